use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{ConvError, Result};
use super::{extension_of, Backend};

/// Structured text formats handled in-process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    Json,
    Toml,
}

impl TextFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TextFormat::Json => "json",
            TextFormat::Toml => "toml",
        }
    }

    /// Format implied by a file's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        extension_of(path).parse()
    }
}

impl fmt::Display for TextFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TextFormat {
    type Err = ConvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "json" => Ok(TextFormat::Json),
            "toml" => Ok(TextFormat::Toml),
            other => Err(ConvError::UnsupportedFormat(format!(
                "text format '{}' (expected json or toml)",
                other
            ))),
        }
    }
}

/// JSON/TOML conversion and minification without external tools
#[derive(Debug, Default)]
pub struct TextBackend;

impl TextBackend {
    pub fn new() -> Self {
        Self
    }

    pub fn read(&self, path: &Path) -> Result<serde_json::Value> {
        let format = TextFormat::from_path(path)?;
        let content = fs::read_to_string(path)?;
        debug!("Parsing {} as {}", path.display(), format);

        let value = match format {
            TextFormat::Json => serde_json::from_str(&content)?,
            TextFormat::Toml => toml::from_str(&content)?,
        };
        Ok(value)
    }

    pub fn render(
        &self,
        value: &serde_json::Value,
        format: TextFormat,
        minify: bool,
    ) -> Result<String> {
        let text = match (format, minify) {
            (TextFormat::Json, false) => serde_json::to_string_pretty(value)? + "\n",
            (TextFormat::Json, true) => serde_json::to_string(value)?,
            (TextFormat::Toml, false) => toml::to_string_pretty(value)?,
            (TextFormat::Toml, true) => toml::to_string(value)?,
        };
        Ok(text)
    }

    /// Convert between formats; the target format is `output`'s extension.
    pub fn convert(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        let format = TextFormat::from_path(output)?;
        info!("Converting {} -> {}", input.display(), output.display());

        let value = self.read(input)?;
        progress(50.0);
        fs::write(output, self.render(&value, format, false)?)?;
        progress(100.0);
        Ok(())
    }

    /// Re-serialize in the input's own format with insignificant whitespace removed.
    pub fn compress(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        let format = TextFormat::from_path(input)?;
        info!("Minifying {} -> {}", input.display(), output.display());

        let value = self.read(input)?;
        progress(50.0);
        fs::write(output, self.render(&value, format, true)?)?;
        progress(100.0);
        Ok(())
    }
}

impl Backend for TextBackend {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supported_in_formats(&self) -> Vec<&'static str> {
        vec!["json", "toml"]
    }

    fn supported_out_formats(&self) -> Vec<&'static str> {
        vec!["json", "toml"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_parsing() {
        assert_eq!(".JSON".parse::<TextFormat>().unwrap(), TextFormat::Json);
        assert_eq!(TextFormat::from_path(Path::new("a/b.toml")).unwrap(), TextFormat::Toml);
        assert!(matches!(
            "yaml".parse::<TextFormat>(),
            Err(ConvError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_json_to_toml() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("settings.json");
        let output = tmp.path().join("settings.toml");
        fs::write(&input, r#"{"name": "demo", "server": {"port": 8080}}"#).unwrap();

        let mut seen = Vec::new();
        TextBackend::new()
            .convert(&input, &output, &mut |p: f64| seen.push(p))
            .unwrap();

        let parsed: toml::Value = toml::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(parsed["name"].as_str(), Some("demo"));
        assert_eq!(parsed["server"]["port"].as_integer(), Some(8080));
        assert_eq!(seen.last().copied(), Some(100.0));
    }

    #[test]
    fn test_minify_json() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("data.json");
        let output = tmp.path().join("data_compressed.json");
        fs::write(&input, "{\n    \"a\": [1, 2, 3],\n    \"b\": true\n}\n").unwrap();

        TextBackend::new().compress(&input, &output, &mut |_: f64| {}).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), r#"{"a":[1,2,3],"b":true}"#);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("broken.json");
        fs::write(&input, "{ not json").unwrap();

        let output = tmp.path().join("out.json");
        let result = TextBackend::new().compress(&input, &output, &mut |_: f64| {});
        assert!(matches!(result, Err(ConvError::Json(_))));
    }

    #[test]
    fn test_top_level_array_cannot_become_toml() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("list.json");
        fs::write(&input, "[1, 2]").unwrap();

        let output = tmp.path().join("list.toml");
        let result = TextBackend::new().convert(&input, &output, &mut |_: f64| {});
        assert!(result.is_err());
    }
}
