use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backend::PdfCompression;
use crate::error::{ConvError, Result};

/// Looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILENAME: &str = "fileconv.toml";

/// Highest CRF libx264 accepts
const MAX_CRF: u8 = 51;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub tools: ToolsConfig,
    pub video: VideoConfig,
    pub pdf: PdfConfig,
    pub image: ImageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Replace existing outputs instead of failing
    pub overwrite_output: bool,
    /// Draw a progress bar while jobs run
    pub show_progress: bool,
    /// Directory for the daily rolling log file
    pub log_dir: String,
}

/// Binary names or paths of the external tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub ghostscript: String,
    pub qpdf: String,
    pub libreoffice: String,
    pub calibre: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Constant rate factor used by `video compress` (0-51, lower is better)
    pub crf: u8,
    /// Extra ffmpeg arguments appended when compressing
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    pub compression: PdfCompression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// JPEG quality used by `image convert` and `image compress` (1-100)
    pub quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            overwrite_output: false,
            show_progress: true,
            log_dir: ".fileconv/log".to_string(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            ghostscript: "gs".to_string(),
            qpdf: "qpdf".to_string(),
            libreoffice: "soffice".to_string(),
            calibre: "ebook-convert".to_string(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            crf: 28,
            extra_args: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConvError::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConvError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// `--config` if given, else `./fileconv.toml` if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILENAME);
        if local.exists() {
            return Ok((Self::from_file(&local)?, Some(local)));
        }
        Ok((Self::default(), None))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConvError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| ConvError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Configuration written to {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.video.crf > MAX_CRF {
            return Err(ConvError::Config(format!(
                "video.crf must be between 0 and {}, got {}",
                MAX_CRF, self.video.crf
            )));
        }

        if !(1..=100).contains(&self.image.quality) {
            return Err(ConvError::Config(format!(
                "image.quality must be between 1 and 100, got {}",
                self.image.quality
            )));
        }

        let tools = [
            ("ffmpeg", &self.tools.ffmpeg),
            ("ffprobe", &self.tools.ffprobe),
            ("ghostscript", &self.tools.ghostscript),
            ("qpdf", &self.tools.qpdf),
            ("libreoffice", &self.tools.libreoffice),
            ("calibre", &self.tools.calibre),
        ];
        for (name, value) in tools {
            if value.trim().is_empty() {
                return Err(ConvError::Config(format!("tools.{} must not be empty", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fileconv.toml");
        std::fs::write(&path, "[video]\ncrf = 23\n\n[pdf]\ncompression = \"high\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.video.crf, 23);
        assert_eq!(config.pdf.compression, PdfCompression::High);
        assert_eq!(config.tools.ghostscript, "gs");
        assert!(config.general.show_progress);
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fileconv.toml");
        let mut config = Config::default();
        config.general.overwrite_output = true;
        config.video.extra_args = vec!["-movflags".to_string(), "+faststart".to_string()];

        config.save_to_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_crf_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fileconv.toml");
        std::fs::write(&path, "[video]\ncrf = 60\n").unwrap();

        assert!(matches!(Config::from_file(&path), Err(ConvError::Config(_))));
    }

    #[test]
    fn test_image_quality_bounds() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fileconv.toml");
        std::fs::write(&path, "[image]\nquality = 0\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConvError::Config(_))));

        std::fs::write(&path, "[image]\nquality = 75\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().image.quality, 75);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(Config::load(Some(missing.as_path())).is_err());
    }
}
