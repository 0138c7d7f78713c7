use std::path::Path;
use tracing::info;

use crate::config::ToolsConfig;
use crate::error::{ConvError, Result};
use super::{extension_of, Backend, ToolCommand};

pub const EBOOK_FORMATS: &[&str] =
    &["epub", "mobi", "azw3", "fb2", "pdf", "txt", "docx", "html", "rtf"];

/// E-books through calibre's `ebook-convert`
pub struct CalibreBackend {
    binary_path: String,
}

impl CalibreBackend {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            binary_path: tools.calibre.clone(),
        }
    }

    pub fn convert(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        let format = extension_of(output);
        if !EBOOK_FORMATS.contains(&format.as_str()) {
            return Err(ConvError::UnsupportedFormat(format!(
                "ebook-convert cannot write '{}'",
                format
            )));
        }

        info!("Converting e-book {} -> {}", input.display(), output.display());
        progress(0.0);
        ToolCommand::new(&self.binary_path, format!("Convert to {}", format))
            .path(input)
            .path(output)
            .execute_streaming(|line| {
                if let Some(p) = parse_percent(line) {
                    progress(p);
                }
            })?;
        progress(100.0);
        Ok(())
    }
}

/// ebook-convert prints lines like `34% Running transforms on e-book...`
fn parse_percent(line: &str) -> Option<f64> {
    let (number, _) = line.split_once('%')?;
    let value: f64 = number.trim().parse().ok()?;
    Some(value.clamp(0.0, 100.0))
}

impl Backend for CalibreBackend {
    fn name(&self) -> &'static str {
        "calibre"
    }

    fn supported_in_formats(&self) -> Vec<&'static str> {
        EBOOK_FORMATS.to_vec()
    }

    fn supported_out_formats(&self) -> Vec<&'static str> {
        EBOOK_FORMATS.to_vec()
    }

    fn external_dependencies(&self) -> Vec<String> {
        vec![self.binary_path.clone()]
    }

    fn check_availability(&self) -> Result<()> {
        ToolCommand::new(&self.binary_path, "Version check").arg("--version").execute()?;
        Ok(())
    }
}
