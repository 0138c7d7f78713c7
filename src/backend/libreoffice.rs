use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::config::ToolsConfig;
use crate::error::{ConvError, Result};
use super::{extension_of, Backend, ToolCommand};

pub const DOC_IN_FORMATS: &[&str] = &[
    "doc", "docx", "odt", "rtf", "txt", "xls", "xlsx", "ods", "csv", "ppt", "pptx", "odp",
];
pub const DOC_OUT_FORMATS: &[&str] = &[
    "pdf", "docx", "odt", "rtf", "html", "txt", "xlsx", "ods", "csv", "pptx", "odp",
];

/// Office documents through headless LibreOffice
pub struct LibreOfficeBackend {
    binary_path: String,
}

impl LibreOfficeBackend {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            binary_path: tools.libreoffice.clone(),
        }
    }

    /// soffice only takes an output directory and names the file itself,
    /// so convert into a scratch directory next to `output` and move it.
    pub fn convert(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        let format = extension_of(output);
        if !DOC_OUT_FORMATS.contains(&format.as_str()) {
            return Err(ConvError::UnsupportedFormat(format!(
                "LibreOffice cannot write '{}'",
                format
            )));
        }

        info!("Converting document {} -> {}", input.display(), output.display());
        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let scratch = tempfile::Builder::new().prefix(".fileconv-").tempdir_in(parent)?;

        progress(0.0);
        ToolCommand::new(&self.binary_path, format!("Convert to {}", format))
            .args(["--headless", "--norestore", "--convert-to"])
            .arg(&format)
            .arg("--outdir")
            .path(scratch.path())
            .path(input)
            .execute()?;

        let mut produced_name = input.file_stem().unwrap_or_default().to_os_string();
        produced_name.push(".");
        produced_name.push(&format);
        let produced = scratch.path().join(produced_name);
        if !produced.exists() {
            return Err(ConvError::MissingOutput(produced));
        }

        debug!("Moving {} -> {}", produced.display(), output.display());
        fs::rename(&produced, output)?;
        progress(100.0);
        Ok(())
    }
}

impl Backend for LibreOfficeBackend {
    fn name(&self) -> &'static str {
        "libreoffice"
    }

    fn supported_in_formats(&self) -> Vec<&'static str> {
        DOC_IN_FORMATS.to_vec()
    }

    fn supported_out_formats(&self) -> Vec<&'static str> {
        DOC_OUT_FORMATS.to_vec()
    }

    fn external_dependencies(&self) -> Vec<String> {
        vec![self.binary_path.clone()]
    }

    fn check_availability(&self) -> Result<()> {
        ToolCommand::new(&self.binary_path, "Version check").arg("--version").execute()?;
        Ok(())
    }
}
