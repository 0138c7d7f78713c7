use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::config::{PdfConfig, ToolsConfig};
use crate::error::{ConvError, Result};
use super::{Backend, ToolCommand};

/// How hard ghostscript squeezes a PDF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfCompression {
    Low,
    #[default]
    Medium,
    High,
}

impl PdfCompression {
    /// Value for `-dPDFSETTINGS`
    pub fn pdf_settings(&self) -> &'static str {
        match self {
            PdfCompression::Low => "/printer",
            PdfCompression::Medium => "/ebook",
            PdfCompression::High => "/screen",
        }
    }
}

impl fmt::Display for PdfCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PdfCompression::Low => "low",
            PdfCompression::Medium => "medium",
            PdfCompression::High => "high",
        };
        f.write_str(s)
    }
}

impl FromStr for PdfCompression {
    type Err = ConvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(PdfCompression::Low),
            "medium" => Ok(PdfCompression::Medium),
            "high" => Ok(PdfCompression::High),
            other => Err(ConvError::InvalidArgument(format!(
                "unknown compression level '{}' (expected low, medium or high)",
                other
            ))),
        }
    }
}

pub struct GhostscriptBackend {
    binary_path: String,
    default_level: PdfCompression,
}

impl GhostscriptBackend {
    pub fn new(tools: &ToolsConfig, pdf: &PdfConfig) -> Self {
        Self {
            binary_path: tools.ghostscript.clone(),
            default_level: pdf.compression,
        }
    }

    fn pdfwrite(&self, description: impl Into<String>) -> ToolCommand {
        ToolCommand::new(&self.binary_path, description)
            .args(["-sDEVICE=pdfwrite", "-dCompatibilityLevel=1.4"])
            .args(["-dNOPAUSE", "-dBATCH", "-dSAFER"])
    }

    pub fn compress(
        &self,
        input: &Path,
        output: &Path,
        level: Option<PdfCompression>,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        let level = level.unwrap_or(self.default_level);
        info!("Compressing PDF {} ({}) -> {}", input.display(), level, output.display());

        let command = self
            .pdfwrite(format!("PDF compress ({})", level))
            .arg(format!("-dPDFSETTINGS={}", level.pdf_settings()))
            .arg("-o")
            .path(output)
            .path(input);

        run_with_pages(command, progress)
    }

    pub fn merge(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        info!("Merging {} PDF(s) -> {}", inputs.len(), output.display());

        let mut command = self.pdfwrite("PDF merge").arg("-o").path(output);
        for input in inputs {
            command = command.path(input);
        }

        run_with_pages(command, progress)
    }
}

fn run_with_pages(command: ToolCommand, progress: &mut dyn FnMut(f64)) -> Result<()> {
    let mut pages = PageCounter::default();
    progress(0.0);
    command.execute_streaming(|line| {
        if let Some(p) = pages.feed(line) {
            progress(p);
        }
    })?;
    progress(100.0);
    Ok(())
}

/// Tracks "Processing pages 1 through N." / "Page k" chatter on stdout.
#[derive(Debug, Default)]
struct PageCounter {
    total: Option<u32>,
}

impl PageCounter {
    fn feed(&mut self, line: &str) -> Option<f64> {
        if let Some(rest) = line.strip_prefix("Processing pages ") {
            self.total = rest
                .trim_end_matches('.')
                .rsplit(' ')
                .next()
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0);
            return None;
        }
        let page: u32 = line.strip_prefix("Page ")?.trim().parse().ok()?;
        let total = self.total?;
        // "Page k" is printed when page k starts
        Some((f64::from(page.saturating_sub(1)) / f64::from(total) * 100.0).clamp(0.0, 100.0))
    }
}

impl Backend for GhostscriptBackend {
    fn name(&self) -> &'static str {
        "ghostscript"
    }

    fn supported_in_formats(&self) -> Vec<&'static str> {
        vec!["pdf"]
    }

    fn supported_out_formats(&self) -> Vec<&'static str> {
        vec!["pdf"]
    }

    fn external_dependencies(&self) -> Vec<String> {
        vec![self.binary_path.clone()]
    }

    fn check_availability(&self) -> Result<()> {
        ToolCommand::new(&self.binary_path, "Version check").arg("--version").execute()?;
        Ok(())
    }
}
