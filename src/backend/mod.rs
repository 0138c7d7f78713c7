//! Adapters around the tools that do the actual converting.
//!
//! Every adapter takes concrete input/output paths and a step progress sink
//! (0-100). Naming, conflict checks and overall progress are the batch
//! processor's job, not the backend's.

pub mod calibre;
pub mod ffmpeg;
pub mod ghostscript;
pub mod hash;
pub mod libreoffice;
pub mod qpdf;
pub mod raster;
pub mod text;
pub mod tool;

pub use calibre::CalibreBackend;
pub use ffmpeg::FfmpegBackend;
pub use ghostscript::{GhostscriptBackend, PdfCompression};
pub use hash::{HashAlgorithm, HashBackend};
pub use libreoffice::LibreOfficeBackend;
pub use qpdf::{QpdfBackend, Rotation};
pub use raster::{ImageBackend, Resize};
pub use text::{TextBackend, TextFormat};
pub use tool::ToolCommand;

use std::path::Path;

use crate::config::Config;
use crate::error::Result;

/// Common surface of every conversion backend
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lowercase extensions this backend reads
    fn supported_in_formats(&self) -> Vec<&'static str>;

    /// Lowercase extensions this backend writes
    fn supported_out_formats(&self) -> Vec<&'static str>;

    /// External binaries this backend shells out to
    fn external_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Check that the external binaries can be run
    fn check_availability(&self) -> Result<()> {
        Ok(())
    }
}

/// The full set of backends, configured once at startup.
pub struct Backends {
    pub ffmpeg: FfmpegBackend,
    pub ghostscript: GhostscriptBackend,
    pub qpdf: QpdfBackend,
    pub libreoffice: LibreOfficeBackend,
    pub calibre: CalibreBackend,
    pub image: ImageBackend,
    pub text: TextBackend,
    pub hash: HashBackend,
}

impl Backends {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg: FfmpegBackend::new(&config.tools, &config.video),
            ghostscript: GhostscriptBackend::new(&config.tools, &config.pdf),
            qpdf: QpdfBackend::new(&config.tools),
            libreoffice: LibreOfficeBackend::new(&config.tools),
            calibre: CalibreBackend::new(&config.tools),
            image: ImageBackend::new(&config.image),
            text: TextBackend::new(),
            hash: HashBackend::new(),
        }
    }

    pub fn all(&self) -> Vec<&dyn Backend> {
        vec![
            &self.ffmpeg,
            &self.ghostscript,
            &self.qpdf,
            &self.libreoffice,
            &self.calibre,
            &self.image,
            &self.text,
            &self.hash,
        ]
    }
}

/// Lowercase extension of `path`, empty if it has none.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lists_every_backend() {
        let backends = Backends::from_config(&Config::default());
        let names: Vec<&str> = backends.all().iter().map(|b| b.name()).collect();
        assert_eq!(
            names,
            vec![
                "ffmpeg",
                "ghostscript",
                "qpdf",
                "libreoffice",
                "calibre",
                "image",
                "text",
                "hash"
            ]
        );
    }

    #[test]
    fn test_native_backends_need_nothing() {
        let backends = Backends::from_config(&Config::default());
        assert!(backends.text.external_dependencies().is_empty());
        assert!(backends.image.external_dependencies().is_empty());
        assert!(backends.hash.check_availability().is_ok());
        assert_eq!(backends.ffmpeg.external_dependencies(), vec!["ffmpeg", "ffprobe"]);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("a/B.PDF")), "pdf");
        assert_eq!(extension_of(Path::new("README")), "");
    }
}
