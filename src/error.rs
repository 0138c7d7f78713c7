use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No input files provided")]
    NoInputFiles,

    #[error("Input file '{}' does not exist", .0.display())]
    FileNotFound(PathBuf),

    #[error("Output file '{}' already exists and overwrite mode is disabled", .0.display())]
    FileExists(PathBuf),

    #[error("Output file '{}' would be written by more than one input", .0.display())]
    DuplicateOutput(PathBuf),

    #[error("Input file and output file cannot be the same: '{}'", .0.display())]
    SamePath(PathBuf),

    #[error("Output path '{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Progress invariant violated: {completed} completed units > {total} total units")]
    ProgressInvariant { completed: usize, total: usize },

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Hash check failed for '{}': expected {expected}, actual {actual}", .file.display())]
    HashMismatch {
        file: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Expected output '{}' was not produced", .0.display())]
    MissingOutput(PathBuf),

    #[error("Pipeline stage {stage} failed{}: {source}", on_file(.file))]
    Stage {
        stage: usize,
        file: Option<PathBuf>,
        #[source]
        source: Box<ConvError>,
    },
}

impl ConvError {
    /// Wrap an error with the pipeline stage (1-based) and file it came from.
    pub fn in_stage(self, stage: usize, file: Option<PathBuf>) -> Self {
        ConvError::Stage {
            stage,
            file,
            source: Box::new(self),
        }
    }
}

fn on_file(file: &Option<PathBuf>) -> String {
    file.as_ref()
        .map(|f| format!(" on '{}'", f.display()))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, ConvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_names_stage_and_file() {
        let err = ConvError::Tool {
            tool: "ghostscript".to_string(),
            message: "exit status 1".to_string(),
        }
        .in_stage(2, Some(PathBuf::from("in.pdf")));

        let text = err.to_string();
        assert!(text.contains("stage 2"));
        assert!(text.contains("in.pdf"));
        assert!(text.contains("ghostscript failed"));
    }

    #[test]
    fn test_stage_error_without_file() {
        let err = ConvError::NoInputFiles.in_stage(1, None);
        assert_eq!(err.to_string(), "Pipeline stage 1 failed: No input files provided");
    }
}
