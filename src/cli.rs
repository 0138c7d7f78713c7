use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::command::StageCommand;
use crate::error::{ConvError, Result};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Replace existing output files
    #[arg(long, global = true)]
    pub overwrite: bool,

    /// Do not draw a progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Input files and where their outputs go
#[derive(clap::Args, Debug, Clone)]
pub struct Files {
    /// Input files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Audio conversion (ffmpeg)
    Audio {
        #[command(subcommand)]
        action: AudioAction,
    },

    /// Video conversion and compression (ffmpeg)
    Video {
        #[command(subcommand)]
        action: VideoAction,
    },

    /// PDF compression, merging, rotation and encryption (ghostscript, qpdf)
    Pdf {
        #[command(subcommand)]
        action: PdfAction,
    },

    /// Office document conversion (LibreOffice)
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// E-book conversion (calibre)
    Ebook {
        #[command(subcommand)]
        action: EbookAction,
    },

    /// Image conversion, compression, resizing and rotation
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },

    /// JSON/TOML conversion and minification
    Text {
        #[command(subcommand)]
        action: TextAction,
    },

    /// Checksum lists (md5, sha1, sha2 and sha3 families)
    Hash {
        #[command(subcommand)]
        action: HashAction,
    },

    /// Manage multi-stage pipelines
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },

    /// List backends, their formats and whether their tools are installed
    Formats,

    /// Show or write the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum AudioAction {
    /// Convert audio files to another format
    Convert {
        #[command(flatten)]
        files: Files,

        /// Target format (mp3, flac, ogg, ...)
        #[arg(short, long)]
        format: String,
    },

    /// Decode audio files fully to detect corruption
    Check {
        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum VideoAction {
    /// Convert video files to another container
    Convert {
        #[command(flatten)]
        files: Files,

        /// Target format (mp4, mkv, webm, ...)
        #[arg(short, long)]
        format: String,
    },

    /// Re-encode video files with H.264
    Compress {
        #[command(flatten)]
        files: Files,

        /// Constant rate factor (0-51); defaults to video.crf from the config
        #[arg(long)]
        crf: Option<u8>,
    },

    /// Decode video files fully to detect corruption
    Check {
        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum PdfAction {
    /// Compress PDFs with ghostscript, then optimize with qpdf
    Compress {
        #[command(flatten)]
        files: Files,

        /// Compression level: low, medium or high
        #[arg(short, long)]
        level: Option<String>,
    },

    /// Merge PDFs into one file named after the first input
    Merge {
        #[command(flatten)]
        files: Files,

        /// Explicit output file
        #[arg(long)]
        output_file: Option<PathBuf>,
    },

    /// Rotate every page clockwise
    Rotate {
        #[command(flatten)]
        files: Files,

        /// Degrees: 90, 180 or 270
        #[arg(short, long)]
        rotation: String,
    },

    /// Protect PDFs with a password (AES-256)
    Encrypt {
        #[command(flatten)]
        files: Files,

        /// Owner password (full permissions)
        #[arg(long)]
        owner_password: String,

        /// Password needed to open the file; defaults to the owner password
        #[arg(long)]
        user_password: Option<String>,
    },

    /// Remove password protection
    Decrypt {
        #[command(flatten)]
        files: Files,

        /// Current password
        #[arg(short, long)]
        password: String,
    },
}

#[derive(Subcommand)]
pub enum ImageAction {
    /// Convert images to another format
    Convert {
        #[command(flatten)]
        files: Files,

        /// Target format (png, jpg, webp, ...)
        #[arg(short, long)]
        format: String,
    },

    /// Re-encode PNG/JPEG files smaller
    Compress {
        #[command(flatten)]
        files: Files,
    },

    /// Scale images, keeping the aspect ratio
    Resize {
        #[command(flatten)]
        files: Files,

        /// New width in pixels (800) or a percentage (50%)
        #[arg(short, long)]
        size: String,
    },

    /// Rotate images clockwise
    Rotate {
        #[command(flatten)]
        files: Files,

        /// Degrees: 90, 180 or 270
        #[arg(short, long)]
        rotation: String,
    },
}

#[derive(Subcommand)]
pub enum DocAction {
    /// Convert office documents
    Convert {
        #[command(flatten)]
        files: Files,

        /// Target format (pdf, docx, odt, ...)
        #[arg(short, long)]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum EbookAction {
    /// Convert e-books
    Convert {
        #[command(flatten)]
        files: Files,

        /// Target format (epub, mobi, azw3, ...)
        #[arg(short, long)]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum TextAction {
    /// Convert between JSON and TOML
    Convert {
        #[command(flatten)]
        files: Files,

        /// Target format: json or toml
        #[arg(short, long)]
        format: String,
    },

    /// Minify JSON/TOML files
    Compress {
        #[command(flatten)]
        files: Files,
    },
}

#[derive(Subcommand)]
pub enum HashAction {
    /// Write a CHECKSUM.<algorithm> list for the inputs
    Create {
        #[command(flatten)]
        files: Files,

        /// md5, sha1, sha256, sha384, sha512, sha3_256, sha3_384 or sha3_512
        #[arg(short, long, default_value = "sha256")]
        algorithm: String,

        /// Explicit checksum file
        #[arg(long)]
        output_file: Option<PathBuf>,
    },

    /// Verify checksum lists; the algorithm comes from the file extension
    Check {
        /// Checksum files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum PipelineAction {
    /// Create a pipeline in DIR
    Create {
        /// Pipeline directory; its files are the first stage's inputs
        dir: PathBuf,

        /// Stage operation, e.g. "pdf compress high" (repeat for more stages)
        #[arg(short, long = "stage", required = true)]
        stages: Vec<String>,
    },

    /// Run every stage of the pipeline in DIR
    Execute {
        dir: PathBuf,
    },

    /// Print the stages of the pipeline in DIR
    Show {
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Target path (default: fileconv.toml)
        path: Option<PathBuf>,
    },
}

/// A one-off conversion requested on the command line.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub command: StageCommand,
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub output_file: Option<PathBuf>,
}

impl Conversion {
    fn new(operation: String, files: Files, output_file: Option<PathBuf>) -> Result<Self> {
        Self::with_command(StageCommand::parse(&operation)?, files, output_file)
    }

    fn with_command(
        command: StageCommand,
        files: Files,
        output_file: Option<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            command,
            inputs: files.inputs,
            output_dir: files.output_dir,
            output_file,
        })
    }

    /// Checks write nothing, so there is no output directory.
    fn check(operation: &str, inputs: Vec<PathBuf>) -> Result<Self> {
        let files = Files {
            inputs,
            output_dir: PathBuf::from("."),
        };
        Self::new(operation.to_string(), files, None)
    }
}

impl Commands {
    /// The conversion this command asks for; pipeline, formats and config
    /// commands are not conversions.
    pub fn into_conversion(self) -> Result<Conversion> {
        match self {
            Commands::Audio { action } => match action {
                AudioAction::Convert { files, format } => {
                    Conversion::new(format!("audio convert {}", format), files, None)
                }
                AudioAction::Check { inputs } => Conversion::check("audio check", inputs),
            },
            Commands::Video { action } => match action {
                VideoAction::Convert { files, format } => {
                    Conversion::new(format!("video convert {}", format), files, None)
                }
                VideoAction::Compress { files, crf } => {
                    let operation = match crf {
                        Some(crf) => format!("video compress {}", crf),
                        None => "video compress".to_string(),
                    };
                    Conversion::new(operation, files, None)
                }
                VideoAction::Check { inputs } => Conversion::check("video check", inputs),
            },
            Commands::Pdf { action } => match action {
                PdfAction::Compress { files, level } => {
                    let operation = match level {
                        Some(level) => format!("pdf compress {}", level),
                        None => "pdf compress".to_string(),
                    };
                    Conversion::new(operation, files, None)
                }
                PdfAction::Merge { files, output_file } => {
                    Conversion::new("pdf merge".to_string(), files, output_file)
                }
                PdfAction::Rotate { files, rotation } => {
                    Conversion::new(format!("pdf rotate {}", rotation), files, None)
                }
                // passwords may contain spaces, so skip the text form
                PdfAction::Encrypt {
                    files,
                    owner_password,
                    user_password,
                } => Conversion::with_command(
                    StageCommand::PdfEncrypt {
                        owner_password,
                        user_password,
                    },
                    files,
                    None,
                ),
                PdfAction::Decrypt { files, password } => {
                    Conversion::with_command(StageCommand::PdfDecrypt { password }, files, None)
                }
            },
            Commands::Image { action } => match action {
                ImageAction::Convert { files, format } => {
                    Conversion::new(format!("image convert {}", format), files, None)
                }
                ImageAction::Compress { files } => {
                    Conversion::new("image compress".to_string(), files, None)
                }
                ImageAction::Resize { files, size } => {
                    Conversion::new(format!("image resize {}", size), files, None)
                }
                ImageAction::Rotate { files, rotation } => {
                    Conversion::new(format!("image rotate {}", rotation), files, None)
                }
            },
            Commands::Doc { action: DocAction::Convert { files, format } } => {
                Conversion::new(format!("doc convert {}", format), files, None)
            }
            Commands::Ebook { action: EbookAction::Convert { files, format } } => {
                Conversion::new(format!("ebook convert {}", format), files, None)
            }
            Commands::Text { action } => match action {
                TextAction::Convert { files, format } => {
                    Conversion::new(format!("text convert {}", format), files, None)
                }
                TextAction::Compress { files } => {
                    Conversion::new("text compress".to_string(), files, None)
                }
            },
            Commands::Hash { action } => match action {
                HashAction::Create {
                    files,
                    algorithm,
                    output_file,
                } => Conversion::new(format!("hash create {}", algorithm), files, output_file),
                HashAction::Check { inputs } => Conversion::check("hash check", inputs),
            },
            Commands::Pipeline { .. } | Commands::Formats | Commands::Config { .. } => Err(
                ConvError::InvalidArgument("not a conversion command".to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_pdf_compress_maps_to_stage_command() {
        let args = Args::try_parse_from([
            "fileconv", "pdf", "compress", "a.pdf", "b.pdf", "-l", "high", "-o", "out",
        ])
        .unwrap();
        let conversion = args.command.into_conversion().unwrap();
        assert_eq!(conversion.command.to_string(), "pdf compress high");
        assert_eq!(conversion.inputs, vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")]);
        assert_eq!(conversion.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "fileconv",
            "text",
            "compress",
            "a.json",
            "--overwrite",
            "--no-progress",
        ])
        .unwrap();
        assert!(args.overwrite);
        assert!(args.no_progress);
    }

    #[test]
    fn test_bad_format_is_rejected() {
        let args =
            Args::try_parse_from(["fileconv", "audio", "convert", "a.wav", "-f", "pdf"]).unwrap();
        assert!(args.command.into_conversion().is_err());
    }

    #[test]
    fn test_hash_algorithm_flag() {
        let args = Args::try_parse_from(["fileconv", "hash", "create", "a.bin", "-a", "sha3_256"])
            .unwrap();
        let conversion = args.command.into_conversion().unwrap();
        assert_eq!(conversion.command.to_string(), "hash create sha3_256");

        let args = Args::try_parse_from(["fileconv", "hash", "create", "a.bin"]).unwrap();
        let conversion = args.command.into_conversion().unwrap();
        assert_eq!(conversion.command.to_string(), "hash create sha256");
    }

    #[test]
    fn test_encrypt_keeps_passwords_with_spaces() {
        let args = Args::try_parse_from([
            "fileconv",
            "pdf",
            "encrypt",
            "a.pdf",
            "--owner-password",
            "two words",
        ])
        .unwrap();
        let conversion = args.command.into_conversion().unwrap();
        assert_eq!(
            conversion.command,
            StageCommand::PdfEncrypt {
                owner_password: "two words".to_string(),
                user_password: None,
            }
        );
    }

    #[test]
    fn test_image_and_check_commands() {
        let args =
            Args::try_parse_from(["fileconv", "image", "resize", "a.png", "-s", "50%"]).unwrap();
        let conversion = args.command.into_conversion().unwrap();
        assert_eq!(conversion.command.to_string(), "image resize 50%");

        let args = Args::try_parse_from(["fileconv", "video", "check", "a.mp4", "b.mkv"]).unwrap();
        let conversion = args.command.into_conversion().unwrap();
        assert_eq!(conversion.command, StageCommand::VideoCheck);
        assert_eq!(conversion.inputs.len(), 2);
    }

    #[test]
    fn test_pipeline_stages() {
        let args = Args::try_parse_from([
            "fileconv",
            "pipeline",
            "create",
            "work",
            "--stage",
            "pdf compress",
            "--stage",
            "pdf merge",
        ])
        .unwrap();
        match args.command {
            Commands::Pipeline { action: PipelineAction::Create { dir, stages } } => {
                assert_eq!(dir, PathBuf::from("work"));
                assert_eq!(stages, vec!["pdf compress", "pdf merge"]);
            }
            _ => panic!("expected pipeline create"),
        }
    }
}
