//! Conversion commands and how they map onto batches and backends.
//!
//! A [`StageCommand`] is the typed form of one CLI operation such as
//! `pdf compress high`. The same value drives a one-off CLI run and a
//! persisted pipeline stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backend::{
    calibre::EBOOK_FORMATS,
    ffmpeg::{AUDIO_FORMATS, VIDEO_FORMATS},
    libreoffice::DOC_OUT_FORMATS,
    raster::IMAGE_FORMATS,
    Backends, HashAlgorithm, PdfCompression, Resize, Rotation, TextFormat,
};
use crate::batch::{BatchDescriptor, BatchProcessor, BatchReport, OutputTarget, WorkItem};
use crate::error::{ConvError, Result};
use crate::output_path::Naming;
use crate::progress::ProgressScope;

pub const COMPRESSED_SUFFIX: &str = "_compressed";
pub const MERGED_SUFFIX: &str = "_merged";
pub const ROTATED_SUFFIX: &str = "_rotated";
pub const RESIZED_SUFFIX: &str = "_resized";
pub const ENCRYPTED_SUFFIX: &str = "_encrypted";
pub const DECRYPTED_SUFFIX: &str = "_decrypted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum StageCommand {
    AudioConvert {
        format: String,
    },
    AudioCheck,
    VideoConvert {
        format: String,
    },
    VideoCheck,
    VideoCompress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        crf: Option<u8>,
    },
    PdfCompress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<PdfCompression>,
    },
    PdfMerge,
    PdfRotate {
        rotation: Rotation,
    },
    PdfEncrypt {
        owner_password: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_password: Option<String>,
    },
    PdfDecrypt {
        password: String,
    },
    DocConvert {
        format: String,
    },
    EbookConvert {
        format: String,
    },
    TextConvert {
        format: TextFormat,
    },
    TextCompress,
    ImageConvert {
        format: String,
    },
    ImageCompress,
    ImageResize {
        size: Resize,
    },
    ImageRotate {
        rotation: Rotation,
    },
    HashCreate {
        #[serde(default)]
        algorithm: HashAlgorithm,
    },
    HashCheck,
}

/// Where a command's output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRule {
    /// One output per input, named from the input
    PerFile(Naming),
    /// One output from all inputs, named from the first input
    Merged(Naming),
    /// One output from all inputs with a fixed file name
    Fixed(String),
    /// Nothing is written; inputs pass through
    CheckOnly,
}

impl StageCommand {
    /// Parse `group action [args...]`, e.g. `pdf compress high`.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let (group, action, args) = match tokens.as_slice() {
            [group, action, args @ ..] => (*group, *action, args),
            _ => {
                return Err(ConvError::InvalidArgument(format!(
                    "expected '<group> <action> [args]', got '{}'",
                    text.trim()
                )))
            }
        };

        let command = match (group, action) {
            ("audio", "convert") => StageCommand::AudioConvert {
                format: format_arg(args, AUDIO_FORMATS)?,
            },
            ("audio", "check") => no_args(args, StageCommand::AudioCheck)?,
            ("video", "convert") => StageCommand::VideoConvert {
                format: format_arg(args, VIDEO_FORMATS)?,
            },
            ("video", "check") => no_args(args, StageCommand::VideoCheck)?,
            ("video", "compress") => StageCommand::VideoCompress {
                crf: optional_arg(args)?.map(parse_crf).transpose()?,
            },
            ("pdf", "compress") => StageCommand::PdfCompress {
                level: optional_arg(args)?
                    .map(str::parse::<PdfCompression>)
                    .transpose()?,
            },
            ("pdf", "merge") => no_args(args, StageCommand::PdfMerge)?,
            ("pdf", "rotate") => StageCommand::PdfRotate {
                rotation: required_arg(args, "rotation")?.parse::<Rotation>()?,
            },
            ("pdf", "encrypt") => match args {
                [owner] => StageCommand::PdfEncrypt {
                    owner_password: owner.to_string(),
                    user_password: None,
                },
                [owner, user] => StageCommand::PdfEncrypt {
                    owner_password: owner.to_string(),
                    user_password: Some(user.to_string()),
                },
                _ => {
                    return Err(ConvError::InvalidArgument(
                        "usage: pdf encrypt <owner-password> [user-password]".to_string(),
                    ))
                }
            },
            ("pdf", "decrypt") => StageCommand::PdfDecrypt {
                password: required_arg(args, "password")?.to_string(),
            },
            ("doc", "convert") => StageCommand::DocConvert {
                format: format_arg(args, DOC_OUT_FORMATS)?,
            },
            ("ebook", "convert") => StageCommand::EbookConvert {
                format: format_arg(args, EBOOK_FORMATS)?,
            },
            ("text", "convert") => StageCommand::TextConvert {
                format: required_arg(args, "format")?.parse::<TextFormat>()?,
            },
            ("text", "compress") => no_args(args, StageCommand::TextCompress)?,
            ("image", "convert") => StageCommand::ImageConvert {
                format: format_arg(args, IMAGE_FORMATS)?,
            },
            ("image", "compress") => no_args(args, StageCommand::ImageCompress)?,
            ("image", "resize") => StageCommand::ImageResize {
                size: required_arg(args, "size")?.parse::<Resize>()?,
            },
            ("image", "rotate") => StageCommand::ImageRotate {
                rotation: required_arg(args, "rotation")?.parse::<Rotation>()?,
            },
            ("hash", "create") => StageCommand::HashCreate {
                algorithm: optional_arg(args)?
                    .map(str::parse::<HashAlgorithm>)
                    .transpose()?
                    .unwrap_or_default(),
            },
            ("hash", "check") => no_args(args, StageCommand::HashCheck)?,
            _ => {
                return Err(ConvError::InvalidArgument(format!(
                    "unknown operation '{} {}'",
                    group, action
                )))
            }
        };
        Ok(command)
    }

    pub fn output_rule(&self) -> OutputRule {
        match self {
            StageCommand::AudioConvert { format }
            | StageCommand::VideoConvert { format }
            | StageCommand::DocConvert { format }
            | StageCommand::EbookConvert { format }
            | StageCommand::ImageConvert { format } => {
                OutputRule::PerFile(Naming::with_extension(format.as_str()))
            }
            StageCommand::TextConvert { format } => {
                OutputRule::PerFile(Naming::with_extension(format.extension()))
            }
            StageCommand::VideoCompress { .. }
            | StageCommand::PdfCompress { .. }
            | StageCommand::TextCompress
            | StageCommand::ImageCompress => {
                OutputRule::PerFile(Naming::with_suffix(COMPRESSED_SUFFIX))
            }
            StageCommand::PdfRotate { .. } | StageCommand::ImageRotate { .. } => {
                OutputRule::PerFile(Naming::with_suffix(ROTATED_SUFFIX))
            }
            StageCommand::ImageResize { .. } => {
                OutputRule::PerFile(Naming::with_suffix(RESIZED_SUFFIX))
            }
            StageCommand::PdfEncrypt { .. } => {
                OutputRule::PerFile(Naming::with_suffix(ENCRYPTED_SUFFIX))
            }
            StageCommand::PdfDecrypt { .. } => {
                OutputRule::PerFile(Naming::with_suffix(DECRYPTED_SUFFIX))
            }
            StageCommand::PdfMerge => {
                OutputRule::Merged(Naming::with_suffix(MERGED_SUFFIX).extension("pdf"))
            }
            StageCommand::HashCreate { algorithm } => {
                OutputRule::Fixed(algorithm.checksum_filename())
            }
            StageCommand::AudioCheck | StageCommand::VideoCheck | StageCommand::HashCheck => {
                OutputRule::CheckOnly
            }
        }
    }

    /// Backend passes per output file; PDF compression runs ghostscript then qpdf.
    pub fn steps_per_unit(&self) -> usize {
        match self {
            StageCommand::PdfCompress { .. } => 2,
            _ => 1,
        }
    }

    /// Build the batch for `inputs`.
    ///
    /// `output_file` names the single output explicitly; otherwise outputs
    /// are placed in `output_dir`.
    pub fn descriptor(
        &self,
        inputs: Vec<PathBuf>,
        output_dir: &Path,
        output_file: Option<PathBuf>,
        overwrite: bool,
    ) -> BatchDescriptor {
        let target = match output_file {
            Some(file) => OutputTarget::File(file),
            None => OutputTarget::Directory(output_dir.to_path_buf()),
        };

        let descriptor = match self.output_rule() {
            OutputRule::PerFile(naming) => BatchDescriptor {
                target,
                ..BatchDescriptor::per_file(inputs, output_dir)
            }
            .naming(naming),
            OutputRule::Merged(naming) => BatchDescriptor::aggregate(inputs, target).naming(naming),
            OutputRule::Fixed(name) => {
                let target = match target {
                    OutputTarget::Directory(dir) => OutputTarget::File(dir.join(name)),
                    file => file,
                };
                BatchDescriptor::aggregate(inputs, target)
            }
            OutputRule::CheckOnly => BatchDescriptor::per_file(inputs, output_dir).check_only(),
        };

        descriptor
            .overwrite(overwrite)
            .steps_per_unit(self.steps_per_unit())
    }
}

fn parse_crf(value: &str) -> Result<u8> {
    value
        .parse::<u8>()
        .ok()
        .filter(|crf| *crf <= 51)
        .ok_or_else(|| ConvError::InvalidArgument(format!("crf must be 0-51, got '{}'", value)))
}

fn format_arg(args: &[&str], allowed: &[&str]) -> Result<String> {
    let format = required_arg(args, "format")?.trim_start_matches('.').to_ascii_lowercase();
    if !allowed.contains(&format.as_str()) {
        return Err(ConvError::UnsupportedFormat(format!(
            "'{}' (supported: {})",
            format,
            allowed.join(", ")
        )));
    }
    Ok(format)
}

fn required_arg<'a>(args: &[&'a str], name: &str) -> Result<&'a str> {
    match args {
        [value] => Ok(*value),
        [] => Err(ConvError::InvalidArgument(format!("missing {} argument", name))),
        _ => Err(unexpected(&args[1..])),
    }
}

fn optional_arg<'a>(args: &[&'a str]) -> Result<Option<&'a str>> {
    match args {
        [] => Ok(None),
        [value] => Ok(Some(*value)),
        _ => Err(unexpected(&args[1..])),
    }
}

fn no_args(args: &[&str], command: StageCommand) -> Result<StageCommand> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(unexpected(args))
    }
}

fn unexpected(args: &[&str]) -> ConvError {
    ConvError::InvalidArgument(format!("unexpected arguments: {}", args.join(" ")))
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageCommand::AudioConvert { format } => write!(f, "audio convert {}", format),
            StageCommand::AudioCheck => f.write_str("audio check"),
            StageCommand::VideoConvert { format } => write!(f, "video convert {}", format),
            StageCommand::VideoCheck => f.write_str("video check"),
            StageCommand::VideoCompress { crf: Some(crf) } => write!(f, "video compress {}", crf),
            StageCommand::VideoCompress { crf: None } => f.write_str("video compress"),
            StageCommand::PdfCompress { level: Some(level) } => write!(f, "pdf compress {}", level),
            StageCommand::PdfCompress { level: None } => f.write_str("pdf compress"),
            StageCommand::PdfMerge => f.write_str("pdf merge"),
            StageCommand::PdfRotate { rotation } => write!(f, "pdf rotate {}", rotation),
            // passwords stay out of logs and `pipeline show`
            StageCommand::PdfEncrypt { user_password: None, .. } => f.write_str("pdf encrypt ***"),
            StageCommand::PdfEncrypt { user_password: Some(_), .. } => {
                f.write_str("pdf encrypt *** ***")
            }
            StageCommand::PdfDecrypt { .. } => f.write_str("pdf decrypt ***"),
            StageCommand::DocConvert { format } => write!(f, "doc convert {}", format),
            StageCommand::EbookConvert { format } => write!(f, "ebook convert {}", format),
            StageCommand::TextConvert { format } => write!(f, "text convert {}", format),
            StageCommand::TextCompress => f.write_str("text compress"),
            StageCommand::ImageConvert { format } => write!(f, "image convert {}", format),
            StageCommand::ImageCompress => f.write_str("image compress"),
            StageCommand::ImageResize { size } => write!(f, "image resize {}", size),
            StageCommand::ImageRotate { rotation } => write!(f, "image rotate {}", rotation),
            StageCommand::HashCreate { algorithm } => write!(f, "hash create {}", algorithm),
            StageCommand::HashCheck => f.write_str("hash check"),
        }
    }
}

/// Performs one work item of a command.
///
/// Implementations report step progress through `progress`; steps left
/// open when `dispatch` returns are closed by the batch processor.
pub trait Dispatch: Send + Sync {
    fn dispatch(
        &self,
        command: &StageCommand,
        item: &WorkItem,
        progress: &mut ProgressScope<'_>,
    ) -> Result<()>;
}

/// Dispatches commands to the configured backends.
pub struct CommandRunner {
    backends: Backends,
}

impl CommandRunner {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    fn compress_pdf(
        &self,
        level: Option<PdfCompression>,
        item: &WorkItem,
        progress: &mut ProgressScope<'_>,
    ) -> Result<()> {
        let scratch = tempfile::tempdir()?;
        let intermediate = scratch.path().join("ghostscript.pdf");

        self.backends
            .ghostscript
            .compress(item.input(), &intermediate, level, &mut progress.step_sink())?;
        progress.complete_step()?;

        self.backends
            .qpdf
            .optimize(&intermediate, item.output(), &mut progress.step_sink())
    }
}

impl Dispatch for CommandRunner {
    fn dispatch(
        &self,
        command: &StageCommand,
        item: &WorkItem,
        progress: &mut ProgressScope<'_>,
    ) -> Result<()> {
        let b = &self.backends;
        let (input, output) = (item.input(), item.output());
        match command {
            StageCommand::AudioConvert { .. } | StageCommand::VideoConvert { .. } => {
                b.ffmpeg.convert(input, output, &mut progress.step_sink())
            }
            StageCommand::AudioCheck | StageCommand::VideoCheck => {
                b.ffmpeg.check(input, &mut progress.step_sink())
            }
            StageCommand::VideoCompress { crf } => {
                b.ffmpeg.compress(input, output, *crf, &mut progress.step_sink())
            }
            StageCommand::PdfCompress { level } => self.compress_pdf(*level, item, progress),
            StageCommand::PdfMerge => {
                b.ghostscript.merge(item.inputs(), output, &mut progress.step_sink())
            }
            StageCommand::PdfRotate { rotation } => {
                b.qpdf.rotate(input, output, *rotation, &mut progress.step_sink())
            }
            StageCommand::PdfEncrypt {
                owner_password,
                user_password,
            } => b.qpdf.encrypt(
                input,
                output,
                owner_password,
                user_password.as_deref(),
                &mut progress.step_sink(),
            ),
            StageCommand::PdfDecrypt { password } => {
                b.qpdf.decrypt(input, output, password, &mut progress.step_sink())
            }
            StageCommand::DocConvert { .. } => {
                b.libreoffice.convert(input, output, &mut progress.step_sink())
            }
            StageCommand::EbookConvert { .. } => {
                b.calibre.convert(input, output, &mut progress.step_sink())
            }
            StageCommand::TextConvert { .. } => {
                b.text.convert(input, output, &mut progress.step_sink())
            }
            StageCommand::TextCompress => b.text.compress(input, output, &mut progress.step_sink()),
            StageCommand::ImageConvert { .. } => {
                b.image.convert(input, output, &mut progress.step_sink())
            }
            StageCommand::ImageCompress => {
                b.image.compress(input, output, &mut progress.step_sink())
            }
            StageCommand::ImageResize { size } => {
                b.image.resize(input, output, *size, &mut progress.step_sink())
            }
            StageCommand::ImageRotate { rotation } => {
                b.image.rotate(input, output, *rotation, &mut progress.step_sink())
            }
            StageCommand::HashCreate { algorithm } => {
                b.hash
                    .generate(item.inputs(), output, *algorithm, &mut progress.step_sink())
            }
            StageCommand::HashCheck => b.hash.check(input, &mut progress.step_sink()).map(|_| ()),
        }
    }
}

/// Run one command as a batch over `descriptor`.
pub fn run_command(
    dispatch: &dyn Dispatch,
    command: &StageCommand,
    descriptor: BatchDescriptor,
    sink: &mut dyn FnMut(f64),
) -> Result<BatchReport> {
    info!("Running '{}' on {} file(s)", command, descriptor.inputs.len());
    let processor = BatchProcessor::new(descriptor)?;
    processor.execute(sink, |item, scope| dispatch.dispatch(command, item, scope))
}
