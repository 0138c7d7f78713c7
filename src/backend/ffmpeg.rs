use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::{ToolsConfig, VideoConfig};
use crate::error::{ConvError, Result};
use super::{extension_of, Backend, ToolCommand};

pub const AUDIO_FORMATS: &[&str] = &["mp3", "wav", "flac", "ogg", "aac", "m4a", "opus", "wma"];
pub const VIDEO_FORMATS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm", "flv", "wmv", "m4v"];

/// FFmpeg-based audio/video conversion, compression and integrity checks
pub struct FfmpegBackend {
    ffmpeg: String,
    ffprobe: String,
    default_crf: u8,
    extra_args: Vec<String>,
}

impl FfmpegBackend {
    pub fn new(tools: &ToolsConfig, video: &VideoConfig) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
            default_crf: video.crf,
            extra_args: video.extra_args.clone(),
        }
    }

    fn base_command(&self, description: impl Into<String>, input: &Path) -> ToolCommand {
        ToolCommand::new(&self.ffmpeg, description)
            .args(["-hide_banner", "-nostats", "-loglevel", "error"])
            .args(["-progress", "pipe:1"])
            .arg("-i")
            .path(input)
    }

    /// Convert `input` to the container/codec implied by `output`'s extension.
    pub fn convert(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        let format = extension_of(output);
        if !AUDIO_FORMATS.contains(&format.as_str()) && !VIDEO_FORMATS.contains(&format.as_str()) {
            return Err(ConvError::UnsupportedFormat(format!("ffmpeg cannot write '{}'", format)));
        }

        info!("Converting {} -> {}", input.display(), output.display());
        let command = self
            .base_command(format!("Convert to {}", format), input)
            .arg("-y")
            .path(output);

        self.run(command, input, progress)
    }

    /// Re-encode video with H.264 at the given (or configured) CRF.
    pub fn compress(
        &self,
        input: &Path,
        output: &Path,
        crf: Option<u8>,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        let crf = crf.unwrap_or(self.default_crf);
        info!("Compressing {} (crf {}) -> {}", input.display(), crf, output.display());

        let command = self
            .base_command(format!("Compress video (crf {})", crf), input)
            .args(["-c:v", "libx264", "-preset", "medium"])
            .arg("-crf")
            .arg(crf.to_string())
            .args(["-c:a", "aac", "-b:a", "128k"])
            .args(&self.extra_args)
            .arg("-y")
            .path(output);

        self.run(command, input, progress)
    }

    /// Decode every stream to the null muxer; any decode error fails the check.
    pub fn check(&self, input: &Path, progress: &mut dyn FnMut(f64)) -> Result<()> {
        info!("Checking {}", input.display());
        let command = self
            .base_command("Integrity check", input)
            .args(["-xerror", "-f", "null", "-"]);
        self.run(command, input, progress)?;
        info!("{}: OK", input.display());
        Ok(())
    }

    fn run(&self, command: ToolCommand, input: &Path, progress: &mut dyn FnMut(f64)) -> Result<()> {
        let duration = match self.media_duration(input) {
            Ok(duration) => duration,
            Err(e) => {
                warn!("Could not read duration of {}: {}", input.display(), e);
                None
            }
        };

        progress(0.0);
        command.execute_streaming(|line| {
            if let Some(p) = parse_progress_line(line, duration) {
                progress(p);
            }
        })?;
        progress(100.0);
        Ok(())
    }

    /// Media duration in seconds, if ffprobe can tell.
    pub fn media_duration(&self, input: &Path) -> Result<Option<f64>> {
        let output = ToolCommand::new(&self.ffprobe, "Read duration")
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .path(input)
            .execute()?;

        let text = String::from_utf8_lossy(&output.stdout);
        let duration = text.trim().parse::<f64>().ok().filter(|d| *d > 0.0);
        debug!("Duration of {}: {:?}", input.display(), duration);
        Ok(duration)
    }
}

/// Map one `-progress` key=value line to a 0-100 step figure.
fn parse_progress_line(line: &str, duration: Option<f64>) -> Option<f64> {
    let (key, value) = line.split_once('=')?;
    match key {
        "progress" if value == "end" => Some(100.0),
        // out_time_ms is microseconds as well, despite the name
        "out_time_us" | "out_time_ms" => {
            let duration = duration?;
            let micros = value.trim().parse::<f64>().ok()?;
            Some((micros / 1_000_000.0 / duration * 100.0).clamp(0.0, 100.0))
        }
        _ => None,
    }
}

impl Backend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn supported_in_formats(&self) -> Vec<&'static str> {
        AUDIO_FORMATS.iter().chain(VIDEO_FORMATS).copied().collect()
    }

    fn supported_out_formats(&self) -> Vec<&'static str> {
        self.supported_in_formats()
    }

    fn external_dependencies(&self) -> Vec<String> {
        vec![self.ffmpeg.clone(), self.ffprobe.clone()]
    }

    fn check_availability(&self) -> Result<()> {
        ToolCommand::new(&self.ffmpeg, "Version check").arg("-version").execute()?;
        ToolCommand::new(&self.ffprobe, "Version check").arg("-version").execute()?;
        Ok(())
    }
}
