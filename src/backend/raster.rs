use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::ImageConfig;
use crate::error::{ConvError, Result};
use super::qpdf::Rotation;
use super::{extension_of, Backend};

pub const IMAGE_FORMATS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];

/// Formats `image compress` can re-encode
pub const COMPRESSIBLE_FORMATS: &[&str] = &["png", "jpg", "jpeg"];

/// Target size for `image resize`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resize {
    /// Width in pixels; height keeps the aspect ratio
    Width(u32),
    /// Percentage of the original size
    Percent(u32),
}

impl Resize {
    fn target(&self, width: u32, height: u32) -> Result<(u32, u32)> {
        let new_width = match self {
            Resize::Width(w) => u64::from(*w),
            Resize::Percent(p) => u64::from(width) * u64::from(*p) / 100,
        };
        if new_width == 0 || width == 0 {
            return Err(ConvError::InvalidArgument(format!(
                "cannot resize a {}x{} image with '{}'",
                width, height, self
            )));
        }
        let new_height = (new_width * u64::from(height) / u64::from(width)).max(1);
        let clamp = |v: u64| u32::try_from(v).unwrap_or(u32::MAX);
        Ok((clamp(new_width), clamp(new_height)))
    }
}

impl fmt::Display for Resize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resize::Width(w) => write!(f, "{}", w),
            Resize::Percent(p) => write!(f, "{}%", p),
        }
    }
}

impl FromStr for Resize {
    type Err = ConvError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || ConvError::InvalidArgument(format!("invalid size '{}' (use 800 or 50%)", s));
        let resize = match s.strip_suffix('%') {
            Some(percent) => Resize::Percent(percent.parse().map_err(|_| invalid())?),
            None => Resize::Width(s.parse().map_err(|_| invalid())?),
        };
        match resize {
            Resize::Width(0) | Resize::Percent(0) => Err(invalid()),
            resize => Ok(resize),
        }
    }
}

/// Native image conversion, compression, resizing and rotation
pub struct ImageBackend {
    quality: u8,
}

impl ImageBackend {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            quality: config.quality,
        }
    }

    fn open(&self, input: &Path) -> Result<DynamicImage> {
        let img = image::open(input)?;
        debug!("Opened {} ({}x{})", input.display(), img.width(), img.height());
        Ok(img)
    }

    /// Write `img` in the format named by `output`'s extension.
    fn save(&self, img: &DynamicImage, output: &Path) -> Result<()> {
        let format = ImageFormat::from_path(output)?;
        let writer = BufWriter::new(File::create(output)?);
        match format {
            // JPEG has no alpha channel
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(writer, self.quality))?;
            }
            ImageFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    writer,
                    CompressionType::Best,
                    PngFilter::Adaptive,
                );
                img.write_with_encoder(encoder)?;
            }
            _ => {
                let mut writer = writer;
                img.write_to(&mut writer, format)?;
            }
        }
        Ok(())
    }

    pub fn convert(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        let format = extension_of(output);
        if !IMAGE_FORMATS.contains(&format.as_str()) {
            return Err(ConvError::UnsupportedFormat(format!(
                "cannot write image format '{}'",
                format
            )));
        }
        info!("Converting {} -> {}", input.display(), output.display());
        let img = self.open(input)?;
        progress(50.0);
        self.save(&img, output)?;
        progress(100.0);
        Ok(())
    }

    /// Re-encode PNG at maximum compression, JPEG at the configured quality.
    pub fn compress(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        let format = extension_of(output);
        if !COMPRESSIBLE_FORMATS.contains(&format.as_str()) {
            return Err(ConvError::UnsupportedFormat(format!(
                "image compress supports {}, got '{}'",
                COMPRESSIBLE_FORMATS.join(", "),
                format
            )));
        }
        info!(
            "Compressing {} (quality {}) -> {}",
            input.display(),
            self.quality,
            output.display()
        );
        let img = self.open(input)?;
        progress(50.0);
        self.save(&img, output)?;
        progress(100.0);
        Ok(())
    }

    pub fn resize(
        &self,
        input: &Path,
        output: &Path,
        size: Resize,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        let img = self.open(input)?;
        let (width, height) = size.target(img.width(), img.height())?;
        info!("Resizing {} to {}x{} -> {}", input.display(), width, height, output.display());
        progress(30.0);

        let resized = img.resize_exact(width, height, FilterType::CatmullRom);
        progress(70.0);
        self.save(&resized, output)?;
        progress(100.0);
        Ok(())
    }

    /// Rotate clockwise.
    pub fn rotate(
        &self,
        input: &Path,
        output: &Path,
        rotation: Rotation,
        progress: &mut dyn FnMut(f64),
    ) -> Result<()> {
        info!("Rotating {} by {} -> {}", input.display(), rotation, output.display());
        let img = self.open(input)?;
        progress(50.0);
        let rotated = match rotation {
            Rotation::Deg90 => img.rotate90(),
            Rotation::Deg180 => img.rotate180(),
            Rotation::Deg270 => img.rotate270(),
        };
        self.save(&rotated, output)?;
        progress(100.0);
        Ok(())
    }
}

impl Backend for ImageBackend {
    fn name(&self) -> &'static str {
        "image"
    }

    fn supported_in_formats(&self) -> Vec<&'static str> {
        IMAGE_FORMATS.to_vec()
    }

    fn supported_out_formats(&self) -> Vec<&'static str> {
        IMAGE_FORMATS.to_vec()
    }
}
