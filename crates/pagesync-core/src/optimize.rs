//! Re-encoding of downloaded images.
//!
//! Images are flattened onto white, scaled down to a maximum width and saved
//! as JPEG. Bytes that do not decode are kept as fetched, and GIFs are left
//! alone so animations survive.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageFormat, ImageResult, Rgb, RgbImage};
use tracing::{debug, warn};

use crate::config::DownloadConfig;

/// Flatten, downscale and JPEG settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptimizer {
    max_width: u32,
    quality: u8,
}

impl ImageOptimizer {
    /// Optimizer capping width at `max_width` and encoding at `quality`.
    pub fn new(max_width: u32, quality: u8) -> Self {
        Self {
            max_width: max_width.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    /// Optimizer for `config`, `None` when optimization is disabled.
    pub fn from_config(config: &DownloadConfig) -> Option<Self> {
        config
            .optimize_images
            .then(|| Self::new(config.max_image_width, config.jpeg_quality))
    }

    /// Optimized bytes, or `bytes` unchanged when they cannot be re-encoded.
    pub fn apply(&self, bytes: Vec<u8>) -> Vec<u8> {
        match image::guess_format(&bytes) {
            Ok(ImageFormat::Gif) => return bytes,
            Ok(_) => {},
            Err(_) => {
                debug!(bytes = bytes.len(), "Unrecognized image format, keeping original bytes");
                return bytes;
            },
        }
        match self.optimize(&bytes) {
            Ok(out) => {
                debug!(before = bytes.len(), after = out.len(), "Optimized image");
                out
            },
            Err(e) => {
                warn!(error = %e, "Failed to optimize image, keeping original bytes");
                bytes
            },
        }
    }

    /// Decode `bytes`, flatten alpha onto white, cap the width and encode
    /// as JPEG.
    pub fn optimize(&self, bytes: &[u8]) -> ImageResult<Vec<u8>> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut rgb = RgbImage::from_fn(width, height, |x, y| {
            let [r, g, b, a] = rgba.get_pixel(x, y).0;
            Rgb([over_white(r, a), over_white(g, a), over_white(b, a)])
        });

        if width > self.max_width {
            let scaled = u64::from(height) * u64::from(self.max_width) / u64::from(width);
            let scaled = u32::try_from(scaled.max(1)).unwrap_or(u32::MAX);
            rgb = imageops::resize(&rgb, self.max_width, scaled, FilterType::Lanczos3);
        }

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality).encode_image(&rgb)?;
        Ok(out)
    }
}

/// Composite one channel over a white background.
fn over_white(channel: u8, alpha: u8) -> u8 {
    let (c, a) = (u16::from(channel), u16::from(alpha));
    let blended = (c * a + 255 * (255 - a) + 127) / 255;
    u8::try_from(blended).unwrap_or(u8::MAX)
}
