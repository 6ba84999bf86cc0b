//! Image normalization for listing photos.
//!
//! Every uploaded image is decoded, rotated per its embedded orientation
//! metadata, scaled down to the configured width bound and re-encoded as
//! JPEG before it reaches object storage. The transform is a pure function
//! of the input bytes; no temporary files are written.

use crate::config::ListingConfig;
use crate::error::{MarketError, MarketResult};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageError, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// Content type of every stored image after re-encoding.
pub const STORED_CONTENT_TYPE: &str = "image/jpeg";

/// A transformed image ready for upload.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode → orient → resize → re-encode pipeline for listing photos.
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    max_width: u32,
    jpeg_quality: u8,
}

impl ImagePipeline {
    pub fn new(max_width: u32, jpeg_quality: u8) -> Self {
        Self {
            max_width,
            jpeg_quality,
        }
    }

    pub fn from_config(config: &ListingConfig) -> Self {
        Self::new(config.max_image_width, config.jpeg_quality)
    }

    /// Transform one raw upload into the stored representation.
    ///
    /// Input that the codec cannot identify or decode surfaces
    /// [`MarketError::UnsupportedImageFormat`] so the seller gets an
    /// actionable message instead of a generic failure.
    pub fn process(&self, bytes: &[u8]) -> MarketResult<ProcessedImage> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| MarketError::Image(e.to_string()))?;

        if reader.format().is_none() {
            return Err(MarketError::UnsupportedImageFormat);
        }

        let mut decoder = reader.into_decoder().map_err(map_decode_error)?;
        // Honor embedded rotation metadata before any resizing.
        let orientation = decoder
            .orientation()
            .unwrap_or(Orientation::NoTransforms);
        let mut img = DynamicImage::from_decoder(decoder).map_err(map_decode_error)?;
        img.apply_orientation(orientation);

        let (original_width, original_height) = (img.width(), img.height());
        if img.width() > self.max_width {
            img = img.resize(self.max_width, u32::MAX, FilterType::Lanczos3);
            debug!(
                original_width,
                original_height,
                width = img.width(),
                height = img.height(),
                "Image scaled down"
            );
        }

        // JPEG has no alpha channel; flatten before encoding.
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        let (width, height) = (rgb.width(), rgb.height());

        let mut out = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut out, self.jpeg_quality);
        rgb.write_with_encoder(encoder)
            .map_err(|e| MarketError::Image(e.to_string()))?;

        Ok(ProcessedImage {
            bytes: out.into_inner(),
            width,
            height,
        })
    }
}

fn map_decode_error(e: ImageError) -> MarketError {
    match e {
        // Decoding happens from an in-memory buffer, so an I/O error here
        // means truncated or malformed input, not a real I/O failure.
        ImageError::Unsupported(_) | ImageError::Decoding(_) | ImageError::IoError(_) => {
            MarketError::UnsupportedImageFormat
        }
        other => MarketError::Image(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
        }));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn decode(bytes: &[u8]) -> (ImageFormat, u32, u32) {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .unwrap();
        let format = reader.format().unwrap();
        let img = reader.decode().unwrap();
        (format, img.width(), img.height())
    }

    #[test]
    fn test_reencodes_to_jpeg() {
        let pipeline = ImagePipeline::new(1200, 80);
        let processed = pipeline.process(&png_bytes(16, 8)).unwrap();

        let (format, width, height) = decode(&processed.bytes);
        assert_eq!(format, ImageFormat::Jpeg);
        assert_eq!((width, height), (16, 8));
        assert_eq!((processed.width, processed.height), (16, 8));
    }

    #[test]
    fn test_scales_down_wide_images() {
        let pipeline = ImagePipeline::new(1200, 80);
        let processed = pipeline.process(&png_bytes(3000, 600)).unwrap();

        assert_eq!(processed.width, 1200);
        // Aspect ratio preserved: 600 * 1200 / 3000
        assert_eq!(processed.height, 240);
    }

    #[test]
    fn test_never_upscales() {
        let pipeline = ImagePipeline::new(1200, 80);
        let processed = pipeline.process(&png_bytes(640, 480)).unwrap();
        assert_eq!((processed.width, processed.height), (640, 480));
    }

    #[test]
    fn test_undecodable_input_is_a_distinct_error() {
        let pipeline = ImagePipeline::new(1200, 80);
        let err = pipeline.process(b"definitely not an image").unwrap_err();
        assert!(matches!(err, MarketError::UnsupportedImageFormat));
    }

    #[test]
    fn test_truncated_image_is_a_distinct_error() {
        let pipeline = ImagePipeline::new(1200, 80);
        let mut bytes = png_bytes(64, 64);
        bytes.truncate(40);
        let err = pipeline.process(&bytes).unwrap_err();
        assert!(matches!(err, MarketError::UnsupportedImageFormat));
    }
}
