//! Lossy DCT compression of still images.
//!
//! Each channel is tiled into 8×8 blocks, transformed and quantized. The
//! quantized blocks are stored together with the image geometry and the
//! quality factor, which is everything needed to rebuild an approximation of
//! the image.

use std::io::Cursor;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use log::{debug, info, warn};
use ndarray::{Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::transform::blocks::{block_count, merge_blocks, split_into_blocks, to_samples};
use crate::transform::dct::{forward, inverse};
use crate::transform::quantize::{QuantizationMatrix, QuantizedBlock};

/// Default quality factor for image compression.
pub const DEFAULT_QUALITY: u8 = 50;

/// Images whose longer side exceeds this are downscaled before encoding.
pub const DEFAULT_MAX_DIMENSION: u32 = 6000;

/// Serialized form of a DCT-compressed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedImage {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub quality: u8,
    /// Quantized blocks, one list per channel, in row-major tile order.
    pub blocks: Vec<Vec<QuantizedBlock>>,
}

impl CompressedImage {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| Error::InvalidInput(format!("cannot serialize image container: {e}")))
    }

    /// Parse and validate a serialized container.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (container, read): (CompressedImage, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| Error::malformed(format!("cannot parse image container: {e}")))?;
        if read != bytes.len() {
            return Err(Error::malformed(format!(
                "{} trailing bytes after image container",
                bytes.len() - read
            )));
        }
        container.validate()?;
        Ok(container)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=4).contains(&self.channels) || self.blocks.len() != self.channels {
            return Err(Error::malformed(format!(
                "container declares {} channels but holds {}",
                self.channels,
                self.blocks.len()
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(Error::malformed(format!(
                "container quality {} is outside 1..=100",
                self.quality
            )));
        }
        // Checked over the non-empty axes, the way ndarray sizes a shape.
        let samples = [self.height, self.width, self.channels]
            .into_iter()
            .filter(|&len| len != 0)
            .try_fold(1usize, usize::checked_mul)
            .filter(|&len| len <= isize::MAX as usize);
        let expected = match (samples, block_count(self.height, self.width)) {
            (Some(_), Some(expected)) => expected,
            _ => {
                return Err(Error::malformed(format!(
                    "container geometry {}x{}x{} is too large",
                    self.height, self.width, self.channels
                )))
            }
        };
        if let Some(channel) = self.blocks.iter().position(|b| b.len() != expected) {
            return Err(Error::malformed(format!(
                "channel {channel} holds {} blocks, expected {expected}",
                self.blocks[channel].len()
            )));
        }
        Ok(())
    }
}

/// Encode interleaved samples laid out as `(height, width, channels)`.
pub fn encode_samples(samples: ArrayView3<'_, u8>, quality: u8) -> Result<CompressedImage> {
    let matrix = QuantizationMatrix::with_quality(quality)?;
    let (height, width, channels) = samples.dim();

    let blocks: Vec<Vec<QuantizedBlock>> = samples
        .axis_iter(Axis(2))
        .map(|plane| {
            split_into_blocks(plane)
                .iter()
                .map(|block| matrix.quantize(&forward(block)))
                .collect()
        })
        .collect();
    debug!(
        "dct-image: {height}x{width}x{channels} tiled into {} blocks per channel",
        blocks.first().map_or(0, Vec::len)
    );

    Ok(CompressedImage {
        height,
        width,
        channels,
        quality,
        blocks,
    })
}

/// Rebuild interleaved samples from a container.
pub fn decode_samples(container: &CompressedImage) -> Result<Array3<u8>> {
    container.validate()?;
    let matrix = QuantizationMatrix::with_quality(container.quality)?;
    let mut samples = Array3::zeros((container.height, container.width, container.channels));

    for (channel, quantized) in container.blocks.iter().enumerate() {
        let restored: Vec<_> = quantized
            .iter()
            .map(|block| inverse(&matrix.dequantize(block)))
            .collect();
        let plane = merge_blocks(&restored, container.height, container.width)?;
        samples
            .index_axis_mut(Axis(2), channel)
            .assign(&to_samples(&plane));
    }
    Ok(samples)
}

/// Convert a decoded image into `(height, width, channels)` samples, keeping its channel layout.
pub fn image_to_samples(image: &DynamicImage) -> Result<Array3<u8>> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let (channels, raw) = match image.color().channel_count() {
        1 => (1, image.to_luma8().into_raw()),
        2 => (2, image.to_luma_alpha8().into_raw()),
        3 => (3, image.to_rgb8().into_raw()),
        _ => (4, image.to_rgba8().into_raw()),
    };
    Array3::from_shape_vec((height, width, channels), raw)
        .map_err(|e| Error::InvalidInput(format!("unexpected image layout: {e}")))
}

/// Convert `(height, width, channels)` samples back into an image.
pub fn samples_to_image(samples: &Array3<u8>) -> Result<DynamicImage> {
    let (height, width, channels) = samples.dim();
    let raw: Vec<u8> = samples.iter().copied().collect();
    let (width, height) = (width as u32, height as u32);
    let image = match channels {
        1 => GrayImage::from_raw(width, height, raw).map(DynamicImage::ImageLuma8),
        2 => GrayAlphaImage::from_raw(width, height, raw).map(DynamicImage::ImageLumaA8),
        3 => RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(width, height, raw).map(DynamicImage::ImageRgba8),
        _ => None,
    };
    image.ok_or_else(|| {
        Error::malformed(format!(
            "cannot build a {width}x{height} image with {channels} channels"
        ))
    })
}

/// Options for [`DctImage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOptions {
    pub quality: u8,
    pub max_dimension: u32,
}

impl Default for ImageOptions {
    fn default() -> Self {
        ImageOptions {
            quality: DEFAULT_QUALITY,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// DCT image codec.
///
/// `compress` accepts any format the `image` crate decodes and produces a
/// serialized [`CompressedImage`]; `decompress` yields a PNG. The workflow
/// is one-directional: the reconstruction is a preview, not the original.
#[derive(Debug, Clone, Default)]
pub struct DctImage {
    options: ImageOptions,
}

impl DctImage {
    pub fn new(options: ImageOptions) -> Result<Self> {
        QuantizationMatrix::with_quality(options.quality)?;
        Ok(DctImage { options })
    }

    pub fn options(&self) -> &ImageOptions {
        &self.options
    }

    /// Decode `data` and downscale it when it exceeds the configured maximum dimension.
    fn load(&self, data: &[u8]) -> Result<DynamicImage> {
        let image = image::load_from_memory(data)?;
        let max = self.options.max_dimension;
        if image.width().max(image.height()) > max {
            warn!(
                "dct-image: downscaling {}x{} to fit within {max}",
                image.width(),
                image.height()
            );
            return Ok(image.resize(max, max, FilterType::Lanczos3));
        }
        Ok(image)
    }

    /// Reconstruct an image file at `path`; the format follows its extension.
    pub fn reconstruct_to(&self, artifact: &[u8], path: &Path) -> Result<()> {
        let container = CompressedImage::from_bytes(artifact)?;
        samples_to_image(&decode_samples(&container)?)?.save(path)?;
        Ok(())
    }
}

impl Compression for DctImage {
    fn name(&self) -> &'static str {
        "dct-image"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let image = self.load(data)?;
        let samples = image_to_samples(&image)?;
        let artifact = encode_samples(samples.view(), self.options.quality)?.to_bytes()?;
        info!(
            "dct-image: {} bytes -> {} bytes at quality {}",
            data.len(),
            artifact.len(),
            self.options.quality
        );
        Ok(artifact)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let container = CompressedImage::from_bytes(data)?;
        let image = samples_to_image(&decode_samples(&container)?)?;
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(png)
    }

    fn supports_decompression(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(height: usize, width: usize, channels: usize) -> Array3<u8> {
        Array3::from_shape_fn((height, width, channels), |(i, j, c)| {
            ((i * 4 + j * 3 + c * 40) % 256) as u8
        })
    }

    #[test]
    fn test_container_geometry() {
        let samples = gradient(20, 13, 3);
        let container = encode_samples(samples.view(), 50).unwrap();
        assert_eq!(container.height, 20);
        assert_eq!(container.width, 13);
        assert_eq!(container.channels, 3);
        assert_eq!(container.blocks.len(), 3);
        assert!(container.blocks.iter().all(|b| b.len() == 6));
    }

    #[test]
    fn test_constant_image_keeps_only_dc() {
        let samples = Array3::from_elem((16, 16, 1), 90u8);
        let container = encode_samples(samples.view(), 75).unwrap();
        for block in &container.blocks[0] {
            let ac = block.iter().flatten().skip(1).all(|&v| v == 0);
            assert!(ac);
        }
        let restored = decode_samples(&container).unwrap();
        assert!(restored.iter().all(|&v| (i32::from(v) - 90).abs() <= 2));
    }

    #[test]
    fn test_high_quality_is_close() {
        let samples = gradient(24, 17, 1);
        let restored = decode_samples(&encode_samples(samples.view(), 95).unwrap()).unwrap();
        assert_eq!(restored.dim(), samples.dim());
        let worst = samples
            .iter()
            .zip(restored.iter())
            .map(|(&a, &b)| (i32::from(a) - i32::from(b)).abs())
            .max()
            .unwrap();
        assert!(worst <= 16, "max error {worst}");
    }

    #[test]
    fn test_container_bytes_roundtrip() {
        let container = encode_samples(gradient(9, 9, 2).view(), 40).unwrap();
        let bytes = container.to_bytes().unwrap();
        assert_eq!(CompressedImage::from_bytes(&bytes).unwrap(), container);
    }

    #[test]
    fn test_corrupt_container_is_malformed() {
        let container = encode_samples(gradient(9, 9, 1).view(), 40).unwrap();
        let bytes = container.to_bytes().unwrap();
        assert!(matches!(
            CompressedImage::from_bytes(&bytes[..bytes.len() / 2]),
            Err(Error::MalformedArtifact(_))
        ));

        let mut broken = container.clone();
        broken.blocks[0].pop();
        assert!(matches!(
            CompressedImage::from_bytes(&broken.to_bytes().unwrap()),
            Err(Error::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_oversized_geometry_is_malformed() {
        for (height, width) in [(1usize << 40, 1usize << 30), (usize::MAX, 0), (usize::MAX, 2)] {
            let crafted = CompressedImage {
                height,
                width,
                channels: 3,
                quality: 50,
                blocks: vec![Vec::new(); 3],
            };
            let bytes = crafted.to_bytes().unwrap();
            assert!(matches!(
                CompressedImage::from_bytes(&bytes),
                Err(Error::MalformedArtifact(_))
            ));
            assert!(matches!(
                DctImage::default().decompress(&bytes),
                Err(Error::MalformedArtifact(_))
            ));
            assert!(matches!(
                decode_samples(&crafted),
                Err(Error::MalformedArtifact(_))
            ));
        }
    }

    #[test]
    fn test_quality_is_validated() {
        let samples = gradient(8, 8, 1);
        assert!(matches!(
            encode_samples(samples.view(), 0),
            Err(Error::QualityOutOfRange(0))
        ));
        assert!(matches!(
            DctImage::new(ImageOptions {
                quality: 120,
                ..ImageOptions::default()
            }),
            Err(Error::QualityOutOfRange(120))
        ));
    }

    #[test]
    fn test_codec_on_png_bytes() {
        let samples = gradient(30, 40, 3);
        let mut png = Vec::new();
        samples_to_image(&samples)
            .unwrap()
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let codec = DctImage::default();
        assert!(!codec.supports_decompression());
        let artifact = codec.compress(&png).unwrap();
        let preview = image::load_from_memory(&codec.decompress(&artifact).unwrap()).unwrap();
        assert_eq!((preview.width(), preview.height()), (40, 30));
        assert_eq!(preview.color().channel_count(), 3);
    }

    #[test]
    fn test_large_images_are_downscaled() {
        let samples = gradient(20, 64, 1);
        let mut png = Vec::new();
        samples_to_image(&samples)
            .unwrap()
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let codec = DctImage::new(ImageOptions {
            quality: 50,
            max_dimension: 32,
        })
        .unwrap();
        let container = CompressedImage::from_bytes(&codec.compress(&png).unwrap()).unwrap();
        assert_eq!(container.width, 32);
        assert_eq!(container.height, 10);
    }

    #[test]
    fn test_rejects_non_image_input() {
        assert!(matches!(
            DctImage::default().compress(b"definitely not an image"),
            Err(Error::Image(_))
        ));
    }
}
