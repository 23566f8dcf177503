//! Conversions between `image` buffers and [`PixelImage`], plus image-level
//! scoring helpers.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cdsearch_core::image::rgb;
use cdsearch_core::{ComputeError, PixelImage, PixelKind, PreparedQuery, ScoreResult, TargetImages};
use image::{DynamicImage, GrayImage, ImageReader, RgbImage};

/// Pack an `RgbImage` into an RGB [`PixelImage`].
pub fn pixel_image_from_rgb(img: &RgbImage) -> PixelImage {
    PixelImage::from_fn(
        img.width() as usize,
        img.height() as usize,
        PixelKind::Rgb,
        |x, y| {
            let [r, g, b] = img.get_pixel(x as u32, y as u32).0;
            rgb(r, g, b)
        },
    )
}

/// Copy a `GrayImage` into a gray [`PixelImage`].
pub fn pixel_image_from_gray(img: &GrayImage) -> PixelImage {
    PixelImage::from_fn(
        img.width() as usize,
        img.height() as usize,
        PixelKind::Gray,
        |x, y| img.get_pixel(x as u32, y as u32).0[0] as u32,
    )
}

/// Convert any decoded image.
///
/// 8- and 16-bit luma images stay gray (16-bit values are kept as is);
/// everything else is converted to 8-bit RGB.
pub fn pixel_image_from_dynamic(img: &DynamicImage) -> PixelImage {
    match img {
        DynamicImage::ImageLuma8(gray) => pixel_image_from_gray(gray),
        DynamicImage::ImageLuma16(gray) => PixelImage::from_fn(
            gray.width() as usize,
            gray.height() as usize,
            PixelKind::Gray,
            |x, y| gray.get_pixel(x as u32, y as u32).0[0] as u32,
        ),
        other => pixel_image_from_rgb(&other.to_rgb8()),
    }
}

/// Decode an image file into a [`PixelImage`].
pub fn load_pixel_image(path: &Path) -> Result<PixelImage> {
    let img = ImageReader::open(path)
        .with_context(|| format!("opening image {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("reading image {}", path.display()))?
        .decode()
        .with_context(|| format!("decoding image {}", path.display()))?;
    Ok(pixel_image_from_dynamic(&img))
}

/// Score an `RgbImage` target (with optional gradient) against a prepared query.
pub fn score_rgb_image(
    prepared: &PreparedQuery,
    target: &RgbImage,
    gradient: Option<&GrayImage>,
) -> Result<ScoreResult, ComputeError> {
    let target = TargetImages {
        image: Arc::new(pixel_image_from_rgb(target)),
        gradient: gradient.map(|g| Arc::new(pixel_image_from_gray(g))),
        zgap: None,
    };
    prepared.score(&target)
}
