//! Materialized pixel images with packed integer pixels.
//!
//! RGB pixels are packed as `0xRRGGBB`; gray pixels hold their intensity in
//! the low bits. Images are immutable once built.

use crate::error::ComputeError;

/// How the packed integer of a pixel is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PixelKind {
    Rgb,
    Gray,
}

/// Pack 8-bit channels into `0xRRGGBB`.
#[inline]
pub fn rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Unpack `0xRRGGBB` into `(r, g, b)`.
#[inline]
pub fn channels(p: u32) -> (u8, u8, u8) {
    ((p >> 16) as u8, (p >> 8) as u8, p as u8)
}

/// Gray value of a pixel. RGB uses the unweighted channel mean.
#[inline]
pub fn intensity(p: u32, kind: PixelKind) -> u32 {
    match kind {
        PixelKind::Gray => p,
        PixelKind::Rgb => {
            let (r, g, b) = channels(p);
            (r as u32 + g as u32 + b as u32) / 3
        }
    }
}

/// True when any channel (RGB) or the value (gray) is strictly above `threshold`.
#[inline]
pub fn is_above(p: u32, kind: PixelKind, threshold: u32) -> bool {
    match kind {
        PixelKind::Gray => p > threshold,
        PixelKind::Rgb => {
            let (r, g, b) = channels(p);
            r as u32 > threshold || g as u32 > threshold || b as u32 > threshold
        }
    }
}

/// Dense row-major image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelImage {
    width: usize,
    height: usize,
    kind: PixelKind,
    data: Vec<u32>,
}

impl PixelImage {
    /// Wrap an existing row-major buffer.
    pub fn new(
        width: usize,
        height: usize,
        kind: PixelKind,
        data: Vec<u32>,
    ) -> Result<Self, ComputeError> {
        if data.len() != width * height {
            return Err(ComputeError::BufferLength {
                expected: width * height,
                found: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            kind,
            data,
        })
    }

    /// Infallible constructor for buffers built by this crate.
    pub(crate) fn from_raw_parts(width: usize, height: usize, kind: PixelKind, data: Vec<u32>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            kind,
            data,
        }
    }

    /// Image with every pixel set to `value`.
    pub fn filled(width: usize, height: usize, kind: PixelKind, value: u32) -> Self {
        Self {
            width,
            height,
            kind,
            data: vec![value; width * height],
        }
    }

    /// Build an image by evaluating `f(x, y)` for every pixel in row-major order.
    pub fn from_fn(
        width: usize,
        height: usize,
        kind: PixelKind,
        mut f: impl FnMut(usize, usize) -> u32,
    ) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            kind,
            data,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn kind(&self) -> PixelKind {
        self.kind
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pixel at an integer coordinate.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.data[y * self.width + x]
    }

    /// Pixel at a flattened row-major index.
    #[inline]
    pub fn at(&self, index: usize) -> u32 {
        self.data[index]
    }

    /// One image row.
    #[inline]
    pub fn row(&self, y: usize) -> &[u32] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u32> {
        self.data
    }

    /// Fail with [`ComputeError::DimensionMismatch`] unless `other` has the same size.
    pub fn check_same_size(&self, other: &PixelImage) -> Result<(), ComputeError> {
        check_dimensions(self.dimensions(), other.dimensions())
    }
}

pub(crate) fn check_dimensions(
    expected: (usize, usize),
    found: (usize, usize),
) -> Result<(), ComputeError> {
    if expected == found {
        Ok(())
    } else {
        Err(ComputeError::DimensionMismatch { expected, found })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_roundtrips_channels() {
        let p = rgb(12, 200, 7);
        assert_eq!(p, 0x0C_C8_07);
        assert_eq!(channels(p), (12, 200, 7));
    }

    #[test]
    fn threshold_checks_any_channel() {
        assert!(is_above(rgb(0, 0, 21), PixelKind::Rgb, 20));
        assert!(!is_above(rgb(20, 20, 20), PixelKind::Rgb, 20));
        assert!(is_above(3, PixelKind::Gray, 2));
    }

    #[test]
    fn new_rejects_short_buffer() {
        let err = PixelImage::new(3, 2, PixelKind::Gray, vec![0; 5]).unwrap_err();
        assert_eq!(
            err,
            ComputeError::BufferLength {
                expected: 6,
                found: 5
            }
        );
    }

    #[test]
    fn from_fn_is_row_major() {
        let img = PixelImage::from_fn(3, 2, PixelKind::Gray, |x, y| (y * 10 + x) as u32);
        assert_eq!(img.as_slice(), &[0, 1, 2, 10, 11, 12]);
        assert_eq!(img.get(2, 1), 12);
        assert_eq!(img.at(4), 11);
    }
}
