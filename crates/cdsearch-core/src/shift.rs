//! Foreground position arrays and the shift/mirror variant enumeration.
//!
//! Positions are flattened row-major indices. A shifted position that leaves
//! the image becomes [`SHIFTED_OUT`]; consumers skip those entries.

use crate::image::{is_above, PixelImage};

/// Sentinel for a position shifted outside the image.
pub const SHIFTED_OUT: i32 = -1;

/// One translation/mirror variant of the mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShiftVariant {
    pub dx: i32,
    pub dy: i32,
    pub mirrored: bool,
}

/// Deterministic enumeration of shift offsets.
///
/// Yields `(0, 0)` first, then for each even radius `i` in `2..=xy_shift`
/// the eight compass offsets with `dx` in `[-i, 0, i]` as the outer loop and
/// `dy` in `[-i, 0, i]` as the inner loop, skipping `(0, 0)`.
#[derive(Clone, Debug)]
pub struct ShiftOffsets {
    xy_shift: i32,
    radius: i32,
    slot: u8,
    started: bool,
}

impl Iterator for ShiftOffsets {
    type Item = (i32, i32);

    fn next(&mut self) -> Option<(i32, i32)> {
        if !self.started {
            self.started = true;
            return Some((0, 0));
        }
        loop {
            if self.radius > self.xy_shift {
                return None;
            }
            if self.slot >= 9 {
                self.radius += 2;
                self.slot = 0;
                continue;
            }
            let slot = self.slot as i32;
            self.slot += 1;
            let dx = (slot / 3 - 1) * self.radius;
            let dy = (slot % 3 - 1) * self.radius;
            if dx == 0 && dy == 0 {
                continue;
            }
            return Some((dx, dy));
        }
    }
}

/// Shift offsets for a maximum translation radius (even, `>= 0`).
pub fn shift_offsets(xy_shift: u32) -> ShiftOffsets {
    ShiftOffsets {
        xy_shift: xy_shift as i32,
        radius: 2,
        slot: 0,
        started: false,
    }
}

/// Number of shift variants per orientation: `1 + (xy_shift / 2) * 8`.
#[inline]
pub fn shift_count(xy_shift: u32) -> usize {
    1 + (xy_shift as usize / 2) * 8
}

/// All variants in scoring order: every unmirrored shift, then, if
/// `mirror` is set, the same shifts mirrored.
pub fn variants(xy_shift: u32, mirror: bool) -> impl Iterator<Item = ShiftVariant> {
    let orientations: &'static [bool] = if mirror { &[false, true] } else { &[false] };
    orientations.iter().flat_map(move |&mirrored| {
        shift_offsets(xy_shift).map(move |(dx, dy)| ShiftVariant { dx, dy, mirrored })
    })
}

/// Row-major indices of pixels above `threshold` in any channel.
pub fn foreground_positions(img: &PixelImage, threshold: u32) -> Vec<i32> {
    let kind = img.kind();
    img.as_slice()
        .iter()
        .enumerate()
        .filter(|&(_, &p)| is_above(p, kind, threshold))
        .map(|(i, _)| i as i32)
        .collect()
}

/// Translate positions by `(dx, dy)`; positions leaving the image become [`SHIFTED_OUT`].
pub fn shift_positions(positions: &[i32], dx: i32, dy: i32, width: usize, height: usize) -> Vec<i32> {
    let w = width as i32;
    let h = height as i32;
    positions
        .iter()
        .map(|&p| {
            if p == SHIFTED_OUT {
                return SHIFTED_OUT;
            }
            let x = p % w + dx;
            let y = p / w + dy;
            if x >= 0 && x < w && y >= 0 && y < h {
                y * w + x
            } else {
                SHIFTED_OUT
            }
        })
        .collect()
}

/// Mirror positions horizontally: `y * w + (w - 1 - x)`.
pub fn mirror_positions(positions: &[i32], width: usize) -> Vec<i32> {
    let w = width as i32;
    positions
        .iter()
        .map(|&p| {
            if p == SHIFTED_OUT {
                SHIFTED_OUT
            } else {
                let x = p % w;
                p - x + (w - 1 - x)
            }
        })
        .collect()
}

/// Position arrays for every variant of one mask.
#[derive(Clone, Debug)]
pub struct VariantSet {
    /// Unshifted foreground positions.
    pub base: Vec<i32>,
    /// Shifted positions, index 0 is the unshifted copy.
    pub shifted: Vec<Vec<i32>>,
    /// Mirrored counterparts of `shifted`; empty when mirroring is off.
    pub mirrored: Vec<Vec<i32>>,
}

impl VariantSet {
    /// Precompute all variants for `base` in an image of the given size.
    pub fn build(base: Vec<i32>, width: usize, height: usize, xy_shift: u32, mirror: bool) -> Self {
        let mut shifted: Vec<Vec<i32>> = Vec::with_capacity(shift_count(xy_shift));
        let mut mirrored: Vec<Vec<i32>> = Vec::new();
        for v in variants(xy_shift, mirror) {
            if v.mirrored {
                let idx = mirrored.len();
                mirrored.push(mirror_positions(&shifted[idx], width));
            } else if v.dx == 0 && v.dy == 0 {
                shifted.push(base.clone());
            } else {
                shifted.push(shift_positions(&base, v.dx, v.dy, width, height));
            }
        }
        Self {
            base,
            shifted,
            mirrored,
        }
    }

    /// Foreground size of the mask.
    #[inline]
    pub fn mask_size(&self) -> usize {
        self.base.len()
    }
}
