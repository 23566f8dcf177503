//! Color-depth slice numbers.
//!
//! A color-depth MIP encodes the z position of the brightest voxel as hue,
//! running from magenta (front) through blue, cyan, green and yellow to red
//! (back). [`depth_slice`] inverts that encoding to one of [`DEPTH_SLICES`]
//! slice numbers so two pixels can be compared by depth.

use crate::image::channels;

/// Number of depth slices a hue is quantized to.
pub const DEPTH_SLICES: u32 = 256;
/// Depth differences up to this many slices are treated as noise.
pub const COLOR_FLUX: u32 = 40;

/// Hue angle (degrees) of the frontmost slice.
const FRONT_HUE: f64 = 300.0;

/// HSV hue in `[0, 360)`, `None` for gray and black.
fn hue_degrees(p: u32) -> Option<f64> {
    let (r8, g8, b8) = channels(p);
    let max = r8.max(g8).max(b8);
    let min = r8.min(g8).min(b8);
    if max == min {
        return None;
    }
    let (r, g, b) = (r8 as f64, g8 as f64, b8 as f64);
    let d = (max - min) as f64;
    let h = if max == r8 {
        60.0 * ((g - b) / d)
    } else if max == g8 {
        60.0 * ((b - r) / d + 2.0)
    } else {
        60.0 * ((r - g) / d + 4.0)
    };
    Some(if h < 0.0 { h + 360.0 } else { h })
}

/// Depth slice of a packed RGB pixel, `0` at the front.
///
/// Hues are unrolled from 300° downwards over a full turn, so magenta maps
/// to slice 0 and hues just above 300° to the last slices.
pub fn depth_slice(p: u32) -> Option<u32> {
    let h = hue_degrees(p)?;
    let unrolled = if h > FRONT_HUE { h - 360.0 } else { h };
    let t = (FRONT_HUE - unrolled) / 360.0;
    Some((t * (DEPTH_SLICES - 1) as f64).round() as u32)
}

/// Absolute slice distance; `0` when either pixel carries no hue.
pub fn slice_gap(a: u32, b: u32) -> u32 {
    match (depth_slice(a), depth_slice(b)) {
        (Some(sa), Some(sb)) => sa.abs_diff(sb),
        _ => 0,
    }
}

/// Per-pixel shape gap.
///
/// Starts from the masked gradient value `grad_score`. Where both the mask
/// pixel and the z-gap pixel are lit and their slices differ by at least
/// twice [`COLOR_FLUX`], the depth disagreement minus the flux replaces it.
#[inline]
pub fn pixel_gap(grad_score: u32, mask: u32, zgap: u32) -> u32 {
    if mask & 0x00FF_FFFF != 0 && zgap & 0x00FF_FFFF != 0 {
        let gap = slice_gap(mask, zgap);
        if gap >= 2 * COLOR_FLUX {
            return gap - COLOR_FLUX;
        }
    }
    grad_score
}
