//! Grayscale/RGB morphological dilation with a disc kernel.
//!
//! The disc is described by its line radii: one `(row offset, half width)`
//! pair per kernel row. Each output row slides a per-channel 8-bit histogram
//! from left to right, so a pixel costs `O(kernel height)` instead of
//! `O(kernel area)`.

use crate::image::{channels, rgb, PixelImage, PixelKind};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Disc kernel as a list of `(dy, half_width)` rows, top to bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineRadii {
    radius: u32,
    rows: Vec<(i32, i32)>,
}

impl LineRadii {
    /// Build the kernel for an integer radius.
    ///
    /// Row `dy` spans `floor(sqrt(r^2 + 1 - dy^2))` pixels to each side.
    /// Radius 0 is the single centre pixel.
    pub fn new(radius: u32) -> Self {
        if radius == 0 {
            return Self {
                radius,
                rows: vec![(0, 0)],
            };
        }
        let r = radius as i64;
        let r2 = r * r + 1;
        let k = r as i32;
        let rows = (-k..=k)
            .map(|dy| {
                let d = dy as i64;
                let half = ((r2 - d * d) as f64 + 1e-10).sqrt() as i32;
                (dy, half)
            })
            .collect();
        Self { radius, rows }
    }

    #[inline]
    pub fn radius(&self) -> u32 {
        self.radius
    }

    #[inline]
    pub fn rows(&self) -> &[(i32, i32)] {
        &self.rows
    }

    /// Number of kernel rows (`2r + 1`).
    #[inline]
    pub fn kernel_height(&self) -> usize {
        self.rows.len()
    }

    /// Number of pixels covered by the kernel.
    pub fn point_count(&self) -> usize {
        self.rows.iter().map(|&(_, hw)| 2 * hw as usize + 1).sum()
    }
}

/// Counts per 8-bit value with an incrementally maintained maximum.
#[derive(Clone, Debug)]
pub(crate) struct Histogram {
    counts: [u32; 256],
    max: u8,
}

impl Histogram {
    pub(crate) fn new() -> Self {
        Self {
            counts: [0; 256],
            max: 0,
        }
    }

    #[inline]
    pub(crate) fn reset(&mut self) {
        self.counts = [0; 256];
        self.max = 0;
    }

    #[inline]
    pub(crate) fn add(&mut self, v: u8) {
        self.counts[v as usize] += 1;
        if v > self.max {
            self.max = v;
        }
    }

    #[inline]
    pub(crate) fn remove(&mut self, v: u8) {
        let c = &mut self.counts[v as usize];
        debug_assert!(*c > 0, "removing value {v} that was never added");
        *c -= 1;
        if v == self.max && *c == 0 {
            let mut m = v;
            while m > 0 {
                m -= 1;
                if self.counts[m as usize] > 0 {
                    break;
                }
            }
            self.max = m;
        }
    }

    #[inline]
    pub(crate) fn max(&self) -> u8 {
        self.max
    }
}

/// Reusable histograms for sequential max-filter passes.
///
/// With the `rayon` feature every worker allocates its own histograms and a
/// supplied scratch is left untouched.
#[derive(Clone, Debug)]
pub struct MaxFilterScratch {
    hist: [Histogram; 3],
}

impl Default for MaxFilterScratch {
    fn default() -> Self {
        Self::new()
    }
}

impl MaxFilterScratch {
    pub fn new() -> Self {
        Self {
            hist: std::array::from_fn(|_| Histogram::new()),
        }
    }
}

#[inline]
fn channel_count(kind: PixelKind) -> usize {
    match kind {
        PixelKind::Rgb => 3,
        PixelKind::Gray => 1,
    }
}

#[inline]
fn add_pixel(hist: &mut [Histogram; 3], p: u32, kind: PixelKind) {
    match kind {
        PixelKind::Rgb => {
            let (r, g, b) = channels(p);
            hist[0].add(r);
            hist[1].add(g);
            hist[2].add(b);
        }
        PixelKind::Gray => hist[0].add(p.min(255) as u8),
    }
}

#[inline]
fn remove_pixel(hist: &mut [Histogram; 3], p: u32, kind: PixelKind) {
    match kind {
        PixelKind::Rgb => {
            let (r, g, b) = channels(p);
            hist[0].remove(r);
            hist[1].remove(g);
            hist[2].remove(b);
        }
        PixelKind::Gray => hist[0].remove(p.min(255) as u8),
    }
}

#[inline]
fn current_max(hist: &[Histogram; 3], kind: PixelKind) -> u32 {
    match kind {
        PixelKind::Rgb => rgb(hist[0].max(), hist[1].max(), hist[2].max()),
        PixelKind::Gray => hist[0].max() as u32,
    }
}

fn filter_row(
    src: &PixelImage,
    radii: &LineRadii,
    y: usize,
    out: &mut [u32],
    hist: &mut [Histogram; 3],
) {
    let w = src.width();
    let h = src.height() as i32;
    let kind = src.kind();

    for x in 0..w {
        if x == 0 {
            for hh in hist.iter_mut().take(channel_count(kind)) {
                hh.reset();
            }
            for &(dy, hw) in radii.rows() {
                let yy = y as i32 + dy;
                if yy < 0 || yy >= h {
                    continue;
                }
                let row = src.row(yy as usize);
                let last = (hw as usize).min(w - 1);
                for &p in &row[..=last] {
                    add_pixel(hist, p, kind);
                }
            }
        } else {
            for &(dy, hw) in radii.rows() {
                let yy = y as i32 + dy;
                if yy < 0 || yy >= h {
                    continue;
                }
                let row = src.row(yy as usize);
                let leaving = x as i64 - 1 - hw as i64;
                if leaving >= 0 {
                    remove_pixel(hist, row[leaving as usize], kind);
                }
                let entering = x + hw as usize;
                if entering < w {
                    add_pixel(hist, row[entering], kind);
                }
            }
        }
        out[x] = current_max(hist, kind);
    }
}

/// Dilate `src` with a disc of the given radius.
///
/// RGB images are filtered per channel; gray values are clamped to 8 bits.
/// Pixels outside the image do not contribute to the maximum. Rows are
/// filtered with `scratch` on the sequential path; the parallel path gives
/// each worker its own histograms.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, scratch), fields(w = src.width(), h = src.height()))
)]
pub fn max_filter(src: &PixelImage, radius: u32, scratch: &mut MaxFilterScratch) -> PixelImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let radii = LineRadii::new(radius);
    let mut data = vec![0u32; w * h];

    #[cfg(feature = "rayon")]
    {
        // per-worker histograms, the caller's scratch is not shared
        let _ = scratch;
        data.par_chunks_mut(w).enumerate().for_each_init(
            MaxFilterScratch::new,
            |local, (y, row)| filter_row(src, &radii, y, row, &mut local.hist),
        );
    }

    #[cfg(not(feature = "rayon"))]
    for (y, row) in data.chunks_mut(w).enumerate() {
        filter_row(src, &radii, y, row, &mut scratch.hist);
    }

    PixelImage::from_raw_parts(w, h, src.kind(), data)
}

/// Direct kernel maximum at one location, without histograms.
///
/// `sample` must return pixels of the given `kind` for in-bounds coordinates.
pub(crate) fn max_at(
    sample: &dyn Fn(usize, usize) -> u32,
    (w, h): (usize, usize),
    kind: PixelKind,
    radii: &LineRadii,
    x: usize,
    y: usize,
) -> u32 {
    let mut hist_max = [0u8; 3];
    for &(dy, hw) in radii.rows() {
        let yy = y as i64 + dy as i64;
        if yy < 0 || yy >= h as i64 {
            continue;
        }
        let x0 = (x as i64 - hw as i64).max(0) as usize;
        let x1 = (x as i64 + hw as i64).min(w as i64 - 1);
        if x1 < 0 {
            continue;
        }
        for xx in x0..=(x1 as usize) {
            let p = sample(xx, yy as usize);
            match kind {
                PixelKind::Rgb => {
                    let (r, g, b) = channels(p);
                    hist_max[0] = hist_max[0].max(r);
                    hist_max[1] = hist_max[1].max(g);
                    hist_max[2] = hist_max[2].max(b);
                }
                PixelKind::Gray => hist_max[0] = hist_max[0].max(p.min(255) as u8),
            }
        }
    }
    match kind {
        PixelKind::Rgb => rgb(hist_max[0], hist_max[1], hist_max[2]),
        PixelKind::Gray => hist_max[0] as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(src: &PixelImage, radius: u32) -> PixelImage {
        let radii = LineRadii::new(radius);
        PixelImage::from_fn(src.width(), src.height(), src.kind(), |x, y| {
            max_at(&|xx, yy| src.get(xx, yy), src.dimensions(), src.kind(), &radii, x, y)
        })
    }

    fn noise_rgb(w: usize, h: usize, seed: u32) -> PixelImage {
        let mut state = seed;
        PixelImage::from_fn(w, h, PixelKind::Rgb, |_, _| {
            // xorshift32
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state & 0xFF_FF_FF
        })
    }

    #[test]
    fn line_radii_are_symmetric_disc() {
        let radii = LineRadii::new(2);
        assert_eq!(radii.rows(), &[(-2, 1), (-1, 2), (0, 2), (1, 2), (2, 1)]);
        assert_eq!(radii.kernel_height(), 5);
        assert_eq!(radii.point_count(), 3 + 5 + 5 + 5 + 3);
    }

    #[test]
    fn radius_zero_is_identity() {
        let src = noise_rgb(7, 5, 99);
        let mut scratch = MaxFilterScratch::new();
        assert_eq!(max_filter(&src, 0, &mut scratch), src);
    }

    #[test]
    fn histogram_rescans_after_removing_max() {
        let mut h = Histogram::new();
        h.add(10);
        h.add(200);
        h.add(200);
        h.add(3);
        h.remove(200);
        assert_eq!(h.max(), 200);
        h.remove(200);
        assert_eq!(h.max(), 10);
        h.remove(10);
        h.remove(3);
        assert_eq!(h.max(), 0);
    }

    #[test]
    fn single_pixel_dilates_to_disc() {
        let mut src = vec![0u32; 11 * 11];
        src[5 * 11 + 5] = 255;
        let src = PixelImage::new(11, 11, PixelKind::Gray, src).unwrap();
        let mut scratch = MaxFilterScratch::new();
        let out = max_filter(&src, 3, &mut scratch);
        let lit = out.as_slice().iter().filter(|&&v| v == 255).count();
        assert_eq!(lit, LineRadii::new(3).point_count());
        assert_eq!(out.get(5, 2), 255);
        assert_eq!(out.get(2, 2), 0);
    }

    #[test]
    fn sliding_histogram_matches_brute_force_rgb() {
        let src = noise_rgb(23, 17, 7);
        let mut scratch = MaxFilterScratch::new();
        for radius in [1, 2, 5, 9] {
            let fast = max_filter(&src, radius, &mut scratch);
            assert_eq!(fast, brute_force(&src, radius), "radius {radius}");
        }
    }

    #[test]
    fn sliding_histogram_matches_brute_force_gray_with_wide_kernel() {
        let mut state = 1234u32;
        let src = PixelImage::from_fn(9, 6, PixelKind::Gray, |_, _| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) & 0xFF
        });
        let mut scratch = MaxFilterScratch::new();
        let fast = max_filter(&src, 20, &mut scratch);
        assert_eq!(fast, brute_force(&src, 20));
    }

    #[test]
    fn scratch_is_reusable_across_images_and_kinds() {
        let mut scratch = MaxFilterScratch::new();
        let rgb_src = noise_rgb(13, 9, 3);
        let mut state = 77u32;
        let gray_src = PixelImage::from_fn(10, 12, PixelKind::Gray, |_, _| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) & 0xFF
        });
        let first = max_filter(&rgb_src, 4, &mut scratch);
        assert_eq!(max_filter(&gray_src, 2, &mut scratch), brute_force(&gray_src, 2));
        assert_eq!(max_filter(&rgb_src, 4, &mut scratch), first);
        assert_eq!(first, max_filter(&rgb_src, 4, &mut MaxFilterScratch::new()));
    }
}
