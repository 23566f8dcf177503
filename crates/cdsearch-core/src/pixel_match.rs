//! Shift/mirror pixel-match scoring.
//!
//! The mask's foreground positions and every shift variant are precomputed
//! once. Scoring a target counts, per variant, the mask pixels whose hue
//! distance to the target pixel under the shifted position is within
//! tolerance, and keeps the first variant with the strictly largest count.

use std::sync::Arc;

use crate::error::{ComputeError, ConfigError};
use crate::hue::pixel_distance;
use crate::image::{check_dimensions, is_above, PixelImage, PixelKind};
use crate::pipeline::LazyImage;
use crate::shift::{foreground_positions, variants, ShiftVariant, VariantSet, SHIFTED_OUT};
use crate::SearchParams;
#[cfg(feature = "tracing")]
use tracing::{debug_span, instrument};

/// Best pixel-match of one target.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelMatchScore {
    /// Matching pixel count, negative-mask corrected (may be negative).
    pub matching_pixels: i64,
    /// Matching fraction of the mask, negative-mask corrected.
    pub matching_ratio: f64,
    pub mirrored: bool,
}

/// Count mask pixels matching the target under one variant.
///
/// `mask_pixels[i]` is compared with the target pixel at `positions[i]`.
/// Shifted-out positions and target pixels not above `target_threshold` are
/// skipped.
pub fn count_matches(
    mask_pixels: &[u32],
    positions: &[i32],
    target: &PixelImage,
    target_threshold: u32,
    tolerance: f64,
) -> usize {
    let kind = target.kind();
    mask_pixels
        .iter()
        .zip(positions)
        .filter(|&(&m, &pos)| {
            if pos == SHIFTED_OUT {
                return false;
            }
            let t = target.at(pos as usize);
            is_above(t, kind, target_threshold) && pixel_distance(m, t) <= tolerance
        })
        .count()
}

/// Foreground pixel values and their variant position arrays.
#[derive(Clone, Debug)]
struct PreparedMask {
    pixels: Vec<u32>,
    variants: VariantSet,
}

impl PreparedMask {
    fn build(mask: &PixelImage, threshold: u32, xy_shift: u32, mirror: bool) -> Self {
        let base = foreground_positions(mask, threshold);
        let pixels = base.iter().map(|&p| mask.at(p as usize)).collect();
        let variants = VariantSet::build(base, mask.width(), mask.height(), xy_shift, mirror);
        Self { pixels, variants }
    }

    #[inline]
    fn size(&self) -> usize {
        self.variants.mask_size()
    }

    fn lists(&self, mirrored: bool) -> &[Vec<i32>] {
        if mirrored {
            &self.variants.mirrored
        } else {
            &self.variants.shifted
        }
    }

    /// Strictly-greatest count over one orientation, earliest variant wins ties.
    fn best_count(&self, target: &PixelImage, mirrored: bool, threshold: u32, tolerance: f64) -> usize {
        let mut best = 0;
        for positions in self.lists(mirrored) {
            let n = count_matches(&self.pixels, positions, target, threshold, tolerance);
            if n > best {
                best = n;
            }
        }
        best
    }
}

/// Round half towards positive infinity, also for negative values.
#[inline]
fn round_half_up(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

/// Pixel-match scorer bound to one mask (and optional negative mask).
#[derive(Clone, Debug)]
pub struct PixelMatchScorer {
    width: usize,
    height: usize,
    target_threshold: u32,
    tolerance: f64,
    xy_shift: u32,
    mirror: bool,
    positive: PreparedMask,
    negative: Option<PreparedMask>,
}

fn restrict_to_roi(
    img: &PixelImage,
    roi: Option<&PixelImage>,
    name: &'static str,
) -> Result<PixelImage, ConfigError> {
    match roi {
        None => Ok(img.clone()),
        Some(roi) => {
            if roi.dimensions() != img.dimensions() {
                return Err(ConfigError::QueryDimensionMismatch {
                    image: name,
                    expected: img.dimensions(),
                    found: roi.dimensions(),
                });
            }
            Ok(LazyImage::from_image(img.clone())
                .clear_outside(Arc::new(roi.clone()))?
                .materialize())
        }
    }
}

impl PixelMatchScorer {
    /// Precompute positions and variants for `mask`.
    ///
    /// Pixels outside `roi` (black ROI pixels) are excluded from both the
    /// mask and the negative mask.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(w = mask.width(), h = mask.height(), xy_shift = params.xy_shift))
    )]
    pub fn new(
        mask: &PixelImage,
        negative: Option<&PixelImage>,
        roi: Option<&PixelImage>,
        params: &SearchParams,
    ) -> Result<Self, ConfigError> {
        params.validate()?;
        let mask = restrict_to_roi(mask, roi, "ROI mask")?;
        let positive =
            PreparedMask::build(&mask, params.mask_threshold, params.xy_shift, params.mirror);

        let negative = match negative {
            None => None,
            Some(neg) => {
                if neg.dimensions() != mask.dimensions() {
                    return Err(ConfigError::QueryDimensionMismatch {
                        image: "negative mask",
                        expected: mask.dimensions(),
                        found: neg.dimensions(),
                    });
                }
                let neg = restrict_to_roi(neg, roi, "ROI mask")?;
                Some(PreparedMask::build(
                    &neg,
                    params.mask_threshold,
                    params.xy_shift,
                    params.mirror,
                ))
            }
        };

        Ok(Self {
            width: mask.width(),
            height: mask.height(),
            target_threshold: params.target_threshold,
            tolerance: params.color_tolerance(),
            xy_shift: params.xy_shift,
            mirror: params.mirror,
            positive,
            negative,
        })
    }

    /// Foreground pixel count of the mask.
    #[inline]
    pub fn mask_size(&self) -> usize {
        self.positive.size()
    }

    /// Foreground pixel count of the negative mask (0 when absent).
    #[inline]
    pub fn negative_mask_size(&self) -> usize {
        self.negative.as_ref().map_or(0, PreparedMask::size)
    }

    /// Number of variants scored per target.
    pub fn variant_count(&self) -> usize {
        variants(self.xy_shift, self.mirror).count()
    }

    /// Match count of every variant, in scoring order, without negative correction.
    pub fn variant_counts(
        &self,
        target: &PixelImage,
    ) -> Result<Vec<(ShiftVariant, usize)>, ComputeError> {
        check_dimensions((self.width, self.height), target.dimensions())?;
        let lists = &self.positive.variants;
        let out = variants(self.xy_shift, self.mirror)
            .zip(lists.shifted.iter().chain(&lists.mirrored))
            .map(|(v, positions)| {
                let n = count_matches(
                    &self.positive.pixels,
                    positions,
                    target,
                    self.target_threshold,
                    self.tolerance,
                );
                (v, n)
            })
            .collect();
        Ok(out)
    }

    /// Negative-corrected `(count, ratio)` for one orientation.
    fn orientation_score(&self, target: &PixelImage, mirrored: bool) -> (i64, f64) {
        let size = self.positive.size();
        let best = self
            .positive
            .best_count(target, mirrored, self.target_threshold, self.tolerance);
        let mut count = best as i64;
        let mut ratio = best as f64 / size as f64;

        if let Some(neg) = self.negative.as_ref().filter(|n| n.size() > 0) {
            let neg_size = neg.size();
            let neg_best = neg.best_count(target, mirrored, self.target_threshold, self.tolerance);
            ratio -= neg_best as f64 / neg_size as f64;
            count =
                round_half_up(best as f64 - neg_best as f64 * (size as f64 / neg_size as f64));
        }
        (count, ratio)
    }

    /// Score one target. `Ok(None)` when the mask has no foreground.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip_all, fields(mask_size = self.mask_size()))
    )]
    pub fn score(&self, target: &PixelImage) -> Result<Option<PixelMatchScore>, ComputeError> {
        check_dimensions((self.width, self.height), target.dimensions())?;
        if self.positive.size() == 0 {
            return Ok(None);
        }
        if target.kind() != PixelKind::Rgb {
            // hue classification is undefined on gray targets
            return Ok(Some(PixelMatchScore {
                matching_pixels: 0,
                matching_ratio: 0.0,
                mirrored: false,
            }));
        }

        let (count, ratio) = self.orientation_score(target, false);
        let mut best = PixelMatchScore {
            matching_pixels: count,
            matching_ratio: ratio,
            mirrored: false,
        };

        if self.mirror {
            #[cfg(feature = "tracing")]
            let _span = debug_span!("mirrored").entered();
            let (m_count, m_ratio) = self.orientation_score(target, true);
            if best.matching_ratio < m_ratio {
                best = PixelMatchScore {
                    matching_pixels: m_count,
                    matching_ratio: m_ratio,
                    mirrored: true,
                };
            }
        }
        Ok(Some(best))
    }
}
