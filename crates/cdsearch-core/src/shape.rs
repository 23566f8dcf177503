//! Gradient area-gap shape scoring.
//!
//! The query mask is turned into three images once: the thresholded mask,
//! a binary signal of its lit pixels, and a high-expression ring (within
//! [`FAR_RADIUS`] of the mask but farther than [`NEAR_RADIUS`]). Per target:
//!
//! - `grad_score = signal * intensity(gradient)`
//! - each pixel's gap is `grad_score`, or the depth disagreement between the
//!   mask and the target z-gap image when that is large (see
//!   [`crate::depth::pixel_gap`])
//! - the area gap sums gaps above [`GAP_THRESHOLD`]
//! - the high-expression area counts lit target pixels inside the ring
//!
//! Lower scores are better.

use std::sync::Arc;

use crate::depth::pixel_gap;
use crate::error::{ComputeError, ConfigError};
use crate::image::{check_dimensions, intensity, is_above, PixelImage, PixelKind};
use crate::pipeline::{EvalContext, LazyImage};
use crate::SearchParams;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Per-pixel gaps at or below this value are ignored.
pub const GAP_THRESHOLD: u32 = 3;
/// Divisor applied to the high-expression area in the combined score.
pub const HIGH_EXPRESSION_FACTOR: i64 = 2;
/// Inner radius of the high-expression ring.
pub const NEAR_RADIUS: u32 = 20;
/// Outer radius of the high-expression ring.
pub const FAR_RADIUS: u32 = 60;
/// Gray level above which a masked query pixel counts as signal.
pub const SIGNAL_THRESHOLD: u32 = 2;

/// Combined 2D shape score: `area_gap + high_expression_area / 2`.
#[inline]
pub fn shape_score(gradient_area_gap: i64, high_expression_area: i64) -> i64 {
    gradient_area_gap + high_expression_area / HIGH_EXPRESSION_FACTOR
}

/// Shape score of one target, from the better mask orientation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeScore {
    pub gradient_area_gap: i64,
    pub high_expression_area: i64,
    pub mirrored: bool,
}

impl ShapeScore {
    #[inline]
    pub fn score(&self) -> i64 {
        shape_score(self.gradient_area_gap, self.high_expression_area)
    }
}

/// Query-derived images for one orientation.
#[derive(Clone, Debug)]
struct QueryMasks {
    masked: Arc<PixelImage>,
    signal: Arc<PixelImage>,
    high_expression: Arc<PixelImage>,
}

impl QueryMasks {
    fn build(masked: &LazyImage, ctx: &mut EvalContext) -> Result<Self, ComputeError> {
        let masked = Arc::new(ctx.materialize(masked));
        let leaf = LazyImage::from_shared(Arc::clone(&masked));
        let signal = ctx.materialize(&leaf.to_gray().to_signal(SIGNAL_THRESHOLD));

        let lit = leaf.map(PixelKind::Gray, |p| u32::from(p & 0x00FF_FFFF != 0));
        let ring = lit.max_filter(FAR_RADIUS).combine2(
            &lit.max_filter(NEAR_RADIUS),
            PixelKind::Gray,
            |far, near| u32::from(far != 0 && near == 0),
        )?;
        let high_expression = ctx.materialize(&ring);

        Ok(Self {
            masked,
            signal: Arc::new(signal),
            high_expression: Arc::new(high_expression),
        })
    }
}

/// Shape scorer bound to one query mask.
#[derive(Clone, Debug)]
pub struct GradientAreaGapScorer {
    width: usize,
    height: usize,
    mask_threshold: u32,
    negative_radius: u32,
    original: QueryMasks,
    mirrored: Option<QueryMasks>,
}

impl GradientAreaGapScorer {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(w = mask.width(), h = mask.height(), mirror = params.mirror))
    )]
    pub fn new(
        mask: &PixelImage,
        roi: Option<&PixelImage>,
        params: &SearchParams,
    ) -> Result<Self, ConfigError> {
        params.validate_shape()?;
        let mut query = LazyImage::from_image(mask.clone());
        if let Some(roi) = roi {
            if roi.dimensions() != mask.dimensions() {
                return Err(ConfigError::QueryDimensionMismatch {
                    image: "ROI mask",
                    expected: mask.dimensions(),
                    found: roi.dimensions(),
                });
            }
            query = query.clear_outside(Arc::new(roi.clone()))?;
        }
        let masked = query.mask(params.mask_threshold);

        let mut ctx = EvalContext::new();
        let original = QueryMasks::build(&masked, &mut ctx)?;
        let mirrored = if params.mirror {
            let flipped = LazyImage::from_shared(Arc::clone(&original.masked)).mirror();
            Some(QueryMasks::build(&flipped, &mut ctx)?)
        } else {
            None
        };

        Ok(Self {
            width: mask.width(),
            height: mask.height(),
            mask_threshold: params.mask_threshold,
            negative_radius: params.negative_radius as u32,
            original,
            mirrored,
        })
    }

    /// Z-gap image used when none is supplied: the thresholded target
    /// dilated by the negative radius.
    pub fn derive_zgap(&self, target: &Arc<PixelImage>) -> PixelImage {
        LazyImage::from_shared(Arc::clone(target))
            .mask(self.mask_threshold)
            .max_filter(self.negative_radius)
            .materialize()
    }

    fn orientation_score(
        &self,
        query: &QueryMasks,
        target: &Arc<PixelImage>,
        gradient: &Arc<PixelImage>,
        zgap: &Arc<PixelImage>,
    ) -> Result<(i64, i64), ComputeError> {
        let grad_kind = gradient.kind();
        let grad_score = LazyImage::from_shared(Arc::clone(&query.signal)).combine2(
            &LazyImage::from_shared(Arc::clone(gradient)),
            PixelKind::Gray,
            move |s, g| s * intensity(g, grad_kind),
        )?;
        let gaps = grad_score.combine3(
            &LazyImage::from_shared(Arc::clone(&query.masked)),
            &LazyImage::from_shared(Arc::clone(zgap)),
            PixelKind::Gray,
            pixel_gap,
        )?;
        let area_gap = gaps.fold(0i64, |acc, g| {
            if g > GAP_THRESHOLD {
                acc + i64::from(g)
            } else {
                acc
            }
        });

        let threshold = self.mask_threshold;
        let target_kind = target.kind();
        let expressed = LazyImage::from_shared(Arc::clone(&query.high_expression)).combine2(
            &LazyImage::from_shared(Arc::clone(target)),
            PixelKind::Gray,
            move |ring, t| u32::from(ring != 0 && is_above(t, target_kind, threshold)),
        )?;
        let high_expression = expressed.fold(0i64, |acc, v| acc + i64::from(v));

        Ok((area_gap, high_expression))
    }

    /// Score one target. `Ok(None)` when no gradient image is available.
    ///
    /// Without an explicit `zgap`, one is derived from the target with
    /// [`GradientAreaGapScorer::derive_zgap`].
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
    pub fn score(
        &self,
        target: &Arc<PixelImage>,
        gradient: Option<&Arc<PixelImage>>,
        zgap: Option<&Arc<PixelImage>>,
    ) -> Result<Option<ShapeScore>, ComputeError> {
        let Some(gradient) = gradient else {
            return Ok(None);
        };
        let dims = (self.width, self.height);
        check_dimensions(dims, target.dimensions())?;
        check_dimensions(dims, gradient.dimensions())?;
        let zgap = match zgap {
            Some(z) => {
                check_dimensions(dims, z.dimensions())?;
                Arc::clone(z)
            }
            None => Arc::new(self.derive_zgap(target)),
        };

        let (gap, high) = self.orientation_score(&self.original, target, gradient, &zgap)?;
        let mut best = ShapeScore {
            gradient_area_gap: gap,
            high_expression_area: high,
            mirrored: false,
        };
        if let Some(mirrored) = &self.mirrored {
            let (gap, high) = self.orientation_score(mirrored, target, gradient, &zgap)?;
            let candidate = ShapeScore {
                gradient_area_gap: gap,
                high_expression_area: high,
                mirrored: true,
            };
            if candidate.score() < best.score() {
                best = candidate;
            }
        }
        Ok(Some(best))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::rgb;

    const BLUE: u32 = 0x0000_00FF;

    fn blob(w: usize, h: usize, xs: std::ops::Range<usize>, ys: std::ops::Range<usize>, color: u32) -> PixelImage {
        PixelImage::from_fn(w, h, PixelKind::Rgb, |x, y| {
            if xs.contains(&x) && ys.contains(&y) {
                color
            } else {
                0
            }
        })
    }

    fn gray(w: usize, h: usize, f: impl FnMut(usize, usize) -> u32) -> Arc<PixelImage> {
        Arc::new(PixelImage::from_fn(w, h, PixelKind::Gray, f))
    }

    #[test]
    fn combined_score_halves_high_expression() {
        assert_eq!(shape_score(156, 1897), 1104);
        assert_eq!(shape_score(0, 1), 0);
    }

    #[test]
    fn missing_gradient_is_unavailable() {
        let mask = blob(30, 30, 5..10, 5..10, BLUE);
        let scorer = GradientAreaGapScorer::new(&mask, None, &SearchParams::default()).unwrap();
        let target = Arc::new(mask);
        assert_eq!(scorer.score(&target, None, None).unwrap(), None);
    }

    #[test]
    fn rejects_non_positive_negative_radius() {
        let mask = blob(8, 8, 1..3, 1..3, BLUE);
        let params = SearchParams::default().with_negative_radius(0);
        assert_eq!(
            GradientAreaGapScorer::new(&mask, None, &params).unwrap_err(),
            ConfigError::NonPositiveNegativeRadius(0)
        );
    }

    #[test]
    fn gradient_inside_signal_accumulates() {
        let mask = blob(30, 30, 5..10, 5..10, BLUE);
        let scorer = GradientAreaGapScorer::new(&mask, None, &SearchParams::default()).unwrap();
        let target = Arc::new(mask.clone());
        let zgap = Arc::new(mask);

        let s = scorer
            .score(&target, Some(&gray(30, 30, |_, _| 10)), Some(&zgap))
            .unwrap()
            .unwrap();
        assert_eq!(s.gradient_area_gap, 25 * 10);
        assert_eq!(s.high_expression_area, 0);
        assert!(!s.mirrored);

        // gaps at the threshold are ignored
        let s = scorer
            .score(&target, Some(&gray(30, 30, |_, _| GAP_THRESHOLD)), Some(&zgap))
            .unwrap()
            .unwrap();
        assert_eq!(s.gradient_area_gap, 0);
    }

    #[test]
    fn depth_disagreement_overrides_gradient() {
        let mask = blob(30, 30, 5..10, 5..10, BLUE);
        let scorer = GradientAreaGapScorer::new(&mask, None, &SearchParams::default()).unwrap();
        let target = Arc::new(mask.clone());
        let red_zgap = Arc::new(blob(30, 30, 5..10, 5..10, rgb(255, 0, 0)));
        let gap = crate::depth::slice_gap(BLUE, rgb(255, 0, 0));

        let s = scorer
            .score(&target, Some(&gray(30, 30, |_, _| 0)), Some(&red_zgap))
            .unwrap()
            .unwrap();
        assert_eq!(
            s.gradient_area_gap,
            25 * i64::from(gap - crate::depth::COLOR_FLUX)
        );
    }

    #[test]
    fn counts_target_pixels_in_the_expression_ring() {
        let mask = blob(161, 161, 79..82, 79..82, BLUE);
        let red = rgb(200, 0, 0);
        let target = PixelImage::from_fn(161, 161, PixelKind::Rgb, |x, y| {
            let in_rows = (79..81).contains(&y);
            if mask.get(x, y) != 0 {
                BLUE
            } else if in_rows && ((90..92).contains(&x) || (120..122).contains(&x) || (150..152).contains(&x)) {
                red
            } else {
                0
            }
        });
        let scorer = GradientAreaGapScorer::new(&mask, None, &SearchParams::default()).unwrap();
        let s = scorer
            .score(&Arc::new(target), Some(&gray(161, 161, |_, _| 0)), None)
            .unwrap()
            .unwrap();
        // only the block 39..41 pixels away lies between the two radii
        assert_eq!(s.high_expression_area, 4);
        assert_eq!(s.gradient_area_gap, 0);
    }

    #[test]
    fn roi_clears_part_of_the_mask() {
        let (w, h) = (161, 161);
        let rows = 79..81;
        let mask = PixelImage::from_fn(w, h, PixelKind::Rgb, |x, y| {
            if rows.contains(&y) && ((20..22).contains(&x) || (139..141).contains(&x)) {
                BLUE
            } else {
                0
            }
        });
        // red blocks about 30 px from each mask block, far from the other one
        let red = rgb(200, 0, 0);
        let target = Arc::new(PixelImage::from_fn(w, h, PixelKind::Rgb, |x, y| {
            if mask.get(x, y) != 0 {
                BLUE
            } else if rows.contains(&y) && ((51..53).contains(&x) || (107..109).contains(&x)) {
                red
            } else {
                0
            }
        }));
        let gradient = gray(w, h, |_, _| 10);
        let zgap = Arc::new(mask.clone());
        let params = SearchParams::default();

        let full = GradientAreaGapScorer::new(&mask, None, &params)
            .unwrap()
            .score(&target, Some(&gradient), Some(&zgap))
            .unwrap()
            .unwrap();
        assert_eq!(full.gradient_area_gap, 8 * 10);
        assert_eq!(full.high_expression_area, 8);

        let left_half = PixelImage::from_fn(w, h, PixelKind::Gray, |x, _| u32::from(x < 80));
        let clipped = GradientAreaGapScorer::new(&mask, Some(&left_half), &params)
            .unwrap()
            .score(&target, Some(&gradient), Some(&zgap))
            .unwrap()
            .unwrap();
        assert_eq!(clipped.gradient_area_gap, 4 * 10);
        assert_eq!(clipped.high_expression_area, 4);

        let wrong = PixelImage::filled(w - 1, h, PixelKind::Gray, 1);
        assert_eq!(
            GradientAreaGapScorer::new(&mask, Some(&wrong), &params).unwrap_err(),
            ConfigError::QueryDimensionMismatch {
                image: "ROI mask",
                expected: (w, h),
                found: (w - 1, h),
            }
        );
    }

    #[test]
    fn mirrored_mask_kept_only_when_strictly_lower() {
        let mask = blob(30, 30, 2..7, 10..15, BLUE);
        let params = SearchParams::default().with_mirror(true);
        let scorer = GradientAreaGapScorer::new(&mask, None, &params).unwrap();
        let target = Arc::new(PixelImage::filled(30, 30, PixelKind::Rgb, 0));

        let left_edges = gray(30, 30, |x, _| if x < 15 { 10 } else { 0 });
        let s = scorer.score(&target, Some(&left_edges), None).unwrap().unwrap();
        assert!(s.mirrored);
        assert_eq!(s.gradient_area_gap, 0);

        let flat = gray(30, 30, |_, _| 0);
        let s = scorer.score(&target, Some(&flat), None).unwrap().unwrap();
        assert!(!s.mirrored);
    }

    #[test]
    fn derived_zgap_dilates_the_target() {
        let mask = blob(64, 64, 30..31, 30..31, BLUE);
        let scorer = GradientAreaGapScorer::new(&mask, None, &SearchParams::default()).unwrap();
        let zgap = scorer.derive_zgap(&Arc::new(mask));
        assert_eq!(zgap.get(30 + 20, 30), BLUE);
        assert_eq!(zgap.get(30 + 21, 30), 0);
        assert_eq!(zgap.get(30, 30 - 20), BLUE);
    }

    #[test]
    fn target_size_must_match() {
        let mask = blob(16, 16, 2..4, 2..4, BLUE);
        let scorer = GradientAreaGapScorer::new(&mask, None, &SearchParams::default()).unwrap();
        let target = Arc::new(PixelImage::filled(15, 16, PixelKind::Rgb, 0));
        let err = scorer
            .score(&target, Some(&gray(16, 16, |_, _| 0)), None)
            .unwrap_err();
        assert!(matches!(err, ComputeError::DimensionMismatch { .. }));
    }
}
