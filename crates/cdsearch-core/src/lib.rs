//! Core primitives for color-depth MIP similarity search.
//!
//! # Overview
//!
//! A query (mask) image is scored against many target images. This crate
//! exposes the building blocks:
//!
//! - [`pipeline`] – a lazy pixel pipeline (maps, positional maps, 2/3-way
//!   combinations) with an explicit materialization pass, plus the color and
//!   morphology primitives in [`ops`] and the histogram dilation in
//!   [`max_filter`].
//! - [`pixel_match`] – shift/mirror search scoring each target pixel with the
//!   six-sector hue distance from [`hue`].
//! - [`shape`] – the gradient area-gap penalty built from dilation masks and
//!   the color-depth slice distance in [`depth`].
//! - [`provider`] – validated parameters bound to one query, producing a
//!   reusable [`provider::PreparedQuery`] with a single `score` entry point.
//!
//! A prepared query holds no per-target state: `score` can be called from
//! many threads at once, each call running its own evaluation context.
//!
//! # Features
//!
//! - `rayon` – dilation rows are processed in parallel. Results are
//!   bit-identical to the sequential path.
//! - `tracing` – instruments scorer construction, scoring and dilation with
//!   `tracing` spans.
//! - `serde` – `Serialize`/`Deserialize` for parameters and results.

pub mod depth;
pub mod error;
pub mod hue;
pub mod image;
pub mod max_filter;
pub mod ops;
pub mod pipeline;
pub mod pixel_match;
pub mod provider;
pub mod shape;
pub mod shift;

pub use crate::error::{ComputeError, ConfigError};
pub use crate::image::{PixelImage, PixelKind};
pub use crate::pipeline::LazyImage;
pub use crate::provider::{
    ColorDepthScorer, PreparedQuery, QueryImages, SearchMode, SearchProvider, TargetImages,
};

/// Tunable parameters shared by all scorers.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SearchParams {
    /// Mask pixels above this value (any channel) are foreground.
    pub mask_threshold: u32,
    /// Target pixels at or below this value (all channels) never match.
    pub target_threshold: u32,
    /// Hue distance tolerance, in percent (2.0 means a distance of 0.02).
    pub pix_color_fluctuation: f64,
    /// Maximum translation explored around the mask, in pixels. Must be even.
    pub xy_shift: u32,
    /// Also score the horizontally mirrored mask.
    pub mirror: bool,
    /// Dilation radius used to derive a target z-gap mask for shape scoring.
    pub negative_radius: i32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            mask_threshold: 100,
            target_threshold: 100,
            pix_color_fluctuation: 2.0,
            xy_shift: 0,
            mirror: false,
            negative_radius: 20,
        }
    }
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mask_threshold(mut self, t: u32) -> Self {
        self.mask_threshold = t;
        self
    }

    pub fn with_target_threshold(mut self, t: u32) -> Self {
        self.target_threshold = t;
        self
    }

    pub fn with_pix_color_fluctuation(mut self, percent: f64) -> Self {
        self.pix_color_fluctuation = percent;
        self
    }

    pub fn with_xy_shift(mut self, xy_shift: u32) -> Self {
        self.xy_shift = xy_shift;
        self
    }

    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_negative_radius(mut self, radius: i32) -> Self {
        self.negative_radius = radius;
        self
    }

    /// Tolerance as an absolute hue distance.
    #[inline]
    pub fn color_tolerance(&self) -> f64 {
        self.pix_color_fluctuation / 100.0
    }

    /// Checks shared by every scorer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("mask threshold", self.mask_threshold),
            ("target threshold", self.target_threshold),
        ] {
            if value > 255 {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if !self.pix_color_fluctuation.is_finite() || self.pix_color_fluctuation < 0.0 {
            return Err(ConfigError::InvalidColorFluctuation(
                self.pix_color_fluctuation,
            ));
        }
        if self.xy_shift % 2 != 0 {
            return Err(ConfigError::OddXyShift(self.xy_shift));
        }
        Ok(())
    }

    /// [`SearchParams::validate`] plus the shape-scoring requirements.
    pub fn validate_shape(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.negative_radius <= 0 {
            return Err(ConfigError::NonPositiveNegativeRadius(self.negative_radius));
        }
        Ok(())
    }
}

/// Outcome of scoring one target against a prepared query.
///
/// Shape fields are `None` when shape scoring was not requested or the
/// target gradient image was missing.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScoreResult {
    pub matching_pixels: i64,
    pub matching_ratio: f64,
    /// Best pixel-match came from the mirrored mask.
    pub mirrored: bool,
    pub gradient_area_gap: Option<i64>,
    pub high_expression_area: Option<i64>,
    /// Lowest shape score came from the mirrored mask.
    pub shape_mirrored: bool,
    /// False when the score could not be computed (e.g. empty mask).
    pub available: bool,
}

impl ScoreResult {
    /// Result for a pair that cannot be scored.
    pub fn unavailable() -> Self {
        Self {
            matching_pixels: 0,
            matching_ratio: 0.0,
            mirrored: false,
            gradient_area_gap: None,
            high_expression_area: None,
            shape_mirrored: false,
            available: false,
        }
    }

    /// Combined 2D shape score, when both shape fields are present.
    pub fn shape_score(&self) -> Option<i64> {
        match (self.gradient_area_gap, self.high_expression_area) {
            (Some(gap), Some(high)) => Some(shape::shape_score(gap, high)),
            _ => None,
        }
    }
}
