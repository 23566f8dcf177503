//! Parameter binding and score composition.
//!
//! A [`SearchProvider`] holds validated [`SearchParams`] and a
//! [`SearchMode`]. [`SearchProvider::prepare`] binds them to one query and
//! returns a [`PreparedQuery`], whose precomputed state is read-only while
//! scoring.

use std::sync::Arc;

use crate::error::{ComputeError, ConfigError};
use crate::image::PixelImage;
use crate::pixel_match::{PixelMatchScore, PixelMatchScorer};
use crate::shape::{GradientAreaGapScorer, ShapeScore};
use crate::{ScoreResult, SearchParams};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Which algorithms contribute to a [`ScoreResult`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SearchMode {
    /// Shift/mirror pixel-match only.
    #[default]
    Pixel,
    /// Gradient area-gap only.
    Shape,
    /// Pixel-match, then shape on the same target.
    Composite,
}

impl SearchMode {
    pub fn uses_pixel_match(self) -> bool {
        matches!(self, SearchMode::Pixel | SearchMode::Composite)
    }

    pub fn uses_shape(self) -> bool {
        matches!(self, SearchMode::Shape | SearchMode::Composite)
    }
}

/// Query side of a search.
#[derive(Clone, Copy, Debug)]
pub struct QueryImages<'a> {
    pub mask: &'a PixelImage,
    pub negative_mask: Option<&'a PixelImage>,
    pub roi: Option<&'a PixelImage>,
}

impl<'a> QueryImages<'a> {
    pub fn new(mask: &'a PixelImage) -> Self {
        Self {
            mask,
            negative_mask: None,
            roi: None,
        }
    }

    pub fn with_negative_mask(mut self, negative: &'a PixelImage) -> Self {
        self.negative_mask = Some(negative);
        self
    }

    pub fn with_roi(mut self, roi: &'a PixelImage) -> Self {
        self.roi = Some(roi);
        self
    }
}

/// Target side of a search. Images are shared so that scoring never copies them.
#[derive(Clone, Debug)]
pub struct TargetImages {
    pub image: Arc<PixelImage>,
    pub gradient: Option<Arc<PixelImage>>,
    pub zgap: Option<Arc<PixelImage>>,
}

impl TargetImages {
    pub fn new(image: PixelImage) -> Self {
        Self {
            image: Arc::new(image),
            gradient: None,
            zgap: None,
        }
    }

    pub fn with_gradient(mut self, gradient: PixelImage) -> Self {
        self.gradient = Some(Arc::new(gradient));
        self
    }

    pub fn with_zgap(mut self, zgap: PixelImage) -> Self {
        self.zgap = Some(Arc::new(zgap));
        self
    }
}

/// Anything that scores a target against a bound query.
pub trait ColorDepthScorer: Send + Sync {
    fn score(&self, target: &TargetImages) -> Result<ScoreResult, ComputeError>;
}

impl From<PixelMatchScore> for ScoreResult {
    fn from(s: PixelMatchScore) -> Self {
        Self {
            matching_pixels: s.matching_pixels,
            matching_ratio: s.matching_ratio,
            mirrored: s.mirrored,
            available: true,
            ..Self::unavailable()
        }
    }
}

impl ScoreResult {
    fn with_shape(mut self, shape: Option<ShapeScore>) -> Self {
        if let Some(s) = shape {
            self.gradient_area_gap = Some(s.gradient_area_gap);
            self.high_expression_area = Some(s.high_expression_area);
            self.shape_mirrored = s.mirrored;
        }
        self
    }
}

/// Validated parameters waiting to be bound to a query.
#[derive(Clone, Debug)]
pub struct SearchProvider {
    params: SearchParams,
    mode: SearchMode,
}

impl SearchProvider {
    pub fn new(params: SearchParams, mode: SearchMode) -> Result<Self, ConfigError> {
        if mode.uses_shape() {
            params.validate_shape()?;
        } else {
            params.validate()?;
        }
        Ok(Self { params, mode })
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Precompute everything that depends only on the query.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(mode = ?self.mode)))]
    pub fn prepare(&self, query: QueryImages<'_>) -> Result<PreparedQuery, ConfigError> {
        let pixel_match = if self.mode.uses_pixel_match() {
            Some(PixelMatchScorer::new(
                query.mask,
                query.negative_mask,
                query.roi,
                &self.params,
            )?)
        } else {
            None
        };
        let shape = if self.mode.uses_shape() {
            Some(GradientAreaGapScorer::new(query.mask, query.roi, &self.params)?)
        } else {
            None
        };
        Ok(PreparedQuery {
            mode: self.mode,
            pixel_match,
            shape,
        })
    }
}

/// A query bound to its parameters. Safe to share across threads.
#[derive(Clone, Debug)]
pub struct PreparedQuery {
    mode: SearchMode,
    pixel_match: Option<PixelMatchScorer>,
    shape: Option<GradientAreaGapScorer>,
}

impl PreparedQuery {
    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Whether targets need a gradient image to get a shape score.
    pub fn needs_gradient(&self) -> bool {
        self.shape.is_some()
    }

    pub fn pixel_match(&self) -> Option<&PixelMatchScorer> {
        self.pixel_match.as_ref()
    }

    pub fn shape(&self) -> Option<&GradientAreaGapScorer> {
        self.shape.as_ref()
    }

    /// Score one target.
    ///
    /// In composite mode an unavailable pixel-match (empty mask) skips the
    /// shape step, and a missing gradient leaves the shape fields empty.
    pub fn score(&self, target: &TargetImages) -> Result<ScoreResult, ComputeError> {
        let mut result = match &self.pixel_match {
            Some(pm) => match pm.score(&target.image)? {
                Some(s) => ScoreResult::from(s),
                None => return Ok(ScoreResult::unavailable()),
            },
            None => ScoreResult::unavailable(),
        };
        if let Some(shape) = &self.shape {
            let s = shape.score(
                &target.image,
                target.gradient.as_ref(),
                target.zgap.as_ref(),
            )?;
            if self.pixel_match.is_none() {
                result.available = s.is_some();
            }
            result = result.with_shape(s);
        }
        Ok(result)
    }
}

impl ColorDepthScorer for PreparedQuery {
    fn score(&self, target: &TargetImages) -> Result<ScoreResult, ComputeError> {
        PreparedQuery::score(self, target)
    }
}
