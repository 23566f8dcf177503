//! Scoring one prepared query against many targets.
//!
//! Every target yields a [`TargetOutcome`]: either a score or the error that
//! prevented it. A failing target never aborts the batch.

use std::path::PathBuf;

use anyhow::Result;
use cdsearch_core::{ColorDepthScorer, ScoreResult, SearchMode, TargetImages};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::image::load_pixel_image;

/// Files making up one target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TargetSpec {
    pub image: PathBuf,
    #[serde(default)]
    pub gradient: Option<PathBuf>,
    #[serde(default)]
    pub zgap: Option<PathBuf>,
}

impl TargetSpec {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            gradient: None,
            zgap: None,
        }
    }

    pub fn with_gradient(mut self, gradient: impl Into<PathBuf>) -> Self {
        self.gradient = Some(gradient.into());
        self
    }

    pub fn with_zgap(mut self, zgap: impl Into<PathBuf>) -> Self {
        self.zgap = Some(zgap.into());
        self
    }
}

/// Source of target images.
pub trait TargetLoader: Sync {
    fn load(&self, spec: &TargetSpec) -> Result<TargetImages>;
}

/// Loads targets from the file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsTargetLoader {
    /// Skip gradient and z-gap files, e.g. for pixel-only searches.
    pub skip_variants: bool,
}

impl TargetLoader for FsTargetLoader {
    fn load(&self, spec: &TargetSpec) -> Result<TargetImages> {
        let mut target = TargetImages::new(load_pixel_image(&spec.image)?);
        if self.skip_variants {
            return Ok(target);
        }
        if let Some(path) = &spec.gradient {
            target = target.with_gradient(load_pixel_image(path)?);
        }
        if let Some(path) = &spec.zgap {
            target = target.with_zgap(load_pixel_image(path)?);
        }
        Ok(target)
    }
}

/// Result of one (query, target) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetOutcome {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Score every target in `specs`, preserving input order.
pub fn search_targets<S, L>(scorer: &S, specs: &[TargetSpec], loader: &L) -> Vec<TargetOutcome>
where
    S: ColorDepthScorer + ?Sized,
    L: TargetLoader + ?Sized,
{
    let score_one = |spec: &TargetSpec| -> TargetOutcome {
        let name = spec.image.to_string_lossy().into_owned();
        let result = loader
            .load(spec)
            .and_then(|target| scorer.score(&target).map_err(anyhow::Error::from));
        match result {
            Ok(score) => {
                log::debug!("{name}: {} matching pixels", score.matching_pixels);
                TargetOutcome {
                    target: name,
                    score: Some(score),
                    error: None,
                }
            }
            Err(err) => {
                log::warn!("{name}: {err:#}");
                TargetOutcome {
                    target: name,
                    score: None,
                    error: Some(format!("{err:#}")),
                }
            }
        }
    };

    #[cfg(feature = "rayon")]
    let outcomes: Vec<TargetOutcome> = specs.par_iter().map(score_one).collect();

    #[cfg(not(feature = "rayon"))]
    let outcomes: Vec<TargetOutcome> = specs.iter().map(score_one).collect();

    outcomes
}

/// Best-first ordering for a search mode.
///
/// Pixel and composite modes rank by matching pixels (descending), shape
/// mode by shape score (ascending). Unavailable scores and failures go last.
/// The sort is stable.
pub fn rank_outcomes(outcomes: &mut [TargetOutcome], mode: SearchMode) {
    let key = |o: &TargetOutcome| -> Option<i64> {
        let score = o.score.as_ref().filter(|s| s.available)?;
        match mode {
            SearchMode::Pixel | SearchMode::Composite => Some(-score.matching_pixels),
            SearchMode::Shape => score.shape_score(),
        }
    };
    outcomes.sort_by_key(|o| match key(o) {
        Some(k) => (0, k),
        None => (1, 0),
    });
}
