//! Ergonomic wrappers over `cdsearch-core` that accept `image` buffers and files.
//!
//! This crate is organized into a few focused modules:
//! - [`image`] – conversions from `image` buffers and files to pixel images.
//! - [`batch`] – scoring a prepared query against many targets.
//! - [`app`] – the JSON-configured search used by the `cdsearch` binary.
//! - [`logger`] – a simple `log` implementation used by the binary.

pub use cdsearch_core::*;

pub mod app;
pub mod batch;
pub mod image;
pub mod logger;

// High-level helpers on `image` buffers.
pub use crate::image::{
    load_pixel_image, pixel_image_from_dynamic, pixel_image_from_gray, pixel_image_from_rgb,
    score_rgb_image,
};

// Batch API.
pub use crate::batch::{
    rank_outcomes, search_targets, FsTargetLoader, TargetLoader, TargetOutcome, TargetSpec,
};
