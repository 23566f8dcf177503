//! Application-level helpers for the CLI.
//!
//! These functions wire up I/O (load the query images, fan out over the
//! targets, write the JSON report) around the `cdsearch-core` scoring APIs.

use crate::batch::{rank_outcomes, search_targets, FsTargetLoader, TargetOutcome, TargetSpec};
use crate::image::load_pixel_image;
use anyhow::{Context, Result};
use cdsearch_core::{QueryImages, SearchMode, SearchParams, SearchProvider};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Write, path::Path, path::PathBuf, time::Instant};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    pub mask: PathBuf,
    pub negative_mask: Option<PathBuf>,
    pub roi: Option<PathBuf>,
    pub targets: Vec<TargetSpec>,
    pub mode: Option<SearchMode>,
    pub mask_threshold: Option<u32>,
    pub target_threshold: Option<u32>,
    pub pix_color_fluctuation: Option<f64>,
    pub xy_shift: Option<u32>,
    pub mirror: Option<bool>,
    pub negative_radius: Option<i32>,
    /// Sort results best-first instead of keeping input order.
    pub rank: Option<bool>,
    pub output_json: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchDump {
    pub mask: String,
    pub width: usize,
    pub height: usize,
    pub mode: SearchMode,
    pub params: SearchParams,
    pub results: Vec<TargetOutcome>,
}

/// Run the configured search and write the JSON report.
///
/// The report goes to `output_json`, or next to the mask as
/// `<mask>.cdsearch.json`.
pub fn run_search(cfg: SearchConfig) -> Result<SearchDump> {
    if cfg.targets.is_empty() {
        anyhow::bail!("no targets configured");
    }
    let mode = cfg.mode.unwrap_or_default();
    let mut params = SearchParams::default();
    apply_params_overrides(&mut params, &cfg);

    let provider = SearchProvider::new(params.clone(), mode)
        .with_context(|| format!("invalid parameters for {mode:?} search"))?;

    let mask = load_pixel_image(&cfg.mask)?;
    let negative = cfg.negative_mask.as_deref().map(load_pixel_image).transpose()?;
    let roi = cfg.roi.as_deref().map(load_pixel_image).transpose()?;

    let mut query = QueryImages::new(&mask);
    if let Some(neg) = &negative {
        query = query.with_negative_mask(neg);
    }
    if let Some(roi) = &roi {
        query = query.with_roi(roi);
    }
    let prepared = provider
        .prepare(query)
        .with_context(|| format!("preparing query {}", cfg.mask.display()))?;
    log::info!(
        "prepared {:?} query {} ({}x{})",
        mode,
        cfg.mask.display(),
        mask.width(),
        mask.height()
    );

    let loader = FsTargetLoader {
        skip_variants: !prepared.needs_gradient(),
    };
    let started = Instant::now();
    let mut results = search_targets(&prepared, &cfg.targets, &loader);
    let failed = results.iter().filter(|o| !o.is_ok()).count();
    log::info!(
        "scored {} targets in {:.2} ms ({} failed)",
        results.len(),
        started.elapsed().as_secs_f64() * 1000.0,
        failed
    );
    if cfg.rank.unwrap_or(false) {
        rank_outcomes(&mut results, mode);
    }

    let dump = SearchDump {
        mask: cfg.mask.to_string_lossy().into_owned(),
        width: mask.width(),
        height: mask.height(),
        mode,
        params,
        results,
    };
    let json_out = cfg
        .output_json
        .unwrap_or_else(|| cfg.mask.with_extension("cdsearch.json"));
    write_json(&json_out, &dump)?;
    log::info!("saved results to {}", json_out.display());

    Ok(dump)
}

fn apply_params_overrides(params: &mut SearchParams, cfg: &SearchConfig) {
    if let Some(t) = cfg.mask_threshold {
        params.mask_threshold = t;
    }
    if let Some(t) = cfg.target_threshold {
        params.target_threshold = t;
    }
    if let Some(f) = cfg.pix_color_fluctuation {
        params.pix_color_fluctuation = f;
    }
    if let Some(s) = cfg.xy_shift {
        params.xy_shift = s;
    }
    if let Some(m) = cfg.mirror {
        params.mirror = m;
    }
    if let Some(r) = cfg.negative_radius {
        params.negative_radius = r;
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut json_file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(&mut json_file, value)?;
    json_file.write_all(b"\n")?;
    Ok(())
}

pub fn load_config(path: &Path) -> Result<SearchConfig> {
    let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
    let cfg: SearchConfig = serde_json::from_reader(file)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let cfg: SearchConfig = serde_json::from_str(
            r#"{
                "mask": "mask.png",
                "targets": [{ "image": "t.png" }],
                "mode": "composite",
                "xy_shift": 4,
                "mirror": true
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.mode, Some(SearchMode::Composite));
        assert_eq!(cfg.targets[0].gradient, None);

        let mut params = SearchParams::default();
        apply_params_overrides(&mut params, &cfg);
        assert_eq!(params.xy_shift, 4);
        assert!(params.mirror);
        assert_eq!(params.mask_threshold, 100);
        assert_eq!(params.negative_radius, 20);
    }

    #[test]
    fn empty_target_list_is_rejected() {
        let cfg: SearchConfig =
            serde_json::from_str(r#"{ "mask": "mask.png", "targets": [] }"#).unwrap();
        let err = run_search(cfg).unwrap_err();
        assert!(err.to_string().contains("no targets"));
    }
}
