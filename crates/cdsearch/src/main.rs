use anyhow::Context;
use cdsearch::app::{load_config, run_search};
use cdsearch::logger;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let config: PathBuf = std::env::args()
        .nth(1)
        .context("usage: cdsearch <config.json>")?
        .into();

    let cfg = load_config(&config)?;
    let level = logger::level_from_config(cfg.log_level.as_deref())?;
    logger::init_with_level(level).context("installing logger")?;
    #[cfg(feature = "tracing")]
    logger::init_tracing().context("installing tracing subscriber")?;

    let dump = run_search(cfg)?;
    let failed = dump.results.iter().filter(|o| !o.is_ok()).count();
    println!(
        "Scored {} targets against {} ({} failed)",
        dump.results.len(),
        dump.mask,
        failed
    );

    Ok(())
}
