use anyhow::{Context, Result, bail};

use karat_orchestrator::EngineConfig;

fn main() -> Result<()> {
    let config = EngineConfig::from_env().context("failed to load engine config")?;
    match config.log_filter.as_deref() {
        Some(directive) => karat_observability::init_with_filter(directive),
        None => karat_observability::init(),
    }

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: karat <scenario.json>");
    };

    let scenario = karat_cli::Scenario::load(&path)?;
    tracing::info!(%path, steps = scenario.steps.len(), "replaying scenario");

    let report = karat_cli::replay(&config, scenario)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
