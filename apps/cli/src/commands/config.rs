//! Config command implementation.

use anyhow::Context;
use colored::Colorize;
use sprout_orchestrator::EngineConfig;
use std::path::Path;

/// Loads `path` if given, otherwise the file named by `SPROUT_CONFIG`, otherwise defaults.
pub fn load(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => EngineConfig::from_env().context("failed to load configuration from SPROUT_CONFIG"),
    }
}

/// Validates a configuration file and prints a short summary.
pub fn check(path: &Path) -> anyhow::Result<()> {
    let config = load(Some(path))?;
    println!("{} {}", "✓ Configuration OK:".green(), path.display());
    println!("  Strategy: {}", config.orchestrator.strategy()?);
    println!("  Model: {} ({})", config.model.model_id, config.model.provider);
    println!(
        "  Restarts: up to {} every {} ms",
        config.supervisor.max_restart_attempts, config.supervisor.restart_delay_ms
    );
    Ok(())
}

/// Prints the effective configuration as TOML.
pub fn show(path: Option<&Path>) -> anyhow::Result<()> {
    let config = load(path)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
