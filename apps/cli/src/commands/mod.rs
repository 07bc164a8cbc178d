//! Command implementations.

pub mod chat;
pub mod config;
pub mod health;

use anyhow::{Context, anyhow};
use sprout_abstraction::Model;
use sprout_models::{ModelConfig, ModelFactory, ModelType};
use sprout_orchestrator::{Engine, EngineConfig};
use std::str::FromStr;
use std::sync::Arc;

/// Creates the completion model named in `[model]`.
fn build_model(config: &EngineConfig) -> anyhow::Result<Arc<dyn Model>> {
    let settings = &config.model;
    let model_type = ModelType::from_str(&settings.provider)
        .map_err(|()| anyhow!("unknown model provider '{}'", settings.provider))?;

    let mut model_config = ModelConfig::new(model_type, settings.model_id.clone());
    if let Some(base_url) = &settings.base_url {
        model_config = model_config.with_base_url(base_url.clone());
    }
    ModelFactory::create(model_config).context("failed to create completion model")
}

/// Builds and starts an engine with the default agents.
async fn start_engine(config: EngineConfig) -> anyhow::Result<Engine> {
    let model = build_model(&config)?;
    let engine = Engine::builder(config).with_default_agents(model).build().await?;
    engine.start().await?;
    Ok(engine)
}
