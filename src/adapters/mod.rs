//! Adapter interfaces for AI text generation.
//!
//! Handlers that generate content talk to a [`Generator`]. Providers:
//! - `none`: generation disabled, every call fails (handlers fall back)
//! - `openai`: chat-completions compatible HTTP endpoint
//! - `fabric`: the Fabric CLI as a subprocess

pub mod fabric;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::AiSettings;

pub use fabric::FabricGenerator;
pub use openai::OpenAiGenerator;

/// Trait for AI text generation backends
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Generate text for a system/user prompt pair
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Generator used when no provider is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn name(&self) -> &str {
        "none"
    }

    async fn generate(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        anyhow::bail!("AI generation is disabled (set --ai-provider or ai.provider to enable it)")
    }
}

/// Build the generator selected by configuration
pub fn build_generator(settings: &AiSettings) -> Result<Arc<dyn Generator>> {
    let timeout = Duration::from_secs(settings.timeout_seconds);

    match settings.provider.as_str() {
        "none" | "" => Ok(Arc::new(DisabledGenerator)),
        "openai" => {
            let generator = OpenAiGenerator::from_settings(settings, timeout)
                .context("Failed to configure the openai provider")?;
            Ok(Arc::new(generator))
        }
        "fabric" => {
            let mut generator = FabricGenerator::new().with_timeout(timeout);
            if let Some(pattern) = &settings.model {
                generator = generator.with_pattern(pattern.clone());
            }
            Ok(Arc::new(generator))
        }
        other => anyhow::bail!(
            "Unknown AI provider '{}' (expected one of: none, openai, fabric)",
            other
        ),
    }
}
