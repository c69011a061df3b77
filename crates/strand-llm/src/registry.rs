use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use strand_core::config::ProviderConfig;
use strand_core::error::{Result, StrandError};
use strand_core::traits::ModelProvider;

use crate::providers::openai::OpenAiProvider;

/// Registry of model providers, keyed by provider name.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ModelProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under its own name.
    pub fn register(&mut self, provider: impl ModelProvider) {
        let name = provider.name().to_string();
        self.providers.insert(name, Arc::new(provider));
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// List registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a `provider/model` id into the provider and the bare model name.
    pub fn resolve(&self, model_id: &str) -> Result<(Arc<dyn ModelProvider>, String)> {
        let (provider, model) = split_model_id(model_id)?;
        let handle = self
            .get(provider)
            .ok_or_else(|| StrandError::UnknownProvider(provider.to_string()))?;
        Ok((handle, model.to_string()))
    }

    /// Build a registry from the `[providers]` config section.
    pub fn from_config(providers: &HashMap<String, ProviderConfig>) -> Result<Self> {
        let mut registry = Self::new();
        for (name, config) in providers {
            match config.kind.as_str() {
                "openai" => {
                    registry.register(OpenAiProvider::from_config(name, config));
                    info!(provider = %name, base_url = %config.base_url, "Registered model provider");
                }
                other => {
                    warn!(provider = %name, kind = %other, "Unsupported provider kind");
                    return Err(StrandError::Config(format!(
                        "provider {}: unsupported kind {:?}",
                        name, other
                    )));
                }
            }
        }
        Ok(registry)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a model id on its first `/` into `(provider, model)`.
pub fn split_model_id(model_id: &str) -> Result<(&str, &str)> {
    match model_id.split_once('/') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
            Ok((provider, model))
        }
        _ => Err(StrandError::InvalidModelId(model_id.to_string())),
    }
}
