// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

// Provider Registry - builds provider adapters from configuration
//
// The registry validates provider types once at startup and then hands out
// adapters per (provider, model) pair. API keys are resolved lazily so a
// missing cloud key only makes that provider unavailable instead of failing
// the whole process.

use crate::domain::config::{BastionConfig, ConfigError, ProviderConfig};
use crate::domain::llm::{LLMError, LLMProvider, ProviderFactory};
use crate::domain::routing_policy::ProviderCatalog;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::anthropic::AnthropicAdapter;
use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

const SUPPORTED_TYPES: [&str; 5] = ["ollama", "openai", "openai-compatible", "openrouter", "anthropic"];

/// Registry of configured providers, keyed by provider name
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderConfig>,
    request_timeout: Duration,
}

impl ProviderRegistry {
    /// Create provider registry from configuration
    pub fn from_config(config: &BastionConfig) -> Result<Self, ConfigError> {
        let mut providers = BTreeMap::new();

        info!("Initializing provider registry");

        for provider_config in &config.providers {
            if !provider_config.enabled {
                info!("Provider '{}' disabled, skipping", provider_config.name);
                continue;
            }
            if !SUPPORTED_TYPES.contains(&provider_config.provider_type.as_str()) {
                return Err(ConfigError::UnknownProviderType {
                    name: provider_config.name.clone(),
                    provider_type: provider_config.provider_type.clone(),
                });
            }

            info!(
                "Registered provider: {} ({}, default model {})",
                provider_config.name, provider_config.provider_type, provider_config.default_model
            );
            providers.insert(provider_config.name.clone(), provider_config.clone());
        }

        if providers.is_empty() {
            warn!("No generation providers configured - every request will fail");
        }

        Ok(Self {
            providers,
            request_timeout: Duration::from_secs(config.router.request_timeout_secs),
        })
    }

    /// Local/cloud split of the enabled providers, as routing policies see it
    pub fn catalog(&self) -> ProviderCatalog {
        let (local, cloud): (Vec<_>, Vec<_>) = self.providers.values().partition(|p| p.is_local());
        ProviderCatalog::new(
            local.into_iter().map(|p| p.name.clone()),
            cloud.into_iter().map(|p| p.name.clone()),
        )
    }

    pub fn config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.providers.get(provider)
    }

    /// Resolve API key from config (supports "env:VAR_NAME" syntax)
    fn resolve_api_key(config: &ProviderConfig) -> Result<String, LLMError> {
        match &config.api_key {
            Some(key) => match key.strip_prefix("env:") {
                Some(var_name) => std::env::var(var_name).map_err(|_| {
                    LLMError::Authentication(format!(
                        "environment variable {} not set for provider '{}'",
                        var_name, config.name
                    ))
                }),
                None => Ok(key.clone()),
            },
            // Local providers need no auth
            None => Ok(String::new()),
        }
    }
}

impl ProviderFactory for ProviderRegistry {
    fn create(&self, provider: &str, model: &str) -> Result<Arc<dyn LLMProvider>, LLMError> {
        let config = self
            .providers
            .get(provider)
            .ok_or_else(|| LLMError::Provider(format!("Provider '{}' not configured", provider)))?;

        let adapter: Arc<dyn LLMProvider> = match config.provider_type.as_str() {
            "ollama" => Arc::new(OllamaAdapter::new(
                config.name.clone(),
                config.endpoint.clone(),
                model,
                self.request_timeout,
            )),
            "anthropic" => Arc::new(AnthropicAdapter::new(
                config.name.clone(),
                config.endpoint.clone(),
                Self::resolve_api_key(config)?,
                model,
                self.request_timeout,
            )),
            // OpenAI, OpenRouter, LM Studio, vLLM, ...
            _ => Arc::new(OpenAIAdapter::new(
                config.name.clone(),
                config.endpoint.clone(),
                Self::resolve_api_key(config)?,
                model,
                self.request_timeout,
            )),
        };

        Ok(adapter)
    }

    fn default_model(&self, provider: &str) -> Option<String> {
        self.providers.get(provider).map(|p| p.default_model.clone())
    }

    fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}
