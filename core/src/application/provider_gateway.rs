// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Provider Selection Gateway
//!
//! Chooses between the local model server and cloud providers from the
//! gateway mode and current provider health, and maps cloud model names onto
//! local equivalents.
//!
//! | Mode | Choice |
//! |------|--------|
//! | `offline` | local, always, health ignored |
//! | `online` | first healthy cloud provider in priority order |
//! | `auto`, offline first | local if healthy, else cloud |
//! | `auto`, cloud first | cloud if any is healthy, else local |
//! | `secure_first` | local if usable, else cloud |
//!
//! Selection only proposes a candidate. Policy enforcement happens in the
//! generation router.

use crate::domain::config::{GatewayConfig, GatewayMode};
use crate::domain::llm::ProviderFactory;
use crate::domain::provider_health::{HealthStatus, ProviderHealth};
use crate::infrastructure::health_monitor::{HealthSnapshot, ProviderHealthMonitor};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Local model for names that look like flagship cloud models
pub const HIGH_QUALITY_LOCAL_MODEL: &str = "llama3.1:70b";
/// Local model for names that look like mid-tier cloud models
pub const MID_TIER_LOCAL_MODEL: &str = "llama3.1:8b";
/// Local model for everything else
pub const DEFAULT_LOCAL_MODEL: &str = "llama3.2:3b";

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("No healthy provider available in {mode} mode")]
    NoHealthyProvider { mode: GatewayMode },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderChoice {
    pub provider: String,
    pub model: String,
    pub is_local: bool,
}

/// Cloud model name to local model name. Never fails.
///
/// The exact table wins; names that are already local targets pass through;
/// everything else is matched by family.
pub fn map_to_local(mapping: &BTreeMap<String, String>, model_name: &str) -> String {
    if let Some(local) = mapping.get(model_name) {
        return local.clone();
    }
    if mapping.values().any(|local| local == model_name) {
        return model_name.to_string();
    }

    let lowered = model_name.to_ascii_lowercase();
    if lowered.contains("gpt-4") || lowered.contains("claude") {
        HIGH_QUALITY_LOCAL_MODEL.to_string()
    } else if lowered.contains("gpt-3.5") || lowered.contains("gemini") {
        MID_TIER_LOCAL_MODEL.to_string()
    } else {
        DEFAULT_LOCAL_MODEL.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadOutcome {
    AlreadyPresent,
    Pulled,
    Failed(String),
}

pub struct ProviderSelectionGateway {
    config: GatewayConfig,
    monitor: Arc<ProviderHealthMonitor>,
    factory: Arc<dyn ProviderFactory>,
}

impl ProviderSelectionGateway {
    pub fn new(config: GatewayConfig, monitor: Arc<ProviderHealthMonitor>, factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            config,
            monitor,
            factory,
        }
    }

    pub fn mode(&self) -> GatewayMode {
        self.config.mode
    }

    pub fn local_provider(&self) -> &str {
        &self.config.local_provider
    }

    pub fn cloud_providers(&self) -> &[String] {
        &self.config.cloud_providers
    }

    pub fn monitor(&self) -> &Arc<ProviderHealthMonitor> {
        &self.monitor
    }

    pub fn map_to_local(&self, model_name: &str) -> String {
        map_to_local(&self.config.model_mapping, model_name)
    }

    /// Propose a (provider, model) pair for the request.
    ///
    /// An empty `requested_model` means "provider default".
    pub async fn select_provider(&self, requested_model: &str, agent_type: &str) -> Result<ProviderChoice, SelectionError> {
        let choice = match self.config.mode {
            GatewayMode::Offline => self.local_choice(requested_model),
            GatewayMode::Online => {
                let health = self.monitor.refresh_if_stale().await;
                self.online_choice(&health, requested_model)?
            }
            GatewayMode::Auto if self.config.offline_first => {
                let health = self.monitor.refresh_if_stale().await;
                if self.local_status(&health) == HealthStatus::Healthy {
                    self.local_choice(requested_model)
                } else {
                    self.online_choice(&health, requested_model)?
                }
            }
            GatewayMode::Auto => {
                let health = self.monitor.refresh_if_stale().await;
                match self.online_choice(&health, requested_model) {
                    Ok(choice) => choice,
                    Err(e) => {
                        debug!(error = %e, "No cloud provider healthy, falling back to local");
                        self.local_choice(requested_model)
                    }
                }
            }
            GatewayMode::SecureFirst => {
                let health = self.monitor.refresh_if_stale().await;
                if self.local_status(&health).is_usable() {
                    self.local_choice(requested_model)
                } else {
                    self.online_choice(&health, requested_model)?
                }
            }
        };

        debug!(
            agent = agent_type,
            mode = %self.config.mode,
            provider = %choice.provider,
            model = %choice.model,
            "Provider selected"
        );
        Ok(choice)
    }

    fn local_status(&self, health: &HealthSnapshot) -> HealthStatus {
        health
            .get(&self.config.local_provider)
            .map(|h| h.status)
            .unwrap_or(HealthStatus::Unknown)
    }

    fn local_choice(&self, requested_model: &str) -> ProviderChoice {
        let model = if requested_model.is_empty() {
            self.factory
                .default_model(&self.config.local_provider)
                .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string())
        } else {
            self.map_to_local(requested_model)
        };
        ProviderChoice {
            provider: self.config.local_provider.clone(),
            model,
            is_local: true,
        }
    }

    fn online_choice(&self, health: &HealthSnapshot, requested_model: &str) -> Result<ProviderChoice, SelectionError> {
        let provider = self
            .config
            .cloud_providers
            .iter()
            .find(|name| health.get(*name).map(|h| h.status) == Some(HealthStatus::Healthy))
            .ok_or(SelectionError::NoHealthyProvider { mode: self.config.mode })?;

        let model = if requested_model.is_empty() {
            self.factory.default_model(provider).unwrap_or_default()
        } else {
            requested_model.to_string()
        };
        Ok(ProviderChoice {
            provider: provider.clone(),
            model,
            is_local: false,
        })
    }

    /// Current health of every provider, probing if the snapshot is stale.
    pub async fn health(&self) -> HealthSnapshot {
        self.monitor.refresh_if_stale().await
    }

    /// Record a failure observed outside a health probe.
    pub fn mark_unavailable(&self, provider: &str, error: impl Into<String>) {
        self.monitor.record(ProviderHealth::unavailable(provider, error));
    }

    /// Pull every configured preload model that the local server lacks.
    /// Runs in the background; selection never waits for it.
    pub fn spawn_preload(&self) -> JoinHandle<Vec<(String, PreloadOutcome)>> {
        let factory = self.factory.clone();
        let provider = self.config.local_provider.clone();
        let models = self.config.preload_models.clone();
        tokio::spawn(async move { warm_models(factory, &provider, &models).await })
    }
}

pub async fn warm_models(
    factory: Arc<dyn ProviderFactory>,
    provider: &str,
    models: &[String],
) -> Vec<(String, PreloadOutcome)> {
    let mut outcomes = Vec::with_capacity(models.len());

    for model in models {
        let outcome = match factory.create(provider, model) {
            Err(e) => PreloadOutcome::Failed(e.to_string()),
            Ok(local) => match local.has_model(model).await {
                Ok(true) => PreloadOutcome::AlreadyPresent,
                Ok(false) => match local.pull_model(model).await {
                    Ok(()) => PreloadOutcome::Pulled,
                    Err(e) => PreloadOutcome::Failed(e.to_string()),
                },
                Err(e) => PreloadOutcome::Failed(e.to_string()),
            },
        };

        match &outcome {
            PreloadOutcome::Failed(error) => warn!(model = %model, error = %error, "Model preload failed"),
            PreloadOutcome::Pulled => info!(model = %model, "Model preloaded"),
            PreloadOutcome::AlreadyPresent => debug!(model = %model, "Model already present"),
        }
        outcomes.push((model.clone(), outcome));
    }

    outcomes
}
