// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Generation Router
//!
//! The single entry point every agent uses to call a model:
//!
//! 1. resolve the task sensitivity (given, or classified from the profile)
//! 2. ask the selection gateway for a candidate (provider, model)
//! 3. re-check the candidate against policy; on rejection take the secure
//!    gateway's recommendation instead, which may be a policy violation
//! 4. call the provider with bounded retries and exponential backoff, then
//!    the configured fallback provider if policy permits it
//! 5. aggregate token usage into the per-provider ledger
//!
//! Policy violations are the only errors. Provider unavailability ends in a
//! [`GenerationOutcome`] with `success = false` once retries and fallback are
//! exhausted.

use crate::application::provider_gateway::ProviderSelectionGateway;
use crate::application::secure_routing::{SecureRoutingGateway, TaskProfile};
use crate::domain::config::RouterConfig;
use crate::domain::events::RoutingEvent;
use crate::domain::llm::{GenerationOptions, LLMError, ProviderFactory, TokenUsage};
use crate::domain::provider_health::HealthStatus;
use crate::domain::routing_policy::PolicyViolation;
use crate::domain::sensitivity::TaskSensitivity;
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error("Router configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    /// Requested model; empty means provider default
    pub model: String,
    pub profile: TaskProfile,
    /// Skips classification when set
    pub sensitivity: Option<TaskSensitivity>,
    pub options: GenerationOptions,
    /// Overall budget across all attempts and backoff
    pub deadline: Option<Duration>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, profile: TaskProfile) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            model: String::new(),
            profile,
            sensitivity: None,
            options: GenerationOptions::default(),
            deadline: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: TaskSensitivity) -> Self {
        self.sensitivity = Some(sensitivity);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub success: bool,
    pub content: String,
    /// Provider that produced the content, or the last one tried
    pub provider: String,
    pub model: String,
    pub sensitivity: TaskSensitivity,
    pub usage: TokenUsage,
    pub attempts: u32,
    pub used_fallback: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub requests: u64,
    pub failures: u64,
    pub usage: TokenUsage,
}

/// Retry and fallback settings.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub request_timeout: Duration,
    pub fallback_provider: Option<String>,
}

impl From<&RouterConfig> for RouterSettings {
    fn from(config: &RouterConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            fallback_provider: config.fallback_provider.clone(),
        }
    }
}

struct ChainResult {
    response: Option<crate::domain::llm::GenerationResponse>,
    attempts: u32,
    last_error: Option<LLMError>,
}

pub struct GenerationRouter {
    secure: Arc<SecureRoutingGateway>,
    selection: Arc<ProviderSelectionGateway>,
    factory: Arc<dyn ProviderFactory>,
    settings: RouterSettings,
    ledger: DashMap<String, ProviderUsage>,
    event_bus: Option<Arc<EventBus>>,
}

impl GenerationRouter {
    pub fn new(
        secure: Arc<SecureRoutingGateway>,
        selection: Arc<ProviderSelectionGateway>,
        factory: Arc<dyn ProviderFactory>,
        settings: RouterSettings,
    ) -> Result<Self, RouterError> {
        if settings.max_attempts == 0 {
            return Err(RouterError::Configuration("max_attempts must be at least 1".into()));
        }
        if let Some(fallback) = &settings.fallback_provider {
            if !factory.provider_names().iter().any(|p| p == fallback) {
                return Err(RouterError::Configuration(format!(
                    "fallback provider '{}' is not configured",
                    fallback
                )));
            }
        }

        Ok(Self {
            secure,
            selection,
            factory,
            settings,
            ledger: DashMap::new(),
            event_bus: None,
        })
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn secure_gateway(&self) -> &Arc<SecureRoutingGateway> {
        &self.secure
    }

    pub fn selection_gateway(&self) -> &Arc<ProviderSelectionGateway> {
        &self.selection
    }

    /// Per-provider request counts and token totals since startup.
    pub fn usage_summary(&self) -> BTreeMap<String, ProviderUsage> {
        self.ledger
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutcome, RouterError> {
        let started = Instant::now();
        let deadline = request.deadline.map(|d| started + d);
        let agent = request.profile.agent_name.as_str();
        let task_type = request.profile.task_type.as_str();

        let sensitivity = request
            .sensitivity
            .unwrap_or_else(|| self.secure.classify_task(&request.profile));

        let (provider, model) = self.route(&request, sensitivity).await?;

        // Primary chain
        let primary = self
            .run_chain(&provider, &model, &request, deadline)
            .await;
        let mut attempts = primary.attempts;
        let mut usage = TokenUsage::default();

        if let Some(response) = primary.response {
            usage.accumulate(&response.usage);
            return Ok(self.success(response, sensitivity, usage, attempts, false));
        }
        let mut last_error = primary.last_error;
        let mut last_provider = provider.clone();
        let mut last_model = model.clone();
        let mut used_fallback = false;

        if let Some(e @ (LLMError::Network(_) | LLMError::Timeout(_))) = &last_error {
            self.selection.mark_unavailable(&provider, e.to_string());
        }

        // Fallback chain, under the same policy
        if let Some(fallback) = self.fallback_for(&provider, sensitivity) {
            let fallback_model = self.model_for(&fallback, &request.model);
            info!(primary = %provider, fallback = %fallback, agent, "Primary provider exhausted, trying fallback");
            metrics::counter!("bastion_fallbacks_total").increment(1);

            let secondary = self
                .run_chain(&fallback, &fallback_model, &request, deadline)
                .await;
            attempts += secondary.attempts;
            used_fallback = true;

            if let Some(response) = secondary.response {
                usage.accumulate(&response.usage);
                let mut metadata = BTreeMap::new();
                metadata.insert("primary_provider".to_string(), json!(provider));
                metadata.insert("primary_error".to_string(), json!(last_error.as_ref().map(|e| e.to_string())));
                self.secure
                    .record_routing(agent, task_type, sensitivity, &fallback, "fallback_provider", metadata);
                if let Some(bus) = &self.event_bus {
                    bus.publish_routing_event(RoutingEvent::FallbackUsed {
                        agent_name: agent.to_string(),
                        primary_provider: provider.clone(),
                        fallback_provider: fallback.clone(),
                        used_at: Utc::now(),
                    });
                }
                return Ok(self.success(response, sensitivity, usage, attempts, true));
            }

            last_error = secondary.last_error.or(last_error);
            last_provider = fallback;
            last_model = fallback_model;
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "deadline exceeded before any attempt".to_string());
        error!(agent, attempts, error = %message, "Generation failed on every permitted provider");
        if let Some(bus) = &self.event_bus {
            bus.publish_routing_event(RoutingEvent::RoutingFailed {
                agent_name: agent.to_string(),
                attempts,
                error: message.clone(),
                failed_at: Utc::now(),
            });
        }

        Ok(GenerationOutcome {
            success: false,
            content: String::new(),
            provider: last_provider,
            model: last_model,
            sensitivity,
            usage,
            attempts,
            used_fallback,
            error: Some(message),
        })
    }

    /// Steps 2 and 3: candidate from selection, confirmed by policy.
    async fn route(&self, request: &GenerationRequest, sensitivity: TaskSensitivity) -> Result<(String, String), RouterError> {
        let agent = request.profile.agent_name.as_str();
        let task_type = request.profile.task_type.as_str();

        match self.selection.select_provider(&request.model, agent).await {
            Ok(candidate) => {
                if self
                    .secure
                    .validate_provider_allowed(&candidate.provider, sensitivity, agent, task_type)
                {
                    let mut metadata = BTreeMap::new();
                    metadata.insert("model".to_string(), json!(candidate.model));
                    metadata.insert("mode".to_string(), json!(self.selection.mode().to_string()));
                    self.secure.record_routing(
                        agent,
                        task_type,
                        sensitivity,
                        &candidate.provider,
                        "gateway_selection",
                        metadata,
                    );
                    return Ok((candidate.provider, candidate.model));
                }
                debug!(provider = %candidate.provider, "Candidate rejected by policy, asking for a recommendation");
            }
            Err(e) => {
                debug!(error = %e, "Selection gateway found no candidate, asking for a recommendation");
            }
        }

        let health = self.selection.health().await;
        let local_available = health
            .get(self.selection.local_provider())
            .map(|h| h.status.is_usable())
            .unwrap_or(false);
        let cloud_available = self
            .selection
            .cloud_providers()
            .iter()
            .any(|p| health.get(p).map(|h| h.status) == Some(HealthStatus::Healthy));

        let provider =
            self.secure
                .get_recommended_provider(sensitivity, local_available, cloud_available, agent, task_type)?;
        let model = self.model_for(&provider, &request.model);
        Ok((provider, model))
    }

    fn model_for(&self, provider: &str, requested: &str) -> String {
        if self.secure.policy().catalog().is_local(provider) {
            if requested.is_empty() {
                self.factory.default_model(provider).unwrap_or_default()
            } else {
                self.selection.map_to_local(requested)
            }
        } else if requested.is_empty() {
            self.factory.default_model(provider).unwrap_or_default()
        } else {
            requested.to_string()
        }
    }

    fn fallback_for(&self, primary: &str, sensitivity: TaskSensitivity) -> Option<String> {
        let fallback = self.settings.fallback_provider.as_ref()?;
        if fallback == primary {
            return None;
        }
        if !self.secure.is_provider_allowed(fallback, sensitivity) {
            debug!(fallback = %fallback, sensitivity = %sensitivity, "Fallback provider not permitted for this sensitivity");
            return None;
        }
        Some(fallback.clone())
    }

    async fn run_chain(
        &self,
        provider_name: &str,
        model: &str,
        request: &GenerationRequest,
        deadline: Option<Instant>,
    ) -> ChainResult {
        let mut result = ChainResult {
            response: None,
            attempts: 0,
            last_error: None,
        };

        let provider = match self.factory.create(provider_name, model) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(provider = provider_name, error = %e, "Provider could not be instantiated");
                self.record_usage(provider_name, None);
                result.last_error = Some(e);
                return result;
            }
        };

        for attempt in 0..self.settings.max_attempts {
            let timeout = match remaining(deadline) {
                Some(left) if left.is_zero() => break,
                Some(left) => left.min(self.settings.request_timeout),
                None => self.settings.request_timeout,
            };

            result.attempts += 1;
            metrics::counter!("bastion_generation_attempts_total", "provider" => provider_name.to_string()).increment(1);

            let call = provider.generate(&request.prompt, request.system_prompt.as_deref(), &request.options);
            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LLMError::Timeout(timeout.as_millis() as u64)),
            };

            match outcome {
                Ok(response) => {
                    info!(
                        provider = provider_name,
                        model,
                        attempt = attempt + 1,
                        tokens = response.usage.total_tokens,
                        "Generation successful"
                    );
                    self.record_usage(provider_name, Some(&response.usage));
                    result.response = Some(response);
                    return result;
                }
                Err(e) => {
                    warn!(
                        provider = provider_name,
                        attempt = attempt + 1,
                        max_attempts = self.settings.max_attempts,
                        error = %e,
                        "Generation attempt failed"
                    );
                    self.record_usage(provider_name, None);
                    let permanent = matches!(e, LLMError::Authentication(_) | LLMError::InvalidInput(_));
                    result.last_error = Some(e);
                    if permanent {
                        break;
                    }
                }
            }

            if attempt + 1 < self.settings.max_attempts {
                let delay = backoff(self.settings.base_delay, attempt);
                let delay = match remaining(deadline) {
                    Some(left) => delay.min(left),
                    None => delay,
                };
                tokio::time::sleep(delay).await;
            }
        }

        result
    }

    fn record_usage(&self, provider: &str, usage: Option<&TokenUsage>) {
        let mut entry = self.ledger.entry(provider.to_string()).or_default();
        entry.requests += 1;
        match usage {
            Some(usage) => entry.usage.accumulate(usage),
            None => entry.failures += 1,
        }
    }

    fn success(
        &self,
        response: crate::domain::llm::GenerationResponse,
        sensitivity: TaskSensitivity,
        usage: TokenUsage,
        attempts: u32,
        used_fallback: bool,
    ) -> GenerationOutcome {
        GenerationOutcome {
            success: true,
            content: response.content,
            provider: response.provider,
            model: response.model,
            sensitivity,
            usage,
            attempts,
            used_fallback,
            error: None,
        }
    }
}

/// `base * 2^attempt`
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}
