// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Provider Health Monitor
//!
//! Tracks liveness of every configured provider.
//!
//! - Probes run concurrently, each under its own timeout, so one unreachable
//!   provider never delays the others. A timed-out probe is recorded as
//!   `UNAVAILABLE`.
//! - The health map is an immutable snapshot behind a lock. A refresh builds
//!   a new map and swaps it in whole; readers see either the old snapshot or
//!   the new one.
//! - Refresh is lazy: [`ProviderHealthMonitor::refresh_if_stale`] probes only
//!   when some entry is older than the interval, and concurrent callers share
//!   one refresh instead of stampeding the providers.

use crate::domain::config::GatewayConfig;
use crate::domain::llm::ProviderFactory;
use crate::domain::provider_health::{HealthStatus, ProviderHealth};
use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub type HealthSnapshot = Arc<HashMap<String, ProviderHealth>>;

pub struct ProviderHealthMonitor {
    factory: Arc<dyn ProviderFactory>,
    providers: Vec<String>,
    interval: Duration,
    probe_timeout: Duration,
    snapshot: RwLock<HealthSnapshot>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ProviderHealthMonitor {
    pub fn new(
        factory: Arc<dyn ProviderFactory>,
        providers: Vec<String>,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let initial = providers
            .iter()
            .map(|name| (name.clone(), ProviderHealth::unknown(name.clone())))
            .collect();

        Self {
            factory,
            providers,
            interval,
            probe_timeout,
            snapshot: RwLock::new(Arc::new(initial)),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Monitor every provider the factory knows about.
    pub fn from_config(factory: Arc<dyn ProviderFactory>, config: &GatewayConfig) -> Self {
        let providers = factory.provider_names();
        Self::new(
            factory,
            providers,
            Duration::from_secs(config.health_check_interval_secs),
            Duration::from_secs(config.probe_timeout_secs),
        )
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current snapshot, without probing.
    pub fn snapshot(&self) -> HealthSnapshot {
        self.snapshot.read().clone()
    }

    pub fn get(&self, provider: &str) -> ProviderHealth {
        self.snapshot
            .read()
            .get(provider)
            .cloned()
            .unwrap_or_else(|| ProviderHealth::unknown(provider))
    }

    /// Overwrite one provider's entry. Used when health is learned outside a
    /// probe, e.g. a generation call that just failed.
    pub fn record(&self, health: ProviderHealth) {
        let mut guard = self.snapshot.write();
        let previous = guard.get(&health.provider).map(|h| h.status);
        log_transition(&health, previous);
        let mut next = HashMap::clone(&guard);
        next.insert(health.provider.clone(), health);
        *guard = Arc::new(next);
    }

    fn is_stale(&self, snapshot: &HashMap<String, ProviderHealth>) -> bool {
        let interval = chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::days(365));
        let now = Utc::now();
        self.providers.iter().any(|name| {
            snapshot
                .get(name)
                .map(|h| h.is_stale(interval, now))
                .unwrap_or(true)
        })
    }

    /// Snapshot that is no older than the interval, probing if needed.
    pub async fn refresh_if_stale(&self) -> HealthSnapshot {
        let current = self.snapshot();
        if !self.is_stale(&current) {
            return current;
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        let current = self.snapshot();
        if !self.is_stale(&current) {
            return current;
        }
        self.probe_all().await
    }

    /// Probe every provider now.
    pub async fn refresh(&self) -> HealthSnapshot {
        let _guard = self.refresh_lock.lock().await;
        self.probe_all().await
    }

    async fn probe_all(&self) -> HealthSnapshot {
        let probes = self.providers.iter().map(|name| self.probe(name));
        let results = join_all(probes).await;

        let previous = self.snapshot();
        for health in &results {
            log_transition(health, previous.get(&health.provider).map(|h| h.status));
        }

        let next: HealthSnapshot = Arc::new(
            results
                .into_iter()
                .map(|health| (health.provider.clone(), health))
                .collect(),
        );
        *self.snapshot.write() = next.clone();
        next
    }

    /// Probe a single provider and store the result.
    pub async fn check(&self, provider: &str) -> ProviderHealth {
        let health = self.probe(provider).await;
        self.record(health.clone());
        health
    }

    async fn probe(&self, name: &str) -> ProviderHealth {
        let model = self.factory.default_model(name).unwrap_or_default();
        let provider = match self.factory.create(name, &model) {
            Ok(provider) => provider,
            Err(e) => return ProviderHealth::unavailable(name, e.to_string()),
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.probe_timeout, async {
            provider.health_check().await?;
            let latency_ms = started.elapsed().as_millis() as u64;
            let model_available = if model.is_empty() {
                true
            } else {
                provider.has_model(&model).await?
            };
            Ok::<_, crate::domain::llm::LLMError>((latency_ms, model_available))
        })
        .await;

        match outcome {
            Err(_) => ProviderHealth::unavailable(
                name,
                format!("probe timed out after {} ms", self.probe_timeout.as_millis()),
            ),
            Ok(Err(e)) => ProviderHealth::unavailable(name, e.to_string()),
            Ok(Ok((latency_ms, true))) => ProviderHealth::healthy(name, latency_ms),
            Ok(Ok((latency_ms, false))) => {
                ProviderHealth::degraded(name, latency_ms, format!("model '{}' not available", model), false)
            }
        }
    }
}

fn log_transition(health: &ProviderHealth, previous: Option<HealthStatus>) {
    if previous == Some(health.status) {
        return;
    }
    match health.status {
        HealthStatus::Healthy => info!(
            provider = %health.provider,
            latency_ms = health.latency_ms,
            "Provider is healthy"
        ),
        HealthStatus::Degraded | HealthStatus::Unavailable => warn!(
            provider = %health.provider,
            status = %health.status,
            error = health.error.as_deref().unwrap_or(""),
            "Provider health changed"
        ),
        HealthStatus::Unknown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{GenerationOptions, GenerationResponse, LLMError, LLMProvider};
    use async_trait::async_trait;

    struct ScriptedProvider {
        name: String,
        delay: Duration,
        healthy: bool,
        has_model: bool,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _options: &GenerationOptions,
        ) -> Result<GenerationResponse, LLMError> {
            Err(LLMError::Provider("not used".into()))
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            tokio::time::sleep(self.delay).await;
            if self.healthy {
                Ok(())
            } else {
                Err(LLMError::Network("connection refused".into()))
            }
        }

        async fn has_model(&self, _model: &str) -> Result<bool, LLMError> {
            Ok(self.has_model)
        }
    }

    struct ScriptedFactory;

    impl ProviderFactory for ScriptedFactory {
        fn create(&self, provider: &str, _model: &str) -> Result<Arc<dyn LLMProvider>, LLMError> {
            let (delay, healthy, has_model) = match provider {
                "fast" => (Duration::from_millis(1), true, true),
                "slow" => (Duration::from_secs(30), true, true),
                "down" => (Duration::from_millis(1), false, true),
                "modelless" => (Duration::from_millis(1), true, false),
                _ => return Err(LLMError::Provider(format!("unknown provider {}", provider))),
            };
            Ok(Arc::new(ScriptedProvider {
                name: provider.to_string(),
                delay,
                healthy,
                has_model,
            }))
        }

        fn default_model(&self, _provider: &str) -> Option<String> {
            Some("test-model".to_string())
        }

        fn provider_names(&self) -> Vec<String> {
            ["fast", "slow", "down", "modelless"].iter().map(|s| s.to_string()).collect()
        }
    }

    fn monitor() -> ProviderHealthMonitor {
        let factory: Arc<dyn ProviderFactory> = Arc::new(ScriptedFactory);
        let providers = factory.provider_names();
        ProviderHealthMonitor::new(factory, providers, Duration::from_secs(60), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_starts_unknown() {
        let monitor = monitor();
        assert_eq!(monitor.get("fast").status, HealthStatus::Unknown);
        assert_eq!(monitor.get("never-configured").status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_slow_probe_times_out_without_delaying_others() {
        let monitor = monitor();
        let started = Instant::now();
        let snapshot = monitor.refresh().await;

        // All four probes share one timeout window instead of queueing
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(snapshot["fast"].status, HealthStatus::Healthy);
        assert_eq!(snapshot["slow"].status, HealthStatus::Unavailable);
        assert!(snapshot["slow"].error.as_deref().unwrap_or("").contains("timed out"));
        assert_eq!(snapshot["down"].status, HealthStatus::Unavailable);
        assert_eq!(snapshot["modelless"].status, HealthStatus::Degraded);
        assert!(!snapshot["modelless"].model_available);
    }

    #[tokio::test]
    async fn test_fresh_snapshot_is_not_reprobed() {
        let monitor = monitor();
        let first = monitor.refresh().await;
        let second = monitor.refresh_if_stale().await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_record_replaces_single_entry() {
        let monitor = monitor();
        let before = monitor.snapshot();
        monitor.record(ProviderHealth::unavailable("fast", "generation failed"));

        assert_eq!(monitor.get("fast").status, HealthStatus::Unavailable);
        // Earlier readers keep their snapshot
        assert_eq!(before["fast"].status, HealthStatus::Unknown);
    }
}
