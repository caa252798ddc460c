// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    /// Reachable, but the configured model is missing or responses are slow
    Degraded,
    Unavailable,
    /// Never probed
    Unknown,
}

impl HealthStatus {
    /// Healthy and degraded providers can still serve requests.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    pub last_check: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub model_available: bool,
}

impl ProviderHealth {
    pub fn unknown(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: HealthStatus::Unknown,
            latency_ms: None,
            last_check: None,
            error: None,
            model_available: false,
        }
    }

    pub fn healthy(provider: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            provider: provider.into(),
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            last_check: Some(Utc::now()),
            error: None,
            model_available: true,
        }
    }

    pub fn degraded(provider: impl Into<String>, latency_ms: u64, reason: impl Into<String>, model_available: bool) -> Self {
        Self {
            provider: provider.into(),
            status: HealthStatus::Degraded,
            latency_ms: Some(latency_ms),
            last_check: Some(Utc::now()),
            error: Some(reason.into()),
            model_available,
        }
    }

    pub fn unavailable(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: HealthStatus::Unavailable,
            latency_ms: None,
            last_check: Some(Utc::now()),
            error: Some(error.into()),
            model_available: false,
        }
    }

    /// Never-checked entries are always stale.
    pub fn is_stale(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        match self.last_check {
            Some(checked) => now - checked > interval,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let interval = Duration::seconds(60);

        assert!(ProviderHealth::unknown("ollama").is_stale(interval, now));

        let mut health = ProviderHealth::healthy("ollama", 12);
        health.last_check = Some(now - Duration::seconds(30));
        assert!(!health.is_stale(interval, now));

        health.last_check = Some(now - Duration::seconds(61));
        assert!(health.is_stale(interval, now));
    }

    #[test]
    fn test_usable_statuses() {
        assert!(HealthStatus::Healthy.is_usable());
        assert!(HealthStatus::Degraded.is_usable());
        assert!(!HealthStatus::Unavailable.is_usable());
        assert!(!HealthStatus::Unknown.is_usable());
    }
}
