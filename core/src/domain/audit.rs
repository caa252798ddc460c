// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Compliance audit records.
//!
//! One entry per routing decision. Entries are append-only: they are written
//! once as a single JSON line and never mutated afterwards.

use crate::domain::sensitivity::{DataResidency, TaskSensitivity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `selected_provider` sentinel for a provider rejected by policy.
pub const BLOCKED: &str = "BLOCKED";
/// `selected_provider` sentinel for a request with no permitted destination.
pub const FAILED: &str = "FAILED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub agent_name: String,
    pub task_type: String,
    pub sensitivity: TaskSensitivity,
    pub selected_provider: String,
    pub policy_decision: String,
    pub policy_name: String,
    pub organization: String,
    pub data_residency: DataResidency,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ComplianceAuditEntry {
    pub fn is_blocked(&self) -> bool {
        self.selected_provider == BLOCKED
    }

    pub fn is_failed(&self) -> bool {
        self.selected_provider == FAILED
    }
}

/// Aggregate view over the audit history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub organization: String,
    pub total_decisions: usize,
    pub by_provider: BTreeMap<String, usize>,
    pub by_sensitivity: BTreeMap<String, usize>,
    pub blocked: usize,
    pub failed: usize,
    pub local_decisions: usize,
    pub cloud_decisions: usize,
    pub first_entry: Option<DateTime<Utc>>,
    pub last_entry: Option<DateTime<Utc>>,
}

impl ComplianceReport {
    pub fn from_entries(organization: &str, entries: &[ComplianceAuditEntry]) -> Self {
        let mut report = Self {
            organization: organization.to_string(),
            total_decisions: entries.len(),
            ..Self::default()
        };

        for entry in entries {
            *report.by_provider.entry(entry.selected_provider.clone()).or_insert(0) += 1;
            *report
                .by_sensitivity
                .entry(entry.sensitivity.as_str().to_string())
                .or_insert(0) += 1;

            if entry.is_blocked() {
                report.blocked += 1;
            } else if entry.is_failed() {
                report.failed += 1;
            } else {
                match entry.data_residency {
                    DataResidency::Local => report.local_decisions += 1,
                    DataResidency::Cloud => report.cloud_decisions += 1,
                }
            }
        }

        report.first_entry = entries.iter().map(|e| e.timestamp).min();
        report.last_entry = entries.iter().map(|e| e.timestamp).max();
        report
    }

    /// Share of routed (non-blocked, non-failed) decisions that stayed local.
    pub fn local_share(&self) -> f64 {
        let routed = self.local_decisions + self.cloud_decisions;
        if routed == 0 {
            return 1.0;
        }
        self.local_decisions as f64 / routed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(provider: &str, sensitivity: TaskSensitivity, residency: DataResidency) -> ComplianceAuditEntry {
        ComplianceAuditEntry {
            timestamp: Utc::now(),
            agent_name: "coder".to_string(),
            task_type: "code_generation".to_string(),
            sensitivity,
            selected_provider: provider.to_string(),
            policy_decision: "prefer_local".to_string(),
            policy_name: "default".to_string(),
            organization: "acme".to_string(),
            data_residency: residency,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_report_counts() {
        let entries = vec![
            entry("ollama", TaskSensitivity::Critical, DataResidency::Local),
            entry("openrouter", TaskSensitivity::Public, DataResidency::Cloud),
            entry(BLOCKED, TaskSensitivity::Sensitive, DataResidency::Local),
            entry(FAILED, TaskSensitivity::Critical, DataResidency::Local),
        ];
        let report = ComplianceReport::from_entries("acme", &entries);
        assert_eq!(report.total_decisions, 4);
        assert_eq!(report.blocked, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.local_decisions, 1);
        assert_eq!(report.cloud_decisions, 1);
        assert_eq!(report.by_sensitivity.get("critical"), Some(&2));
        assert!((report.local_share() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_entry_json_field_names() {
        let value = serde_json::to_value(entry("ollama", TaskSensitivity::Internal, DataResidency::Local)).unwrap();
        for field in [
            "timestamp",
            "agent_name",
            "task_type",
            "sensitivity",
            "selected_provider",
            "policy_decision",
            "policy_name",
            "organization",
            "data_residency",
            "metadata",
        ] {
            assert!(value.get(field).is_some(), "missing field {}", field);
        }
        assert_eq!(value["data_residency"], "local");
        assert_eq!(value["sensitivity"], "internal");
    }
}
