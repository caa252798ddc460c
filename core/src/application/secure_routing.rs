// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Secure Routing Gateway
//!
//! Classifies work by data sensitivity, checks providers against the
//! organization's [`RoutingPolicy`] and writes the compliance audit trail.
//!
//! Every decision that leads to a routing outcome produces exactly one audit
//! entry: `BLOCKED` for a rejected provider, `FAILED` when protected data has
//! nowhere safe to go, otherwise the chosen provider with the path taken
//! (`prefer_local` or `fallback_cloud`). Policy violations are returned to the
//! caller; sensitivity is never downgraded and no disallowed provider is ever
//! substituted.

use crate::domain::audit::{ComplianceAuditEntry, BLOCKED, FAILED};
use crate::domain::events::RoutingEvent;
use crate::domain::routing_policy::{PolicyViolation, RoutingPolicy};
use crate::domain::sensitivity::{DataResidency, TaskSensitivity};
use crate::infrastructure::audit::ComplianceAuditor;
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Agents whose whole job is security analysis.
pub const SECURITY_AGENTS: [&str; 3] = ["security_scanner", "security_analyzer", "security"];

/// Task types that reveal project internals but carry no private data.
pub const INTERNAL_TASK_TYPES: [&str; 4] = ["planning", "analysis", "validation", "documentation"];

pub const DECISION_PREFER_LOCAL: &str = "prefer_local";
pub const DECISION_FALLBACK_CLOUD: &str = "fallback_cloud";

/// What a caller knows about a unit of work before it is routed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskProfile {
    pub agent_name: String,
    pub task_type: String,
    pub has_private_data: bool,
    pub has_sensitive_data: bool,
    pub is_security_task: bool,
}

impl TaskProfile {
    pub fn new(agent_name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            task_type: task_type.into(),
            ..Self::default()
        }
    }

    pub fn with_private_data(mut self) -> Self {
        self.has_private_data = true;
        self
    }

    pub fn with_sensitive_data(mut self) -> Self {
        self.has_sensitive_data = true;
        self
    }

    pub fn security_task(mut self) -> Self {
        self.is_security_task = true;
        self
    }
}

fn is_security_agent(agent_name: &str) -> bool {
    let normalized = agent_name.trim().to_ascii_lowercase().replace('-', "_");
    SECURITY_AGENTS.contains(&normalized.as_str())
}

/// First matching rule wins:
/// security work, sensitive data, private data, internal task type, public.
pub fn classify_task(
    agent_name: &str,
    task_type: &str,
    has_private_data: bool,
    has_sensitive_data: bool,
    is_security_task: bool,
) -> TaskSensitivity {
    if is_security_task || is_security_agent(agent_name) || has_sensitive_data {
        TaskSensitivity::Critical
    } else if has_private_data {
        TaskSensitivity::Sensitive
    } else if INTERNAL_TASK_TYPES.contains(&task_type.trim().to_ascii_lowercase().as_str()) {
        TaskSensitivity::Internal
    } else {
        TaskSensitivity::Public
    }
}

pub struct SecureRoutingGateway {
    policy: Arc<dyn RoutingPolicy>,
    auditor: Arc<ComplianceAuditor>,
    organization: String,
    local_provider: String,
    cloud_providers: Vec<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl SecureRoutingGateway {
    /// `cloud_providers` is the priority order used when cloud is chosen.
    pub fn new(
        policy: Arc<dyn RoutingPolicy>,
        auditor: Arc<ComplianceAuditor>,
        local_provider: impl Into<String>,
        cloud_providers: Vec<String>,
    ) -> Self {
        let organization = auditor.organization().to_string();
        Self {
            policy,
            auditor,
            organization,
            local_provider: local_provider.into(),
            cloud_providers,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn policy(&self) -> &Arc<dyn RoutingPolicy> {
        &self.policy
    }

    pub fn auditor(&self) -> &Arc<ComplianceAuditor> {
        &self.auditor
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn local_provider(&self) -> &str {
        &self.local_provider
    }

    pub fn classify_task(&self, profile: &TaskProfile) -> TaskSensitivity {
        classify_task(
            &profile.agent_name,
            &profile.task_type,
            profile.has_private_data,
            profile.has_sensitive_data,
            profile.is_security_task,
        )
    }

    /// Whitelist check without any audit side effect.
    pub fn is_provider_allowed(&self, provider: &str, sensitivity: TaskSensitivity) -> bool {
        self.policy.get_allowed_providers(sensitivity).contains(provider)
    }

    /// Whitelist check. A rejection writes one `BLOCKED` audit entry.
    pub fn validate_provider_allowed(
        &self,
        provider: &str,
        sensitivity: TaskSensitivity,
        agent_name: &str,
        task_type: &str,
    ) -> bool {
        let allowed = self.policy.get_allowed_providers(sensitivity);
        if allowed.contains(provider) {
            return true;
        }

        warn!(
            provider,
            sensitivity = %sensitivity,
            agent = agent_name,
            policy = self.policy.name(),
            "Provider blocked by routing policy"
        );
        metrics::counter!("bastion_policy_blocks_total", "policy" => self.policy.name().to_string()).increment(1);

        let mut metadata = self.base_metadata(&allowed);
        metadata.insert("attempted_provider".to_string(), json!(provider));
        self.write_entry(
            agent_name,
            task_type,
            sensitivity,
            BLOCKED,
            format!(
                "provider '{}' is not permitted for {} data under policy '{}'",
                provider,
                sensitivity,
                self.policy.name()
            ),
            DataResidency::Local,
            metadata,
        );

        if let Some(bus) = &self.event_bus {
            bus.publish_routing_event(RoutingEvent::ProviderBlocked {
                agent_name: agent_name.to_string(),
                provider: provider.to_string(),
                sensitivity,
                policy_name: self.policy.name().to_string(),
                blocked_at: Utc::now(),
            });
        }
        false
    }

    /// Like [`Self::validate_provider_allowed`], but a rejection is an error
    /// naming the rule that was broken.
    pub fn enforce_provider(
        &self,
        provider: &str,
        sensitivity: TaskSensitivity,
        agent_name: &str,
        task_type: &str,
    ) -> Result<(), PolicyViolation> {
        if self.validate_provider_allowed(provider, sensitivity, agent_name, task_type) {
            Ok(())
        } else {
            Err(self.violation(
                format!("provider '{}' is not in the whitelist for {} data", provider, sensitivity),
                sensitivity,
                agent_name,
                task_type,
                Some(provider.to_string()),
            ))
        }
    }

    /// Pick a provider from what is currently reachable.
    ///
    /// Protected data (SENSITIVE, CRITICAL) goes local or nowhere. Other data
    /// prefers local and falls back to a whitelisted cloud provider.
    pub fn get_recommended_provider(
        &self,
        sensitivity: TaskSensitivity,
        local_available: bool,
        cloud_available: bool,
        agent_name: &str,
        task_type: &str,
    ) -> Result<String, PolicyViolation> {
        let allowed = self.policy.get_allowed_providers(sensitivity);
        let local = self.local_candidate(&allowed);

        let mut metadata = self.base_metadata(&allowed);
        metadata.insert("local_available".to_string(), json!(local_available));
        metadata.insert("cloud_available".to_string(), json!(cloud_available));

        if let (Some(local), true) = (&local, local_available) {
            self.write_entry(
                agent_name,
                task_type,
                sensitivity,
                local,
                DECISION_PREFER_LOCAL.to_string(),
                DataResidency::Local,
                metadata,
            );
            info!(provider = %local, sensitivity = %sensitivity, agent = agent_name, "Routing to local provider");
            return Ok(local.clone());
        }

        let rule = if sensitivity.is_protected() {
            format!("{} data requires an available local provider", sensitivity)
        } else {
            let cloud = if cloud_available && self.policy.should_allow_cloud(sensitivity) {
                self.cloud_candidate(&allowed)
            } else {
                None
            };
            match cloud {
                Some(cloud) => {
                    self.write_entry(
                        agent_name,
                        task_type,
                        sensitivity,
                        &cloud,
                        DECISION_FALLBACK_CLOUD.to_string(),
                        DataResidency::Cloud,
                        metadata,
                    );
                    info!(provider = %cloud, sensitivity = %sensitivity, agent = agent_name, "Routing to cloud provider");
                    return Ok(cloud);
                }
                None => format!("no permitted provider is available for {} data", sensitivity),
            }
        };

        warn!(sensitivity = %sensitivity, agent = agent_name, policy = self.policy.name(), rule = %rule, "No permitted provider");
        self.write_entry(
            agent_name,
            task_type,
            sensitivity,
            FAILED,
            rule.clone(),
            DataResidency::Local,
            metadata,
        );
        Err(self.violation(rule, sensitivity, agent_name, task_type, None))
    }

    /// Audit a routing outcome decided outside this gateway, e.g. a fallback
    /// provider taking over after the primary chain was exhausted.
    pub fn record_routing(
        &self,
        agent_name: &str,
        task_type: &str,
        sensitivity: TaskSensitivity,
        provider: &str,
        decision: impl Into<String>,
        extra: BTreeMap<String, Value>,
    ) {
        let allowed = self.policy.get_allowed_providers(sensitivity);
        let mut metadata = self.base_metadata(&allowed);
        metadata.extend(extra);
        self.write_entry(
            agent_name,
            task_type,
            sensitivity,
            provider,
            decision.into(),
            self.policy.catalog().residency(provider),
            metadata,
        );
    }

    fn local_candidate(&self, allowed: &BTreeSet<String>) -> Option<String> {
        if allowed.contains(&self.local_provider) {
            return Some(self.local_provider.clone());
        }
        allowed
            .iter()
            .find(|p| self.policy.catalog().is_local(p))
            .cloned()
    }

    fn cloud_candidate(&self, allowed: &BTreeSet<String>) -> Option<String> {
        self.cloud_providers
            .iter()
            .find(|p| allowed.contains(*p) && !self.policy.catalog().is_local(p))
            .cloned()
    }

    fn base_metadata(&self, allowed: &BTreeSet<String>) -> BTreeMap<String, Value> {
        let mut metadata = BTreeMap::new();
        metadata.insert("allowed_providers".to_string(), json!(allowed));
        let parameters = self.policy.parameters();
        if !parameters.is_empty() {
            metadata.insert("policy_parameters".to_string(), json!(parameters));
        }
        metadata
    }

    #[allow(clippy::too_many_arguments)]
    fn write_entry(
        &self,
        agent_name: &str,
        task_type: &str,
        sensitivity: TaskSensitivity,
        selected_provider: &str,
        policy_decision: String,
        data_residency: DataResidency,
        metadata: BTreeMap<String, Value>,
    ) {
        self.auditor.record(ComplianceAuditEntry {
            timestamp: Utc::now(),
            agent_name: agent_name.to_string(),
            task_type: task_type.to_string(),
            sensitivity,
            selected_provider: selected_provider.to_string(),
            policy_decision,
            policy_name: self.policy.name().to_string(),
            organization: self.organization.clone(),
            data_residency,
            metadata,
        });
    }

    fn violation(
        &self,
        rule: String,
        sensitivity: TaskSensitivity,
        agent_name: &str,
        task_type: &str,
        attempted_provider: Option<String>,
    ) -> PolicyViolation {
        PolicyViolation {
            rule,
            policy_name: self.policy.name().to_string(),
            sensitivity,
            agent_name: agent_name.to_string(),
            task_type: task_type.to_string(),
            attempted_provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::routing_policy::{DefaultPolicy, EnterprisePolicy, ProviderCatalog};

    fn gateway(policy: Arc<dyn RoutingPolicy>) -> SecureRoutingGateway {
        SecureRoutingGateway::new(
            policy,
            Arc::new(ComplianceAuditor::in_memory("acme")),
            "ollama",
            vec!["openrouter".to_string(), "anthropic".to_string()],
        )
    }

    #[test]
    fn test_classification_precedence() {
        assert_eq!(classify_task("coder", "code", true, false, true), TaskSensitivity::Critical);
        assert_eq!(classify_task("security-scanner", "code", false, false, false), TaskSensitivity::Critical);
        assert_eq!(classify_task("coder", "planning", false, true, false), TaskSensitivity::Critical);
        assert_eq!(classify_task("coder", "planning", true, false, false), TaskSensitivity::Sensitive);
        assert_eq!(classify_task("planner", "Planning", false, false, false), TaskSensitivity::Internal);
        assert_eq!(classify_task("coder", "code_generation", false, false, false), TaskSensitivity::Public);
    }

    #[test]
    fn test_public_prefers_local_then_cloud() {
        let gateway = gateway(Arc::new(DefaultPolicy::default()));

        let chosen = gateway
            .get_recommended_provider(TaskSensitivity::Public, true, true, "coder", "code")
            .unwrap();
        assert_eq!(chosen, "ollama");

        let chosen = gateway
            .get_recommended_provider(TaskSensitivity::Public, false, true, "coder", "code")
            .unwrap();
        assert_eq!(chosen, "openrouter");

        let entries = gateway.auditor().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].policy_decision, DECISION_PREFER_LOCAL);
        assert_eq!(entries[1].policy_decision, DECISION_FALLBACK_CLOUD);
        assert_eq!(entries[1].data_residency, DataResidency::Cloud);
    }

    #[test]
    fn test_nothing_available_fails_with_one_entry() {
        let gateway = gateway(Arc::new(DefaultPolicy::default()));
        let violation = gateway
            .get_recommended_provider(TaskSensitivity::Public, false, false, "coder", "code")
            .unwrap_err();
        assert_eq!(violation.policy_name, "default");
        assert_eq!(gateway.auditor().len(), 1);
        assert!(gateway.auditor().entries()[0].is_failed());
    }

    #[test]
    fn test_enterprise_internal_never_reaches_cloud() {
        let gateway = gateway(Arc::new(EnterprisePolicy::new(ProviderCatalog::default(), "eu", true)));
        let result = gateway.get_recommended_provider(TaskSensitivity::Internal, false, true, "planner", "planning");
        assert!(result.is_err());

        let chosen = gateway
            .get_recommended_provider(TaskSensitivity::Public, false, true, "coder", "code")
            .unwrap();
        assert_eq!(chosen, "openrouter");
    }

    #[test]
    fn test_pure_check_writes_nothing() {
        let gateway = gateway(Arc::new(DefaultPolicy::default()));
        assert!(!gateway.is_provider_allowed("openrouter", TaskSensitivity::Sensitive));
        assert!(gateway.is_provider_allowed("openrouter", TaskSensitivity::Internal));
        assert!(gateway.auditor().is_empty());
    }

    #[test]
    fn test_enforce_provider_names_rule_and_policy() {
        let gateway = gateway(Arc::new(DefaultPolicy::default()));
        let violation = gateway
            .enforce_provider("openrouter", TaskSensitivity::Critical, "coder", "code")
            .unwrap_err();
        assert_eq!(violation.attempted_provider.as_deref(), Some("openrouter"));
        let message = violation.to_string();
        assert!(message.contains("default"));
        assert!(message.contains("openrouter"));
        assert_eq!(gateway.auditor().report().blocked, 1);
    }
}
