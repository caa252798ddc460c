// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Routing policies - which providers may handle data of a given sensitivity.
//!
//! A policy is selected once per organization and is a pure strategy: no I/O,
//! no state beyond its parameters.
//!
//! | Policy | Cloud considered for | Whitelist includes cloud for |
//! |--------|----------------------|------------------------------|
//! | `DefaultPolicy` | public, internal | public, internal |
//! | `EnterprisePolicy` | public, internal | public only |
//! | `CompliancePolicy` | never | never |

use crate::domain::config::{ConfigError, PolicyConfig};
use crate::domain::sensitivity::{DataResidency, TaskSensitivity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Local and cloud provider names known to the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCatalog {
    pub local: BTreeSet<String>,
    pub cloud: BTreeSet<String>,
}

impl ProviderCatalog {
    pub fn new<L, C, S>(local: L, cloud: C) -> Self
    where
        L: IntoIterator<Item = S>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            local: local.into_iter().map(Into::into).collect(),
            cloud: cloud.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_local(&self, provider: &str) -> bool {
        self.local.contains(provider)
    }

    pub fn is_cloud(&self, provider: &str) -> bool {
        self.cloud.contains(provider)
    }

    /// Anything not known to be local is treated as leaving the machine.
    pub fn residency(&self, provider: &str) -> DataResidency {
        if self.is_local(provider) {
            DataResidency::Local
        } else {
            DataResidency::Cloud
        }
    }

    fn local_only(&self) -> BTreeSet<String> {
        self.local.clone()
    }

    fn everything(&self) -> BTreeSet<String> {
        self.local.union(&self.cloud).cloned().collect()
    }
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        Self::new(["ollama"], ["openrouter", "anthropic", "openai"])
    }
}

/// Strategy deciding which providers may process data of a given sensitivity.
pub trait RoutingPolicy: Send + Sync + fmt::Debug {
    /// Policy name recorded in every audit entry
    fn name(&self) -> &str;

    /// Whether cloud execution may be considered at all
    fn should_allow_cloud(&self, sensitivity: TaskSensitivity) -> bool;

    /// Provider whitelist for the sensitivity level
    fn get_allowed_providers(&self, sensitivity: TaskSensitivity) -> BTreeSet<String>;

    fn catalog(&self) -> &ProviderCatalog;

    /// Policy parameters, recorded alongside audit entries
    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefaultPolicy {
    catalog: ProviderCatalog,
}

impl DefaultPolicy {
    pub fn new(catalog: ProviderCatalog) -> Self {
        Self { catalog }
    }
}

impl RoutingPolicy for DefaultPolicy {
    fn name(&self) -> &str {
        "default"
    }

    fn should_allow_cloud(&self, sensitivity: TaskSensitivity) -> bool {
        !sensitivity.is_protected()
    }

    fn get_allowed_providers(&self, sensitivity: TaskSensitivity) -> BTreeSet<String> {
        if sensitivity.is_protected() {
            self.catalog.local_only()
        } else {
            self.catalog.everything()
        }
    }

    fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }
}

/// Enterprise deployments: internal data may be *considered* for cloud, but
/// the whitelist still keeps it local. Only public data reaches cloud providers.
#[derive(Debug, Clone)]
pub struct EnterprisePolicy {
    catalog: ProviderCatalog,
    region: String,
    requires_encryption: bool,
}

impl EnterprisePolicy {
    pub fn new(catalog: ProviderCatalog, region: impl Into<String>, requires_encryption: bool) -> Self {
        Self {
            catalog,
            region: region.into(),
            requires_encryption,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn requires_encryption(&self) -> bool {
        self.requires_encryption
    }
}

impl RoutingPolicy for EnterprisePolicy {
    fn name(&self) -> &str {
        "enterprise"
    }

    fn should_allow_cloud(&self, sensitivity: TaskSensitivity) -> bool {
        matches!(sensitivity, TaskSensitivity::Public | TaskSensitivity::Internal)
    }

    fn get_allowed_providers(&self, sensitivity: TaskSensitivity) -> BTreeSet<String> {
        match sensitivity {
            TaskSensitivity::Public => self.catalog.everything(),
            _ => self.catalog.local_only(),
        }
    }

    fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("region".to_string(), self.region.clone()),
            ("requires_encryption".to_string(), self.requires_encryption.to_string()),
        ])
    }
}

/// Regulated deployments (HIPAA, SOC2, ...): nothing leaves local execution.
#[derive(Debug, Clone)]
pub struct CompliancePolicy {
    catalog: ProviderCatalog,
    framework: String,
}

impl CompliancePolicy {
    pub fn new(catalog: ProviderCatalog, framework: impl Into<String>) -> Self {
        Self {
            catalog,
            framework: framework.into(),
        }
    }

    pub fn framework(&self) -> &str {
        &self.framework
    }
}

impl RoutingPolicy for CompliancePolicy {
    fn name(&self) -> &str {
        "compliance"
    }

    fn should_allow_cloud(&self, _sensitivity: TaskSensitivity) -> bool {
        false
    }

    fn get_allowed_providers(&self, _sensitivity: TaskSensitivity) -> BTreeSet<String> {
        self.catalog.local_only()
    }

    fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("framework".to_string(), self.framework.clone())])
    }
}

/// Build the configured policy. Unknown names are a startup error.
pub fn build_policy(config: &PolicyConfig, catalog: ProviderCatalog) -> Result<Arc<dyn RoutingPolicy>, ConfigError> {
    match config.name.to_ascii_lowercase().as_str() {
        "default" => Ok(Arc::new(DefaultPolicy::new(catalog))),
        "enterprise" => Ok(Arc::new(EnterprisePolicy::new(
            catalog,
            config.region.clone().unwrap_or_else(|| "us".to_string()),
            config.requires_encryption,
        ))),
        "compliance" => Ok(Arc::new(CompliancePolicy::new(
            catalog,
            config.framework.clone().unwrap_or_else(|| "GENERAL".to_string()),
        ))),
        other => Err(ConfigError::UnknownPolicy(other.to_string())),
    }
}

/// Sensitive data had no permitted destination, or a provider outside the
/// whitelist was requested. Fatal for the current request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Policy '{policy_name}' violated: {rule} (sensitivity: {sensitivity}, agent: {agent_name}, task: {task_type})")]
pub struct PolicyViolation {
    pub rule: String,
    pub policy_name: String,
    pub sensitivity: TaskSensitivity,
    pub agent_name: String,
    pub task_type: String,
    pub attempted_provider: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_keeps_protected_data_local() {
        let policy = DefaultPolicy::default();
        for sensitivity in [TaskSensitivity::Critical, TaskSensitivity::Sensitive] {
            assert!(!policy.should_allow_cloud(sensitivity));
            let allowed = policy.get_allowed_providers(sensitivity);
            assert!(!allowed.contains("openrouter"));
            assert!(allowed.contains("ollama"));
        }
        for sensitivity in [TaskSensitivity::Public, TaskSensitivity::Internal] {
            assert!(policy.should_allow_cloud(sensitivity));
            assert!(policy.get_allowed_providers(sensitivity).contains("openrouter"));
        }
    }

    #[test]
    fn test_enterprise_internal_considers_cloud_but_whitelist_is_local() {
        let policy = EnterprisePolicy::new(ProviderCatalog::default(), "eu-west-1", true);
        assert!(policy.should_allow_cloud(TaskSensitivity::Internal));
        assert_eq!(
            policy.get_allowed_providers(TaskSensitivity::Internal),
            BTreeSet::from(["ollama".to_string()])
        );
        assert!(policy.get_allowed_providers(TaskSensitivity::Public).contains("openrouter"));
        assert!(!policy.should_allow_cloud(TaskSensitivity::Sensitive));
        assert_eq!(policy.parameters().get("region").map(String::as_str), Some("eu-west-1"));
    }

    #[test]
    fn test_compliance_never_allows_cloud() {
        let policy = CompliancePolicy::new(ProviderCatalog::default(), "HIPAA");
        for sensitivity in TaskSensitivity::ALL {
            assert!(!policy.should_allow_cloud(sensitivity));
            assert_eq!(
                policy.get_allowed_providers(sensitivity),
                BTreeSet::from(["ollama".to_string()])
            );
        }
    }

    #[test]
    fn test_build_policy() {
        let mut config = PolicyConfig::default();
        assert_eq!(build_policy(&config, ProviderCatalog::default()).unwrap().name(), "default");

        config.name = "Compliance".to_string();
        config.framework = Some("SOC2".to_string());
        let policy = build_policy(&config, ProviderCatalog::default()).unwrap();
        assert_eq!(policy.name(), "compliance");
        assert_eq!(policy.parameters().get("framework").map(String::as_str), Some("SOC2"));

        config.name = "lenient".to_string();
        assert!(matches!(
            build_policy(&config, ProviderCatalog::default()),
            Err(ConfigError::UnknownPolicy(_))
        ));
    }

    #[test]
    fn test_catalog_residency() {
        let catalog = ProviderCatalog::default();
        assert_eq!(catalog.residency("ollama"), DataResidency::Local);
        assert_eq!(catalog.residency("openrouter"), DataResidency::Cloud);
        assert_eq!(catalog.residency("unknown-provider"), DataResidency::Cloud);
    }

    #[test]
    fn test_violation_message_names_rule_and_policy() {
        let violation = PolicyViolation {
            rule: "no local provider available for protected data".to_string(),
            policy_name: "default".to_string(),
            sensitivity: TaskSensitivity::Critical,
            agent_name: "security_scanner".to_string(),
            task_type: "scan".to_string(),
            attempted_provider: None,
        };
        let message = violation.to_string();
        assert!(message.contains("Policy 'default' violated"));
        assert!(message.contains("no local provider available"));
        assert!(message.contains("critical"));
    }
}
