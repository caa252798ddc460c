// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

// Bastion Configuration Types
//
// Defines the configuration schema for a governance instance:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Organization identity and routing policy selection
// - Compliance audit settings
// - Provider endpoints and the provider selection gateway
// - Generation retry/fallback behavior and checkpoint retention

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const API_VERSION: &str = "bastion.dev/v1";
pub const KIND: &str = "BastionConfig";

/// Configuration errors are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown routing policy: '{0}' (expected default, enterprise or compliance)")]
    UnknownPolicy(String),

    #[error("Unknown gateway mode: '{0}'")]
    UnknownMode(String),

    #[error("Unknown provider type '{provider_type}' for provider '{name}'")]
    UnknownProviderType { name: String, provider_type: String },

    #[error("Provider '{0}' is not configured")]
    MissingProvider(String),

    #[error("Environment variable not set: {0}")]
    MissingEnv(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BastionConfigManifest {
    /// API version (must be "bastion.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "BastionConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: BastionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable instance name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Configuration specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BastionConfig {
    /// Organization the audit trail is scoped to
    #[serde(default = "default_organization")]
    pub organization: String,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// "default", "enterprise" or "compliance"
    #[serde(default = "default_policy_name")]
    pub name: String,

    /// Data region (enterprise policy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Require encrypted transport to cloud providers (enterprise policy)
    #[serde(default = "default_true")]
    pub requires_encryption: bool,

    /// Compliance framework, e.g. "HIPAA", "SOC2" (compliance policy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding `compliance_audit_<organization>.jsonl`
    #[serde(default = "default_audit_directory")]
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    /// Always local, regardless of health
    Offline,
    /// Cloud only
    Online,
    /// Health-driven choice between local and cloud
    Auto,
    /// Local whenever it is healthy, cloud only as a last resort
    SecureFirst,
}

impl std::str::FromStr for GatewayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "offline" => Ok(Self::Offline),
            "online" => Ok(Self::Online),
            "auto" => Ok(Self::Auto),
            "secure_first" | "secure-first" => Ok(Self::SecureFirst),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Auto => "auto",
            Self::SecureFirst => "secure_first",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_mode")]
    pub mode: GatewayMode,

    /// In auto mode, try local before cloud
    #[serde(default = "default_true")]
    pub offline_first: bool,

    /// Exact cloud-model -> local-model mapping, consulted before heuristics
    #[serde(default = "default_model_mapping")]
    pub model_mapping: BTreeMap<String, String>,

    /// Local models to pull proactively at startup
    #[serde(default)]
    pub preload_models: Vec<String>,

    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Name of the local provider (must appear in `providers`)
    #[serde(default = "default_local_provider")]
    pub local_provider: String,

    /// Cloud providers in priority order
    #[serde(default = "default_cloud_providers")]
    pub cloud_providers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name (e.g., "ollama", "openrouter")
    pub name: String,

    /// Provider type
    #[serde(rename = "type")]
    pub provider_type: String, // "ollama", "openai", "openai-compatible", "openrouter", "anthropic"

    pub endpoint: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model used when a request names none
    pub default_model: String,
}

impl ProviderConfig {
    pub fn is_local(&self) -> bool {
        self.provider_type == "ollama"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Attempts per provider chain
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff base; attempt n waits base * 2^n
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Secondary provider tried after the primary chain is exhausted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_checkpoint_retention")]
    pub checkpoint_retention: usize,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_organization() -> String {
    "default".to_string()
}

fn default_policy_name() -> String {
    "default".to_string()
}

fn default_audit_directory() -> PathBuf {
    PathBuf::from("./audit_logs")
}

fn default_mode() -> GatewayMode {
    GatewayMode::Auto
}

fn default_health_interval() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_local_provider() -> String {
    "ollama".to_string()
}

fn default_cloud_providers() -> Vec<String> {
    vec!["openrouter".to_string()]
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    120
}

fn default_checkpoint_retention() -> usize {
    crate::domain::checkpoint::DEFAULT_CHECKPOINT_RETENTION
}

/// Built-in cloud -> local model table.
pub fn default_model_mapping() -> BTreeMap<String, String> {
    [
        ("gpt-4", "llama3.1:70b"),
        ("gpt-4o", "llama3.1:70b"),
        ("gpt-4-turbo", "llama3.1:70b"),
        ("gpt-4o-mini", "llama3.1:8b"),
        ("gpt-3.5-turbo", "llama3.1:8b"),
        ("claude-3-opus", "llama3.1:70b"),
        ("claude-3-5-sonnet", "llama3.1:70b"),
        ("claude-3-haiku", "llama3.1:8b"),
        ("gemini-pro", "llama3.1:8b"),
        ("gemini-1.5-flash", "llama3.1:8b"),
    ]
    .into_iter()
    .map(|(cloud, local)| (cloud.to_string(), local.to_string()))
    .collect()
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            name: "ollama".to_string(),
            provider_type: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            enabled: true,
            default_model: "llama3.2:3b".to_string(),
        },
        ProviderConfig {
            name: "openrouter".to_string(),
            provider_type: "openrouter".to_string(),
            endpoint: "https://openrouter.ai/api/v1".to_string(),
            api_key: Some("env:OPENROUTER_API_KEY".to_string()),
            enabled: true,
            default_model: "anthropic/claude-3.5-sonnet".to_string(),
        },
    ]
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            name: default_policy_name(),
            region: None,
            requires_encryption: true,
            framework: None,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_audit_directory(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            offline_first: true,
            model_mapping: default_model_mapping(),
            preload_models: vec![],
            health_check_interval_secs: default_health_interval(),
            probe_timeout_secs: default_probe_timeout(),
            local_provider: default_local_provider(),
            cloud_providers: default_cloud_providers(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            request_timeout_secs: default_request_timeout(),
            fallback_provider: None,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            checkpoint_retention: default_checkpoint_retention(),
        }
    }
}

impl Default for BastionConfig {
    fn default() -> Self {
        Self {
            organization: default_organization(),
            policy: PolicyConfig::default(),
            audit: AuditConfig::default(),
            gateway: GatewayConfig::default(),
            providers: default_providers(),
            router: RouterConfig::default(),
            state: StateConfig::default(),
        }
    }
}

impl BastionConfig {
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Audit file for the configured organization.
    pub fn audit_log_path(&self) -> PathBuf {
        self.audit
            .directory
            .join(format!("compliance_audit_{}.jsonl", self.organization))
    }
}

impl Default for BastionConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "bastion".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                labels: None,
            },
            spec: BastionConfig::default(),
        }
    }
}

impl BastionConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Discover configuration file using precedence order
    /// 1. BASTION_CONFIG_PATH environment variable
    /// 2. ./bastion-config.yaml (working directory)
    /// 3. ~/.bastion/config.yaml (user home)
    /// 4. /etc/bastion/config.yaml (system, Unix) or C:\ProgramData\Bastion\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("BASTION_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./bastion-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".bastion").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/bastion/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Bastion\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Explicit path fails loudly if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Invalid values are
    /// logged and ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let spec = &mut self.spec;

        if let Some(offline) = lookup("BASTION_OFFLINE_MODE").and_then(|v| parse_flag("BASTION_OFFLINE_MODE", &v)) {
            if offline {
                tracing::info!("Environment override: BASTION_OFFLINE_MODE=true");
                spec.gateway.mode = GatewayMode::Offline;
            }
        }

        if let Some(org) = lookup("BASTION_ORGANIZATION") {
            tracing::info!("Environment override: BASTION_ORGANIZATION={}", org);
            spec.organization = org;
        }

        if let Some(enabled) = lookup("BASTION_AUDIT_ENABLED").and_then(|v| parse_flag("BASTION_AUDIT_ENABLED", &v)) {
            spec.audit.enabled = enabled;
        }

        if let Some(dir) = lookup("BASTION_AUDIT_DIR") {
            spec.audit.directory = PathBuf::from(dir);
        }

        if let Some(policy) = lookup("BASTION_POLICY") {
            tracing::info!("Environment override: BASTION_POLICY={}", policy);
            spec.policy.name = policy;
        }

        if let Some(region) = lookup("BASTION_POLICY_REGION") {
            spec.policy.region = Some(region);
        }

        if let Some(encrypt) = lookup("BASTION_POLICY_REQUIRES_ENCRYPTION")
            .and_then(|v| parse_flag("BASTION_POLICY_REQUIRES_ENCRYPTION", &v))
        {
            spec.policy.requires_encryption = encrypt;
        }

        if let Some(framework) = lookup("BASTION_COMPLIANCE_FRAMEWORK") {
            spec.policy.framework = Some(framework);
        }

        for (var, provider_type) in [("BASTION_OLLAMA_URL", "ollama"), ("BASTION_OPENROUTER_URL", "openrouter")] {
            if let Some(url) = lookup(var) {
                for provider in spec.providers.iter_mut().filter(|p| p.provider_type == provider_type) {
                    tracing::info!("Environment override: {} -> {}", var, provider.name);
                    provider.endpoint = url.clone();
                }
            }
        }

        if let Some(secs) = lookup("BASTION_REQUEST_TIMEOUT_SECS").and_then(|v| parse_number("BASTION_REQUEST_TIMEOUT_SECS", &v)) {
            spec.router.request_timeout_secs = secs;
        }

        if let Some(attempts) = lookup("BASTION_MAX_ATTEMPTS").and_then(|v| parse_number("BASTION_MAX_ATTEMPTS", &v)) {
            spec.router.max_attempts = attempts as u32;
        }

        if let Some(retention) = lookup("BASTION_CHECKPOINT_RETENTION").and_then(|v| parse_number("BASTION_CHECKPOINT_RETENTION", &v)) {
            spec.state.checkpoint_retention = retention as usize;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::Invalid(format!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version, API_VERSION
            )));
        }

        if self.kind != KIND {
            return Err(ConfigError::Invalid(format!(
                "Invalid kind: '{}'. Must be '{}'",
                self.kind, KIND
            )));
        }

        let spec = &self.spec;

        if spec.organization.trim().is_empty() {
            return Err(ConfigError::Invalid("organization cannot be empty".to_string()));
        }

        if !matches!(spec.policy.name.as_str(), "default" | "enterprise" | "compliance") {
            return Err(ConfigError::UnknownPolicy(spec.policy.name.clone()));
        }

        if spec.state.checkpoint_retention == 0 {
            return Err(ConfigError::Invalid("state.checkpoint_retention must be at least 1".to_string()));
        }

        if spec.router.max_attempts == 0 {
            return Err(ConfigError::Invalid("router.max_attempts must be at least 1".to_string()));
        }

        for provider in &spec.providers {
            if provider.name.is_empty() {
                return Err(ConfigError::Invalid("provider name cannot be empty".to_string()));
            }
            if provider.endpoint.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "provider endpoint cannot be empty for: {}",
                    provider.name
                )));
            }
            if !matches!(
                provider.provider_type.as_str(),
                "ollama" | "openai" | "openai-compatible" | "openrouter" | "anthropic"
            ) {
                return Err(ConfigError::UnknownProviderType {
                    name: provider.name.clone(),
                    provider_type: provider.provider_type.clone(),
                });
            }
        }

        if let Some(fallback) = &spec.router.fallback_provider {
            if spec.provider(fallback).is_none() {
                return Err(ConfigError::MissingProvider(fallback.clone()));
            }
        }

        if spec.gateway.mode == GatewayMode::Online
            && !spec.gateway.cloud_providers.iter().any(|name| spec.provider(name).is_some())
        {
            return Err(ConfigError::Invalid(
                "online mode requires at least one configured cloud provider".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_flag(var: &str, value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(
                "Invalid value for {}: '{}'. Expected true/false. Ignoring.",
                var,
                value
            );
            None
        }
    }
}

fn parse_number(var: &str, value: &str) -> Option<u64> {
    match value.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!("Invalid value for {}: '{}'. Expected a number. Ignoring.", var, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_manifest() {
        let manifest = BastionConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.gateway.mode, GatewayMode::Auto);
        assert_eq!(manifest.spec.router.max_attempts, 3);
        assert_eq!(manifest.spec.state.checkpoint_retention, 5);
        assert_eq!(manifest.spec.gateway.health_check_interval_secs, 60);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_minimal_uses_defaults() {
        let yaml = r#"
apiVersion: bastion.dev/v1
kind: BastionConfig
metadata:
  name: test-node
spec:
  organization: acme
  policy:
    name: enterprise
    region: eu-west-1
  gateway:
    mode: secure_first
"#;
        let manifest = BastionConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.organization, "acme");
        assert_eq!(manifest.spec.policy.name, "enterprise");
        assert_eq!(manifest.spec.policy.region.as_deref(), Some("eu-west-1"));
        assert!(manifest.spec.policy.requires_encryption);
        assert_eq!(manifest.spec.gateway.mode, GatewayMode::SecureFirst);
        assert_eq!(manifest.spec.gateway.model_mapping.get("gpt-4").map(String::as_str), Some("llama3.1:70b"));
        assert_eq!(manifest.spec.providers.len(), 2);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = BastionConfigManifest::default();
        manifest.apply_overrides_from(env(&[
            ("BASTION_OFFLINE_MODE", "yes"),
            ("BASTION_ORGANIZATION", "initech"),
            ("BASTION_AUDIT_ENABLED", "off"),
            ("BASTION_POLICY", "compliance"),
            ("BASTION_COMPLIANCE_FRAMEWORK", "HIPAA"),
            ("BASTION_OLLAMA_URL", "http://gpu-box:11434"),
            ("BASTION_MAX_ATTEMPTS", "5"),
            ("BASTION_CHECKPOINT_RETENTION", "not-a-number"),
        ]));

        let spec = &manifest.spec;
        assert_eq!(spec.gateway.mode, GatewayMode::Offline);
        assert_eq!(spec.organization, "initech");
        assert!(!spec.audit.enabled);
        assert_eq!(spec.policy.name, "compliance");
        assert_eq!(spec.policy.framework.as_deref(), Some("HIPAA"));
        assert_eq!(spec.provider("ollama").unwrap().endpoint, "http://gpu-box:11434");
        assert_eq!(spec.router.max_attempts, 5);
        // invalid numbers are ignored
        assert_eq!(spec.state.checkpoint_retention, 5);
    }

    #[test]
    fn test_invalid_flag_is_ignored() {
        let mut manifest = BastionConfigManifest::default();
        manifest.apply_overrides_from(env(&[("BASTION_OFFLINE_MODE", "maybe")]));
        assert_eq!(manifest.spec.gateway.mode, GatewayMode::Auto);
    }

    #[test]
    fn test_validation() {
        let mut manifest = BastionConfigManifest::default();

        manifest.spec.policy.name = "permissive".to_string();
        assert!(matches!(manifest.validate(), Err(ConfigError::UnknownPolicy(_))));
        manifest.spec.policy.name = "default".to_string();

        manifest.spec.state.checkpoint_retention = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.state.checkpoint_retention = 5;

        manifest.spec.router.fallback_provider = Some("missing".to_string());
        assert!(matches!(manifest.validate(), Err(ConfigError::MissingProvider(_))));
        manifest.spec.router.fallback_provider = Some("openrouter".to_string());
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_audit_path_is_organization_scoped() {
        let mut config = BastionConfig::default();
        config.organization = "acme".to_string();
        config.audit.directory = PathBuf::from("/var/log/bastion");
        assert_eq!(
            config.audit_log_path(),
            PathBuf::from("/var/log/bastion/compliance_audit_acme.jsonl")
        );
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("secure-first".parse::<GatewayMode>().unwrap(), GatewayMode::SecureFirst);
        assert!("hybrid".parse::<GatewayMode>().is_err());
    }
}
