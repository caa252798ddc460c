// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Artifact entity - a versioned unit of agent-produced work.
//!
//! Lifecycle: `proposed -> {blocked, persisted}`. An artifact is proposed by
//! `ArtifactGovernanceEngine::create_artifact`, conflict-checked by
//! `declare_artifact`, and is either persisted (empty `blocked_by`) or
//! stored blocked with the ids of the conflicts that block it. A blocked
//! artifact only becomes persisted through `release_artifact` once every
//! conflict in `blocked_by` has been resolved.

use crate::domain::conflict::ConflictId;
use crate::domain::project::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Metadata key naming the generation provider that produced an artifact.
pub const PROVIDER_METADATA_KEY: &str = "provider";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId(pub Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Persisted,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub project_id: ProjectId,
    /// Free-form type tag ("plan", "code", "specialist", ...). Versions are
    /// numbered independently per (project, artifact_type).
    pub artifact_type: String,
    pub version: u32,
    pub created_by: String,
    #[serde(default)]
    pub depends_on: BTreeSet<ArtifactId>,
    pub data: serde_json::Value,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub blocked_by: Vec<ConflictId>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        project_id: ProjectId,
        artifact_type: impl Into<String>,
        version: u32,
        created_by: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: ArtifactId::new(),
            project_id,
            artifact_type: artifact_type.into(),
            version,
            created_by: created_by.into(),
            depends_on: BTreeSet::new(),
            data,
            metadata: BTreeMap::new(),
            blocked_by: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_dependencies(mut self, depends_on: impl IntoIterator<Item = ArtifactId>) -> Self {
        self.depends_on = depends_on.into_iter().collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_blocked(&self) -> bool {
        !self.blocked_by.is_empty()
    }

    pub fn state(&self) -> ArtifactState {
        if self.is_blocked() {
            ArtifactState::Blocked
        } else {
            ArtifactState::Persisted
        }
    }

    /// Generation provider named in metadata, if any.
    pub fn provider_hint(&self) -> Option<&str> {
        self.metadata.get(PROVIDER_METADATA_KEY).and_then(|v| v.as_str())
    }

    /// Reads a boolean flag from metadata; absent or non-boolean values are false.
    pub fn metadata_flag(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_artifact_is_unblocked() {
        let artifact = Artifact::new(ProjectId::new(), "plan", 1, "planner", json!({"steps": []}));
        assert!(!artifact.is_blocked());
        assert_eq!(artifact.state(), ArtifactState::Persisted);
        assert!(artifact.depends_on.is_empty());
    }

    #[test]
    fn test_provider_hint_and_flags() {
        let artifact = Artifact::new(ProjectId::new(), "code", 2, "coder", json!("fn main() {}"))
            .with_metadata(PROVIDER_METADATA_KEY, json!("openrouter"))
            .with_metadata("has_private_data", json!(true))
            .with_metadata("task_type", json!(42));

        assert_eq!(artifact.provider_hint(), Some("openrouter"));
        assert!(artifact.metadata_flag("has_private_data"));
        assert!(!artifact.metadata_flag("has_sensitive_data"));
        assert_eq!(artifact.metadata_str("task_type"), None);
    }

    #[test]
    fn test_blocked_state() {
        let mut artifact = Artifact::new(ProjectId::new(), "plan", 1, "planner", json!({}));
        artifact.blocked_by.push(ConflictId::new());
        assert_eq!(artifact.state(), ArtifactState::Blocked);
    }
}
