// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Point-in-time snapshots of a project's governed state.

use crate::domain::artifact::Artifact;
use crate::domain::conflict::Conflict;
use crate::domain::project::{Project, ProjectId, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of checkpoints kept per project unless configured otherwise.
pub const DEFAULT_CHECKPOINT_RETENTION: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId(pub Uuid);

impl CheckpointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialized project state. Contains everything needed to rebuild the
/// project on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    pub project: Project,
    pub artifacts: Vec<Artifact>,
    pub tasks: Vec<Task>,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub project_id: ProjectId,
    pub label: String,
    /// `CheckpointSnapshot` as a single JSON document
    pub snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn capture(label: impl Into<String>, snapshot: &CheckpointSnapshot) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: CheckpointId::new(),
            project_id: snapshot.project.id,
            label: label.into(),
            snapshot: serde_json::to_value(snapshot)?,
            created_at: Utc::now(),
        })
    }

    pub fn decode(&self) -> Result<CheckpointSnapshot, serde_json::Error> {
        serde_json::from_value(self.snapshot.clone())
    }
}
