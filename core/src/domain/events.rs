// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::artifact::ArtifactId;
use crate::domain::checkpoint::CheckpointId;
use crate::domain::conflict::{Conflict, ConflictId, ResolutionStrategy};
use crate::domain::project::ProjectId;
use crate::domain::sensitivity::TaskSensitivity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GovernanceEvent {
    /// An artifact was blocked on declaration. Consumed by notification layers.
    ConflictDetected {
        artifact_id: ArtifactId,
        project_id: ProjectId,
        conflicts: Vec<Conflict>,
        detected_at: DateTime<Utc>,
    },
    ArtifactDeclared {
        artifact_id: ArtifactId,
        project_id: ProjectId,
        artifact_type: String,
        version: u32,
        declared_at: DateTime<Utc>,
    },
    ArtifactReleased {
        artifact_id: ArtifactId,
        project_id: ProjectId,
        released_at: DateTime<Utc>,
    },
    ConflictResolved {
        conflict_id: ConflictId,
        project_id: ProjectId,
        strategy: ResolutionStrategy,
        resolved_at: DateTime<Utc>,
    },
    CheckpointCreated {
        checkpoint_id: CheckpointId,
        project_id: ProjectId,
        label: String,
        pruned: usize,
        created_at: DateTime<Utc>,
    },
    CheckpointRestored {
        checkpoint_id: CheckpointId,
        project_id: ProjectId,
        restored_at: DateTime<Utc>,
    },
}

impl GovernanceEvent {
    pub fn project_id(&self) -> ProjectId {
        match self {
            GovernanceEvent::ConflictDetected { project_id, .. } => *project_id,
            GovernanceEvent::ArtifactDeclared { project_id, .. } => *project_id,
            GovernanceEvent::ArtifactReleased { project_id, .. } => *project_id,
            GovernanceEvent::ConflictResolved { project_id, .. } => *project_id,
            GovernanceEvent::CheckpointCreated { project_id, .. } => *project_id,
            GovernanceEvent::CheckpointRestored { project_id, .. } => *project_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RoutingEvent {
    ProviderBlocked {
        agent_name: String,
        provider: String,
        sensitivity: TaskSensitivity,
        policy_name: String,
        blocked_at: DateTime<Utc>,
    },
    FallbackUsed {
        agent_name: String,
        primary_provider: String,
        fallback_provider: String,
        used_at: DateTime<Utc>,
    },
    RoutingFailed {
        agent_name: String,
        attempts: u32,
        error: String,
        failed_at: DateTime<Utc>,
    },
}
