// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # State Manager
//!
//! Integration point for project state. Every artifact write goes through the
//! governance engine, and an artifact whose metadata names a generation
//! provider is checked against the routing policy before it is declared.
//!
//! Also owns projects, tasks and checkpoints. Checkpoints are full snapshots
//! of a project; after each new one the oldest beyond the retention count are
//! deleted.

use crate::application::governance::{ArtifactDraft, ArtifactGovernanceEngine, GovernanceError};
use crate::application::secure_routing::{classify_task, SecureRoutingGateway};
use crate::domain::artifact::{Artifact, PROVIDER_METADATA_KEY};
use crate::domain::checkpoint::{Checkpoint, CheckpointId, CheckpointSnapshot};
use crate::domain::events::GovernanceEvent;
use crate::domain::project::{Project, ProjectId, Task, TaskId, TaskStatus};
use crate::domain::repository::{ArtifactStore, RepositoryError};
use crate::domain::routing_policy::PolicyViolation;
use crate::domain::sensitivity::TaskSensitivity;
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Explicit sensitivity level ("public", "internal", ...)
pub const SENSITIVITY_METADATA_KEY: &str = "sensitivity";
pub const PRIVATE_DATA_METADATA_KEY: &str = "has_private_data";
pub const SENSITIVE_DATA_METADATA_KEY: &str = "has_sensitive_data";
pub const SECURITY_TASK_METADATA_KEY: &str = "is_security_task";

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Governance(#[from] GovernanceError),

    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(CheckpointId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Checkpoint snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub struct StateManager {
    store: Arc<dyn ArtifactStore>,
    governance: Arc<ArtifactGovernanceEngine>,
    secure: Arc<SecureRoutingGateway>,
    event_bus: Arc<EventBus>,
    checkpoint_retention: usize,
}

impl StateManager {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        governance: Arc<ArtifactGovernanceEngine>,
        secure: Arc<SecureRoutingGateway>,
        event_bus: Arc<EventBus>,
        checkpoint_retention: usize,
    ) -> Self {
        Self {
            store,
            governance,
            secure,
            event_bus,
            checkpoint_retention: checkpoint_retention.max(1),
        }
    }

    pub fn governance(&self) -> &Arc<ArtifactGovernanceEngine> {
        &self.governance
    }

    pub fn checkpoint_retention(&self) -> usize {
        self.checkpoint_retention
    }

    // ========================================================================
    // Projects
    // ========================================================================

    pub async fn create_project(&self, name: impl Into<String>) -> Result<Project, StateError> {
        let project = Project::new(name);
        self.store.save_project(&project).await?;
        info!(project_id = %project.id, name = %project.name, "Project created");
        Ok(project)
    }

    pub async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StateError> {
        Ok(self.store.get_project(id).await?)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, StateError> {
        Ok(self.store.list_projects().await?)
    }

    /// Removes the project with its artifacts, conflicts, tasks and checkpoints.
    pub async fn delete_project(&self, id: ProjectId) -> Result<(), StateError> {
        self.store.delete_project(id).await?;
        self.governance.forget_project(id);
        info!(project_id = %id, "Project deleted");
        Ok(())
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub async fn add_task(
        &self,
        project_id: ProjectId,
        description: impl Into<String>,
        assigned_to: Option<String>,
    ) -> Result<Task, StateError> {
        self.require_project(project_id).await?;
        let task = Task::new(project_id, description, assigned_to);
        self.store.save_task(&task).await?;
        debug!(task_id = %task.id, project_id = %project_id, "Task added");
        Ok(task)
    }

    pub async fn update_task_status(&self, task_id: TaskId, status: TaskStatus) -> Result<Task, StateError> {
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or(StateError::TaskNotFound(task_id))?;
        task.transition(status);
        self.store.save_task(&task).await?;
        debug!(task_id = %task_id, status = ?status, "Task status updated");
        Ok(task)
    }

    pub async fn list_tasks(&self, project_id: ProjectId) -> Result<Vec<Task>, StateError> {
        Ok(self.store.list_tasks(project_id).await?)
    }

    // ========================================================================
    // Artifacts
    // ========================================================================

    /// Number, check and store an artifact.
    ///
    /// When the draft names a provider in its metadata, that provider must be
    /// permitted for the draft's sensitivity. Sensitivity comes from the
    /// `sensitivity` metadata key if present, otherwise from the creating
    /// agent, the artifact type and the data flags in metadata.
    pub async fn create_artifact(&self, draft: ArtifactDraft) -> Result<Artifact, StateError> {
        if let Some(provider) = draft.metadata.get(PROVIDER_METADATA_KEY).and_then(|v| v.as_str()) {
            let sensitivity = draft_sensitivity(&draft);
            self.secure
                .enforce_provider(provider, sensitivity, &draft.created_by, &draft.artifact_type)?;
        }

        Ok(self.governance.declare_new_artifact(draft).await?)
    }

    pub async fn list_artifacts(&self, project_id: ProjectId) -> Result<Vec<Artifact>, StateError> {
        Ok(self.store.list_artifacts(project_id).await?)
    }

    // ========================================================================
    // Checkpoints
    // ========================================================================

    pub async fn create_checkpoint(
        &self,
        project_id: ProjectId,
        label: impl Into<String>,
    ) -> Result<Checkpoint, StateError> {
        let project = self.require_project(project_id).await?;
        let snapshot = CheckpointSnapshot {
            project,
            artifacts: self.store.list_artifacts(project_id).await?,
            tasks: self.store.list_tasks(project_id).await?,
            conflicts: self.store.list_conflicts(project_id).await?,
        };

        let checkpoint = Checkpoint::capture(label, &snapshot)?;
        self.store.save_checkpoint(&checkpoint).await?;
        let pruned = self.prune_checkpoints(project_id).await?;

        info!(
            checkpoint_id = %checkpoint.id,
            project_id = %project_id,
            label = %checkpoint.label,
            artifacts = snapshot.artifacts.len(),
            pruned,
            "Checkpoint created"
        );
        self.event_bus.publish_governance_event(GovernanceEvent::CheckpointCreated {
            checkpoint_id: checkpoint.id,
            project_id,
            label: checkpoint.label.clone(),
            pruned,
            created_at: checkpoint.created_at,
        });

        Ok(checkpoint)
    }

    /// Newest first.
    pub async fn list_checkpoints(&self, project_id: ProjectId) -> Result<Vec<Checkpoint>, StateError> {
        let mut checkpoints = self.store.list_checkpoints(project_id).await?;
        checkpoints.reverse();
        Ok(checkpoints)
    }

    /// Replace the project's artifacts, tasks and conflicts with the snapshot.
    pub async fn restore_checkpoint(&self, checkpoint_id: CheckpointId) -> Result<CheckpointSnapshot, StateError> {
        let checkpoint = self
            .store
            .get_checkpoint(checkpoint_id)
            .await?
            .ok_or(StateError::CheckpointNotFound(checkpoint_id))?;

        let snapshot = checkpoint.decode()?;
        self.store
            .replace_project_state(&snapshot.project, &snapshot.artifacts, &snapshot.tasks, &snapshot.conflicts)
            .await?;

        info!(
            checkpoint_id = %checkpoint_id,
            project_id = %snapshot.project.id,
            artifacts = snapshot.artifacts.len(),
            tasks = snapshot.tasks.len(),
            "Checkpoint restored"
        );
        self.event_bus.publish_governance_event(GovernanceEvent::CheckpointRestored {
            checkpoint_id,
            project_id: snapshot.project.id,
            restored_at: Utc::now(),
        });

        Ok(snapshot)
    }

    async fn prune_checkpoints(&self, project_id: ProjectId) -> Result<usize, StateError> {
        // Oldest first
        let checkpoints = self.store.list_checkpoints(project_id).await?;
        let excess = checkpoints.len().saturating_sub(self.checkpoint_retention);

        for checkpoint in checkpoints.iter().take(excess) {
            match self.store.delete_checkpoint(checkpoint.id).await {
                Ok(()) => debug!(checkpoint_id = %checkpoint.id, "Checkpoint pruned"),
                // Already gone, e.g. pruned by a concurrent call
                Err(RepositoryError::NotFound(_)) => {
                    warn!(checkpoint_id = %checkpoint.id, "Checkpoint vanished during pruning")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(excess)
    }

    async fn require_project(&self, project_id: ProjectId) -> Result<Project, StateError> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or(StateError::Governance(GovernanceError::ProjectNotFound(project_id)))
    }
}

/// Sensitivity of the data an artifact draft carries.
pub fn draft_sensitivity(draft: &ArtifactDraft) -> TaskSensitivity {
    let explicit = draft
        .metadata
        .get(SENSITIVITY_METADATA_KEY)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<TaskSensitivity>().ok());
    if let Some(sensitivity) = explicit {
        return sensitivity;
    }

    let flag = |key: &str| draft.metadata.get(key).and_then(|v| v.as_bool()).unwrap_or(false);
    classify_task(
        &draft.created_by,
        &draft.artifact_type,
        flag(PRIVATE_DATA_METADATA_KEY),
        flag(SENSITIVE_DATA_METADATA_KEY),
        flag(SECURITY_TASK_METADATA_KEY),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::routing_policy::DefaultPolicy;
    use crate::infrastructure::audit::ComplianceAuditor;
    use crate::infrastructure::repositories::InMemoryArtifactStore;
    use serde_json::json;

    fn manager(retention: usize) -> (StateManager, Arc<ComplianceAuditor>) {
        let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
        let bus = Arc::new(EventBus::with_default_capacity());
        let auditor = Arc::new(ComplianceAuditor::in_memory("acme"));
        let secure = Arc::new(SecureRoutingGateway::new(
            Arc::new(DefaultPolicy::default()),
            auditor.clone(),
            "ollama",
            vec!["openrouter".to_string()],
        ));
        let governance = Arc::new(ArtifactGovernanceEngine::new(store.clone(), bus.clone()));
        (StateManager::new(store, governance, secure, bus, retention), auditor)
    }

    #[test]
    fn test_draft_sensitivity() {
        let project = ProjectId::new();
        let draft = ArtifactDraft::new(project, "code", "coder", json!({}));
        assert_eq!(draft_sensitivity(&draft), TaskSensitivity::Public);

        let draft = draft.metadata(PRIVATE_DATA_METADATA_KEY, json!(true));
        assert_eq!(draft_sensitivity(&draft), TaskSensitivity::Sensitive);

        let draft = draft.metadata(SENSITIVITY_METADATA_KEY, json!("internal"));
        assert_eq!(draft_sensitivity(&draft), TaskSensitivity::Internal);

        let draft = ArtifactDraft::new(project, "report", "security_scanner", json!({}));
        assert_eq!(draft_sensitivity(&draft), TaskSensitivity::Critical);
    }

    #[tokio::test]
    async fn test_provider_hint_is_enforced() {
        let (manager, auditor) = manager(5);
        let project = manager.create_project("demo").await.unwrap();

        let draft = ArtifactDraft::new(project.id, "code", "coder", json!({"src": "..."}))
            .metadata(PROVIDER_METADATA_KEY, json!("openrouter"))
            .metadata(SENSITIVE_DATA_METADATA_KEY, json!(true));
        let result = manager.create_artifact(draft).await;

        assert!(matches!(result, Err(StateError::Policy(_))));
        assert!(manager.list_artifacts(project.id).await.unwrap().is_empty());
        assert_eq!(auditor.entries().iter().filter(|e| e.is_blocked()).count(), 1);

        let draft = ArtifactDraft::new(project.id, "code", "coder", json!({"src": "..."}))
            .metadata(PROVIDER_METADATA_KEY, json!("ollama"))
            .metadata(SENSITIVE_DATA_METADATA_KEY, json!(true));
        let artifact = manager.create_artifact(draft).await.unwrap();
        assert_eq!(artifact.version, 1);
    }

    #[tokio::test]
    async fn test_tasks() {
        let (manager, _) = manager(5);
        let project = manager.create_project("demo").await.unwrap();
        let task = manager
            .add_task(project.id, "write parser", Some("coder".to_string()))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        let task = manager.update_task_status(task.id, TaskStatus::InProgress).await.unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(manager.list_tasks(project.id).await.unwrap(), vec![task]);

        let missing = manager.update_task_status(TaskId::new(), TaskStatus::Completed).await;
        assert!(matches!(missing, Err(StateError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_task_requires_project() {
        let (manager, _) = manager(5);
        let result = manager.add_task(ProjectId::new(), "orphan", None).await;
        assert!(matches!(
            result,
            Err(StateError::Governance(GovernanceError::ProjectNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_restore_checkpoint_rolls_back_artifacts() {
        let (manager, _) = manager(5);
        let project = manager.create_project("demo").await.unwrap();
        manager
            .create_artifact(ArtifactDraft::new(project.id, "plan", "planner", json!({"v": 1})))
            .await
            .unwrap();
        let checkpoint = manager.create_checkpoint(project.id, "after plan v1").await.unwrap();

        manager
            .create_artifact(ArtifactDraft::new(project.id, "plan", "planner", json!({"v": 2})))
            .await
            .unwrap();
        assert_eq!(manager.list_artifacts(project.id).await.unwrap().len(), 2);

        let snapshot = manager.restore_checkpoint(checkpoint.id).await.unwrap();
        assert_eq!(snapshot.artifacts.len(), 1);
        let artifacts = manager.list_artifacts(project.id).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].version, 1);

        let missing = manager.restore_checkpoint(CheckpointId::new()).await;
        assert!(matches!(missing, Err(StateError::CheckpointNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_project_cascades() {
        let (manager, _) = manager(5);
        let project = manager.create_project("demo").await.unwrap();
        manager.add_task(project.id, "t", None).await.unwrap();
        manager.create_checkpoint(project.id, "c").await.unwrap();
        manager
            .create_artifact(ArtifactDraft::new(project.id, "plan", "planner", json!({})))
            .await
            .unwrap();
        assert_eq!(manager.governance().tracked_lock_count(), 1);

        manager.delete_project(project.id).await.unwrap();
        assert_eq!(manager.governance().tracked_lock_count(), 0);
        assert!(manager.get_project(project.id).await.unwrap().is_none());
        assert!(manager.list_tasks(project.id).await.unwrap().is_empty());
        assert!(manager.list_checkpoints(project.id).await.unwrap().is_empty());
    }
}
