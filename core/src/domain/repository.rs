// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Artifact Store Interface
//!
//! Persistence contract for everything a project owns: the project record,
//! its artifacts, tasks, conflicts and checkpoints. The contract is defined
//! here in the domain layer and implemented in
//! `crate::infrastructure::repositories`.
//!
//! All queries are keyed by project. Writes are upserts keyed by entity id.

use crate::domain::artifact::{Artifact, ArtifactId};
use crate::domain::checkpoint::{Checkpoint, CheckpointId};
use crate::domain::conflict::{Conflict, ConflictId};
use crate::domain::project::{Project, ProjectId, Task, TaskId};
use async_trait::async_trait;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save_project(&self, project: &Project) -> Result<(), RepositoryError>;

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, RepositoryError>;

    async fn list_projects(&self) -> Result<Vec<Project>, RepositoryError>;

    /// Delete the project and everything it owns
    async fn delete_project(&self, id: ProjectId) -> Result<(), RepositoryError>;

    /// Save artifact (create or update)
    async fn save_artifact(&self, artifact: &Artifact) -> Result<(), RepositoryError>;

    async fn get_artifact(&self, id: ArtifactId) -> Result<Option<Artifact>, RepositoryError>;

    /// Artifacts of a project, oldest first
    async fn list_artifacts(&self, project_id: ProjectId) -> Result<Vec<Artifact>, RepositoryError>;

    async fn save_conflict(&self, conflict: &Conflict) -> Result<(), RepositoryError>;

    async fn get_conflict(&self, id: ConflictId) -> Result<Option<Conflict>, RepositoryError>;

    async fn list_conflicts(&self, project_id: ProjectId) -> Result<Vec<Conflict>, RepositoryError>;

    async fn save_task(&self, task: &Task) -> Result<(), RepositoryError>;

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, RepositoryError>;

    async fn list_tasks(&self, project_id: ProjectId) -> Result<Vec<Task>, RepositoryError>;

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), RepositoryError>;

    async fn get_checkpoint(&self, id: CheckpointId) -> Result<Option<Checkpoint>, RepositoryError>;

    /// Checkpoints of a project, oldest first
    async fn list_checkpoints(&self, project_id: ProjectId) -> Result<Vec<Checkpoint>, RepositoryError>;

    async fn delete_checkpoint(&self, id: CheckpointId) -> Result<(), RepositoryError>;

    /// Replace the artifacts, tasks and conflicts of a project in one step.
    /// Used by checkpoint restore.
    async fn replace_project_state(
        &self,
        project: &Project,
        artifacts: &[Artifact],
        tasks: &[Task],
        conflicts: &[Conflict],
    ) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
