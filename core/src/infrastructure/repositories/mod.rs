// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the [`ArtifactStore`] contract defined
//! in the domain layer.
//!
//! # Available Implementations
//!
//! - **InMemoryArtifactStore** - lock-protected maps, one per entity kind.
//!   Each write replaces a whole record, so readers never observe a partial
//!   artifact, conflict or checkpoint.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use bastion_core::domain::repository::ArtifactStore;
//! use bastion_core::infrastructure::repositories::InMemoryArtifactStore;
//!
//! let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
//! ```

use crate::domain::artifact::{Artifact, ArtifactId};
use crate::domain::checkpoint::{Checkpoint, CheckpointId};
use crate::domain::conflict::{Conflict, ConflictId};
use crate::domain::project::{Project, ProjectId, Task, TaskId};
use crate::domain::repository::{ArtifactStore, RepositoryError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct StoreState {
    projects: HashMap<ProjectId, Project>,
    artifacts: HashMap<ArtifactId, Artifact>,
    conflicts: HashMap<ConflictId, Conflict>,
    tasks: HashMap<TaskId, Task>,
    checkpoints: HashMap<CheckpointId, Checkpoint>,
    // Insertion counter; keeps listings stable when timestamps collide
    sequence: u64,
    order: HashMap<uuid::Uuid, u64>,
}

impl StoreState {
    fn touch(&mut self, id: uuid::Uuid) -> u64 {
        if let Some(seq) = self.order.get(&id) {
            return *seq;
        }
        self.sequence += 1;
        self.order.insert(id, self.sequence);
        self.sequence
    }

    fn seq(&self, id: uuid::Uuid) -> u64 {
        self.order.get(&id).copied().unwrap_or(u64::MAX)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryArtifactStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save_project(&self, project: &Project) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        state.touch(project.id.0);
        state.projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, RepositoryError> {
        Ok(self.state.read().projects.get(&id).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, RepositoryError> {
        let state = self.state.read();
        let mut projects: Vec<Project> = state.projects.values().cloned().collect();
        projects.sort_by_key(|p| (p.created_at, state.seq(p.id.0)));
        Ok(projects)
    }

    async fn delete_project(&self, id: ProjectId) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if state.projects.remove(&id).is_none() {
            return Err(RepositoryError::NotFound(format!("project {}", id)));
        }
        state.artifacts.retain(|_, a| a.project_id != id);
        state.conflicts.retain(|_, c| c.project_id != id);
        state.tasks.retain(|_, t| t.project_id != id);
        state.checkpoints.retain(|_, c| c.project_id != id);
        Ok(())
    }

    async fn save_artifact(&self, artifact: &Artifact) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        state.touch(artifact.id.0);
        state.artifacts.insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn get_artifact(&self, id: ArtifactId) -> Result<Option<Artifact>, RepositoryError> {
        Ok(self.state.read().artifacts.get(&id).cloned())
    }

    async fn list_artifacts(&self, project_id: ProjectId) -> Result<Vec<Artifact>, RepositoryError> {
        let state = self.state.read();
        let mut artifacts: Vec<Artifact> = state
            .artifacts
            .values()
            .filter(|a| a.project_id == project_id)
            .cloned()
            .collect();
        artifacts.sort_by_key(|a| (a.created_at, state.seq(a.id.0)));
        Ok(artifacts)
    }

    async fn save_conflict(&self, conflict: &Conflict) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        state.touch(conflict.id.0);
        state.conflicts.insert(conflict.id, conflict.clone());
        Ok(())
    }

    async fn get_conflict(&self, id: ConflictId) -> Result<Option<Conflict>, RepositoryError> {
        Ok(self.state.read().conflicts.get(&id).cloned())
    }

    async fn list_conflicts(&self, project_id: ProjectId) -> Result<Vec<Conflict>, RepositoryError> {
        let state = self.state.read();
        let mut conflicts: Vec<Conflict> = state
            .conflicts
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        conflicts.sort_by_key(|c| (c.detected_at, state.seq(c.id.0)));
        Ok(conflicts)
    }

    async fn save_task(&self, task: &Task) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        state.touch(task.id.0);
        state.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, RepositoryError> {
        Ok(self.state.read().tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, project_id: ProjectId) -> Result<Vec<Task>, RepositoryError> {
        let state = self.state.read();
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.created_at, state.seq(t.id.0)));
        Ok(tasks)
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        state.touch(checkpoint.id.0);
        state.checkpoints.insert(checkpoint.id, checkpoint.clone());
        Ok(())
    }

    async fn get_checkpoint(&self, id: CheckpointId) -> Result<Option<Checkpoint>, RepositoryError> {
        Ok(self.state.read().checkpoints.get(&id).cloned())
    }

    async fn list_checkpoints(&self, project_id: ProjectId) -> Result<Vec<Checkpoint>, RepositoryError> {
        let state = self.state.read();
        let mut checkpoints: Vec<Checkpoint> = state
            .checkpoints
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        checkpoints.sort_by_key(|c| (c.created_at, state.seq(c.id.0)));
        Ok(checkpoints)
    }

    async fn delete_checkpoint(&self, id: CheckpointId) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        state.order.remove(&id.0);
        state
            .checkpoints
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("checkpoint {}", id)))
    }

    async fn replace_project_state(
        &self,
        project: &Project,
        artifacts: &[Artifact],
        tasks: &[Task],
        conflicts: &[Conflict],
    ) -> Result<(), RepositoryError> {
        let project_id = project.id;
        if let Some(stray) = artifacts.iter().find(|a| a.project_id != project_id) {
            return Err(RepositoryError::Storage(format!(
                "artifact {} belongs to project {}, not {}",
                stray.id, stray.project_id, project_id
            )));
        }

        let mut state = self.state.write();
        state.projects.insert(project_id, project.clone());
        state.artifacts.retain(|_, a| a.project_id != project_id);
        state.tasks.retain(|_, t| t.project_id != project_id);
        state.conflicts.retain(|_, c| c.project_id != project_id);

        for artifact in artifacts {
            state.touch(artifact.id.0);
            state.artifacts.insert(artifact.id, artifact.clone());
        }
        for task in tasks {
            state.touch(task.id.0);
            state.tasks.insert(task.id, task.clone());
        }
        for conflict in conflicts {
            state.touch(conflict.id.0);
            state.conflicts.insert(conflict.id, conflict.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkpoint::CheckpointSnapshot;
    use serde_json::json;

    #[tokio::test]
    async fn test_artifacts_listed_in_insertion_order() {
        let store = InMemoryArtifactStore::new();
        let project = Project::new("demo");
        store.save_project(&project).await.unwrap();

        let first = Artifact::new(project.id, "plan", 1, "planner", json!({}));
        let second = Artifact::new(project.id, "plan", 2, "planner", json!({}));
        store.save_artifact(&first).await.unwrap();
        store.save_artifact(&second).await.unwrap();

        let listed = store.list_artifacts(project.id).await.unwrap();
        assert_eq!(listed.iter().map(|a| a.version).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_delete_project_cascades() {
        let store = InMemoryArtifactStore::new();
        let project = Project::new("doomed");
        let other = Project::new("survivor");
        store.save_project(&project).await.unwrap();
        store.save_project(&other).await.unwrap();

        store
            .save_artifact(&Artifact::new(project.id, "code", 1, "coder", json!({})))
            .await
            .unwrap();
        store
            .save_artifact(&Artifact::new(other.id, "code", 1, "coder", json!({})))
            .await
            .unwrap();
        store.save_task(&Task::new(project.id, "write tests", None)).await.unwrap();
        let snapshot = CheckpointSnapshot {
            project: project.clone(),
            artifacts: vec![],
            tasks: vec![],
            conflicts: vec![],
        };
        let checkpoint = Checkpoint::capture("before", &snapshot).unwrap();
        store.save_checkpoint(&checkpoint).await.unwrap();

        store.delete_project(project.id).await.unwrap();

        assert!(store.get_project(project.id).await.unwrap().is_none());
        assert!(store.list_artifacts(project.id).await.unwrap().is_empty());
        assert!(store.list_tasks(project.id).await.unwrap().is_empty());
        assert!(store.list_checkpoints(project.id).await.unwrap().is_empty());
        assert_eq!(store.list_artifacts(other.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_checkpoint_is_not_found() {
        let store = InMemoryArtifactStore::new();
        let result = store.delete_checkpoint(CheckpointId::new()).await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }
}
