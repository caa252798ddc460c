// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Artifact Governance Engine
//!
//! Decides whether an artifact may be durably stored.
//!
//! Every declaration runs three independent checks against the artifacts the
//! project already holds and reports everything found:
//!
//! | Check | Conflict | Severity | Suggested strategy |
//! |-------|----------|----------|--------------------|
//! | version is not `max + 1` for its type | `version_mismatch` | MEDIUM | RETRY |
//! | same type already written by another agent | `parallel_creation` | HIGH | MERGE |
//! | dependency does not exist | `missing_dependency` | HIGH | RETRY |
//! | dependency depends back on the artifact | `circular_dependency` | CRITICAL | ESCALATE |
//!
//! A conflicted artifact is stored with `blocked_by` populated so it can be
//! inspected, a `ConflictDetected` event is published, and the call returns
//! [`GovernanceError::ConflictDetected`]. Blocked artifacts take no part in
//! version numbering or same-type comparisons until they are released.
//!
//! Version assignment and conflict checking for one (project, artifact type)
//! pair run under an exclusive lock, so two concurrent declarations never
//! both claim the same next version. Declarations that carry dependencies
//! additionally serialize per project, so a mutual dependency across two
//! types is always seen as circular by whichever side lands second.

use crate::domain::artifact::{Artifact, ArtifactId};
use crate::domain::conflict::{
    BlockedArtifact, BlockingReport, Conflict, ConflictId, ConflictSeverity, ConflictType, ResolutionStrategy,
};
use crate::domain::events::GovernanceEvent;
use crate::domain::project::ProjectId;
use crate::domain::repository::{ArtifactStore, RepositoryError};
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum GovernanceError {
    /// Recoverable: resolve the conflicts, then release or redeclare.
    #[error("Artifact {artifact_id} blocked by {} conflict(s)\n{report}", conflict_ids.len())]
    ConflictDetected {
        artifact_id: ArtifactId,
        project_id: ProjectId,
        conflict_ids: Vec<ConflictId>,
        report: Box<BlockingReport>,
    },

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(ArtifactId),

    #[error("Conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("Artifact {artifact_id} still has {} unresolved conflict(s)", unresolved.len())]
    StillBlocked {
        artifact_id: ArtifactId,
        unresolved: Vec<ConflictId>,
    },

    /// The artifact's version fell behind while it was blocked; redeclare it.
    #[error("Artifact {artifact_id} is '{artifact_type}' version {version}, expected {expected}")]
    StaleVersion {
        artifact_id: ArtifactId,
        artifact_type: String,
        version: u32,
        expected: u32,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Everything needed to create an artifact except its version.
#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    pub project_id: ProjectId,
    pub artifact_type: String,
    pub created_by: String,
    pub data: serde_json::Value,
    pub depends_on: BTreeSet<ArtifactId>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ArtifactDraft {
    pub fn new(
        project_id: ProjectId,
        artifact_type: impl Into<String>,
        created_by: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            project_id,
            artifact_type: artifact_type.into(),
            created_by: created_by.into(),
            data,
            depends_on: BTreeSet::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = ArtifactId>) -> Self {
        self.depends_on.extend(ids);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    fn into_artifact(self, version: u32) -> Artifact {
        let mut artifact = Artifact::new(self.project_id, self.artifact_type, version, self.created_by, self.data)
            .with_dependencies(self.depends_on);
        artifact.metadata = self.metadata;
        artifact
    }
}

pub struct ArtifactGovernanceEngine {
    store: Arc<dyn ArtifactStore>,
    event_bus: Arc<EventBus>,
    locks: DashMap<(ProjectId, String), Arc<Mutex<()>>>,
    dependency_locks: DashMap<ProjectId, Arc<Mutex<()>>>,
}

impl ArtifactGovernanceEngine {
    pub fn new(store: Arc<dyn ArtifactStore>, event_bus: Arc<EventBus>) -> Self {
        Self {
            store,
            event_bus,
            locks: DashMap::new(),
            dependency_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, project_id: ProjectId, artifact_type: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((project_id, artifact_type.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Always taken after the type lock
    fn dependency_lock_for(&self, project_id: ProjectId) -> Arc<Mutex<()>> {
        self.dependency_locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the locks held for a deleted project.
    pub fn forget_project(&self, project_id: ProjectId) {
        self.locks.retain(|(id, _), _| *id != project_id);
        self.dependency_locks.remove(&project_id);
    }

    pub fn tracked_lock_count(&self) -> usize {
        self.locks.len() + self.dependency_locks.len()
    }

    async fn ensure_project(&self, project_id: ProjectId) -> Result<(), GovernanceError> {
        match self.store.get_project(project_id).await? {
            Some(_) => Ok(()),
            None => Err(GovernanceError::ProjectNotFound(project_id)),
        }
    }

    /// Build an unpersisted artifact numbered after the latest one of its type.
    ///
    /// The number is only a proposal: another declaration may land first.
    /// Use [`Self::declare_new_artifact`] to number and declare atomically.
    pub async fn create_artifact(&self, draft: ArtifactDraft) -> Result<Artifact, GovernanceError> {
        self.ensure_project(draft.project_id).await?;
        let existing = self.store.list_artifacts(draft.project_id).await?;
        let version = next_version(&existing, &draft.artifact_type);
        Ok(draft.into_artifact(version))
    }

    /// Check and store an artifact.
    ///
    /// `persist` controls only the clean path; a conflicted artifact is
    /// always stored in blocked state together with its conflicts.
    pub async fn declare_artifact(&self, artifact: Artifact, persist: bool) -> Result<Artifact, GovernanceError> {
        let lock = self.lock_for(artifact.project_id, &artifact.artifact_type);
        let _guard = lock.lock().await;
        self.declare_locked(artifact, persist).await
    }

    /// Number and declare under one lock.
    pub async fn declare_new_artifact(&self, draft: ArtifactDraft) -> Result<Artifact, GovernanceError> {
        let lock = self.lock_for(draft.project_id, &draft.artifact_type);
        let _guard = lock.lock().await;

        let existing = self.store.list_artifacts(draft.project_id).await?;
        let version = next_version(&existing, &draft.artifact_type);
        self.declare_locked(draft.into_artifact(version), true).await
    }

    async fn declare_locked(&self, mut artifact: Artifact, persist: bool) -> Result<Artifact, GovernanceError> {
        let dependency_lock = (!artifact.depends_on.is_empty()).then(|| self.dependency_lock_for(artifact.project_id));
        let _dependency_guard = match &dependency_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        self.ensure_project(artifact.project_id).await?;
        let existing = self.store.list_artifacts(artifact.project_id).await?;
        let conflicts = detect_conflicts(&artifact, &existing);

        if conflicts.is_empty() {
            artifact.blocked_by.clear();
            if persist {
                self.store.save_artifact(&artifact).await?;
                info!(
                    artifact_id = %artifact.id,
                    project_id = %artifact.project_id,
                    artifact_type = %artifact.artifact_type,
                    version = artifact.version,
                    created_by = %artifact.created_by,
                    "Artifact declared"
                );
                self.event_bus.publish_governance_event(GovernanceEvent::ArtifactDeclared {
                    artifact_id: artifact.id,
                    project_id: artifact.project_id,
                    artifact_type: artifact.artifact_type.clone(),
                    version: artifact.version,
                    declared_at: Utc::now(),
                });
            }
            return Ok(artifact);
        }

        for conflict in &conflicts {
            self.store.save_conflict(conflict).await?;
            metrics::counter!("bastion_conflicts_detected_total", "type" => conflict.conflict_type.as_str())
                .increment(1);
        }
        artifact.blocked_by = conflicts.iter().map(|c| c.id).collect();
        self.store.save_artifact(&artifact).await?;

        warn!(
            artifact_id = %artifact.id,
            project_id = %artifact.project_id,
            artifact_type = %artifact.artifact_type,
            version = artifact.version,
            conflicts = conflicts.len(),
            kinds = ?conflicts.iter().map(|c| c.conflict_type.as_str()).collect::<Vec<_>>(),
            "Artifact blocked by conflicts"
        );

        self.event_bus.publish_governance_event(GovernanceEvent::ConflictDetected {
            artifact_id: artifact.id,
            project_id: artifact.project_id,
            conflicts: conflicts.clone(),
            detected_at: Utc::now(),
        });

        let report = self.get_blocking_report(artifact.project_id).await?;
        Err(GovernanceError::ConflictDetected {
            artifact_id: artifact.id,
            project_id: artifact.project_id,
            conflict_ids: artifact.blocked_by.clone(),
            report: Box::new(report),
        })
    }

    /// Conflicts the artifact would raise if declared now. Nothing is stored.
    pub async fn check_conflicts(&self, artifact: &Artifact) -> Result<Vec<Conflict>, GovernanceError> {
        let existing = self.store.list_artifacts(artifact.project_id).await?;
        Ok(detect_conflicts(artifact, &existing))
    }

    pub async fn get_blocking_report(&self, project_id: ProjectId) -> Result<BlockingReport, GovernanceError> {
        let artifacts = self.store.list_artifacts(project_id).await?;
        let conflicts = self.store.list_conflicts(project_id).await?;
        Ok(build_blocking_report(project_id, &artifacts, &conflicts))
    }

    /// Mark a conflict resolved. The artifact it blocks stays blocked until
    /// [`Self::release_artifact`] is called.
    pub async fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        strategy: ResolutionStrategy,
    ) -> Result<Conflict, GovernanceError> {
        let mut conflict = self
            .store
            .get_conflict(conflict_id)
            .await?
            .ok_or(GovernanceError::ConflictNotFound(conflict_id))?;

        conflict.resolve(strategy);
        self.store.save_conflict(&conflict).await?;

        info!(
            conflict_id = %conflict.id,
            artifact_id = %conflict.artifact_id,
            strategy = %strategy,
            "Conflict resolved"
        );
        self.event_bus.publish_governance_event(GovernanceEvent::ConflictResolved {
            conflict_id: conflict.id,
            project_id: conflict.project_id,
            strategy,
            resolved_at: Utc::now(),
        });

        Ok(conflict)
    }

    /// Move a blocked artifact to persisted once every conflict holding it
    /// is resolved. Releasing an unblocked artifact is a no-op.
    ///
    /// The version is checked again against the current unblocked peers: an
    /// artifact that no longer follows the latest version is refused with
    /// [`GovernanceError::StaleVersion`] rather than persisted as a duplicate.
    pub async fn release_artifact(&self, artifact_id: ArtifactId) -> Result<Artifact, GovernanceError> {
        let artifact = self
            .store
            .get_artifact(artifact_id)
            .await?
            .ok_or(GovernanceError::ArtifactNotFound(artifact_id))?;

        if !artifact.is_blocked() {
            return Ok(artifact);
        }

        let lock = self.lock_for(artifact.project_id, &artifact.artifact_type);
        let _guard = lock.lock().await;

        // Re-read under the lock
        let mut artifact = self
            .store
            .get_artifact(artifact_id)
            .await?
            .ok_or(GovernanceError::ArtifactNotFound(artifact_id))?;

        let mut unresolved = Vec::new();
        for conflict_id in &artifact.blocked_by {
            match self.store.get_conflict(*conflict_id).await? {
                Some(conflict) if conflict.resolved => {}
                _ => unresolved.push(*conflict_id),
            }
        }

        if !unresolved.is_empty() {
            debug!(artifact_id = %artifact_id, unresolved = unresolved.len(), "Release refused");
            return Err(GovernanceError::StillBlocked { artifact_id, unresolved });
        }

        let existing = self.store.list_artifacts(artifact.project_id).await?;
        if check_version(&artifact, &existing).is_some() {
            let expected = next_version(&existing, &artifact.artifact_type);
            warn!(
                artifact_id = %artifact_id,
                version = artifact.version,
                expected,
                "Release refused: version is stale"
            );
            return Err(GovernanceError::StaleVersion {
                artifact_id,
                artifact_type: artifact.artifact_type.clone(),
                version: artifact.version,
                expected,
            });
        }

        artifact.blocked_by.clear();
        self.store.save_artifact(&artifact).await?;

        info!(artifact_id = %artifact.id, version = artifact.version, "Blocked artifact released");
        self.event_bus.publish_governance_event(GovernanceEvent::ArtifactReleased {
            artifact_id: artifact.id,
            project_id: artifact.project_id,
            released_at: Utc::now(),
        });

        Ok(artifact)
    }
}

/// `max(version) + 1` over the unblocked artifacts of the type, or 1.
pub fn next_version(existing: &[Artifact], artifact_type: &str) -> u32 {
    existing
        .iter()
        .filter(|a| a.artifact_type == artifact_type && !a.is_blocked())
        .map(|a| a.version)
        .max()
        .map_or(1, |max| max + 1)
}

/// Run every check; no check short-circuits another.
pub fn detect_conflicts(artifact: &Artifact, existing: &[Artifact]) -> Vec<Conflict> {
    let mut conflicts: Vec<Conflict> = check_version(artifact, existing).into_iter().collect();
    conflicts.extend(check_parallel_creation(artifact, existing));
    conflicts.extend(check_dependencies(artifact, existing));
    conflicts
}

fn same_type_peers<'a>(artifact: &'a Artifact, existing: &'a [Artifact]) -> impl Iterator<Item = &'a Artifact> {
    existing
        .iter()
        .filter(move |a| a.id != artifact.id && !a.is_blocked() && a.artifact_type == artifact.artifact_type)
}

fn check_version(artifact: &Artifact, existing: &[Artifact]) -> Option<Conflict> {
    let latest = same_type_peers(artifact, existing).max_by_key(|a| a.version)?;
    let expected = latest.version + 1;
    if artifact.version == expected {
        return None;
    }

    Some(
        Conflict::new(
            artifact,
            ConflictType::VersionMismatch,
            ConflictSeverity::Medium,
            ResolutionStrategy::Retry,
            format!(
                "'{}' version {} does not follow latest version {} (expected {})",
                artifact.artifact_type, artifact.version, latest.version, expected
            ),
        )
        .against(latest.id),
    )
}

// Flags any earlier same-type artifact by another agent, whatever its version
fn check_parallel_creation(artifact: &Artifact, existing: &[Artifact]) -> Option<Conflict> {
    let others: Vec<&Artifact> = same_type_peers(artifact, existing)
        .filter(|a| a.created_by != artifact.created_by)
        .collect();
    let latest = others.iter().max_by_key(|a| a.version)?;

    let mut authors: Vec<&str> = others.iter().map(|a| a.created_by.as_str()).collect();
    authors.sort_unstable();
    authors.dedup();

    Some(
        Conflict::new(
            artifact,
            ConflictType::ParallelCreation,
            ConflictSeverity::High,
            ResolutionStrategy::Merge,
            format!(
                "'{}' by {} overlaps work already produced by {}",
                artifact.artifact_type,
                artifact.created_by,
                authors.join(", ")
            ),
        )
        .against(latest.id),
    )
}

fn check_dependencies(artifact: &Artifact, existing: &[Artifact]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for dependency_id in &artifact.depends_on {
        if *dependency_id == artifact.id {
            conflicts.push(Conflict::new(
                artifact,
                ConflictType::CircularDependency,
                ConflictSeverity::Critical,
                ResolutionStrategy::Escalate,
                "artifact depends on itself",
            ));
            continue;
        }

        match existing.iter().find(|a| a.id == *dependency_id) {
            None => conflicts.push(Conflict::new(
                artifact,
                ConflictType::MissingDependency,
                ConflictSeverity::High,
                ResolutionStrategy::Retry,
                format!("dependency {} does not exist", dependency_id),
            )),
            Some(dependency) if dependency.depends_on.contains(&artifact.id) => conflicts.push(
                Conflict::new(
                    artifact,
                    ConflictType::CircularDependency,
                    ConflictSeverity::Critical,
                    ResolutionStrategy::Escalate,
                    format!(
                        "dependency {} ('{}' v{}) depends back on this artifact",
                        dependency.id, dependency.artifact_type, dependency.version
                    ),
                )
                .against(dependency.id),
            ),
            Some(_) => {}
        }
    }

    conflicts
}

pub fn build_blocking_report(project_id: ProjectId, artifacts: &[Artifact], conflicts: &[Conflict]) -> BlockingReport {
    let by_id: BTreeMap<ConflictId, &Conflict> = conflicts.iter().map(|c| (c.id, c)).collect();

    let blocked = artifacts
        .iter()
        .filter(|a| a.is_blocked())
        .map(|a| BlockedArtifact {
            artifact_id: a.id,
            artifact_type: a.artifact_type.clone(),
            version: a.version,
            created_by: a.created_by.clone(),
            conflicts: a
                .blocked_by
                .iter()
                .filter_map(|id| by_id.get(id).map(|c| (*c).clone()))
                .collect(),
        })
        .collect();

    BlockingReport {
        project_id,
        total_artifacts: artifacts.len(),
        blocked,
        unresolved_conflicts: conflicts.iter().filter(|c| !c.resolved).count(),
        generated_at: Utc::now(),
    }
}
