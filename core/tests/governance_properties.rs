// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end properties of artifact governance and checkpoint retention.
//!
//! These tests drive the public services against the in-memory store:
//! - versions are assigned 1..n per (project, type)
//! - a stale version is blocked, never stored unblocked
//! - mutual dependencies are a CRITICAL conflict
//! - only the newest checkpoints survive pruning

use bastion_core::application::governance::{ArtifactDraft, ArtifactGovernanceEngine, GovernanceError};
use bastion_core::application::secure_routing::SecureRoutingGateway;
use bastion_core::application::state_manager::StateManager;
use bastion_core::domain::artifact::Artifact;
use bastion_core::domain::conflict::{ConflictSeverity, ConflictType, ResolutionStrategy};
use bastion_core::domain::events::GovernanceEvent;
use bastion_core::domain::project::Project;
use bastion_core::domain::repository::ArtifactStore;
use bastion_core::domain::routing_policy::DefaultPolicy;
use bastion_core::infrastructure::audit::ComplianceAuditor;
use bastion_core::infrastructure::event_bus::{DomainEvent, EventBus};
use bastion_core::infrastructure::repositories::InMemoryArtifactStore;
use serde_json::json;
use std::sync::Arc;

struct Fixture {
    store: Arc<dyn ArtifactStore>,
    bus: Arc<EventBus>,
    engine: Arc<ArtifactGovernanceEngine>,
    project: Project,
}

async fn fixture() -> Fixture {
    let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    let bus = Arc::new(EventBus::with_default_capacity());
    let engine = Arc::new(ArtifactGovernanceEngine::new(store.clone(), bus.clone()));
    let project = Project::new("governed");
    store.save_project(&project).await.unwrap();
    Fixture {
        store,
        bus,
        engine,
        project,
    }
}

#[tokio::test]
async fn test_versions_are_sequential_per_type() {
    let f = fixture().await;

    for i in 1..=5u32 {
        let draft = ArtifactDraft::new(f.project.id, "plan", "planner", json!({ "revision": i }));
        let artifact = f.engine.create_artifact(draft).await.unwrap();
        assert_eq!(artifact.version, i);
        f.engine.declare_artifact(artifact, true).await.unwrap();
    }

    // Another type starts its own sequence
    let code = f
        .engine
        .declare_new_artifact(ArtifactDraft::new(f.project.id, "code", "planner", json!({})))
        .await
        .unwrap();
    assert_eq!(code.version, 1);

    let versions: Vec<u32> = f
        .store
        .list_artifacts(f.project.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.artifact_type == "plan")
        .map(|a| a.version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_concurrent_declarations_never_share_a_version() {
    let f = fixture().await;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = f.engine.clone();
            let project_id = f.project.id;
            tokio::spawn(async move {
                engine
                    .declare_new_artifact(ArtifactDraft::new(project_id, "notes", "scribe", json!({ "n": i })))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut versions: Vec<u32> = f
        .store
        .list_artifacts(f.project.id)
        .await
        .unwrap()
        .iter()
        .map(|a| a.version)
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_stale_version_is_blocked() {
    let f = fixture().await;
    let mut events = f.bus.subscribe();

    f.engine
        .declare_new_artifact(ArtifactDraft::new(f.project.id, "plan", "planner", json!({})))
        .await
        .unwrap();
    f.engine
        .declare_new_artifact(ArtifactDraft::new(f.project.id, "plan", "planner", json!({})))
        .await
        .unwrap();

    let stale = Artifact::new(f.project.id, "plan", 2, "planner", json!({"late": true}));
    let err = f.engine.declare_artifact(stale.clone(), true).await.unwrap_err();

    match err {
        GovernanceError::ConflictDetected {
            artifact_id,
            project_id,
            conflict_ids,
            report,
        } => {
            assert_eq!(artifact_id, stale.id);
            assert_eq!(project_id, f.project.id);
            assert_eq!(conflict_ids.len(), 1);
            assert_eq!(report.blocked_count(), 1);
        }
        other => panic!("expected ConflictDetected, got {other:?}"),
    }

    let stored = f.store.get_artifact(stale.id).await.unwrap().unwrap();
    assert!(stored.is_blocked());

    let conflicts = f.store.list_conflicts(f.project.id).await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].conflict_type, ConflictType::VersionMismatch);
    assert_eq!(conflicts[0].severity, ConflictSeverity::Medium);
    assert_eq!(conflicts[0].resolution_strategy, ResolutionStrategy::Retry);

    // Two declarations, then the conflict
    let mut saw_conflict = false;
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::Governance(GovernanceEvent::ConflictDetected { artifact_id, conflicts, .. }) = event {
            assert_eq!(artifact_id, stale.id);
            assert_eq!(conflicts.len(), 1);
            saw_conflict = true;
        }
    }
    assert!(saw_conflict);

    // The blocked artifact does not take part in numbering
    let next = f
        .engine
        .create_artifact(ArtifactDraft::new(f.project.id, "plan", "planner", json!({})))
        .await
        .unwrap();
    assert_eq!(next.version, 3);
}

#[tokio::test]
async fn test_parallel_creation_and_release() {
    let f = fixture().await;

    f.engine
        .declare_new_artifact(ArtifactDraft::new(f.project.id, "code", "backend_dev", json!({})))
        .await
        .unwrap();
    let err = f
        .engine
        .declare_new_artifact(ArtifactDraft::new(f.project.id, "code", "frontend_dev", json!({})))
        .await
        .unwrap_err();

    let (artifact_id, conflict_ids) = match err {
        GovernanceError::ConflictDetected {
            artifact_id,
            conflict_ids,
            ..
        } => (artifact_id, conflict_ids),
        other => panic!("expected ConflictDetected, got {other:?}"),
    };
    let conflict = f.store.get_conflict(conflict_ids[0]).await.unwrap().unwrap();
    assert_eq!(conflict.conflict_type, ConflictType::ParallelCreation);
    assert_eq!(conflict.severity, ConflictSeverity::High);
    assert_eq!(conflict.resolution_strategy, ResolutionStrategy::Merge);

    let still_blocked = f.engine.release_artifact(artifact_id).await;
    assert!(matches!(still_blocked, Err(GovernanceError::StillBlocked { .. })));

    let resolved = f
        .engine
        .resolve_conflict(conflict.id, ResolutionStrategy::Override)
        .await
        .unwrap();
    assert!(resolved.resolved);
    assert_eq!(resolved.resolution_strategy, ResolutionStrategy::Override);

    // Resolution alone does not unblock
    assert!(f.store.get_artifact(artifact_id).await.unwrap().unwrap().is_blocked());

    let released = f.engine.release_artifact(artifact_id).await.unwrap();
    assert!(!released.is_blocked());
    assert!(!f.engine.get_blocking_report(f.project.id).await.unwrap().is_blocked());
}

#[tokio::test]
async fn test_mutual_dependency_is_critical() {
    let f = fixture().await;

    let a = Artifact::new(f.project.id, "api", 1, "architect", json!({}));
    let b = Artifact::new(f.project.id, "schema", 1, "architect", json!({})).with_dependencies([a.id]);

    // B arrives first, so A is still missing
    let err = f.engine.declare_artifact(b.clone(), true).await.unwrap_err();
    assert!(matches!(err, GovernanceError::ConflictDetected { .. }));
    let first = f.store.list_conflicts(f.project.id).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].conflict_type, ConflictType::MissingDependency);

    let a = a.with_dependencies([b.id]);
    let err = f.engine.declare_artifact(a.clone(), true).await.unwrap_err();
    let conflict_ids = match err {
        GovernanceError::ConflictDetected { conflict_ids, .. } => conflict_ids,
        other => panic!("expected ConflictDetected, got {other:?}"),
    };
    assert_eq!(conflict_ids.len(), 1);

    let circular = f.store.get_conflict(conflict_ids[0]).await.unwrap().unwrap();
    assert_eq!(circular.conflict_type, ConflictType::CircularDependency);
    assert_eq!(circular.severity, ConflictSeverity::Critical);
    assert_eq!(circular.resolution_strategy, ResolutionStrategy::Escalate);
    assert_eq!(circular.related_artifact_id, Some(b.id));

    let report = f.engine.get_blocking_report(f.project.id).await.unwrap();
    assert_eq!(report.blocked_count(), 2);
}

#[tokio::test]
async fn test_checkpoint_retention_prunes_oldest() {
    let f = fixture().await;
    let auditor = Arc::new(ComplianceAuditor::in_memory("acme"));
    let secure = Arc::new(SecureRoutingGateway::new(
        Arc::new(DefaultPolicy::default()),
        auditor,
        "ollama",
        vec!["openrouter".to_string()],
    ));
    let manager = StateManager::new(f.store.clone(), f.engine.clone(), secure, f.bus.clone(), 5);

    let mut created = Vec::new();
    for i in 0..6 {
        created.push(manager.create_checkpoint(f.project.id, format!("cp-{i}")).await.unwrap());
    }

    let kept = manager.list_checkpoints(f.project.id).await.unwrap();
    assert_eq!(kept.len(), 5);
    assert!(kept.iter().all(|c| c.id != created[0].id));
    // Newest first
    let labels: Vec<&str> = kept.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["cp-5", "cp-4", "cp-3", "cp-2", "cp-1"]);
}
