// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Conflict records and the derived blocking report.
//!
//! Conflicts are created only by the governance engine and mutated only by
//! `resolve_conflict`. The blocking report is never persisted; it is
//! recomputed from the current artifact and conflict state on every call.

use crate::domain::artifact::{Artifact, ArtifactId};
use crate::domain::project::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictId(pub Uuid);

impl ConflictId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered by declaration: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConflictSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    VersionMismatch,
    ParallelCreation,
    MissingDependency,
    CircularDependency,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VersionMismatch => "version_mismatch",
            Self::ParallelCreation => "parallel_creation",
            Self::MissingDependency => "missing_dependency",
            Self::CircularDependency => "circular_dependency",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolutionStrategy {
    /// Re-create the artifact against current state and declare again
    Retry,
    /// Merge the competing contributions
    Merge,
    /// Hand the decision to a human or supervising agent
    Escalate,
    /// Accept the artifact as declared
    Override,
    /// Drop the artifact
    Discard,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Retry => "RETRY",
            Self::Merge => "MERGE",
            Self::Escalate => "ESCALATE",
            Self::Override => "OVERRIDE",
            Self::Discard => "DISCARD",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    pub artifact_id: ArtifactId,
    pub project_id: ProjectId,
    pub description: String,
    pub severity: ConflictSeverity,
    pub conflict_type: ConflictType,
    pub resolution_strategy: ResolutionStrategy,
    /// Existing artifact the conflict was detected against, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_artifact_id: Option<ArtifactId>,
    pub resolved: bool,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    pub fn new(
        artifact: &Artifact,
        conflict_type: ConflictType,
        severity: ConflictSeverity,
        resolution_strategy: ResolutionStrategy,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            artifact_id: artifact.id,
            project_id: artifact.project_id,
            description: description.into(),
            severity,
            conflict_type,
            resolution_strategy,
            related_artifact_id: None,
            resolved: false,
            detected_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn against(mut self, related: ArtifactId) -> Self {
        self.related_artifact_id = Some(related);
        self
    }

    pub fn resolve(&mut self, strategy: ResolutionStrategy) {
        self.resolution_strategy = strategy;
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
    }
}

/// One blocked artifact and the unresolved conflicts holding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedArtifact {
    pub artifact_id: ArtifactId,
    pub artifact_type: String,
    pub version: u32,
    pub created_by: String,
    pub conflicts: Vec<Conflict>,
}

impl BlockedArtifact {
    pub fn highest_severity(&self) -> Option<ConflictSeverity> {
        self.conflicts.iter().map(|c| c.severity).max()
    }
}

/// Read-only view of which artifacts in a project are blocked and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingReport {
    pub project_id: ProjectId,
    pub total_artifacts: usize,
    pub blocked: Vec<BlockedArtifact>,
    pub unresolved_conflicts: usize,
    pub generated_at: DateTime<Utc>,
}

impl BlockingReport {
    pub fn is_blocked(&self) -> bool {
        !self.blocked.is_empty()
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }
}

impl fmt::Display for BlockingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.blocked.is_empty() {
            return write!(
                f,
                "Project {}: {} artifact(s), none blocked",
                self.project_id, self.total_artifacts
            );
        }
        writeln!(
            f,
            "Project {}: {} of {} artifact(s) blocked by {} unresolved conflict(s)",
            self.project_id,
            self.blocked.len(),
            self.total_artifacts,
            self.unresolved_conflicts
        )?;
        for entry in &self.blocked {
            writeln!(
                f,
                "  {} v{} ({}) by {}:",
                entry.artifact_type, entry.version, entry.artifact_id, entry.created_by
            )?;
            for conflict in &entry.conflicts {
                writeln!(
                    f,
                    "    [{}] {} - {} (suggested: {})",
                    conflict.severity,
                    conflict.conflict_type,
                    conflict.description,
                    conflict.resolution_strategy
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_ordering() {
        assert!(ConflictSeverity::Low < ConflictSeverity::Medium);
        assert!(ConflictSeverity::Medium < ConflictSeverity::High);
        assert!(ConflictSeverity::High < ConflictSeverity::Critical);
        let max = [ConflictSeverity::Medium, ConflictSeverity::Critical, ConflictSeverity::Low]
            .into_iter()
            .max();
        assert_eq!(max, Some(ConflictSeverity::Critical));
    }

    #[test]
    fn test_conflict_type_wire_names() {
        assert_eq!(
            serde_json::to_value(ConflictType::CircularDependency).unwrap(),
            json!("circular_dependency")
        );
        assert_eq!(serde_json::to_value(ConflictSeverity::High).unwrap(), json!("HIGH"));
        assert_eq!(serde_json::to_value(ResolutionStrategy::Escalate).unwrap(), json!("ESCALATE"));
    }

    #[test]
    fn test_resolve_marks_conflict() {
        let artifact = Artifact::new(ProjectId::new(), "plan", 2, "planner", json!({}));
        let mut conflict = Conflict::new(
            &artifact,
            ConflictType::VersionMismatch,
            ConflictSeverity::Medium,
            ResolutionStrategy::Retry,
            "stale version",
        );
        assert!(!conflict.resolved);
        conflict.resolve(ResolutionStrategy::Override);
        assert!(conflict.resolved);
        assert_eq!(conflict.resolution_strategy, ResolutionStrategy::Override);
        assert!(conflict.resolved_at.is_some());
    }

    #[test]
    fn test_report_display_lists_conflicts() {
        let artifact = Artifact::new(ProjectId::new(), "code", 1, "coder", json!({}));
        let conflict = Conflict::new(
            &artifact,
            ConflictType::MissingDependency,
            ConflictSeverity::High,
            ResolutionStrategy::Retry,
            "dependency does not exist",
        );
        let report = BlockingReport {
            project_id: artifact.project_id,
            total_artifacts: 1,
            blocked: vec![BlockedArtifact {
                artifact_id: artifact.id,
                artifact_type: "code".to_string(),
                version: 1,
                created_by: "coder".to_string(),
                conflicts: vec![conflict],
            }],
            unresolved_conflicts: 1,
            generated_at: Utc::now(),
        };
        let text = report.to_string();
        assert!(text.contains("1 of 1 artifact(s) blocked"));
        assert!(text.contains("[HIGH] missing_dependency"));
        assert_eq!(report.blocked[0].highest_severity(), Some(ConflictSeverity::High));
    }
}
