// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Compliance Audit Log
//!
//! Append-only record of every routing decision, one JSON object per line in
//! `compliance_audit_<organization>.jsonl`.
//!
//! ## Guarantees
//!
//! - The file is opened once in append mode. Records are written under the
//!   history lock with one `write_all` and a flush per line, so concurrent
//!   writers never interleave partial records and the file order matches the
//!   in-process decision order.
//! - The full history is loaded at construction, so [`ComplianceAuditor::report`]
//!   covers prior runs as well as the current one.
//! - A disabled auditor keeps decisions in memory and in the tracing log but
//!   never touches the file.

use crate::domain::audit::{ComplianceAuditEntry, ComplianceReport};
use crate::domain::config::BastionConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct ComplianceAuditor {
    organization: String,
    log_path: Option<PathBuf>,
    // Locked after `entries`
    writer: Option<Mutex<BufWriter<File>>>,
    entries: Mutex<Vec<ComplianceAuditEntry>>,
}

impl ComplianceAuditor {
    /// Open (or create) the audit log at `log_path` and load its history.
    pub fn open(organization: impl Into<String>, log_path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let organization = organization.into();
        let log_path = log_path.into();

        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let entries = Self::load(&log_path)?;
        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        info!(
            organization = %organization,
            path = %log_path.display(),
            loaded = entries.len(),
            "Compliance audit log opened"
        );

        Ok(Self {
            organization,
            log_path: Some(log_path),
            writer: Some(Mutex::new(BufWriter::new(file))),
            entries: Mutex::new(entries),
        })
    }

    /// Auditor that keeps history only for the lifetime of the process.
    pub fn in_memory(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            log_path: None,
            writer: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &BastionConfig) -> Result<Self, AuditError> {
        if config.audit.enabled {
            Self::open(config.organization.clone(), config.audit_log_path())
        } else {
            info!("Compliance audit file disabled; decisions are kept in memory only");
            Ok(Self::in_memory(config.organization.clone()))
        }
    }

    fn load(path: &Path) -> Result<Vec<ComplianceAuditEntry>, AuditError> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ComplianceAuditEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = index + 1, error = %e, "Skipping unreadable audit record"),
            }
        }
        Ok(entries)
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Append one decision. A failed file write is logged and counted; the
    /// decision itself is still kept in memory and the routing outcome stands.
    pub fn record(&self, entry: ComplianceAuditEntry) {
        debug!(
            agent = %entry.agent_name,
            task_type = %entry.task_type,
            sensitivity = %entry.sensitivity,
            provider = %entry.selected_provider,
            decision = %entry.policy_decision,
            "Compliance decision"
        );

        let mut entries = self.entries.lock();
        if let Some(writer) = &self.writer {
            if let Err(e) = Self::append(&mut writer.lock(), &entry) {
                metrics::counter!("bastion_audit_write_failures_total").increment(1);
                let path = self.log_path.as_deref().unwrap_or(Path::new(""));
                error!(path = %path.display(), error = %e, "Failed to append compliance audit record");
            }
        }
        entries.push(entry);
    }

    fn append(writer: &mut BufWriter<File>, entry: &ComplianceAuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    pub fn entries(&self) -> Vec<ComplianceAuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn report(&self) -> ComplianceReport {
        let entries = self.entries.lock();
        ComplianceReport::from_entries(&self.organization, &entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::BLOCKED;
    use crate::domain::sensitivity::{DataResidency, TaskSensitivity};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn decision(provider: &str, residency: DataResidency) -> ComplianceAuditEntry {
        ComplianceAuditEntry {
            timestamp: Utc::now(),
            agent_name: "planner".to_string(),
            task_type: "planning".to_string(),
            sensitivity: TaskSensitivity::Internal,
            selected_provider: provider.to_string(),
            policy_decision: "prefer_local".to_string(),
            policy_name: "default".to_string(),
            organization: "acme".to_string(),
            data_residency: residency,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_records_are_reloaded_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compliance_audit_acme.jsonl");

        {
            let auditor = ComplianceAuditor::open("acme", &path).unwrap();
            auditor.record(decision("ollama", DataResidency::Local));
            auditor.record(decision(BLOCKED, DataResidency::Local));
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);

        let reopened = ComplianceAuditor::open("acme", &path).unwrap();
        assert_eq!(reopened.len(), 2);
        let report = reopened.report();
        assert_eq!(report.total_decisions, 2);
        assert_eq!(report.blocked, 1);
        assert_eq!(report.local_decisions, 1);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let valid = serde_json::to_string(&decision("openrouter", DataResidency::Cloud)).unwrap();
        std::fs::write(&path, format!("{valid}\nnot json\n\n")).unwrap();

        let auditor = ComplianceAuditor::open("acme", &path).unwrap();
        assert_eq!(auditor.len(), 1);
        assert_eq!(auditor.report().cloud_decisions, 1);
    }

    #[test]
    fn test_concurrent_records_land_as_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let auditor = ComplianceAuditor::open("acme", &path).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        auditor.record(decision("ollama", DataResidency::Local));
                    }
                });
            }
        });

        // Readable while the auditor still holds the file
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 100);
        for line in lines {
            serde_json::from_str::<ComplianceAuditEntry>(line).unwrap();
        }
        assert_eq!(auditor.len(), 100);
    }

    #[test]
    fn test_in_memory_auditor_writes_no_file() {
        let auditor = ComplianceAuditor::in_memory("acme");
        auditor.record(decision("ollama", DataResidency::Local));
        assert!(auditor.log_path().is_none());
        assert_eq!(auditor.entries().len(), 1);
    }
}
