// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Compliance audit commands

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use bastion_core::domain::config::BastionConfigManifest;
use bastion_core::infrastructure::audit::ComplianceAuditor;

#[derive(Subcommand)]
pub enum AuditCommand {
    /// Summarize every recorded routing decision, including prior runs
    Report {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the most recent decisions
    Tail {
        /// Number of entries
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },
}

pub async fn handle_command(command: AuditCommand, config_path: Option<PathBuf>) -> Result<()> {
    // The audit log needs no providers, so skip the full runtime
    let manifest = BastionConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let auditor = ComplianceAuditor::from_config(&manifest.spec).context("Failed to open compliance audit log")?;

    match command {
        AuditCommand::Report { json } => report(&auditor, json),
        AuditCommand::Tail { count } => tail(&auditor, count),
    }
}

fn report(auditor: &ComplianceAuditor, json: bool) -> Result<()> {
    let report = auditor.report();

    if json {
        println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize report")?);
        return Ok(());
    }

    println!("{} {}", "Compliance report for".bold(), report.organization.bold());
    if let Some(path) = auditor.log_path() {
        println!("  Log: {}", path.display());
    }
    println!("  Decisions: {}", report.total_decisions);
    println!("  Local: {}  Cloud: {}", report.local_decisions, report.cloud_decisions);
    println!("  Local share: {:.1}%", report.local_share() * 100.0);
    println!("  Blocked: {}", report.blocked.to_string().yellow());
    println!("  Failed: {}", report.failed.to_string().red());
    if let (Some(first), Some(last)) = (report.first_entry, report.last_entry) {
        println!("  Period: {} .. {}", first.to_rfc3339(), last.to_rfc3339());
    }

    println!();
    println!("{}", "By provider:".bold());
    for (provider, count) in &report.by_provider {
        println!("  {:<14} {}", provider, count);
    }

    println!();
    println!("{}", "By sensitivity:".bold());
    for (sensitivity, count) in &report.by_sensitivity {
        println!("  {:<14} {}", sensitivity, count);
    }

    Ok(())
}

fn tail(auditor: &ComplianceAuditor, count: usize) -> Result<()> {
    let entries = auditor.entries();
    let start = entries.len().saturating_sub(count);

    for entry in &entries[start..] {
        let provider = if entry.is_blocked() || entry.is_failed() {
            entry.selected_provider.red()
        } else {
            entry.selected_provider.normal()
        };
        println!(
            "{} {:<10} {:<12} {:<16} {} ({})",
            entry.timestamp.to_rfc3339().dimmed(),
            entry.sensitivity.as_str(),
            provider,
            entry.agent_name,
            entry.policy_decision,
            entry.data_residency
        );
    }

    Ok(())
}
