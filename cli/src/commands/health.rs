// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `bastion health` - probe every enabled provider once.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use bastion_core::domain::provider_health::HealthStatus;

use crate::runtime::Runtime;

pub async fn handle_command(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let runtime = Runtime::load(config_path)?;
    let snapshot = runtime.monitor.refresh().await;

    let mut providers: Vec<_> = snapshot.values().cloned().collect();
    providers.sort_by(|a, b| a.provider.cmp(&b.provider));

    if json {
        let out = serde_json::to_string_pretty(&providers).context("Failed to serialize health")?;
        println!("{}", out);
        return Ok(());
    }

    println!("{}", "Provider health:".bold());
    for health in &providers {
        let status = match health.status {
            HealthStatus::Healthy => health.status.to_string().green(),
            HealthStatus::Degraded => health.status.to_string().yellow(),
            HealthStatus::Unavailable => health.status.to_string().red(),
            HealthStatus::Unknown => health.status.to_string().dimmed(),
        };
        let latency = health
            .latency_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        let local = if runtime.secure.policy().catalog().is_local(&health.provider) {
            "local"
        } else {
            "cloud"
        };

        println!("  {:<14} {:<5} {:<12} {:>8}", health.provider.bold(), local, status, latency);
        if let Some(error) = &health.error {
            println!("    {}", error.dimmed());
        }
    }

    Ok(())
}
