// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use bastion_core::domain::config::BastionConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write the default configuration as a starting point
    Generate {
        /// Output path (default: ./bastion-config.yaml)
        #[arg(short, long, default_value = "./bastion-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let manifest = BastionConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;
    let config = &manifest.spec;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. BASTION_CONFIG_PATH: {}",
            std::env::var("BASTION_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./bastion-config.yaml");
        println!("  4. ~/.bastion/config.yaml");
        println!("  5. /etc/bastion/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Governance:".bold());
    println!("  Instance: {}", manifest.metadata.name);
    println!("  Organization: {}", config.organization);
    println!("  Policy: {}", config.policy.name);
    if let Some(region) = &config.policy.region {
        println!("    Region: {}", region);
    }
    if let Some(framework) = &config.policy.framework {
        println!("    Framework: {}", framework);
    }
    if config.audit.enabled {
        println!("  Audit log: {}", config.audit_log_path().display());
    } else {
        println!("  Audit log: {}", "(memory only)".dimmed());
    }
    println!("  Checkpoint retention: {}", config.state.checkpoint_retention);
    println!();

    println!("{}", "Providers:".bold());
    for provider in &config.providers {
        let enabled = if provider.enabled { "".normal() } else { " (disabled)".dimmed() };
        println!("  {} ({}){}", provider.name.bold(), provider.provider_type, enabled);
        println!("    Endpoint: {}", provider.endpoint);
        println!("    Default model: {}", provider.default_model);
    }
    println!();

    println!("{}", "Provider Selection:".bold());
    println!("  Mode: {}", config.gateway.mode);
    println!("  Offline first: {}", config.gateway.offline_first);
    println!("  Local provider: {}", config.gateway.local_provider);
    println!("  Cloud providers: {}", config.gateway.cloud_providers.join(", "));
    println!("  Health interval: {}s", config.gateway.health_check_interval_secs);
    if !config.gateway.preload_models.is_empty() {
        println!("  Preload: {}", config.gateway.preload_models.join(", "));
    }
    println!();

    println!("{}", "Router:".bold());
    println!("  Max attempts: {}", config.router.max_attempts);
    println!("  Base delay: {}ms", config.router.base_delay_ms);
    println!("  Request timeout: {}s", config.router.request_timeout_secs);
    if let Some(fallback) = &config.router.fallback_provider {
        println!("  Fallback provider: {}", fallback);
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let manifest = BastionConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    manifest.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    BastionConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
