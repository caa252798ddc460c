// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Bastion CLI
//!
//! Operator front end for a governance instance: inspect configuration,
//! probe providers, classify tasks, report on the compliance audit trail and
//! route a prompt through the full generation pipeline.
//!
//! ## Commands
//!
//! - `bastion config show|validate|generate` - Configuration management
//! - `bastion health` - Probe every configured provider
//! - `bastion classify` - Sensitivity and permitted providers for a task
//! - `bastion audit report` - Summarize routing decisions
//! - `bastion generate` - Route a prompt under policy

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use bastion::commands::{self, AuditCommand, ClassifyArgs, ConfigCommand, GenerateArgs};

/// Bastion - governed, sensitivity-aware model routing
#[derive(Parser)]
#[command(name = "bastion")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "BASTION_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "BASTION_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Probe every configured provider
    #[command(name = "health")]
    Health {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Classify a task and show where its data may go
    #[command(name = "classify")]
    Classify(ClassifyArgs),

    /// Compliance audit trail
    #[command(name = "audit")]
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },

    /// Route a prompt through policy, selection, retry and fallback
    #[command(name = "generate")]
    Generate(GenerateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Health { json }) => commands::health::handle_command(cli.config, json).await,
        Some(Commands::Classify(args)) => commands::classify::handle_command(args, cli.config).await,
        Some(Commands::Audit { command }) => commands::audit::handle_command(command, cli.config).await,
        Some(Commands::Generate(args)) => commands::generate::handle_command(args, cli.config).await,
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
