// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `bastion classify` - show the sensitivity of a task and the providers the
//! configured policy permits for it. Nothing is audited: no routing happens.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use bastion_core::application::secure_routing::TaskProfile;

use crate::runtime::Runtime;

#[derive(Args, Debug, Clone)]
pub struct TaskArgs {
    /// Agent issuing the request
    #[arg(long, default_value = "cli")]
    pub agent: String,

    /// Task type (planning, analysis, code_generation, ...)
    #[arg(long, default_value = "general")]
    pub task_type: String,

    /// Task handles private data
    #[arg(long)]
    pub private: bool,

    /// Task handles sensitive data (credentials, secrets, PII)
    #[arg(long)]
    pub sensitive: bool,

    /// Task is security analysis
    #[arg(long)]
    pub security: bool,
}

impl TaskArgs {
    pub fn profile(&self) -> TaskProfile {
        let mut profile = TaskProfile::new(self.agent.clone(), self.task_type.clone());
        if self.private {
            profile = profile.with_private_data();
        }
        if self.sensitive {
            profile = profile.with_sensitive_data();
        }
        if self.security {
            profile = profile.security_task();
        }
        profile
    }
}

#[derive(Args)]
pub struct ClassifyArgs {
    #[command(flatten)]
    pub task: TaskArgs,
}

pub async fn handle_command(args: ClassifyArgs, config_path: Option<PathBuf>) -> Result<()> {
    let runtime = Runtime::load(config_path)?;
    let policy = runtime.secure.policy();

    let sensitivity = runtime.secure.classify_task(&args.task.profile());
    let allowed: Vec<String> = policy.get_allowed_providers(sensitivity).into_iter().collect();

    println!("{} {}", "Sensitivity:".bold(), sensitivity.as_str().to_uppercase());
    println!("{} {}", "Policy:".bold(), policy.name());
    println!(
        "{} {}",
        "Cloud considered:".bold(),
        if policy.should_allow_cloud(sensitivity) { "yes".yellow() } else { "no".green() }
    );
    println!("{} {}", "Allowed providers:".bold(), allowed.join(", "));

    Ok(())
}
