// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `bastion generate` - route one prompt through the full pipeline:
//! classification, selection, policy check, retry and fallback.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use bastion_core::application::generation_router::{GenerationOutcome, GenerationRequest};
use bastion_core::domain::sensitivity::TaskSensitivity;

use super::classify::TaskArgs;
use crate::runtime::Runtime;

#[derive(Args)]
pub struct GenerateArgs {
    /// Prompt text
    #[arg(value_name = "PROMPT")]
    pub prompt: String,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Requested model; cloud names are mapped onto local models when routed locally
    #[arg(short, long, default_value = "")]
    pub model: String,

    /// Skip classification and use this sensitivity (public, internal, sensitive, critical)
    #[arg(long, value_parser = parse_sensitivity)]
    pub sensitivity: Option<TaskSensitivity>,

    /// Overall deadline in seconds across all attempts
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub task: TaskArgs,
}

fn parse_sensitivity(value: &str) -> Result<TaskSensitivity, String> {
    value.parse()
}

impl GenerateArgs {
    pub fn request(&self) -> GenerationRequest {
        let mut request = GenerationRequest::new(self.prompt.clone(), self.task.profile()).with_model(self.model.clone());
        if let Some(system) = &self.system {
            request = request.with_system_prompt(system.clone());
        }
        if let Some(sensitivity) = self.sensitivity {
            request = request.with_sensitivity(sensitivity);
        }
        if let Some(secs) = self.deadline_secs {
            request = request.with_deadline(Duration::from_secs(secs));
        }
        request
    }
}

pub async fn handle_command(args: GenerateArgs, config_path: Option<PathBuf>) -> Result<()> {
    let runtime = Runtime::load(config_path)?;
    let _preload = runtime.start_preload();

    let outcome = runtime
        .router
        .generate(args.request())
        .await
        .context("Request refused by routing policy")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?);
    } else {
        print_outcome(&outcome);
    }

    if !outcome.success {
        bail!("generation failed after {} attempt(s)", outcome.attempts);
    }
    Ok(())
}

fn print_outcome(outcome: &GenerationOutcome) {
    let header = format!(
        "{} / {} [{}] attempts: {}{}",
        outcome.provider,
        outcome.model,
        outcome.sensitivity.as_str().to_uppercase(),
        outcome.attempts,
        if outcome.used_fallback { ", fallback" } else { "" }
    );

    if outcome.success {
        eprintln!("{}", header.dimmed());
        println!("{}", outcome.content);
        eprintln!(
            "{}",
            format!(
                "tokens: {} prompt + {} completion",
                outcome.usage.prompt_tokens, outcome.usage.completion_tokens
            )
            .dimmed()
        );
    } else {
        eprintln!("{}", header.red());
        if let Some(error) = &outcome.error {
            eprintln!("{}", error.red());
        }
    }
}
