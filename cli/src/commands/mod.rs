// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Bastion CLI

pub mod audit;
pub mod classify;
pub mod config;
pub mod generate;
pub mod health;

pub use self::audit::AuditCommand;
pub use self::classify::ClassifyArgs;
pub use self::config::ConfigCommand;
pub use self::generate::GenerateArgs;
