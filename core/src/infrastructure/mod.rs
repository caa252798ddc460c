// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure layer: adapters behind the domain contracts.

pub mod audit;
pub mod event_bus;
pub mod health_monitor;
pub mod llm;
pub mod repositories;
