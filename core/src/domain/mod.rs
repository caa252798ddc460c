// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: entities, value types and the traits infrastructure implements.

pub mod artifact;
pub mod audit;
pub mod checkpoint;
pub mod config;
pub mod conflict;
pub mod events;
pub mod llm;
pub mod project;
pub mod provider_health;
pub mod repository;
pub mod routing_policy;
pub mod sensitivity;
