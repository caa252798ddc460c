// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Bastion core
//!
//! Artifact governance, sensitivity-aware routing and provider selection for
//! multi-agent generation pipelines.
//!
//! # Architecture
//!
//! - **domain:** entities, value types, policies and the store/provider contracts
//! - **application:** governance engine, routing gateways, generation router, state manager
//! - **infrastructure:** in-memory store, audit log, health monitor, event bus, provider adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
