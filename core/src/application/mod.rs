// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod governance;
pub mod secure_routing;
pub mod provider_gateway;
pub mod generation_router;
pub mod state_manager;

// Re-export services for convenience
pub use governance::{ArtifactDraft, ArtifactGovernanceEngine, GovernanceError};
pub use secure_routing::{SecureRoutingGateway, TaskProfile};
pub use provider_gateway::{ProviderChoice, ProviderSelectionGateway, SelectionError};
pub use generation_router::{GenerationOutcome, GenerationRequest, GenerationRouter, RouterError, RouterSettings};
pub use state_manager::{StateError, StateManager};
