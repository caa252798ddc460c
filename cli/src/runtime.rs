// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Composition root
//!
//! Loads configuration and wires every service once, in dependency order.
//! Commands receive the assembled [`Runtime`] and never construct services
//! themselves.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use bastion_core::{
    application::{
        generation_router::{GenerationRouter, RouterSettings},
        governance::ArtifactGovernanceEngine,
        provider_gateway::{PreloadOutcome, ProviderSelectionGateway},
        secure_routing::SecureRoutingGateway,
        state_manager::StateManager,
    },
    domain::{
        config::BastionConfigManifest,
        llm::ProviderFactory,
        repository::ArtifactStore,
        routing_policy::build_policy,
    },
    infrastructure::{
        audit::ComplianceAuditor,
        event_bus::EventBus,
        health_monitor::ProviderHealthMonitor,
        llm::ProviderRegistry,
        repositories::InMemoryArtifactStore,
    },
};

pub struct Runtime {
    pub manifest: BastionConfigManifest,
    pub registry: Arc<ProviderRegistry>,
    pub auditor: Arc<ComplianceAuditor>,
    pub event_bus: Arc<EventBus>,
    pub secure: Arc<SecureRoutingGateway>,
    pub monitor: Arc<ProviderHealthMonitor>,
    pub selection: Arc<ProviderSelectionGateway>,
    pub router: Arc<GenerationRouter>,
    pub state: Arc<StateManager>,
}

impl Runtime {
    /// Discover, load and validate configuration, then build the services.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let manifest = BastionConfigManifest::load_or_default(config_path)
            .context("Failed to load configuration")?;
        Self::build(manifest)
    }

    pub fn build(manifest: BastionConfigManifest) -> Result<Self> {
        manifest.validate().context("Configuration validation failed")?;
        let config = &manifest.spec;

        let registry = Arc::new(
            ProviderRegistry::from_config(config).context("Failed to initialize generation providers")?,
        );
        let factory: Arc<dyn ProviderFactory> = registry.clone();

        let policy = build_policy(&config.policy, registry.catalog()).context("Failed to build routing policy")?;
        let auditor = Arc::new(ComplianceAuditor::from_config(config).context("Failed to open compliance audit log")?);
        let event_bus = Arc::new(EventBus::with_default_capacity());

        let secure = Arc::new(
            SecureRoutingGateway::new(
                policy,
                auditor.clone(),
                config.gateway.local_provider.clone(),
                config.gateway.cloud_providers.clone(),
            )
            .with_event_bus(event_bus.clone()),
        );

        let monitor = Arc::new(ProviderHealthMonitor::from_config(factory.clone(), &config.gateway));
        let selection = Arc::new(ProviderSelectionGateway::new(
            config.gateway.clone(),
            monitor.clone(),
            factory.clone(),
        ));

        let router = Arc::new(
            GenerationRouter::new(
                secure.clone(),
                selection.clone(),
                factory,
                RouterSettings::from(&config.router),
            )
            .context("Failed to build generation router")?
            .with_event_bus(event_bus.clone()),
        );

        let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
        let governance = Arc::new(ArtifactGovernanceEngine::new(store.clone(), event_bus.clone()));
        let state = Arc::new(StateManager::new(
            store,
            governance,
            secure.clone(),
            event_bus.clone(),
            config.state.checkpoint_retention,
        ));

        debug!(
            organization = %config.organization,
            policy = %config.policy.name,
            mode = %config.gateway.mode,
            "Runtime assembled"
        );

        Ok(Self {
            manifest,
            registry,
            auditor,
            event_bus,
            secure,
            monitor,
            selection,
            router,
            state,
        })
    }

    /// Start warming the configured preload models in the background.
    /// Nothing waits on the handle; the pull is cut short when the process exits.
    pub fn start_preload(&self) -> Option<JoinHandle<Vec<(String, PreloadOutcome)>>> {
        let models = &self.manifest.spec.gateway.preload_models;
        if models.is_empty() {
            return None;
        }
        debug!(models = models.len(), "Starting model preload");
        Some(self.selection.spawn_preload())
    }
}
