// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

// Generation Provider Domain Interface (Anti-Corruption Layer)
//
// The router depends only on this contract; concrete providers (local model
// server, remote APIs) live in infrastructure/llm/ and are swappable without
// touching governance logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Domain interface for generation providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Provider name as used by routing policy ("ollama", "openrouter", ...)
    fn name(&self) -> &str;

    /// Model requests are sent to
    fn model(&self) -> &str;

    /// Generate a completion
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError>;

    /// Check if provider is reachable
    async fn health_check(&self) -> Result<(), LLMError>;

    async fn is_available(&self) -> bool {
        self.health_check().await.is_ok()
    }

    /// Whether the provider can serve `model` right now. Remote APIs serve
    /// whatever they advertise, so the default is optimistic.
    async fn has_model(&self, _model: &str) -> Result<bool, LLMError> {
        Ok(true)
    }

    /// Download a model onto the provider. Only local servers support this.
    async fn pull_model(&self, model: &str) -> Result<(), LLMError> {
        Err(LLMError::Provider(format!(
            "provider '{}' does not support pulling model '{}'",
            self.name(),
            model
        )))
    }
}

/// Builds provider instances by name. The router and the health monitor go
/// through this seam so tests can substitute in-process providers.
pub trait ProviderFactory: Send + Sync {
    /// Instantiate `provider` targeting `model`
    fn create(&self, provider: &str, model: &str) -> Result<Arc<dyn LLMProvider>, LLMError>;

    /// Model used when the caller does not name one
    fn default_model(&self, provider: &str) -> Option<String>;

    /// Names of all enabled providers
    fn provider_names(&self) -> Vec<String>;
}

/// Options for generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(4096),
            temperature: Some(0.7),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Errors that can occur during provider operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.accumulate(&TokenUsage::new(10, 5));
        total.accumulate(&TokenUsage::new(3, 2));
        assert_eq!(total, TokenUsage { prompt_tokens: 13, completion_tokens: 7, total_tokens: 20 });
    }
}
