// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

// Generation Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates between the domain `LLMProvider` contract and one
// external API. Adapters report errors; retry and fallback belong to the
// generation router.

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod registry;

pub use registry::ProviderRegistry;

use crate::domain::llm::LLMError;
use std::time::Duration;

/// Client with a per-request timeout so no call can hang a router attempt.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub(crate) fn map_send_error(err: reqwest::Error, timeout: Duration) -> LLMError {
    if err.is_timeout() {
        LLMError::Timeout(timeout.as_millis() as u64)
    } else {
        LLMError::Network(err.to_string())
    }
}

pub(crate) fn map_status_error(status: reqwest::StatusCode, body: String, model: &str) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::Authentication(body),
        429 => LLMError::RateLimit,
        404 => LLMError::ModelNotFound(model.to_string()),
        400 | 422 => LLMError::InvalidInput(body),
        _ => LLMError::Provider(format!("HTTP {}: {}", status, body)),
    }
}
