// Copyright (c) 2026 Bastion Contributors
// SPDX-License-Identifier: AGPL-3.0

// Ollama Provider Adapter
//
// Anti-Corruption Layer for the local model server. This is the only
// provider that keeps data on the machine, so it is also the one that can
// pull models on demand.

use super::{http_client, map_send_error, map_status_error};
use crate::domain::llm::{GenerationOptions, GenerationResponse, LLMError, LLMProvider, TokenUsage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub struct OllamaAdapter {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    eval_count: Option<u32>,
    prompt_eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

impl OllamaAdapter {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            name: name.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }

    /// Models currently present on the server
    pub async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(LLMError::Network(format!("HTTP {}", response.status())));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Failed to parse model list: {}", e)))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// `llama3.2` and `llama3.2:latest` name the same model.
fn same_model(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || installed.strip_suffix(":latest") == Some(wanted)
        || wanted.strip_suffix(":latest") == Some(installed)
}

#[async_trait]
impl LLMProvider for OllamaAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            system: system_prompt,
            stream: false,
            options: Some(OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens.map(|t| t as i32),
            }),
        };

        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, error_text, &self.model));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Failed to parse response: {}", e)))?;

        Ok(GenerationResponse {
            content: ollama_response.response,
            usage: TokenUsage::new(
                ollama_response.prompt_eval_count.unwrap_or(0),
                ollama_response.eval_count.unwrap_or(0),
            ),
            provider: self.name.clone(),
            model: self.model.clone(),
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        // The tag listing is the cheapest endpoint that proves the server is up
        self.list_models().await.map(|_| ())
    }

    async fn has_model(&self, model: &str) -> Result<bool, LLMError> {
        Ok(self.list_models().await?.iter().any(|m| same_model(m, model)))
    }

    async fn pull_model(&self, model: &str) -> Result<(), LLMError> {
        info!(provider = %self.name, model, "Pulling model");

        // Pulls can take far longer than a generation; no client timeout here
        let response = reqwest::Client::new()
            .post(self.url("/api/pull"))
            .json(&PullRequest { name: model, stream: false })
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, error_text, model));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn adapter(url: &str) -> OllamaAdapter {
        OllamaAdapter::new("ollama", url, "llama3.2:3b", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_generate_sends_system_prompt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({
                "model": "llama3.2:3b",
                "prompt": "hello",
                "system": "be brief",
                "stream": false
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response":"hi","done":true,"prompt_eval_count":4,"eval_count":2}"#)
            .create_async()
            .await;

        let response = adapter(&server.url())
            .generate("hello", Some("be brief"), &GenerationOptions::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "hi");
        assert_eq!(response.provider, "ollama");
        assert_eq!(response.usage.total_tokens, 6);
    }

    #[tokio::test]
    async fn test_missing_model_maps_to_model_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(404)
            .with_body("model not found")
            .create_async()
            .await;

        let result = adapter(&server.url())
            .generate("hello", None, &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(LLMError::ModelNotFound(_))));
    }

    #[tokio::test]
    async fn test_has_model_reads_tags() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"models":[{"name":"llama3.2:latest"},{"name":"llama3.1:8b"}]}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let ollama = adapter(&server.url());
        assert!(ollama.health_check().await.is_ok());
        assert!(ollama.has_model("llama3.1:8b").await.unwrap());
        assert!(ollama.has_model("llama3.2").await.unwrap());
        assert!(!ollama.has_model("llama3.1:70b").await.unwrap());
    }

    #[tokio::test]
    async fn test_pull_model() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/pull")
            .match_body(Matcher::PartialJson(json!({"name": "llama3.1:8b"})))
            .with_status(200)
            .with_body(r#"{"status":"success"}"#)
            .create_async()
            .await;

        adapter(&server.url()).pull_model("llama3.1:8b").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_health_check() {
        // Nothing listens on port 9 (discard) in the test environment
        let ollama = OllamaAdapter::new("ollama", "http://127.0.0.1:9", "llama3.2:3b", Duration::from_millis(500));
        assert!(!ollama.is_available().await);
    }
}
