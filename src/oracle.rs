//! HTTP completion oracles.
//!
//! Two backends implement [`Oracle`]:
//!
//! - [`OllamaOracle`]: `POST {url}/api/generate` with `stream: false`,
//!   reading the `response` field.
//! - [`OpenAiOracle`]: `POST {url}/v1/chat/completions` with a single user
//!   message, reading `choices[0].message.content`. Needs `OPENAI_API_KEY`.
//!
//! Completions are not retried. Any transport error, non-success status,
//! or malformed body becomes [`TriageError::OracleUnavailable`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use triage_harness_core::error::TriageError;
use triage_harness_core::oracle::Oracle;

use crate::config::OracleConfig;

/// Build the oracle named by `config.provider`.
pub fn create_oracle(config: &OracleConfig) -> Result<Box<dyn Oracle>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaOracle::new(config)?)),
        "openai" => Ok(Box::new(OpenAiOracle::new(config)?)),
        other => bail!("Unknown oracle provider: {}. Use ollama or openai.", other),
    }
}

fn http_client(config: &OracleConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.timeout())
        .build()?)
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
) -> Result<serde_json::Value, TriageError> {
    let mut request = client.post(url).json(body);
    if let Some(key) = bearer {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request
        .send()
        .await
        .map_err(|e| TriageError::oracle(format!("request to {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(TriageError::oracle(format!("HTTP {}: {}", status, text.trim())));
    }

    response
        .json()
        .await
        .map_err(|e| TriageError::oracle(format!("invalid response body: {}", e)))
}

// ============ Ollama ============

pub struct OllamaOracle {
    client: reqwest::Client,
    url: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.resolved_model(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Oracle for OllamaOracle {
    async fn complete(&self, prompt: &str) -> Result<String, TriageError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let json = post_json(&self.client, &format!("{}/api/generate", self.url), None, &body).await?;
        let reply = parse_generate_response(json)?;
        debug!(model = %self.model, chars = reply.len(), "ollama completion");
        Ok(reply)
    }
}

fn parse_generate_response(json: serde_json::Value) -> Result<String, TriageError> {
    serde_json::from_value::<GenerateResponse>(json)
        .map(|r| r.response)
        .map_err(|e| TriageError::oracle(format!("Ollama response missing text: {}", e)))
}

// ============ OpenAI ============

pub struct OpenAiOracle {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("oracle.model required for openai provider"))?;
        Ok(Self {
            client: http_client(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            api_key,
        })
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn complete(&self, prompt: &str) -> Result<String, TriageError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let json = post_json(
            &self.client,
            &format!("{}/v1/chat/completions", self.url),
            Some(&self.api_key),
            &body,
        )
        .await?;
        let reply = parse_chat_response(&json)?;
        debug!(model = %self.model, chars = reply.len(), "openai completion");
        Ok(reply)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String, TriageError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| TriageError::oracle("OpenAI response missing choices[0].message.content"))
}
