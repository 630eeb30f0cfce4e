use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::budget::estimate_tokens;
use crate::config::{Config, MAX_OUTPUT_TOKENS};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A text-generation backend: one prompt in, one reply out.
///
/// Implementations make exactly one attempt per call; any transport or
/// provider failure is returned as an error and never retried here.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [UserMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Anthropic Messages API client. Built once per run and reused for every call.
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    api_base: String,
    model: String,
    chars_per_token: usize,
}

impl AnthropicClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(cfg.llm_timeout)
            .build()
            .context("building Anthropic HTTP client")?;
        Ok(Self {
            http,
            api_key: cfg.anthropic_api_key.clone(),
            api_base: cfg.anthropic_api_base.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            chars_per_token: cfg.chars_per_token,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Oracle for AnthropicClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let start = std::time::Instant::now();
        info!(
            "LLM call starting - model={}, approx_input_tokens={}",
            self.model,
            estimate_tokens(prompt, self.chars_per_token)
        );

        let url = format!("{}/v1/messages", self.api_base);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            messages: [UserMessage { role: "user", content: prompt }],
        };

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Request failed for {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            bail!("Anthropic API error {}: {}", status, detail);
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .context("Decoding Anthropic messages response")?;

        let answer: String = parsed
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();

        let elapsed = start.elapsed();
        info!(
            "LLM API call completed - duration={:.2}s, response_length={} chars",
            elapsed.as_secs_f32(),
            answer.len()
        );
        if let Some(u) = &parsed.usage {
            debug!(
                "LLM usage - input_tokens={}, output_tokens={}, stop_reason={}",
                u.input_tokens,
                u.output_tokens,
                parsed.stop_reason.as_deref().unwrap_or("unknown")
            );
        }

        Ok(answer)
    }
}
