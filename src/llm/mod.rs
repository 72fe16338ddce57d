//! LLM client for OpenAI-compatible model servers (LM Studio et al.)
//!
//! Issues streaming chat completions and decodes the SSE token stream into
//! content deltas. Also provides a non-streaming completion (used by the
//! conversation summarizer) and model discovery.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{CoChatError, Result};
use crate::types::CancelToken;

/// A chat message in wire format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Sampling parameters for a completion request
#[derive(Debug, Clone, Copy)]
pub struct ChatParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: 2000 }
    }
}

/// Model information from the discovery endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub owned_by: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Seam between panels and the chat completion backend. Production uses
/// [`LlmClient`]; tests substitute scripted fakes.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Stream a chat completion. Content deltas are sent over `deltas` as
    /// they arrive; the assembled response text is returned. Cancellation
    /// must take effect within one delta boundary.
    async fn stream_chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        params: ChatParams,
        cancel: CancelToken,
        deltas: mpsc::UnboundedSender<String>,
    ) -> Result<String>;

    /// Non-streaming chat completion
    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        params: ChatParams,
    ) -> Result<String>;

    /// List models offered by the server
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

/// Drain complete SSE events from `buffer`, returning their `data:` payloads.
/// Incomplete trailing events stay in the buffer for the next chunk.
fn drain_sse_events(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some(pos) = buffer.find("\n\n") {
        let event: String = buffer.drain(..pos + 2).collect();
        for line in event.lines() {
            if let Some(data) = line.strip_prefix("data: ") {
                payloads.push(data.to_string());
            }
        }
    }
    payloads
}

/// HTTP client for an OpenAI-compatible `/v1` API
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatTransport for LlmClient {
    async fn stream_chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        params: ChatParams,
        cancel: CancelToken,
        deltas: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: &messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| CoChatError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoChatError::Http(response.status().as_u16()));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full_content = String::new();
        let mut saw_choices = false;
        let mut done = false;

        'read: while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                // Dropping the byte stream aborts the underlying read.
                return Err(CoChatError::Cancelled);
            }
            let chunk = chunk.map_err(|e| CoChatError::Transport(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            for payload in drain_sse_events(&mut buffer) {
                if payload == "[DONE]" {
                    done = true;
                    break 'read;
                }
                match serde_json::from_str::<StreamResponse>(&payload) {
                    Ok(resp) => {
                        saw_choices = true;
                        if let Some(content) =
                            resp.choices.first().and_then(|c| c.delta.content.as_deref())
                        {
                            full_content.push_str(content);
                            // Receiver gone means the caller stopped listening;
                            // keep assembling so the return value stays whole.
                            let _ = deltas.send(content.to_string());
                        }
                    }
                    Err(e) => {
                        warn!("Skipping malformed SSE payload: {}", e);
                    }
                }
            }
        }

        // A missing [DONE] is tolerated: reader close ends the stream.
        if !done {
            debug!("Stream ended without [DONE] terminator");
        }

        if !saw_choices {
            return Err(CoChatError::MalformedStream(
                "no choices arrived before the stream ended".to_string(),
            ));
        }

        Ok(full_content)
    }

    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        params: ChatParams,
    ) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: &messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| CoChatError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoChatError::Http(response.status().as_u16()));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CoChatError::MalformedStream(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CoChatError::MalformedStream("response had no choices".to_string()))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
            .map_err(|e| CoChatError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoChatError::Http(response.status().as_u16()));
        }

        let parsed: ModelsResponse = response
            .json()
            .await
            .map_err(|e| CoChatError::MalformedStream(e.to_string()))?;

        if parsed.data.is_empty() {
            return Err(CoChatError::NoModels(
                "the model server returned an empty list; ensure it is running and has models loaded"
                    .to_string(),
            ));
        }

        Ok(parsed.data)
    }
}
