// src/memory/llm_provider.rs
// Chat model abstraction with token streaming.
// Default: Azure OpenAI chat deployment (gpt-4o-mini in production).

use crate::config::AzureConfig;
use crate::session::Message;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Incremental answer text; the concatenation of all items is the answer.
pub type TokenStream = BoxStream<'static, Result<String, LLMError>>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LLMError {
    #[error("LLM connection failed: {0}")]
    ConnectionFailed(String),
    #[error("LLM API error: {status} {body}")]
    Status { status: u16, body: String },
    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),
}

/// Chat model trait - implement this to support new providers
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(&self, messages: Vec<Message>) -> Result<TokenStream, LLMError>;

    async fn complete(&self, messages: Vec<Message>) -> Result<String, LLMError> {
        let mut stream = self.stream_chat(messages).await?;
        let mut answer = String::new();
        while let Some(delta) = stream.next().await {
            answer.push_str(&delta?);
        }
        Ok(answer)
    }

    fn model_name(&self) -> &str;
}

/// Wraps an already-known answer as a one-item stream.
pub fn single_token_stream(text: String) -> TokenStream {
    stream::once(async move { Ok(text) }).boxed()
}

/// Adapts a channel receiver into a `TokenStream`.
pub fn receiver_stream(rx: mpsc::Receiver<Result<String, LLMError>>) -> TokenStream {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Delta(String),
    Error(String),
    Done,
}

/// Server-Sent-Events decoder for chat completion streams. Bytes may split
/// anywhere, including inside a UTF-8 sequence; only complete lines are
/// decoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = parse_sse_line(line.trim()) {
                events.push(event);
            }
        }
        events
    }

    /// Decodes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        parse_sse_line(line.trim())
    }
}

fn parse_sse_line(line: &str) -> Option<SseEvent> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => return Some(SseEvent::Error(format!("malformed frame: {}", e))),
    };
    if let Some(message) = value["error"]["message"].as_str() {
        return Some(SseEvent::Error(message.to_string()));
    }
    // content-filter frames carry no choices
    value["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| SseEvent::Delta(s.to_string()))
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Azure OpenAI chat-completions deployment.
pub struct AzureChatProvider {
    url: String,
    api_key: String,
    deployment: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AzureChatProvider {
    pub fn new(config: &AzureConfig) -> Self {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            config.endpoint, config.chat_deployment, config.api_version
        );
        info!(deployment = %config.chat_deployment, "Initializing AzureChatProvider");
        Self {
            url,
            api_key: config.api_key.clone(),
            deployment: config.chat_deployment.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl ChatModel for AzureChatProvider {
    async fn stream_chat(&self, messages: Vec<Message>) -> Result<TokenStream, LLMError> {
        debug!(
            model = %self.deployment,
            messages = messages.len(),
            temperature = self.temperature,
            max_tokens = self.max_tokens,
            "Streaming chat completion"
        );

        let body = ChatCompletionRequest {
            messages: messages
                .iter()
                .map(|m| WireMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        };

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LLMError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Chat completion rejected");
            return Err(LLMError::Status { status: status.as_u16(), body });
        }

        let (tx, rx) = mpsc::channel(64);
        let model = self.deployment.clone();
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut emitted = 0usize;
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(LLMError::ConnectionFailed(e.to_string()))).await;
                        return;
                    }
                };
                for event in decoder.push(&chunk) {
                    match event {
                        SseEvent::Delta(text) => {
                            emitted += text.len();
                            if tx.send(Ok(text)).await.is_err() {
                                debug!("Token receiver dropped; stopping stream");
                                return;
                            }
                        }
                        SseEvent::Error(msg) => {
                            let _ = tx.send(Err(LLMError::InvalidResponse(msg))).await;
                            return;
                        }
                        SseEvent::Done => break 'read,
                    }
                }
            }
            if let Some(SseEvent::Delta(text)) = decoder.finish() {
                emitted += text.len();
                let _ = tx.send(Ok(text)).await;
            }
            info!(model = %model, response_len = emitted, "Generation complete");
        });

        Ok(receiver_stream(rx))
    }

    fn model_name(&self) -> &str {
        &self.deployment
    }
}
