// src/assistant/client.rs
// Azure OpenAI Assistants REST client: threads, messages, runs.

use crate::config::{AssistantSettings, AzureConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Assistant request failed: {0}")]
    Request(String),
    #[error("Assistant API error: {status} {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode assistant response: {0}")]
    Decode(String),
    #[error("Assistant run did not finish within {0:?}")]
    Timeout(std::time::Duration),
    #[error("Assistant run cancelled")]
    Cancelled,
    #[error("Assistant run ended with status {status}: {}", .last_error.as_deref().unwrap_or("no details"))]
    RunFailed {
        status: RunStatus,
        last_error: Option<String>,
    },
    #[error("Assistant produced no reply")]
    EmptyReply,
    #[error(transparent)]
    Session(#[from] crate::session::SessionError),
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        AssistantError::Request(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    /// Still moving toward a terminal status.
    pub fn is_pending(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

/// Remote assistant operations. Implemented over HTTP by
/// `AzureAssistantClient` and by in-process fakes in tests.
#[async_trait::async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_thread(&self) -> Result<String, AssistantError>;
    async fn create_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError>;
    async fn create_run(&self, thread_id: &str) -> Result<Run, AssistantError>;
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError>;
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), AssistantError>;
    /// Text of the newest message on the thread, if any.
    async fn latest_message(&self, thread_id: &str) -> Result<Option<String>, AssistantError>;
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    #[serde(default)]
    content: Vec<Value>,
}

/// Concatenates the `text` parts of a thread message.
fn message_text(message: &ThreadMessage) -> String {
    message
        .content
        .iter()
        .filter(|part| part["type"] == "text")
        .filter_map(|part| part["text"]["value"].as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct AzureAssistantClient {
    base: String,
    api_version: String,
    api_key: String,
    assistant_id: String,
    vector_store_id: Option<String>,
    client: reqwest::Client,
}

impl AzureAssistantClient {
    pub fn new(azure: &AzureConfig, settings: &AssistantSettings) -> Self {
        info!(assistant_id = %settings.assistant_id, "Initializing AzureAssistantClient");
        Self {
            base: format!("{}/openai", azure.endpoint),
            api_version: azure.api_version.clone(),
            api_key: azure.api_key.clone(),
            assistant_id: settings.assistant_id.clone(),
            vector_store_id: settings.vector_store_id.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}?api-version={}", self.base, path, self.api_version)
    }

    fn thread_body(&self) -> Value {
        match &self.vector_store_id {
            Some(id) => json!({ "tool_resources": { "file_search": { "vector_store_ids": [id] } } }),
            None => json!({}),
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, AssistantError> {
        let response = request.header("api-key", &self.api_key).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AssistantError::Status { status: status.as_u16(), body });
        }
        serde_json::from_str(&body).map_err(|e| AssistantError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl AssistantApi for AzureAssistantClient {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let created: Created = self
            .send(self.client.post(self.url("/threads")).json(&self.thread_body()))
            .await?;
        debug!(thread_id = %created.id, "Thread created");
        Ok(created.id)
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError> {
        let path = format!("/threads/{}/messages", thread_id);
        let _: Value = self
            .send(self.client.post(self.url(&path)).json(&json!({ "role": "user", "content": content })))
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str) -> Result<Run, AssistantError> {
        let path = format!("/threads/{}/runs", thread_id);
        self.send(self.client.post(self.url(&path)).json(&json!({ "assistant_id": self.assistant_id })))
            .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let path = format!("/threads/{}/runs/{}", thread_id, run_id);
        self.send(self.client.get(self.url(&path))).await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), AssistantError> {
        let path = format!("/threads/{}/runs/{}/cancel", thread_id, run_id);
        let _: Value = self.send(self.client.post(self.url(&path))).await?;
        Ok(())
    }

    async fn latest_message(&self, thread_id: &str) -> Result<Option<String>, AssistantError> {
        let path = format!("/threads/{}/messages", thread_id);
        let list: MessageList = self
            .send(self.client.get(self.url(&path)).query(&[("order", "desc"), ("limit", "1")]))
            .await?;
        Ok(list.data.first().map(message_text).filter(|text| !text.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(vector_store_id: Option<&str>) -> AzureAssistantClient {
        let azure = AzureConfig {
            endpoint: "https://res.openai.azure.com".into(),
            api_key: "k".into(),
            chat_deployment: String::new(),
            embedding_deployment: "ada".into(),
            api_version: "2024-05-01-preview".into(),
            temperature: 0.3,
            max_tokens: 1000,
        };
        let settings = AssistantSettings {
            assistant_id: "asst_1".into(),
            vector_store_id: vector_store_id.map(str::to_string),
            poll_interval: Duration::from_millis(1000),
            run_timeout: Duration::from_secs(120),
        };
        AzureAssistantClient::new(&azure, &settings)
    }

    #[test]
    fn test_url_and_thread_body() {
        let c = client(Some("vs_1"));
        assert_eq!(
            c.url("/threads/t1/runs"),
            "https://res.openai.azure.com/openai/threads/t1/runs?api-version=2024-05-01-preview"
        );
        assert_eq!(c.thread_body()["tool_resources"]["file_search"]["vector_store_ids"][0], "vs_1");
        assert_eq!(client(None).thread_body(), json!({}));
    }

    #[test]
    fn test_run_status_decoding() {
        let run: Run = serde_json::from_str(
            r#"{"id":"run_1","status":"failed","last_error":{"code":"rate_limit_exceeded","message":"slow down"}}"#,
        )
        .unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.last_error.unwrap().message, "slow down");

        assert!(RunStatus::Queued.is_pending());
        assert!(RunStatus::Cancelling.is_pending());
        assert!(!RunStatus::RequiresAction.is_pending());
        assert!(!RunStatus::Completed.is_pending());
    }

    #[test]
    fn test_message_text_skips_non_text_parts() {
        let message: ThreadMessage = serde_json::from_value(json!({
            "content": [
                {"type": "image_file", "image_file": {"file_id": "f"}},
                {"type": "text", "text": {"value": "누리호는", "annotations": []}},
                {"type": "text", "text": {"value": "성공했어요", "annotations": []}}
            ]
        }))
        .unwrap();
        assert_eq!(message_text(&message), "누리호는\n성공했어요");
    }
}
