//! External workflow engine client.
//!
//! Workflows are invoked by name and report progress as a server-sent
//! event stream. Each `data:` payload is one [`WorkflowEvent`].

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::JobError;

/// Event type carrying workflow-level state.
pub const WORKFLOW_EVENT: &str = "WORKFLOW";
/// Terminal success state.
pub const STATE_FULFILLED: &str = "FULFILLED";
/// Terminal failure state.
pub const STATE_REJECTED: &str = "REJECTED";

/// One progress event from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,

    #[serde(default)]
    pub data: WorkflowEventData,
}

/// Event payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEventData {
    /// Either a message string or an object with a `message` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<serde_json::Value>,
}

impl WorkflowEvent {
    /// Upstream error message, if this event reports one.
    pub fn error_message(&self) -> Option<String> {
        match self.data.error.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(message) => Some(message.clone()),
            other => Some(
                other
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| other.to_string()),
            ),
        }
    }

    fn has_state(&self, state: &str) -> bool {
        self.event_type == WORKFLOW_EVENT && self.data.state.as_deref() == Some(state)
    }

    /// Workflow finished successfully.
    pub fn is_fulfilled(&self) -> bool {
        self.has_state(STATE_FULFILLED)
    }

    /// Workflow finished unsuccessfully.
    pub fn is_rejected(&self) -> bool {
        self.has_state(STATE_REJECTED)
    }
}

/// Stream of workflow events.
pub type WorkflowEventStream = Pin<Box<dyn Stream<Item = Result<WorkflowEvent, JobError>> + Send>>;

/// Invoke-by-name streaming execution API.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Start the named workflow and return its event stream.
    async fn execute_stream(
        &self,
        workflow_name: &str,
        inputs: serde_json::Value,
    ) -> Result<WorkflowEventStream, JobError>;
}

/// HTTP client for the workflow engine.
pub struct HttpWorkflowEngine {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpWorkflowEngine {
    /// Create a client. `connect_timeout` bounds connection setup only.
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, JobError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: None,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn execute_url(&self, workflow_name: &str) -> Result<Url, JobError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| JobError::Network(format!("Invalid workflow base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| JobError::Network(format!("Invalid workflow base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "workflows", workflow_name, "execute"]);
        Ok(url)
    }

    async fn send_request(
        &self,
        workflow_name: &str,
        inputs: serde_json::Value,
    ) -> Result<reqwest::Response, JobError> {
        let url = self.execute_url(workflow_name)?;
        let body = serde_json::json!({ "inputs": inputs, "stream": true });

        let mut request = self
            .client
            .post(url)
            .header("accept", "text/event-stream")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v["error"]["message"]
                        .as_str()
                        .or_else(|| v["error"].as_str())
                        .map(String::from)
                })
                .unwrap_or(body);
            return Err(JobError::Upstream { status, message });
        }

        Ok(response)
    }
}

#[async_trait]
impl WorkflowEngine for HttpWorkflowEngine {
    async fn execute_stream(
        &self,
        workflow_name: &str,
        inputs: serde_json::Value,
    ) -> Result<WorkflowEventStream, JobError> {
        let response = self.send_request(workflow_name, inputs).await?;

        let stream = async_stream::stream! {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = LineBuffer::default();

            while let Some(result) = byte_stream.next().await {
                match result {
                    Ok(bytes) => {
                        buffer.extend(&bytes);

                        while let Some(line) = buffer.next_line() {
                            match parse_sse_line(&line) {
                                SseLine::Event(event) => yield Ok(*event),
                                SseLine::Done => return,
                                SseLine::Skip => {}
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(JobError::Stream(e.to_string()));
                        return;
                    }
                }
            }

            // Final line without a trailing newline
            if let SseLine::Event(event) = parse_sse_line(&buffer.finish()) {
                yield Ok(*event);
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Raw bytes received so far, split into lines on `\n`.
///
/// Only complete lines are decoded, so a multi-byte character split across
/// network chunks survives intact.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next complete line, trimmed, if one has been received.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let newline_pos = self.bytes.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=newline_pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }

    /// Whatever is left after the stream ended without a trailing newline.
    pub(crate) fn finish(self) -> String {
        String::from_utf8_lossy(&self.bytes).trim().to_string()
    }
}

/// Classification of one line of an event stream.
#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    Event(Box<WorkflowEvent>),
    Done,
    Skip,
}

pub(crate) fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<WorkflowEvent>(data) {
        Ok(event) => SseLine::Event(Box::new(event)),
        Err(e) => {
            debug!("Skipping undecodable workflow event: {} ({})", data, e);
            SseLine::Skip
        }
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
