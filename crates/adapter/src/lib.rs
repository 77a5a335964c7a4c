//! Streaming client for the downstream agent service.
//!
//! Opens a single POST and yields parsed NDJSON objects as they arrive. The wire format is
//! self-framing on `\n`, so the adapter never needs to understand the shape of an event to
//! split the stream correctly.

pub mod error;

pub use error::AdapterError;

use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, AdapterError>;

/// Object-safe boundary the worker drives, so tests can substitute a fake upstream without a
/// real HTTP server.
pub trait AgentStreamSource: Send + Sync {
    fn open_stream(
        &self,
        project_id: String,
        user_message: String,
        bearer_token: String,
        thread_id: String,
    ) -> Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;
}

#[derive(Clone)]
pub struct UpstreamAdapter {
    client: reqwest::Client,
    service_url: String,
    timeout: Duration,
}

impl UpstreamAdapter {
    pub fn new(service_url: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            service_url,
            timeout,
        }
    }

    /// Streams parsed agent events for one turn. Non-object JSON values and lines that fail to
    /// parse are silently dropped, matching the upstream's own tolerance for stray output.
    pub fn stream_agent_events(
        &self,
        project_id: String,
        user_message: String,
        bearer_token: String,
        thread_id: String,
    ) -> impl Stream<Item = Result<Value>> {
        let client = self.client.clone();
        let service_url = self.service_url.clone();
        let timeout = self.timeout;

        async_stream::stream! {
            let url = format!("{service_url}/copilotkit/{project_id}");
            let payload = serde_json::json!({
                "threadId": thread_id,
                "state": {},
                "actions": [],
                "messages": [{
                    "id": Uuid::new_v4().to_string(),
                    "type": "TextMessage",
                    "role": "user",
                    "content": user_message,
                }],
            });

            let request = client
                .post(&url)
                .bearer_auth(bearer_token)
                .header("Accept", "application/x-ndjson")
                .json(&payload)
                .send();

            let response = match tokio::time::timeout(timeout, request).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    yield Err(AdapterError::from(err));
                    return;
                }
                Err(_elapsed) => {
                    yield Err(AdapterError::Timeout);
                    return;
                }
            };

            let status = response.status();
            if status.as_u16() >= 400 {
                let body = response.text().await.unwrap_or_default();
                let body = body.trim();
                let body = if body.is_empty() { "Agent upstream request failed" } else { body };
                yield Err(AdapterError::UpstreamHttp {
                    status: status.as_u16(),
                    error_code: format!("AGENT_UPSTREAM_{}", status.as_u16()),
                    body: body.to_string(),
                });
                return;
            }

            // One fixed deadline for the whole read, not just the gap between two chunks: a
            // stream trickling bytes in just under `timeout` apart would otherwise never trip
            // the per-chunk check and could stall forever.
            let deadline = Instant::now() + timeout;
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            loop {
                let chunk = match tokio::time::timeout_at(deadline, bytes.next()).await {
                    Ok(Some(Ok(chunk))) => chunk,
                    Ok(Some(Err(err))) => {
                        yield Err(AdapterError::from(err));
                        return;
                    }
                    Ok(None) => break,
                    Err(_elapsed) => {
                        yield Err(AdapterError::Timeout);
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].trim().to_string();
                    buffer.drain(..=newline_pos);
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(event) = parse_event_line(&line) {
                        yield Ok(event);
                    }
                }
            }

            let trailing = buffer.trim();
            if !trailing.is_empty() {
                if let Some(event) = parse_event_line(trailing) {
                    yield Ok(event);
                }
            }
        }
    }
}

impl AgentStreamSource for UpstreamAdapter {
    fn open_stream(
        &self,
        project_id: String,
        user_message: String,
        bearer_token: String,
        thread_id: String,
    ) -> Pin<Box<dyn Stream<Item = Result<Value>> + Send>> {
        Box::pin(self.stream_agent_events(project_id, user_message, bearer_token, thread_id))
    }
}

fn parse_event_line(line: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_object_line() {
        let event = parse_event_line(r#"{"type": "TextMessage", "content": "hi"}"#).unwrap();
        assert_eq!(event["type"], "TextMessage");
    }

    #[test]
    fn discards_non_object_json() {
        assert!(parse_event_line("42").is_none());
        assert!(parse_event_line("[1, 2, 3]").is_none());
        assert!(parse_event_line(r#""just a string""#).is_none());
    }

    #[test]
    fn discards_unparseable_lines() {
        assert!(parse_event_line("{not json").is_none());
        assert!(parse_event_line("").is_none());
    }
}
