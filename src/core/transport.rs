use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{CompletionRequest, CompletionResponse};
use crate::core::constants::{COMPLETIONS_ENDPOINT, STREAM_DONE_SENTINEL};
use crate::core::error::ChatError;
use crate::core::message::{ChatMessage, ProgressCallback};
use crate::core::sse::{sse_events, EventStream};
use crate::utils::url::construct_api_url;

/// Result of one blocking completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: Option<String>,
    pub text: String,
}

/// HTTP side of a turn: one POST to the completions endpoint, answered either
/// as a single JSON body or as an event stream.
#[derive(Clone)]
pub struct CompletionTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    debug: bool,
}

impl CompletionTransport {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, debug: bool) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            debug,
        }
    }

    pub fn endpoint(&self) -> String {
        construct_api_url(&self.base_url, COMPLETIONS_ENDPOINT)
    }

    /// Run the request in the mode `request.stream` asks for, writing the
    /// reply text into `reply`.
    ///
    /// Firing `cancel` drops the in-flight request, which closes the
    /// connection; the call then fails with [`ChatError::Cancelled`].
    pub async fn send(
        &self,
        request: &CompletionRequest<'_>,
        reply: &mut ChatMessage,
        on_progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<(), ChatError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            result = self.dispatch(request, reply, on_progress) => result,
        }
    }

    async fn dispatch(
        &self,
        request: &CompletionRequest<'_>,
        reply: &mut ChatMessage,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<(), ChatError> {
        if request.stream {
            let events = self.open_stream(request).await?;
            collect_stream(events, reply, on_progress).await
        } else {
            let completion = self.complete(request).await?;
            if let Some(id) = completion.id {
                reply.id = id;
            }
            reply.text = completion.text;
            Ok(())
        }
    }

    async fn post(&self, request: &CompletionRequest<'_>) -> Result<reqwest::Response, ChatError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        debug!(status = status.as_u16(), body = %error_text, "Completion request rejected");

        Err(ChatError::Transport {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body: summarize_error_body(&error_text),
        })
    }

    /// Blocking mode: one request, one JSON body.
    pub async fn complete(&self, request: &CompletionRequest<'_>) -> Result<Completion, ChatError> {
        let response = self.post(request).await?;
        let body = response.text().await?;
        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|err| ChatError::Decode(format!("{err}: {}", summarize_error_body(&body))))?;

        if self.debug {
            debug!(response = %body, "Completion response");
        }

        let text = parsed
            .first_text()
            .ok_or_else(|| ChatError::Decode("response contained no choices".to_string()))?;

        Ok(Completion {
            id: parsed.id.clone(),
            text: text.trim().to_string(),
        })
    }

    /// Streaming mode: the response body decoded into events.
    pub async fn open_stream(&self, request: &CompletionRequest<'_>) -> Result<EventStream, ChatError> {
        let response = self.post(request).await?;
        Ok(sse_events(response.bytes_stream()))
    }
}

/// Fold completion deltas into `reply` until the `[DONE]` event.
///
/// Each delta with at least one choice appends the first choice's text and
/// reports the partial reply through `on_progress`. The final text is
/// trimmed. A source that closes without `[DONE]` is a truncated reply and
/// fails with [`ChatError::Decode`].
pub async fn collect_stream(
    mut events: EventStream,
    reply: &mut ChatMessage,
    on_progress: Option<&ProgressCallback>,
) -> Result<(), ChatError> {
    while let Some(event) = events.next().await {
        let event = event?;
        let payload = event.data.as_str();

        if payload == STREAM_DONE_SENTINEL {
            reply.text = reply.text.trim().to_string();
            return Ok(());
        }

        let delta: CompletionResponse =
            serde_json::from_str(payload).map_err(|source| ChatError::StreamParse {
                payload: payload.to_string(),
                source,
            })?;

        let Some(choice) = delta.choices.first() else {
            continue;
        };

        if let Some(id) = delta.id.as_ref() {
            reply.id.clone_from(id);
        }
        if let Some(fragment) = choice.text.as_deref() {
            reply.text.push_str(fragment);
        }
        if let Some(callback) = on_progress {
            callback(reply);
        }
    }

    debug!(received = reply.text.len(), "Completion stream closed without a [DONE] event");
    Err(ChatError::Decode(format!(
        "stream closed before {STREAM_DONE_SENTINEL}"
    )))
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Reduce an error body to one line: the API's error message when the body
/// is JSON that carries one, otherwise the collapsed body text.
pub fn summarize_error_body(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value) {
            if !summary.is_empty() {
                return summary;
            }
        }
    }

    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::ChatMessage;
    use crate::core::sse::push_channel;
    use std::sync::{Arc, Mutex};

    fn pending() -> ChatMessage {
        ChatMessage::pending_reply("reply-1", "user-1", Some("conv".into()))
    }

    fn recording_callback() -> (ProgressCallback, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |partial: &ChatMessage| {
            sink.lock().unwrap().push(partial.text.clone());
        });
        (callback, seen)
    }

    #[tokio::test]
    async fn accumulates_deltas_until_done() {
        let (mut feed, events) = push_channel();
        feed.push(b"data: {\"choices\":[{\"text\":\"Hi\"}]}\n\n");
        feed.push(b"data: {\"choices\":[{\"text\":\" there\"}]}\n\n");
        feed.push(b"data: [DONE]\n\n");
        feed.close();

        let (callback, seen) = recording_callback();
        let mut reply = pending();
        collect_stream(events, &mut reply, Some(&callback))
            .await
            .unwrap();

        assert_eq!(reply.text, "Hi there");
        assert_eq!(reply.id, "reply-1");
        assert_eq!(*seen.lock().unwrap(), vec!["Hi", "Hi there"]);
    }

    #[tokio::test]
    async fn adopts_server_ids_and_skips_empty_choice_lists() {
        let (mut feed, events) = push_channel();
        feed.push(b"data: {\"id\":\"cmpl-1\",\"choices\":[]}\n\n");
        feed.push(b"data: {\"id\":\"cmpl-2\",\"choices\":[{\"text\":\"\\n\\nok \"}]}\n\n");
        feed.push(b"data: [DONE]\n\n");
        feed.close();

        let (callback, seen) = recording_callback();
        let mut reply = pending();
        collect_stream(events, &mut reply, Some(&callback))
            .await
            .unwrap();

        assert_eq!(reply.id, "cmpl-2");
        assert_eq!(reply.text, "ok");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_delta_aborts_the_stream() {
        let (mut feed, events) = push_channel();
        feed.push(b"data: {\"choices\":[{\"text\":\"Hi\"}]}\n\n");
        feed.push(b"data: {not json\n\n");
        feed.push(b"data: {\"choices\":[{\"text\":\" more\"}]}\n\n");
        feed.close();

        let (callback, seen) = recording_callback();
        let mut reply = pending();
        let err = collect_stream(events, &mut reply, Some(&callback))
            .await
            .unwrap_err();

        match err {
            ChatError::StreamParse { payload, .. } => assert_eq!(payload, "{not json"),
            other => panic!("expected stream parse error, got {other:?}"),
        }
        assert_eq!(*seen.lock().unwrap(), vec!["Hi"]);
    }

    #[tokio::test]
    async fn stream_closed_without_done_is_an_error() {
        let (mut feed, events) = push_channel();
        feed.push(b"data: {\"choices\":[{\"text\":\" partial \"}]}\n\n");
        feed.close();

        let mut reply = pending();
        let err = collect_stream(events, &mut reply, None).await.unwrap_err();
        match err {
            ChatError::Decode(message) => assert!(message.contains("[DONE]"), "{message}"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_without_events_is_an_error() {
        let (mut feed, events) = push_channel();
        feed.push(b"{\"id\":\"cmpl-1\",\"choices\":[{\"text\":\"Hi\"}]}");
        feed.close();

        let (callback, seen) = recording_callback();
        let mut reply = pending();
        let err = collect_stream(events, &mut reply, Some(&callback))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Decode(_)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn summarizes_json_error_bodies() {
        let raw = r#"{"error":{"message":"model   overloaded","type":"invalid_request_error"}}"#;
        assert_eq!(summarize_error_body(raw), "model overloaded");

        assert_eq!(summarize_error_body(r#"{"error":"bad key"}"#), "bad key");
        assert_eq!(summarize_error_body(r#"{"message":"nope"}"#), "nope");
    }

    #[test]
    fn summarizes_plain_bodies() {
        assert_eq!(summarize_error_body("  api\n failure  "), "api failure");
        assert_eq!(summarize_error_body(r#"{"status":"failed"}"#), r#"{"status":"failed"}"#);
        assert_eq!(summarize_error_body(""), "");
    }

    #[test]
    fn endpoint_joins_base_url() {
        let transport =
            CompletionTransport::new(reqwest::Client::new(), "https://api.example.com/", "k", false);
        assert_eq!(
            transport.endpoint(),
            "https://api.example.com/v1/completions"
        );
    }
}
