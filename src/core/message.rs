use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// One conversational turn.
///
/// `parent_message_id` points at the preceding turn in the chain; it is a
/// plain id, resolved through a [`crate::core::store::MessageStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatMessage {
    pub fn user(
        id: impl Into<String>,
        text: impl Into<String>,
        parent_message_id: Option<String>,
        conversation_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            role: Role::User,
            parent_message_id,
            conversation_id,
        }
    }

    /// An empty assistant reply to `parent_message_id`, filled in as the
    /// completion arrives.
    pub fn pending_reply(
        id: impl Into<String>,
        parent_message_id: impl Into<String>,
        conversation_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: String::new(),
            role: Role::Assistant,
            parent_message_id: Some(parent_message_id.into()),
            conversation_id,
        }
    }
}

/// Invoked with the partial reply each time a streamed fragment arrives.
pub type ProgressCallback = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

/// Per-request options for [`crate::core::client::ConversationClient::send_message`].
#[derive(Clone, Default)]
pub struct SendMessageOptions {
    pub conversation_id: Option<String>,
    pub parent_message_id: Option<String>,
    pub message_id: Option<String>,
    /// Defaults to streaming iff `on_progress` is set.
    pub stream: Option<bool>,
    pub prompt_prefix: Option<String>,
    pub prompt_suffix: Option<String>,
    pub timeout: Option<Duration>,
    pub on_progress: Option<ProgressCallback>,
    pub cancel_token: Option<CancellationToken>,
}

impl SendMessageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_parent_message_id(mut self, id: impl Into<String>) -> Self {
        self.parent_message_id = Some(id.into());
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_prompt_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prompt_prefix = Some(prefix.into());
        self
    }

    pub fn with_prompt_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.prompt_suffix = Some(suffix.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn should_stream(&self) -> bool {
        self.stream.unwrap_or(self.on_progress.is_some())
    }
}

impl fmt::Debug for SendMessageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendMessageOptions")
            .field("conversation_id", &self.conversation_id)
            .field("parent_message_id", &self.parent_message_id)
            .field("message_id", &self.message_id)
            .field("stream", &self.stream)
            .field("prompt_prefix", &self.prompt_prefix)
            .field("prompt_suffix", &self.prompt_suffix)
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancel_token", &self.cancel_token.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_round_trip_through_strings() {
        assert_eq!(Role::try_from("user"), Ok(Role::User));
        assert_eq!(Role::try_from("assistant"), Ok(Role::Assistant));
        assert!(Role::try_from("system").is_err());
        assert_eq!(String::from(Role::Assistant), "assistant");
    }

    #[test]
    fn messages_serialize_with_camel_case_ids() {
        let message = ChatMessage::user("m1", "hello", Some("p0".into()), Some("c1".into()));
        let value = serde_json::to_value(&message).expect("serialize message");
        assert_eq!(value["role"], "user");
        assert_eq!(value["parentMessageId"], "p0");
        assert_eq!(value["conversationId"], "c1");

        let root = ChatMessage::user("m0", "first", None, None);
        let value = serde_json::to_value(&root).expect("serialize root");
        assert!(value.get("parentMessageId").is_none());
    }

    #[test]
    fn stream_defaults_to_presence_of_progress_callback() {
        assert!(!SendMessageOptions::new().should_stream());
        assert!(SendMessageOptions::new()
            .with_progress(|_| {})
            .should_stream());
        assert!(!SendMessageOptions::new()
            .with_progress(|_| {})
            .with_stream(false)
            .should_stream());
        assert!(SendMessageOptions::new().with_stream(true).should_stream());
    }

    #[test]
    fn pending_reply_links_to_parent() {
        let reply = ChatMessage::pending_reply("a1", "u1", Some("c1".into()));
        assert_eq!(reply.role, Role::Assistant);
        assert!(reply.text.is_empty());
        assert_eq!(reply.parent_message_id.as_deref(), Some("u1"));
    }
}
