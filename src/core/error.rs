use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// Everything that can go wrong while sending one turn.
///
/// Nothing is retried internally; every variant reaches the caller.
#[derive(Debug)]
pub enum ChatError {
    /// The client was constructed with a missing or invalid setting.
    Configuration(String),

    /// The completions endpoint answered with a non-2xx status.
    Transport {
        status: u16,
        status_text: String,
        /// Error summary pulled out of the response body, if any.
        body: String,
    },

    /// The request never produced a response (connect, TLS, body read).
    Request(reqwest::Error),

    /// A streamed delta was not valid JSON.
    StreamParse {
        payload: String,
        source: serde_json::Error,
    },

    /// A blocking response did not have the expected shape.
    Decode(String),

    /// The turn exceeded its timeout.
    Timeout(Duration),

    /// The caller's cancellation token fired.
    Cancelled,

    /// The message store failed to read or write.
    Store(String),

    /// The tokenizer tables could not be loaded.
    Tokenizer(String),
}

impl ChatError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ChatError::Transport { status, .. } => Some(*status),
            ChatError::Request(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ChatError::Timeout(_))
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Configuration(message) => write!(f, "Invalid configuration: {message}"),
            ChatError::Transport {
                status,
                status_text,
                body,
            } => {
                write!(f, "Completion request failed with status {status}")?;
                if !status_text.is_empty() {
                    write!(f, " {status_text}")?;
                }
                if !body.is_empty() {
                    write!(f, ": {body}")?;
                }
                Ok(())
            }
            ChatError::Request(err) => write!(f, "Completion request failed: {err}"),
            ChatError::StreamParse { source, .. } => {
                write!(f, "Unexpected completion stream event: {source}")
            }
            ChatError::Decode(message) => write!(f, "Unexpected completion response: {message}"),
            ChatError::Timeout(limit) => write!(
                f,
                "Timed out waiting for response after {}ms",
                limit.as_millis()
            ),
            ChatError::Cancelled => write!(f, "Request cancelled"),
            ChatError::Store(message) => write!(f, "Message store error: {message}"),
            ChatError::Tokenizer(message) => write!(f, "Failed to load tokenizer: {message}"),
        }
    }
}

impl StdError for ChatError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ChatError::Request(err) => Some(err),
            ChatError::StreamParse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Request(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_carry_status() {
        let err = ChatError::Transport {
            status: 429,
            status_text: "Too Many Requests".to_string(),
            body: "slow down".to_string(),
        };
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(
            err.to_string(),
            "Completion request failed with status 429 Too Many Requests: slow down"
        );
    }

    #[test]
    fn stream_parse_errors_expose_source() {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = ChatError::StreamParse {
            payload: "{oops".to_string(),
            source,
        };
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Unexpected completion stream event"));
    }

    #[test]
    fn timeout_reports_milliseconds() {
        let err = ChatError::Timeout(Duration::from_millis(10));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timed out waiting for response after 10ms");
    }
}
