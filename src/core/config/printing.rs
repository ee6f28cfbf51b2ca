use crate::core::config::data::Config;
use crate::core::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_ASSISTANT_LABEL, DEFAULT_MAX_MODEL_TOKENS,
    DEFAULT_MAX_RESPONSE_TOKENS, DEFAULT_MODEL, DEFAULT_PRESENCE_PENALTY, DEFAULT_TEMPERATURE,
    DEFAULT_USER_LABEL, END_OF_TURN_MARKER,
};

fn line<T: std::fmt::Display>(key: &str, value: Option<T>, default: impl std::fmt::Display) -> String {
    match value {
        Some(value) => format!("  {key}: {value}"),
        None => format!("  {key}: (unset, default {default})"),
    }
}

impl Config {
    /// One line per key, showing the default for unset keys.
    pub fn describe(&self) -> Vec<String> {
        vec![
            line(
                "api-base-url",
                self.api_base_url.as_deref(),
                DEFAULT_API_BASE_URL,
            ),
            line("model", self.model.as_deref(), DEFAULT_MODEL),
            line("temperature", self.temperature, DEFAULT_TEMPERATURE),
            line(
                "presence-penalty",
                self.presence_penalty,
                DEFAULT_PRESENCE_PENALTY,
            ),
            line(
                "max-model-tokens",
                self.max_model_tokens,
                DEFAULT_MAX_MODEL_TOKENS,
            ),
            line(
                "max-response-tokens",
                self.max_response_tokens,
                DEFAULT_MAX_RESPONSE_TOKENS,
            ),
            line("user-label", self.user_label.as_deref(), DEFAULT_USER_LABEL),
            line(
                "assistant-label",
                self.assistant_label.as_deref(),
                DEFAULT_ASSISTANT_LABEL,
            ),
            line(
                "end-of-turn-marker",
                self.end_of_turn_marker.as_deref(),
                END_OF_TURN_MARKER,
            ),
            match self.debug {
                Some(true) => "  debug: on".to_string(),
                Some(false) => "  debug: off".to_string(),
                None => "  debug: (unset, default off)".to_string(),
            },
        ]
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        for line in self.describe() {
            println!("{line}");
        }
    }
}
