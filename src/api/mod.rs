use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::constants::{
    DEFAULT_MODEL, DEFAULT_PRESENCE_PENALTY, DEFAULT_TEMPERATURE, END_OF_TURN_MARKER,
};

/// Request fields that the client owns; overrides with these names are dropped.
const RESERVED_FIELDS: [&str; 3] = ["prompt", "stream", "max_tokens"];

/// Completion parameters sent with every request from one client.
///
/// The named fields cover what the client sets by default. Anything else the
/// completions endpoint accepts (`top_p`, `frequency_penalty`, `logit_bias`,
/// `user`, ...) rides along in `extra` and is flattened into the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(DEFAULT_TEMPERATURE),
            presence_penalty: Some(DEFAULT_PRESENCE_PENALTY),
            stop: Some(vec![END_OF_TURN_MARKER.to_string()]),
            extra: Map::new(),
        }
    }
}

impl CompletionParams {
    /// Add a pass-through field. Returns `false` when the name is reserved
    /// for the client (`prompt`, `stream`, `max_tokens`).
    pub fn insert_extra(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if RESERVED_FIELDS.contains(&key.as_str()) {
            return false;
        }
        self.extra.insert(key, value);
        true
    }
}

#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub max_tokens: usize,
    #[serde(flatten)]
    pub params: &'a CompletionParams,
    pub prompt: &'a str,
    pub stream: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Body of a blocking response, and of each streamed delta.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub created: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<CompletionUsage>,
}

impl CompletionResponse {
    pub fn first_text(&self) -> Option<&str> {
        self.choices.first().and_then(|choice| choice.text.as_deref())
    }
}
