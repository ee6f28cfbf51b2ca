//! Defaults shared by the client, the prompt builder and the config layer.

pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com";

/// Completions path appended to the base URL.
pub const COMPLETIONS_ENDPOINT: &str = "v1/completions";

pub const DEFAULT_MODEL: &str = "text-chat-davinci-002-20221122";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_PRESENCE_PENALTY: f32 = 0.6;

pub const DEFAULT_MAX_MODEL_TOKENS: usize = 4096;
pub const DEFAULT_MAX_RESPONSE_TOKENS: usize = 1000;

pub const DEFAULT_USER_LABEL: &str = "User";
pub const DEFAULT_ASSISTANT_LABEL: &str = "ChatGPT";

/// Marks the end of each turn inside a built prompt.
pub const END_OF_TURN_MARKER: &str = "<|im_end|>";

/// What the tokenizer calls the end-of-turn marker for the default model.
pub const END_OF_TEXT_TOKEN: &str = "<|endoftext|>";

/// Payload of the terminal event on a completion stream.
pub const STREAM_DONE_SENTINEL: &str = "[DONE]";

/// How long the command line waits for a reply unless told otherwise.
pub const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_STORE_CAPACITY: usize = 10_000;
