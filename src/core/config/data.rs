use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of `config.toml`. Every key is optional; unset keys fall back to
/// the client defaults. The API key is never stored here.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the completions server, e.g. `https://api.openai.com`
    pub api_base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub presence_penalty: Option<f32>,
    /// Context window of the model, prompt and response together
    pub max_model_tokens: Option<usize>,
    /// Tokens reserved for the reply
    pub max_response_tokens: Option<usize>,
    pub user_label: Option<String>,
    pub assistant_label: Option<String>,
    /// Closes each turn in the prompt and stops generation
    pub end_of_turn_marker: Option<String>,
    /// Log request bodies and responses at debug level
    pub debug: Option<bool>,
}

/// Get a user-friendly display string for a path, using `~` for the home
/// directory on Unix-like systems.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
