//! `parley set` / `parley unset`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::core::config::data::Config;
use crate::core::config::io::ConfigError;

/// Keys accepted by `set`/`unset`. Underscored spellings are accepted too.
pub const SETTING_KEYS: [&str; 10] = [
    "api-base-url",
    "model",
    "temperature",
    "presence-penalty",
    "max-model-tokens",
    "max-response-tokens",
    "user-label",
    "assistant-label",
    "end-of-turn-marker",
    "debug",
];

#[derive(Debug)]
pub enum SettingError {
    UnknownKey(String),
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    Config(ConfigError),
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::UnknownKey(key) => write!(
                f,
                "Unknown config key: {key} (expected one of: {})",
                SETTING_KEYS.join(", ")
            ),
            SettingError::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "Invalid value for {key}: {value} (expected {expected})"),
            SettingError::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for SettingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for SettingError {
    fn from(err: ConfigError) -> Self {
        SettingError::Config(err)
    }
}

fn canonical_key(key: &str) -> Result<&'static str, SettingError> {
    let normalized = key.trim().to_ascii_lowercase().replace('_', "-");
    SETTING_KEYS
        .iter()
        .copied()
        .find(|candidate| *candidate == normalized)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))
}

fn parse_value<T: FromStr>(
    key: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, SettingError> {
    value.trim().parse().map_err(|_| SettingError::InvalidValue {
        key,
        value: value.to_string(),
        expected,
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, SettingError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(SettingError::InvalidValue {
            key,
            value: value.to_string(),
            expected: "on or off",
        }),
    }
}

/// Set `key` to `value` on `config`, returning the confirmation message.
pub fn apply_set(config: &mut Config, key: &str, value: &str) -> Result<String, SettingError> {
    let key = canonical_key(key)?;
    let text = value.trim().to_string();

    match key {
        "api-base-url" => config.api_base_url = Some(text.clone()),
        "model" => config.model = Some(text.clone()),
        "temperature" => {
            config.temperature = Some(parse_value(key, value, "a number between 0 and 2")?)
        }
        "presence-penalty" => {
            config.presence_penalty = Some(parse_value(key, value, "a number between -2 and 2")?)
        }
        "max-model-tokens" => {
            config.max_model_tokens = Some(parse_value(key, value, "a positive integer")?)
        }
        "max-response-tokens" => {
            config.max_response_tokens = Some(parse_value(key, value, "a positive integer")?)
        }
        "user-label" => config.user_label = Some(text.clone()),
        "assistant-label" => config.assistant_label = Some(text.clone()),
        "end-of-turn-marker" if text.is_empty() => {
            return Err(SettingError::InvalidValue {
                key,
                value: value.to_string(),
                expected: "a non-empty marker",
            })
        }
        "end-of-turn-marker" => config.end_of_turn_marker = Some(text.clone()),
        "debug" => config.debug = Some(parse_bool(key, value)?),
        _ => return Err(SettingError::UnknownKey(key.to_string())),
    }

    Ok(format!("✅ Set {key} to: {text}"))
}

pub fn apply_unset(config: &mut Config, key: &str) -> Result<String, SettingError> {
    let key = canonical_key(key)?;

    match key {
        "api-base-url" => config.api_base_url = None,
        "model" => config.model = None,
        "temperature" => config.temperature = None,
        "presence-penalty" => config.presence_penalty = None,
        "max-model-tokens" => config.max_model_tokens = None,
        "max-response-tokens" => config.max_response_tokens = None,
        "user-label" => config.user_label = None,
        "assistant-label" => config.assistant_label = None,
        "end-of-turn-marker" => config.end_of_turn_marker = None,
        "debug" => config.debug = None,
        _ => return Err(SettingError::UnknownKey(key.to_string())),
    }

    Ok(format!("✅ Unset {key}"))
}

/// `parley set [key [value...]]`. Without a value, prints the current
/// configuration instead.
pub fn run_set(path: &Path, key: Option<&str>, value: &[String]) -> Result<(), SettingError> {
    let mut config = Config::load_from_path(path)?;

    let Some(key) = key.filter(|_| !value.is_empty()) else {
        if let Some(key) = key {
            canonical_key(key)?;
        }
        config.print_all();
        return Ok(());
    };

    let message = apply_set(&mut config, key, &value.join(" "))?;
    config.save_to_path(path)?;
    println!("{message}");
    Ok(())
}

pub fn run_unset(path: &Path, key: &str) -> Result<(), SettingError> {
    let mut config = Config::load_from_path(path)?;
    let message = apply_unset(&mut config, key)?;
    config.save_to_path(path)?;
    println!("{message}");
    Ok(())
}
