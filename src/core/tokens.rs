use std::fmt;
use std::sync::Arc;

use tiktoken_rs::CoreBPE;
use tracing::debug;

use crate::core::constants::{DEFAULT_MODEL, END_OF_TEXT_TOKEN};
use crate::core::error::ChatError;

/// Counts prompt tokens the way the completions server will.
///
/// Uses the BPE that `tiktoken-rs` associates with the model, falling back to
/// the GPT-3 `r50k_base` encoding for models it does not know (including the
/// default chat model). Cloning shares the loaded tables.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Arc<CoreBPE>,
    marker_rewrite: Option<String>,
}

impl TokenCounter {
    pub fn for_model(model: &str, end_marker: &str) -> Result<Self, ChatError> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => {
                debug!(model = %model, "No dedicated tokenizer for model, using r50k_base");
                tiktoken_rs::r50k_base().map_err(|err| ChatError::Tokenizer(err.to_string()))?
            }
        };

        // The default model sees the end-of-turn marker as its end-of-text token.
        let marker_rewrite =
            (model == DEFAULT_MODEL && !end_marker.is_empty()).then(|| end_marker.to_string());

        Ok(Self {
            bpe: Arc::new(bpe),
            marker_rewrite,
        })
    }

    pub fn count(&self, text: &str) -> usize {
        match &self.marker_rewrite {
            Some(marker) if text.contains(marker.as_str()) => {
                let rewritten = text.replace(marker.as_str(), END_OF_TEXT_TOKEN);
                self.bpe.encode_with_special_tokens(&rewritten).len()
            }
            _ => self.bpe.encode_with_special_tokens(text).len(),
        }
    }
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounter")
            .field("marker_rewrite", &self.marker_rewrite)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::END_OF_TURN_MARKER;

    #[test]
    fn counts_plain_text() {
        let counter = TokenCounter::for_model(DEFAULT_MODEL, END_OF_TURN_MARKER).unwrap();
        assert_eq!(counter.count(""), 0);
        assert!(counter.count("hello world") >= 2);
    }

    #[test]
    fn default_model_counts_marker_as_one_token() {
        let counter = TokenCounter::for_model(DEFAULT_MODEL, END_OF_TURN_MARKER).unwrap();
        let bare = counter.count("hello");
        let marked = counter.count("hello<|im_end|>");
        assert_eq!(marked, bare + 1);
    }

    #[test]
    fn other_models_count_marker_literally() {
        let counter = TokenCounter::for_model("my-custom-model", END_OF_TURN_MARKER).unwrap();
        let bare = counter.count("hello");
        let marked = counter.count("hello<|im_end|>");
        assert!(marked > bare + 1);
    }

    #[test]
    fn counting_is_deterministic() {
        let counter = TokenCounter::for_model(DEFAULT_MODEL, END_OF_TURN_MARKER).unwrap();
        let text = "User:\n\nWhat is the capital of France?<|im_end|>";
        assert_eq!(counter.count(text), counter.count(text));
    }
}
