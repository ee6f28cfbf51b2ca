use chrono::{NaiveDate, Utc};
use tracing::{debug, warn};

use crate::core::error::ChatError;
use crate::core::message::Role;
use crate::core::store::MessageStore;
use crate::core::tokens::TokenCounter;

/// Token limits and labels that shape every prompt a client builds.
#[derive(Debug, Clone)]
pub struct PromptSettings {
    pub max_model_tokens: usize,
    pub max_response_tokens: usize,
    pub user_label: String,
    pub assistant_label: String,
    pub end_marker: String,
}

impl PromptSettings {
    /// Tokens left for the prompt once the response allowance is reserved.
    pub fn prompt_budget(&self) -> usize {
        self.max_model_tokens.saturating_sub(self.max_response_tokens)
    }

    fn label_for(&self, role: Role) -> &str {
        match role {
            Role::User => &self.user_label,
            Role::Assistant => &self.assistant_label,
        }
    }
}

/// Input for one [`PromptBuilder::build`] call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptRequest<'a> {
    pub message: &'a str,
    pub parent_message_id: Option<&'a str>,
    pub prompt_prefix: Option<&'a str>,
    pub prompt_suffix: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub text: String,
    pub num_tokens: usize,
    /// Response allowance, clamped to `1..=max_response_tokens`.
    pub max_tokens: usize,
}

/// Walks a chain of turns backwards from the parent, prepending each one to
/// the prompt until the next turn would exceed the token budget.
pub struct PromptBuilder<'a> {
    settings: &'a PromptSettings,
    counter: &'a TokenCounter,
    store: &'a dyn MessageStore,
    today: NaiveDate,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(
        settings: &'a PromptSettings,
        counter: &'a TokenCounter,
        store: &'a dyn MessageStore,
    ) -> Self {
        Self {
            settings,
            counter,
            store,
            today: Utc::now().date_naive(),
        }
    }

    /// Pin the date stamped into the default prefix.
    pub fn with_date(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn default_prefix(&self) -> String {
        format!(
            "You are {}, a large language model trained by OpenAI. You answer as concisely as possible for each response (e.g. don’t be verbose). It is very important that you answer as concisely as possible, so please remember this. If you are generating a list, do not have too many items. Keep the number of items short.\nCurrent date: {}\n\n",
            self.settings.assistant_label,
            self.today.format("%Y-%m-%d")
        )
    }

    pub fn default_suffix(&self) -> String {
        format!("\n\n{}:\n", self.settings.assistant_label)
    }

    pub async fn build(&self, request: PromptRequest<'_>) -> Result<BuiltPrompt, ChatError> {
        let settings = self.settings;
        let marker = settings.end_marker.as_str();
        let budget = settings.prompt_budget();

        let prefix = match request.prompt_prefix.filter(|prefix| !prefix.is_empty()) {
            Some(prefix) => prefix.to_string(),
            None => self.default_prefix(),
        };
        let suffix = match request.prompt_suffix.filter(|suffix| !suffix.is_empty()) {
            Some(suffix) => suffix.to_string(),
            None => self.default_suffix(),
        };

        let mut next_body = format!("{}:\n\n{}{}", settings.user_label, request.message, marker);
        let mut body: String;
        let mut accepted: Option<(String, usize)> = None;
        let mut parent_id = request.parent_message_id.map(str::to_string);
        let mut turns = 0usize;

        loop {
            let candidate = format!("{prefix}{next_body}{suffix}");
            let num_tokens = self.counter.count(&candidate);
            let within_budget = num_tokens <= budget;

            if accepted.is_some() && !within_budget {
                break;
            }
            if accepted.is_none() && !within_budget {
                // The new turn alone does not fit; it is sent anyway rather
                // than truncated or rejected.
                warn!(
                    tokens = num_tokens,
                    budget = budget,
                    "Prompt for the new turn alone exceeds the token budget"
                );
            }

            body = next_body;
            accepted = Some((candidate, num_tokens));
            turns += 1;

            if !within_budget {
                break;
            }

            let Some(id) = parent_id.take() else {
                break;
            };
            let Some(parent) = self.store.get(&id).await? else {
                debug!(parent_message_id = %id, "Parent message not found, stopping history walk");
                break;
            };

            next_body = format!(
                "{}:\n\n{}{}\n\n{}",
                settings.label_for(parent.role),
                parent.text,
                marker,
                body
            );
            parent_id = parent.parent_message_id;
        }

        let (text, num_tokens) = accepted.unwrap_or_default();
        let max_tokens = settings
            .max_model_tokens
            .saturating_sub(num_tokens)
            .min(settings.max_response_tokens)
            .max(1);

        debug!(
            turns,
            tokens = num_tokens,
            max_tokens,
            "Built completion prompt"
        );

        Ok(BuiltPrompt {
            text,
            num_tokens,
            max_tokens,
        })
    }
}
