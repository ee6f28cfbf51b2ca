//! The conversational front door: one `send_message` call per turn.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{CompletionParams, CompletionRequest};
use crate::core::config::data::Config;
use crate::core::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_ASSISTANT_LABEL, DEFAULT_MAX_MODEL_TOKENS,
    DEFAULT_MAX_RESPONSE_TOKENS, DEFAULT_USER_LABEL, END_OF_TURN_MARKER,
};
use crate::core::error::ChatError;
use crate::core::ids::{IdProvider, UuidIdProvider};
use crate::core::message::{ChatMessage, SendMessageOptions};
use crate::core::prompt::{PromptBuilder, PromptRequest, PromptSettings};
use crate::core::store::{LruMessageStore, MessageStore};
use crate::core::tokens::TokenCounter;
use crate::core::transport::CompletionTransport;

/// Sends turns to a completions endpoint and keeps the chain in a
/// [`MessageStore`]. Cheap to share behind an `Arc`; independent chains may
/// be driven concurrently.
pub struct ConversationClient {
    transport: CompletionTransport,
    params: CompletionParams,
    settings: PromptSettings,
    counter: TokenCounter,
    store: Arc<dyn MessageStore>,
    ids: Arc<dyn IdProvider>,
    debug: bool,
}

impl ConversationClient {
    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    pub fn from_config(config: &Config, api_key: impl Into<String>) -> Result<Self, ChatError> {
        Self::builder(api_key).with_config(config).build()
    }

    pub fn params(&self) -> &CompletionParams {
        &self.params
    }

    pub fn settings(&self) -> &PromptSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub async fn message(&self, id: &str) -> Result<Option<ChatMessage>, ChatError> {
        self.store.get(id).await
    }

    /// Send `text` as a new user turn and wait for the assistant's reply.
    ///
    /// The user turn is stored before the request goes out. The reply is
    /// stored only once it is complete, so a failed, timed-out or cancelled
    /// turn leaves no assistant message behind.
    pub async fn send_message(
        &self,
        text: &str,
        options: SendMessageOptions,
    ) -> Result<ChatMessage, ChatError> {
        let stream = options.should_stream();
        let SendMessageOptions {
            conversation_id,
            parent_message_id,
            message_id,
            prompt_prefix,
            prompt_suffix,
            timeout,
            on_progress,
            cancel_token,
            ..
        } = options;

        let conversation_id = conversation_id.unwrap_or_else(|| self.ids.next_id());
        let message_id = message_id.unwrap_or_else(|| self.ids.next_id());

        let user_message = ChatMessage::user(
            message_id.as_str(),
            text,
            parent_message_id.clone(),
            Some(conversation_id.clone()),
        );
        self.store.set(&message_id, user_message).await?;

        let prompt = PromptBuilder::new(&self.settings, &self.counter, self.store.as_ref())
            .build(PromptRequest {
                message: text,
                parent_message_id: parent_message_id.as_deref(),
                prompt_prefix: prompt_prefix.as_deref(),
                prompt_suffix: prompt_suffix.as_deref(),
            })
            .await?;

        let mut reply =
            ChatMessage::pending_reply(self.ids.next_id(), message_id.as_str(), Some(conversation_id));

        let request = CompletionRequest {
            max_tokens: prompt.max_tokens,
            params: &self.params,
            prompt: &prompt.text,
            stream,
        };

        if self.debug {
            if let Ok(body) = serde_json::to_string(&request) {
                debug!(tokens = prompt.num_tokens, body = %body, "Sending completion request");
            }
        }

        let cancel = cancel_token
            .map(|token| token.child_token())
            .unwrap_or_default();

        let outcome = {
            let send = self
                .transport
                .send(&request, &mut reply, on_progress.as_ref(), &cancel);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, send).await {
                    Ok(result) => result,
                    Err(_) => {
                        cancel.cancel();
                        Err(ChatError::Timeout(limit))
                    }
                },
                None => send.await,
            }
        };

        if let Err(err) = outcome {
            debug!(message_id = %message_id, error = %err, "Turn failed");
            return Err(err);
        }

        self.store.set(&reply.id, reply.clone()).await?;
        Ok(reply)
    }
}

impl fmt::Debug for ConversationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationClient")
            .field("endpoint", &self.transport.endpoint())
            .field("params", &self.params)
            .field("settings", &self.settings)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

pub struct ClientBuilder {
    api_key: String,
    api_base_url: String,
    debug: bool,
    params: CompletionParams,
    custom_stop: bool,
    end_marker: String,
    max_model_tokens: usize,
    max_response_tokens: usize,
    user_label: String,
    assistant_label: String,
    store: Option<Arc<dyn MessageStore>>,
    ids: Option<Arc<dyn IdProvider>>,
    http_client: Option<reqwest::Client>,
}

impl ClientBuilder {
    fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            debug: false,
            params: CompletionParams::default(),
            custom_stop: false,
            end_marker: END_OF_TURN_MARKER.to_string(),
            max_model_tokens: DEFAULT_MAX_MODEL_TOKENS,
            max_response_tokens: DEFAULT_MAX_RESPONSE_TOKENS,
            user_label: DEFAULT_USER_LABEL.to_string(),
            assistant_label: DEFAULT_ASSISTANT_LABEL.to_string(),
            store: None,
            ids: None,
            http_client: None,
        }
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replace every completion parameter at once, stop list included.
    pub fn completion_params(mut self, params: CompletionParams) -> Self {
        self.params = params;
        self.custom_stop = true;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.params.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.params.temperature = Some(temperature);
        self
    }

    pub fn presence_penalty(mut self, presence_penalty: f32) -> Self {
        self.params.presence_penalty = Some(presence_penalty);
        self
    }

    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.params.stop = Some(stop);
        self.custom_stop = true;
        self
    }

    /// Sequence that closes each turn in the prompt. Unless a stop list was
    /// set explicitly, it is also the only stop sequence.
    pub fn end_of_turn_marker(mut self, marker: impl Into<String>) -> Self {
        self.end_marker = marker.into();
        self
    }

    /// Pass an extra field through to the request body. Names the client
    /// sets itself (`prompt`, `stream`, `max_tokens`) are ignored.
    pub fn completion_param(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !self.params.insert_extra(key.as_str(), value) {
            debug!(key = %key, "Ignoring reserved completion parameter");
        }
        self
    }

    pub fn max_model_tokens(mut self, tokens: usize) -> Self {
        self.max_model_tokens = tokens;
        self
    }

    pub fn max_response_tokens(mut self, tokens: usize) -> Self {
        self.max_response_tokens = tokens;
        self
    }

    pub fn user_label(mut self, label: impl Into<String>) -> Self {
        self.user_label = label.into();
        self
    }

    pub fn assistant_label(mut self, label: impl Into<String>) -> Self {
        self.assistant_label = label.into();
        self
    }

    pub fn message_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn id_provider(mut self, ids: Arc<dyn IdProvider>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Layer the values set in a config file over the current settings.
    pub fn with_config(mut self, config: &Config) -> Self {
        if let Some(url) = &config.api_base_url {
            self.api_base_url.clone_from(url);
        }
        if let Some(model) = &config.model {
            self.params.model.clone_from(model);
        }
        if let Some(temperature) = config.temperature {
            self.params.temperature = Some(temperature);
        }
        if let Some(presence_penalty) = config.presence_penalty {
            self.params.presence_penalty = Some(presence_penalty);
        }
        if let Some(tokens) = config.max_model_tokens {
            self.max_model_tokens = tokens;
        }
        if let Some(tokens) = config.max_response_tokens {
            self.max_response_tokens = tokens;
        }
        if let Some(label) = &config.user_label {
            self.user_label.clone_from(label);
        }
        if let Some(label) = &config.assistant_label {
            self.assistant_label.clone_from(label);
        }
        if let Some(marker) = &config.end_of_turn_marker {
            self.end_marker.clone_from(marker);
        }
        if let Some(debug) = config.debug {
            self.debug = debug;
        }
        self
    }

    pub fn build(mut self) -> Result<ConversationClient, ChatError> {
        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            return Err(ChatError::Configuration(
                "an API key is required (set OPENAI_API_KEY)".to_string(),
            ));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ChatError::Configuration(
                "api_base_url must not be empty".to_string(),
            ));
        }
        if self.params.model.trim().is_empty() {
            return Err(ChatError::Configuration("model must not be empty".to_string()));
        }
        if self.max_response_tokens >= self.max_model_tokens {
            return Err(ChatError::Configuration(format!(
                "max_response_tokens ({}) must be smaller than max_model_tokens ({})",
                self.max_response_tokens, self.max_model_tokens
            )));
        }

        if self.end_marker.is_empty() {
            return Err(ChatError::Configuration(
                "end_of_turn_marker must not be empty".to_string(),
            ));
        }
        if !self.custom_stop {
            self.params.stop = Some(vec![self.end_marker.clone()]);
        }

        let counter = TokenCounter::for_model(&self.params.model, &self.end_marker)?;
        let http_client = self.http_client.unwrap_or_default();
        let transport =
            CompletionTransport::new(http_client, &self.api_base_url, api_key, self.debug);

        Ok(ConversationClient {
            transport,
            params: self.params,
            settings: PromptSettings {
                max_model_tokens: self.max_model_tokens,
                max_response_tokens: self.max_response_tokens,
                user_label: self.user_label,
                assistant_label: self.assistant_label,
                end_marker: self.end_marker,
            },
            counter,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(LruMessageStore::default())),
            ids: self.ids.unwrap_or_else(|| Arc::new(UuidIdProvider)),
            debug: self.debug,
        })
    }
}
