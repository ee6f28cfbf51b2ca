//! Parley is a conversational client for text completion endpoints.
//!
//! Each turn is stored as a [`core::message::ChatMessage`] linked to its
//! parent, so a conversation is a chain that can be walked backwards. The
//! crate is organized in a few layers:
//! - [`core`] owns the conversation logic: the message store, token counting,
//!   prompt building, the completion transport with its event-stream parser,
//!   and [`core::client::ConversationClient`], which ties them together.
//! - [`api`] defines the completion request and response payloads.
//! - [`cli`] is the `parley` binary's command line: one-shot `say`, an
//!   interactive chat loop, and config editing.
//! - [`utils`] holds URL helpers and transcript logging.
//!
//! ```no_run
//! use parley::core::client::ConversationClient;
//! use parley::core::message::SendMessageOptions;
//!
//! # async fn demo() -> Result<(), parley::core::error::ChatError> {
//! let client = ConversationClient::builder(std::env::var("OPENAI_API_KEY").unwrap_or_default())
//!     .build()?;
//! let first = client
//!     .send_message("Name a prime number.", SendMessageOptions::new())
//!     .await?;
//! let follow_up = client
//!     .send_message(
//!         "And the next one?",
//!         SendMessageOptions::new()
//!             .with_conversation_id(first.conversation_id.clone().unwrap_or_default())
//!             .with_parent_message_id(first.id.clone())
//!             .with_progress(|partial| eprint!("\r{}", partial.text)),
//!     )
//!     .await?;
//! println!("{}", follow_up.text);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
