pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod message;
pub mod prompt;
pub mod sse;
pub mod store;
pub mod tokens;
pub mod transport;
