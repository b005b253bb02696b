//! Anthropic (Claude) provider implementation

pub mod backend;
pub mod client;
pub mod types;

pub use backend::AnthropicBackend;
pub use client::AnthropicClient;
