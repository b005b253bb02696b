//! Generative backend providers.

pub mod anthropic;

pub use anthropic::{AnthropicBackend, AnthropicClient};
