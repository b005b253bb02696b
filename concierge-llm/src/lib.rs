//! Concierge LLM - Generative Backend Gateway
//!
//! The engine reasons through a `GenerativeBackend`. Domain code never holds a
//! raw backend: it holds a `ProtectedBackend`, which routes every call through
//! the process-wide `AvailabilityBreaker`.

pub mod breaker;
pub mod decode;
pub mod protected;
pub mod providers;

pub use breaker::{AvailabilityBreaker, BreakerPermit};
pub use decode::{decode_json, DecodeError};
pub use protected::ProtectedBackend;
pub use providers::{AnthropicBackend, AnthropicClient};

use async_trait::async_trait;
use concierge_core::{GenerationOptions, LlmResult, StructuredResponse};

/// A generative-language backend.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Provider name, used in logs and errors.
    fn name(&self) -> &str;

    /// Free-text generation.
    async fn generate_text(
        &self,
        prompt: &str,
        system_instruction: &str,
        options: &GenerationOptions,
    ) -> LlmResult<String>;

    /// Tool-calling generation for a conversation session.
    async fn generate_structured(
        &self,
        prompt: &str,
        system_instruction: &str,
        session_id: &str,
    ) -> LlmResult<StructuredResponse>;
}
