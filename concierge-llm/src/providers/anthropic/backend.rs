//! Anthropic (Claude) generative backend.

use super::client::AnthropicClient;
use super::types::{Message, MessageRequest, MessageResponse, RequestMetadata};
use crate::decode::decode_json;
use crate::GenerativeBackend;
use async_trait::async_trait;
use concierge_core::{GenerationOptions, LlmError, LlmResult, StructuredResponse};

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Appended to every structured call so the reply decodes as a `StructuredResponse`.
const STRUCTURED_FORMAT: &str = "Respond with ONLY a JSON object of the form \
    {\"tool_calls\": [{\"name\": \"...\", \"parameters\": {...}}], \"message\": \"...\"}. \
    Use an empty tool_calls array when no tool applies.";

/// Anthropic backend using the Messages API.
pub struct AnthropicBackend {
    client: AnthropicClient,
    model: String,
    structured_max_tokens: u32,
}

impl AnthropicBackend {
    /// # Arguments
    /// * `api_key` - Anthropic API key
    /// * `model` - Model name (e.g., "claude-3-5-sonnet-20241022")
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_client(AnthropicClient::new(api_key, 50), model)
    }

    pub fn with_default_model(api_key: impl Into<String>) -> Self {
        Self::new(api_key, DEFAULT_MODEL)
    }

    pub fn with_client(client: AnthropicClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            structured_max_tokens: 1024,
        }
    }
}

#[async_trait]
impl GenerativeBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate_text(
        &self,
        prompt: &str,
        system_instruction: &str,
        options: &GenerationOptions,
    ) -> LlmResult<String> {
        let request = MessageRequest {
            model: self.model.clone(),
            system: Some(system_instruction.to_string()),
            messages: vec![Message::user(prompt)],
            max_tokens: options.max_tokens,
            temperature: Some(options.temperature),
            metadata: None,
        };

        let response: MessageResponse = self.client.post("messages", &request).await?;
        tracing::debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "anthropic text generation complete"
        );
        Ok(response.text())
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        system_instruction: &str,
        session_id: &str,
    ) -> LlmResult<StructuredResponse> {
        let request = MessageRequest {
            model: self.model.clone(),
            system: Some(format!("{}\n\n{}", system_instruction, STRUCTURED_FORMAT)),
            messages: vec![Message::user(prompt)],
            max_tokens: self.structured_max_tokens,
            temperature: Some(0.0),
            metadata: Some(RequestMetadata {
                user_id: session_id.to_string(),
            }),
        };

        let response: MessageResponse = self.client.post("messages", &request).await?;
        decode_json(&response.text()).map_err(|e| LlmError::InvalidResponse {
            provider: "anthropic".to_string(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("model", &self.model)
            .field("client", &self.client)
            .finish()
    }
}
