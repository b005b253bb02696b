//! Breaker-protected backend.

use crate::breaker::AvailabilityBreaker;
use crate::GenerativeBackend;
use async_trait::async_trait;
use concierge_core::{GenerationOptions, HealthCheck, LlmResult, StructuredResponse};
use std::sync::Arc;

/// A backend whose every call passes through an `AvailabilityBreaker`.
#[derive(Clone)]
pub struct ProtectedBackend {
    inner: Arc<dyn GenerativeBackend>,
    breaker: Arc<AvailabilityBreaker>,
}

impl ProtectedBackend {
    pub fn new(inner: Arc<dyn GenerativeBackend>, breaker: Arc<AvailabilityBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &AvailabilityBreaker {
        &self.breaker
    }

    pub fn health(&self) -> HealthCheck {
        self.breaker
            .health()
            .with_metadata("provider", serde_json::json!(self.inner.name()))
    }
}

#[async_trait]
impl GenerativeBackend for ProtectedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate_text(
        &self,
        prompt: &str,
        system_instruction: &str,
        options: &GenerationOptions,
    ) -> LlmResult<String> {
        let result = self
            .breaker
            .execute(|| self.inner.generate_text(prompt, system_instruction, options))
            .await;
        if let Err(e) = &result {
            tracing::debug!(provider = self.inner.name(), error = %e, "generate_text failed");
        }
        result
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        system_instruction: &str,
        session_id: &str,
    ) -> LlmResult<StructuredResponse> {
        let result = self
            .breaker
            .execute(|| {
                self.inner
                    .generate_structured(prompt, system_instruction, session_id)
            })
            .await;
        if let Err(e) = &result {
            tracing::debug!(
                provider = self.inner.name(),
                session_id,
                error = %e,
                "generate_structured failed"
            );
        }
        result
    }
}

impl std::fmt::Debug for ProtectedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedBackend")
            .field("provider", &self.inner.name())
            .field("breaker", &self.breaker)
            .finish()
    }
}
