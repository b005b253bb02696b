//! Messages API transport.
//!
//! Requests are paced: at most `requests_per_minute` are in flight and
//! consecutive sends are spaced by `60s / requests_per_minute`.

use super::types::ApiError;
use concierge_core::{LlmError, LlmResult};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

const PROVIDER: &str = "anthropic";
const API_ROOT: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Spaces out sends and caps concurrency.
struct Pacer {
    slots: Arc<Semaphore>,
    spacing: Duration,
    next_send: Mutex<Option<Instant>>,
}

impl Pacer {
    fn per_minute(requests: u32) -> Self {
        let requests = requests.max(1);
        Self {
            slots: Arc::new(Semaphore::new(requests as usize)),
            spacing: Duration::from_millis((60_000 / u64::from(requests)).max(10)),
            next_send: Mutex::new(None),
        }
    }

    /// Wait for this caller's send slot.
    async fn wait_turn(&self) {
        let wake_at = {
            let mut next = self.next_send.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |at| at.max(now));
            *next = Some(slot + self.spacing);
            slot
        };
        tokio::time::sleep_until(wake_at).await;
    }
}

/// Authenticated client for the Messages API.
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    base_url: String,
    pacer: Pacer,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, requests_per_minute: u32) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: API_ROOT.to_string(),
            pacer: Pacer::per_minute(requests_per_minute),
        }
    }

    /// Point the client at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// POST `body` to `endpoint` and decode the JSON reply.
    pub async fn post<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> LlmResult<Res> {
        let _slot = self
            .pacer
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| transport_error(format!("pacer closed: {}", e)))?;
        self.pacer.wait_turn().await;

        let response = self
            .http
            .post(format!("{}/{}", self.base_url, endpoint))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "anthropic request rejected");
            return Err(classify_status(status, &body));
        }

        response.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        })
    }
}

fn transport_error(message: String) -> LlmError {
    LlmError::RequestFailed {
        provider: PROVIDER.to_string(),
        status: 0,
        message,
    }
}

/// Map a non-success reply onto the gateway's error kinds.
fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let provider = PROVIDER.to_string();
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited { provider },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::InvalidApiKey { provider },
        _ => LlmError::RequestFailed {
            provider,
            status: i32::from(status.as_u16()),
            message: serde_json::from_str::<ApiError>(body)
                .map(|api| api.error.message)
                .unwrap_or_else(|_| body.to_string()),
        },
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("spacing", &self.pacer.spacing)
            .finish_non_exhaustive()
    }
}
