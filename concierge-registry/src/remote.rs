//! Capability served over HTTP.
//!
//! The endpoint receives `POST {"operation": "<name>", "parameters": {...}}`
//! and answers with a `ToolResult` JSON body.

use crate::Capability;
use async_trait::async_trait;
use concierge_core::{
    AuthToken, CapabilityError, CapabilityId, CapabilityResult, OperationDescriptor,
    RemoteCapabilityConfig, ToolResult,
};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct InvokeRequest<'a> {
    operation: &'a str,
    parameters: &'a Value,
}

/// Remote capability adapter.
pub struct HttpCapability {
    name: String,
    endpoint: String,
    client: Client,
    operations: Vec<OperationDescriptor>,
    /// Used when the caller supplies no user credential.
    service_token: Option<AuthToken>,
}

impl HttpCapability {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        operations: Vec<OperationDescriptor>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client: Client::new(),
            operations,
            service_token: None,
        }
    }

    pub fn with_service_token(mut self, token: AuthToken) -> Self {
        self.service_token = Some(token);
        self
    }

    /// Build from configuration, reading the service token from `token_env`.
    pub fn from_config(config: &RemoteCapabilityConfig) -> Self {
        let operations = config
            .operations
            .iter()
            .copied()
            .map(OperationDescriptor::standard)
            .collect();
        let capability = Self::new(config.name.clone(), config.endpoint.clone(), operations);
        match config
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
        {
            Some(token) => capability.with_service_token(AuthToken::new(token)),
            None => capability,
        }
    }

    fn failure(&self, operation: CapabilityId, reason: String) -> CapabilityError {
        tracing::warn!(
            capability = %self.name,
            operation = %operation,
            reason = %reason,
            "remote capability call failed"
        );
        CapabilityError::InvocationFailed {
            capability: operation.as_str().to_string(),
            reason,
        }
    }
}

#[async_trait]
impl Capability for HttpCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_operations(&self) -> Vec<OperationDescriptor> {
        self.operations.clone()
    }

    async fn invoke(
        &self,
        operation: CapabilityId,
        parameters: &Value,
        auth: Option<&AuthToken>,
    ) -> CapabilityResult<ToolResult> {
        let mut request = self.client.post(&self.endpoint).json(&InvokeRequest {
            operation: operation.as_str(),
            parameters,
        });
        if let Some(token) = auth.or(self.service_token.as_ref()) {
            request = request.bearer_auth(token.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.failure(operation, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.failure(operation, format!("status {}: {}", status, body)));
        }

        response
            .json::<ToolResult>()
            .await
            .map_err(|_| CapabilityError::InvalidResult {
                capability: operation.as_str().to_string(),
            })
    }
}

impl std::fmt::Debug for HttpCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCapability")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field(
                "operations",
                &self.operations.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_uses_standard_descriptors() {
        let config = RemoteCapabilityConfig {
            name: "calendar".to_string(),
            endpoint: "http://localhost:8082/invoke".to_string(),
            operations: vec![CapabilityId::ListEvents, CapabilityId::CreateEvent],
            token_env: Some("CONCIERGE_TEST_TOKEN_THAT_IS_NOT_SET".to_string()),
        };
        let capability = HttpCapability::from_config(&config);
        let ops = capability.list_operations();
        assert_eq!(ops.len(), 2);
        assert!(ops[1].mutates);
        assert!(capability.service_token.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_invocation_failure() {
        let capability = HttpCapability::new(
            "mail",
            "http://127.0.0.1:1/invoke",
            vec![OperationDescriptor::standard(CapabilityId::SearchMessages)],
        );
        let err = capability
            .invoke(
                CapabilityId::SearchMessages,
                &serde_json::json!({"query": "invoices"}),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvocationFailed { .. }));
    }
}
