//! Availability snapshots.
//!
//! The breaker reports one for the generative backend; the orchestrator adds
//! registry and ledger sizes before handing it to the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Serving, but a trial call decides what happens next.
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Ordered so rendered snapshots are stable.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl HealthCheck {
    fn with_status(status: HealthStatus, component: String, message: Option<String>) -> Self {
        Self {
            status,
            component,
            message,
            metadata: BTreeMap::new(),
        }
    }

    pub fn healthy(component: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Healthy, component.into(), None)
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Degraded, component.into(), Some(message.into()))
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unhealthy, component.into(), Some(message.into()))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
