//! Concierge Registry - Capability Contract and Dispatch
//!
//! Domain capabilities (email, contacts, calendar, messaging, self-reflection)
//! implement [`Capability`]. They are installed into a [`RegistryBuilder`] at
//! startup; the resulting [`CapabilityRegistry`] is immutable and shared
//! behind an `Arc`.

pub mod matching;
pub mod registry;
pub mod remote;

pub use matching::{keyword_score, tokenize};
pub use registry::{CapabilityRegistry, RegistryBuilder};
pub use remote::HttpCapability;

use async_trait::async_trait;
use concierge_core::{AuthToken, CapabilityId, CapabilityResult, OperationDescriptor, ToolResult};
use serde_json::Value;

/// A domain capability exposing one or more operations.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Display name, used in logs.
    fn name(&self) -> &str;

    /// Operations this capability serves.
    fn list_operations(&self) -> Vec<OperationDescriptor>;

    /// Invoke one operation.
    async fn invoke(
        &self,
        operation: CapabilityId,
        parameters: &Value,
        auth: Option<&AuthToken>,
    ) -> CapabilityResult<ToolResult>;
}
