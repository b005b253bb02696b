//! Capability registry.

use crate::matching::{keyword_score, tokenize};
use crate::Capability;
use concierge_core::{
    AuthToken, CapabilityError, CapabilityId, CapabilityResult, OperationDescriptor, ToolCall,
    ToolResult,
};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// BUILDER
// ============================================================================

/// Collects capabilities before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    capabilities: Vec<Arc<dyn Capability>>,
    default_capability: Option<CapabilityId>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Capability used when keyword matching finds nothing.
    pub fn with_default(mut self, id: CapabilityId) -> Self {
        self.default_capability = Some(id);
        self
    }

    /// Freeze the registry.
    ///
    /// The first capability to declare an operation serves it. The default
    /// capability is the configured one if installed, otherwise the first
    /// installed operation that does not mutate.
    pub fn build(self) -> CapabilityResult<CapabilityRegistry> {
        let mut operations: Vec<RegisteredOperation> = Vec::new();
        let mut index = HashMap::new();

        for capability in self.capabilities {
            for descriptor in capability.list_operations() {
                if index.contains_key(&descriptor.id) {
                    tracing::warn!(
                        operation = %descriptor.id,
                        capability = capability.name(),
                        "operation already registered, ignoring duplicate"
                    );
                    continue;
                }
                index.insert(descriptor.id, operations.len());
                operations.push(RegisteredOperation {
                    descriptor,
                    provider: Arc::clone(&capability),
                });
            }
        }

        let first = operations.first().ok_or(CapabilityError::EmptyRegistry)?;

        let default_capability = match self.default_capability {
            Some(id) if index.contains_key(&id) => id,
            configured => {
                if let Some(id) = configured {
                    tracing::warn!(operation = %id, "configured default capability not installed");
                }
                operations
                    .iter()
                    .find(|op| !op.descriptor.mutates)
                    .map(|op| op.descriptor.id)
                    .unwrap_or(first.descriptor.id)
            }
        };

        tracing::info!(
            operations = operations.len(),
            default = %default_capability,
            "capability registry built"
        );

        Ok(CapabilityRegistry {
            operations,
            index,
            default_capability,
        })
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

struct RegisteredOperation {
    descriptor: OperationDescriptor,
    provider: Arc<dyn Capability>,
}

/// Immutable set of installed operations, in registration order.
pub struct CapabilityRegistry {
    operations: Vec<RegisteredOperation>,
    index: HashMap<CapabilityId, usize>,
    default_capability: CapabilityId,
}

impl CapabilityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn contains(&self, id: CapabilityId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn descriptor(&self, id: CapabilityId) -> Option<&OperationDescriptor> {
        self.index.get(&id).map(|&i| &self.operations[i].descriptor)
    }

    /// Resolve a wire name to an installed operation.
    pub fn resolve(&self, name: &str) -> CapabilityResult<&OperationDescriptor> {
        let id = CapabilityId::from_name(name)?;
        self.descriptor(id).ok_or_else(|| CapabilityError::NotInstalled {
            name: name.to_string(),
        })
    }

    /// Installed operations in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.iter().map(|op| &op.descriptor)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn default_capability(&self) -> CapabilityId {
        self.default_capability
    }

    /// Whether `name` is an installed operation that changes external state.
    pub fn is_mutating(&self, name: &str) -> bool {
        self.resolve(name).map(|d| d.mutates).unwrap_or(false)
    }

    /// The operation that turns a person reference into an address.
    pub fn resolution_capability(&self) -> Option<&OperationDescriptor> {
        self.descriptors().find(|d| d.resolves_references)
    }

    /// Best keyword match for `text`; ties go to the earlier registration.
    pub fn best_match(&self, text: &str) -> CapabilityId {
        let tokens = tokenize(text);
        let mut best: Option<(usize, CapabilityId)> = None;
        for descriptor in self.descriptors() {
            let score = keyword_score(&tokens, descriptor);
            if score > 0 && best.map_or(true, |(top, _)| score > top) {
                best = Some((score, descriptor.id));
            }
        }
        best.map(|(_, id)| id).unwrap_or(self.default_capability)
    }

    /// Operation catalogue for backend prompts.
    pub fn catalogue(&self) -> String {
        self.descriptors()
            .map(|d| {
                let params = d
                    .parameters
                    .iter()
                    .map(|p| {
                        if p.required {
                            format!("{} (required): {}", p.name, p.description)
                        } else {
                            format!("{}: {}", p.name, p.description)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                let mut line = format!("- {}: {}", d.name(), d.description);
                if !params.is_empty() {
                    line.push_str(&format!(" [parameters: {}]", params));
                }
                if d.mutates {
                    line.push_str(" [changes external state]");
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Dispatch a call to the capability serving it.
    pub async fn invoke(
        &self,
        call: &ToolCall,
        auth: Option<&AuthToken>,
    ) -> CapabilityResult<ToolResult> {
        let id = CapabilityId::from_name(&call.name)?;
        let slot = self
            .index
            .get(&id)
            .ok_or_else(|| CapabilityError::NotInstalled {
                name: call.name.clone(),
            })?;
        let registered = &self.operations[*slot];
        tracing::debug!(
            operation = %id,
            capability = registered.provider.name(),
            "invoking capability"
        );
        registered.provider.invoke(id, &call.parameters, auth).await
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field(
                "operations",
                &self.descriptors().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .field("default_capability", &self.default_capability)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
