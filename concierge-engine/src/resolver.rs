//! Dependency resolution.
//!
//! A state-changing action may name a person where it needs an address
//! ("email John"). The resolver asks the backend which parameter values are
//! such references and splices a lookup call in front of the dependent action
//! for each one. Lookups run before their dependents; the address they yield
//! is patched into the dependent's parameters just before it executes.

use crate::prompts;
use concierge_core::{GenerationOptions, ResolutionError, ToolCall};
use concierge_llm::{decode_json, GenerativeBackend, ProtectedBackend};
use concierge_registry::CapabilityRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Email and phone number shapes.
static ADDRESS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"^[^@\s]+@[^@\s]+\.[^@\s]+$", r"^\+?[0-9][0-9 ().-]{6,}$"]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// Whether `value` is already an address and needs no lookup.
pub fn is_literal_address(value: &str) -> bool {
    let value = value.trim();
    ADDRESS_PATTERNS.iter().any(|pattern| pattern.is_match(value))
}

/// Parameter values of `call` that might name a person, as `(parameter, value)`.
///
/// Only reference parameters declared by the call's descriptor are
/// considered; literal addresses are never candidates.
pub fn reference_candidates(registry: &CapabilityRegistry, call: &ToolCall) -> Vec<(String, String)> {
    let Ok(descriptor) = registry.resolve(&call.name) else {
        return Vec::new();
    };
    let mut candidates = Vec::new();
    for parameter in &descriptor.reference_parameters {
        let values: Vec<&str> = match call.parameters.get(parameter) {
            Some(Value::String(s)) => vec![s.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        for value in values {
            let value = value.trim();
            if !value.is_empty() && !is_literal_address(value) {
                candidates.push((parameter.clone(), value.to_string()));
            }
        }
    }
    candidates
}

/// Address carried by a lookup result's data, if any.
pub fn extract_address(data: &Value) -> Option<String> {
    match data {
        Value::String(s) if is_literal_address(s) => Some(s.trim().to_string()),
        Value::Object(map) => ["email", "address", "phone"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(extract_address)
            .or_else(|| {
                ["contact", "contacts", "results"]
                    .iter()
                    .filter_map(|key| map.get(*key))
                    .find_map(extract_address)
            }),
        Value::Array(items) => items.first().and_then(extract_address),
        _ => None,
    }
}

/// Replace `reference` with `address` in `parameter`, whether it holds a
/// single value or a list.
pub fn apply_resolution(parameters: &Value, parameter: &str, reference: &str, address: &str) -> Value {
    let mut patched = parameters.clone();
    let matches = |v: &Value| {
        v.as_str()
            .map(|s| s.trim().eq_ignore_ascii_case(reference.trim()))
            .unwrap_or(false)
    };
    if let Some(slot) = patched.get_mut(parameter) {
        match slot {
            Value::Array(items) => {
                for item in items.iter_mut().filter(|item| matches(item)) {
                    *item = json!(address);
                }
            }
            other if matches(other) => *other = json!(address),
            _ => {}
        }
    }
    patched
}

/// A lookup call feeding one parameter value of a later call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyBinding {
    pub lookup_index: usize,
    pub dependent_index: usize,
    pub parameter: String,
    pub reference: String,
}

/// Calls in dependency order plus the bindings between them.
///
/// `actions[i]` is the position in `calls` of the i-th call handed to the
/// resolver; every other call is an injected lookup. A lookup serves every
/// binding that names the same reference.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionBatch {
    pub calls: Vec<ToolCall>,
    pub actions: Vec<usize>,
    pub bindings: Vec<DependencyBinding>,
}

impl ActionBatch {
    /// A batch with no lookups.
    pub fn unresolved(calls: Vec<ToolCall>) -> Self {
        Self {
            actions: (0..calls.len()).collect(),
            calls,
            bindings: Vec::new(),
        }
    }

    pub fn has_dependencies(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// The injected lookup calls with their positions, in execution order.
    pub fn lookups(&self) -> impl Iterator<Item = (usize, &ToolCall)> {
        self.calls
            .iter()
            .enumerate()
            .filter(move |(index, _)| self.bindings.iter().any(|b| b.lookup_index == *index))
    }

    /// Bindings feeding the `action`-th resolved call.
    pub fn bindings_for(&self, action: usize) -> impl Iterator<Item = &DependencyBinding> {
        let dependent = self.actions.get(action).copied();
        self.bindings
            .iter()
            .filter(move |b| Some(b.dependent_index) == dependent)
    }

    /// Calls that run when the first action succeeds: its lookups and itself.
    pub fn primary_calls(&self) -> &[ToolCall] {
        match self.actions.first() {
            Some(&first) => &self.calls[..=first],
            None => &self.calls,
        }
    }

    fn lookup_for(&self, reference: &str) -> Option<usize> {
        self.bindings
            .iter()
            .find(|b| b.reference.eq_ignore_ascii_case(reference))
            .map(|b| b.lookup_index)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResolverWire {
    #[serde(default)]
    references: Vec<ReferenceWire>,
}

#[derive(Debug, Deserialize)]
struct ReferenceWire {
    parameter: String,
    name: String,
}

pub struct Resolver {
    backend: Arc<ProtectedBackend>,
    registry: Arc<CapabilityRegistry>,
}

impl Resolver {
    pub fn new(backend: Arc<ProtectedBackend>, registry: Arc<CapabilityRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Splice lookup calls in front of every call that references a person.
    ///
    /// `calls` are alternatives tried in order, so one person named by several
    /// of them is looked up once, before the first call that needs it.
    /// Never fails: when references cannot be judged the call proceeds
    /// unresolved.
    pub async fn resolve(&self, request: &str, calls: Vec<ToolCall>) -> ActionBatch {
        let Some(lookup) = self.registry.resolution_capability() else {
            tracing::debug!("no resolution capability installed, skipping dependency resolution");
            return ActionBatch::unresolved(calls);
        };
        let lookup_name = lookup.name();

        let mut batch = ActionBatch::default();
        for call in calls {
            let candidates = reference_candidates(&self.registry, &call);
            if candidates.is_empty() {
                batch.actions.push(batch.calls.len());
                batch.calls.push(call);
                continue;
            }

            let references = match self.judge(request, &call, &candidates).await {
                Ok(references) => references,
                Err(e) => {
                    tracing::warn!(method = %call.name, error = %e, "action proceeds unresolved");
                    batch.actions.push(batch.calls.len());
                    batch.calls.push(call);
                    continue;
                }
            };

            let mut lookup_indices = Vec::with_capacity(references.len());
            for (position, (_, name)) in references.iter().enumerate() {
                let shared = references[..position]
                    .iter()
                    .position(|(_, earlier)| earlier.eq_ignore_ascii_case(name))
                    .map(|earlier| lookup_indices[earlier]);
                let index = match shared.or_else(|| batch.lookup_for(name)) {
                    Some(index) => index,
                    None => {
                        batch.calls.push(ToolCall::new(lookup_name, json!({ "name": name })));
                        batch.calls.len() - 1
                    }
                };
                lookup_indices.push(index);
            }
            let dependent_index = batch.calls.len();
            for (lookup_index, (parameter, name)) in lookup_indices.into_iter().zip(references) {
                tracing::debug!(
                    method = %call.name,
                    parameter = %parameter,
                    reference = %name,
                    "injecting lookup"
                );
                batch.bindings.push(DependencyBinding {
                    lookup_index,
                    dependent_index,
                    parameter,
                    reference: name,
                });
            }
            batch.actions.push(dependent_index);
            batch.calls.push(call);
        }
        batch
    }

    /// Ask the backend which candidates name a person. Only answers that
    /// match a candidate exactly are kept.
    async fn judge(
        &self,
        request: &str,
        call: &ToolCall,
        candidates: &[(String, String)],
    ) -> Result<Vec<(String, String)>, ResolutionError> {
        let raw = self
            .backend
            .generate_text(
                &prompts::resolver_prompt(request, call, candidates),
                prompts::RESOLVER_SYSTEM,
                &GenerationOptions::default().with_temperature(0.0),
            )
            .await
            .map_err(|e| ResolutionError::DependencyResolutionFailure {
                reason: e.to_string(),
            })?;
        let wire: ResolverWire =
            decode_json(&raw).map_err(|e| ResolutionError::DependencyResolutionFailure {
                reason: e.to_string(),
            })?;

        let mut judged: Vec<(String, String)> = Vec::new();
        for reference in wire.references {
            let Some((parameter, value)) = candidates.iter().find(|(p, v)| {
                *p == reference.parameter && v.eq_ignore_ascii_case(reference.name.trim())
            }) else {
                tracing::debug!(
                    parameter = %reference.parameter,
                    name = %reference.name,
                    "ignoring reference that is not a candidate"
                );
                continue;
            };
            if !judged.iter().any(|(p, v)| p == parameter && v == value) {
                judged.push((parameter.clone(), value.clone()));
            }
        }
        Ok(judged)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_test_utils::fixtures::{protected, standard_registry};
    use concierge_test_utils::{new_log, FailingBackend, ScriptedBackend};

    fn resolver(backend: Arc<dyn GenerativeBackend>) -> Resolver {
        Resolver::new(protected(backend), Arc::new(standard_registry(new_log())))
    }

    fn compose(to: Value) -> ToolCall {
        ToolCall::new(
            "compose_message",
            json!({"to": to, "subject": "Meeting", "body": "About tomorrow"}),
        )
    }

    #[test]
    fn test_literal_addresses() {
        assert!(is_literal_address("john@example.com"));
        assert!(is_literal_address(" +1 (555) 123-4567 "));
        assert!(!is_literal_address("John"));
        assert!(!is_literal_address("the team"));
    }

    #[test]
    fn test_candidates_skip_addresses_and_read_only_calls() {
        let registry = standard_registry(new_log());
        let call = compose(json!(["John", "sarah@example.com"]));
        assert_eq!(
            reference_candidates(&registry, &call),
            vec![("to".to_string(), "John".to_string())]
        );
        let search = ToolCall::new("search_messages", json!({"query": "John"}));
        assert!(reference_candidates(&registry, &search).is_empty());
    }

    #[test]
    fn test_extract_and_apply() {
        assert_eq!(
            extract_address(&json!({"name": "John", "email": "john@example.com"})),
            Some("john@example.com".to_string())
        );
        assert_eq!(
            extract_address(&json!({"contacts": [{"phone": "+15551234567"}]})),
            Some("+15551234567".to_string())
        );
        assert_eq!(extract_address(&json!({"name": "John"})), None);

        let params = json!({"to": ["john", "sarah@example.com"], "subject": "Hi"});
        let patched = apply_resolution(&params, "to", "John", "john@example.com");
        assert_eq!(patched["to"], json!(["john@example.com", "sarah@example.com"]));
        let untouched = apply_resolution(&params, "cc", "John", "john@example.com");
        assert_eq!(untouched, params);
    }

    #[tokio::test]
    async fn test_lookup_spliced_before_dependent() {
        let backend = ScriptedBackend::new().on(
            prompts::RESOLVER_SYSTEM,
            r#"{"references": [{"parameter": "to", "name": "John"}]}"#,
        );
        let batch = resolver(Arc::new(backend))
            .resolve("email John about the meeting tomorrow", vec![compose(json!("John"))])
            .await;

        let names: Vec<&str> = batch.calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["lookup_contact", "compose_message"]);
        assert_eq!(batch.calls[0].parameters, json!({"name": "John"}));
        assert_eq!(
            batch.bindings,
            vec![DependencyBinding {
                lookup_index: 0,
                dependent_index: 1,
                parameter: "to".to_string(),
                reference: "John".to_string(),
            }]
        );
        assert_eq!(batch.lookups().count(), 1);
        assert_eq!(batch.actions, vec![1]);
    }

    #[tokio::test]
    async fn test_alternatives_share_one_lookup_per_person() {
        let backend = ScriptedBackend::new()
            .on(
                prompts::RESOLVER_SYSTEM,
                r#"{"references": [{"parameter": "to", "name": "John"}]}"#,
            )
            .on_matching(
                prompts::RESOLVER_SYSTEM,
                "send_chat",
                r#"{"references": [{"parameter": "recipient", "name": "john"}]}"#,
            );
        let chat = ToolCall::new("send_chat", json!({"recipient": "john", "text": "Meeting?"}));
        let batch = resolver(Arc::new(backend))
            .resolve("message John about the meeting", vec![compose(json!("John")), chat])
            .await;

        let names: Vec<&str> = batch.calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["lookup_contact", "compose_message", "send_chat"]);
        assert_eq!(batch.actions, vec![1, 2]);
        assert_eq!(batch.lookups().count(), 1);
        assert_eq!(batch.primary_calls().len(), 2);

        let fallback: Vec<&DependencyBinding> = batch.bindings_for(1).collect();
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].lookup_index, 0);
        assert_eq!(fallback[0].parameter, "recipient");
        assert_eq!(batch.bindings_for(0).next().map(|b| b.parameter.as_str()), Some("to"));
    }

    #[tokio::test]
    async fn test_hallucinated_references_ignored() {
        let backend = ScriptedBackend::new().on(
            prompts::RESOLVER_SYSTEM,
            r#"{"references": [{"parameter": "subject", "name": "Meeting"}, {"parameter": "to", "name": "Bob"}]}"#,
        );
        let batch = resolver(Arc::new(backend))
            .resolve("email John", vec![compose(json!("John"))])
            .await;
        assert!(!batch.has_dependencies());
        assert_eq!(batch.calls.len(), 1);
    }

    #[tokio::test]
    async fn test_no_backend_call_without_candidates() {
        let backend = Arc::new(ScriptedBackend::new());
        let batch = resolver(backend.clone())
            .resolve(
                "email john@example.com",
                vec![compose(json!("john@example.com"))],
            )
            .await;
        assert_eq!(batch.calls.len(), 1);
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_action_unresolved() {
        let batch = resolver(Arc::new(FailingBackend::new()))
            .resolve("email John", vec![compose(json!("John"))])
            .await;
        assert_eq!(batch, ActionBatch::unresolved(vec![compose(json!("John"))]));
    }
}
