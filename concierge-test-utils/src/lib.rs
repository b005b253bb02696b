//! Concierge Test Utilities
//!
//! Centralized test infrastructure for the Concierge workspace:
//! - Scripted and failing generative backends
//! - Stub capabilities with a shared invocation log
//! - Test fixtures for common scenarios
//! - Proptest generators for core types
//! - Custom assertions

pub use concierge_core::{
    ActionAppraisal, Appropriateness, AuthToken, CapabilityError, CapabilityId,
    CapabilityResult, ConciergeConfig, ConciergeError, ConciergeResult, ExecutionPlan,
    GenerationOptions, LlmError, LlmResult, OperationDescriptor, Strategy, StructuredResponse,
    ToolCall, ToolResult,
};
pub use concierge_llm::{AvailabilityBreaker, GenerativeBackend, ProtectedBackend};
pub use concierge_registry::{Capability, CapabilityRegistry, RegistryBuilder};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MOCK BACKENDS
// ============================================================================

struct Rule {
    system: String,
    needle: Option<String>,
    reply: LlmResult<String>,
}

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub system: String,
    pub prompt: String,
}

/// Backend that answers by system instruction.
///
/// Lookup order for a call: queued replies for the system instruction, then
/// rules whose needle appears in the prompt, then plain rules. A call that
/// matches nothing gets an empty string, which decodes as a soft failure
/// without tripping the breaker.
#[derive(Default)]
pub struct ScriptedBackend {
    rules: Vec<Rule>,
    queues: Mutex<HashMap<String, VecDeque<LlmResult<String>>>>,
    structured: Option<StructuredResponse>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `system` with `reply`.
    pub fn on(mut self, system: &str, reply: impl Into<String>) -> Self {
        self.rules.push(Rule {
            system: system.to_string(),
            needle: None,
            reply: Ok(reply.into()),
        });
        self
    }

    /// Answer `system` with `reply` when the prompt contains `needle`.
    pub fn on_matching(mut self, system: &str, needle: &str, reply: impl Into<String>) -> Self {
        // Needle rules are checked before plain ones regardless of insertion order.
        self.rules.insert(
            0,
            Rule {
                system: system.to_string(),
                needle: Some(needle.to_string()),
                reply: Ok(reply.into()),
            },
        );
        self
    }

    /// Answer `system` with these replies in turn before falling back to rules.
    pub fn on_sequence(self, system: &str, replies: Vec<LlmResult<String>>) -> Self {
        lock(&self.queues)
            .entry(system.to_string())
            .or_default()
            .extend(replies);
        self
    }

    /// Always fail calls for `system`.
    pub fn failing_on(mut self, system: &str, error: LlmError) -> Self {
        self.rules.push(Rule {
            system: system.to_string(),
            needle: None,
            reply: Err(error),
        });
        self
    }

    pub fn with_structured(mut self, response: StructuredResponse) -> Self {
        self.structured = Some(response);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, system: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.system == system).count()
    }

    pub fn prompts_for(&self, system: &str) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.system == system)
            .map(|c| c.prompt.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    fn reply(&self, prompt: &str, system: &str) -> LlmResult<String> {
        lock(&self.calls).push(RecordedCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
        });

        if let Some(reply) = lock(&self.queues)
            .get_mut(system)
            .and_then(|queue| queue.pop_front())
        {
            return reply;
        }

        self.rules
            .iter()
            .filter(|rule| rule.system == system)
            .find(|rule| match &rule.needle {
                Some(needle) => prompt.contains(needle.as_str()),
                None => true,
            })
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| Ok(String::new()))
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_text(
        &self,
        prompt: &str,
        system_instruction: &str,
        _options: &GenerationOptions,
    ) -> LlmResult<String> {
        self.reply(prompt, system_instruction)
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        system_instruction: &str,
        _session_id: &str,
    ) -> LlmResult<StructuredResponse> {
        lock(&self.calls).push(RecordedCall {
            system: system_instruction.to_string(),
            prompt: prompt.to_string(),
        });
        Ok(self.structured.clone().unwrap_or_default())
    }
}

/// Backend that fails every call.
pub struct FailingBackend {
    error: LlmError,
    calls: AtomicUsize,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::with_error(LlmError::RequestFailed {
            provider: "failing".to_string(),
            status: 503,
            message: "service unavailable".to_string(),
        })
    }

    pub fn with_error(error: LlmError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FailingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate_text(
        &self,
        _prompt: &str,
        _system_instruction: &str,
        _options: &GenerationOptions,
    ) -> LlmResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    async fn generate_structured(
        &self,
        _prompt: &str,
        _system_instruction: &str,
        _session_id: &str,
    ) -> LlmResult<StructuredResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

// ============================================================================
// STUB CAPABILITIES
// ============================================================================

/// Invocation log shared between stubs so tests can assert global order.
pub type InvocationLog = Arc<Mutex<Vec<ToolCall>>>;

pub fn new_log() -> InvocationLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Names of logged calls, in invocation order.
pub fn logged_names(log: &InvocationLog) -> Vec<String> {
    lock(log).iter().map(|c| c.name.clone()).collect()
}

pub fn logged_calls(log: &InvocationLog) -> Vec<ToolCall> {
    lock(log).clone()
}

type Handler = Arc<dyn Fn(&Value) -> CapabilityResult<ToolResult> + Send + Sync>;

/// Capability with scripted per-operation results.
///
/// Unscripted operations echo their parameters back as valid data.
pub struct StubCapability {
    name: String,
    operations: Vec<OperationDescriptor>,
    handlers: HashMap<CapabilityId, Handler>,
    delays: HashMap<CapabilityId, Duration>,
    log: InvocationLog,
}

impl StubCapability {
    pub fn new(name: impl Into<String>, ids: &[CapabilityId]) -> Self {
        Self {
            name: name.into(),
            operations: ids.iter().copied().map(OperationDescriptor::standard).collect(),
            handlers: HashMap::new(),
            delays: HashMap::new(),
            log: new_log(),
        }
    }

    pub fn with_log(mut self, log: InvocationLog) -> Self {
        self.log = log;
        self
    }

    /// Replace the standard descriptor for one operation.
    pub fn with_descriptor(mut self, descriptor: OperationDescriptor) -> Self {
        match self.operations.iter_mut().find(|d| d.id == descriptor.id) {
            Some(slot) => *slot = descriptor,
            None => self.operations.push(descriptor),
        }
        self
    }

    pub fn respond(self, id: CapabilityId, result: CapabilityResult<ToolResult>) -> Self {
        self.respond_with(id, move |_| result.clone())
    }

    pub fn respond_with<F>(mut self, id: CapabilityId, handler: F) -> Self
    where
        F: Fn(&Value) -> CapabilityResult<ToolResult> + Send + Sync + 'static,
    {
        self.handlers.insert(id, Arc::new(handler));
        self
    }

    /// Sleep before answering `id`.
    pub fn delay(mut self, id: CapabilityId, delay: Duration) -> Self {
        self.delays.insert(id, delay);
        self
    }

    pub fn log(&self) -> InvocationLog {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Capability for StubCapability {
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
        _auth: Option<&AuthToken>,
    ) -> CapabilityResult<ToolResult> {
        lock(&self.log).push(ToolCall::new(operation.as_str(), parameters.clone()));

        if let Some(delay) = self.delays.get(&operation) {
            tokio::time::sleep(*delay).await;
        }

        match self.handlers.get(&operation) {
            Some(handler) => handler(parameters),
            None => Ok(ToolResult::ok(json!({
                "operation": operation.as_str(),
                "parameters": parameters,
            }))),
        }
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// Address book used by `contacts_stub`.
    pub const DIRECTORY: &[(&str, &str)] = &[
        ("John", "john@example.com"),
        ("Sarah", "sarah@example.com"),
        ("Priya", "priya@example.com"),
    ];

    /// Contacts capability resolving names from `DIRECTORY`.
    pub fn contacts_stub(log: InvocationLog) -> StubCapability {
        StubCapability::new("contacts", &[CapabilityId::LookupContact])
            .with_log(log)
            .respond_with(CapabilityId::LookupContact, |params| {
                let name = params.get("name").and_then(Value::as_str).unwrap_or("");
                Ok(DIRECTORY
                    .iter()
                    .find(|(known, _)| known.eq_ignore_ascii_case(name))
                    .map(|(known, email)| ToolResult::ok(json!({"name": known, "email": email})))
                    .unwrap_or_else(|| ToolResult::failure(format!("no contact named {}", name))))
            })
    }

    /// Registry with every standard operation, all logging to `log`.
    pub fn standard_registry(log: InvocationLog) -> CapabilityRegistry {
        registry_with(log, Vec::new())
    }

    /// Standard registry where `overrides` replace the default stubs.
    ///
    /// An override serving an operation shadows the default stub for it.
    pub fn registry_with(log: InvocationLog, overrides: Vec<StubCapability>) -> CapabilityRegistry {
        let mut builder = RegistryBuilder::new();
        for stub in overrides {
            builder = builder.register(Arc::new(stub.with_log(Arc::clone(&log))));
        }
        builder
            .register(Arc::new(
                StubCapability::new(
                    "mail",
                    &[CapabilityId::SearchMessages, CapabilityId::ComposeMessage],
                )
                .with_log(Arc::clone(&log)),
            ))
            .register(Arc::new(contacts_stub(Arc::clone(&log))))
            .register(Arc::new(
                StubCapability::new(
                    "calendar",
                    &[CapabilityId::ListEvents, CapabilityId::CreateEvent],
                )
                .with_log(Arc::clone(&log)),
            ))
            .register(Arc::new(
                StubCapability::new("messaging", &[CapabilityId::ReadChats, CapabilityId::SendChat])
                    .with_log(Arc::clone(&log)),
            ))
            .register(Arc::new(
                StubCapability::new("reflection", &[CapabilityId::SelfReflect]).with_log(log),
            ))
            .with_default(CapabilityId::SearchMessages)
            .build()
            .unwrap_or_else(|e| panic!("standard registry must build: {}", e))
    }

    /// Wrap a backend in a fresh breaker.
    pub fn protected(backend: Arc<dyn GenerativeBackend>) -> Arc<ProtectedBackend> {
        let breaker = Arc::new(AvailabilityBreaker::with_settings(5, Duration::from_secs(30)));
        Arc::new(ProtectedBackend::new(backend, breaker))
    }

    /// Default configuration with a short capability timeout.
    pub fn test_config() -> ConciergeConfig {
        let mut config = ConciergeConfig::default();
        config.execution.capability_timeout_secs = 2;
        config
    }

    pub fn strategy(method: &str, parameters: Value) -> Strategy {
        Strategy::new(method, parameters, format!("try {}", method))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for core types.

    use super::{Appropriateness, ToolResult};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    pub fn arb_appropriateness() -> impl Strategy<Value = Appropriateness> {
        prop_oneof![
            Just(Appropriateness::Correct),
            Just(Appropriateness::Incorrect),
            Just(Appropriateness::Suboptimal),
        ]
    }

    pub fn arb_parameters() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z]{1,8}", "[a-zA-Z0-9 ]{0,16}", 0..4)
            .prop_map(|map| json!(map))
    }

    pub fn arb_tool_result() -> impl Strategy<Value = ToolResult> {
        (
            prop::option::of(any::<bool>()),
            prop::option::of(arb_parameters()),
            prop::option::of("[a-z ]{1,20}"),
        )
            .prop_map(|(success, data, message)| ToolResult {
                success,
                data,
                message,
                error: None,
            })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Concierge-specific results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &ConciergeResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &ConciergeResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert the strategies were exhausted and the last error mentions `needle`.
    #[track_caller]
    pub fn assert_exhausted<T: std::fmt::Debug>(result: &ConciergeResult<T>, needle: &str) {
        match result {
            Err(ConciergeError::Execution(
                concierge_core::ExecutionError::AllStrategiesExhausted { last_error, .. },
            )) => assert!(
                last_error.contains(needle),
                "last error {:?} does not mention {:?}",
                last_error,
                needle
            ),
            other => panic!("Expected AllStrategiesExhausted, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_confirmation_required<T: std::fmt::Debug>(result: &ConciergeResult<T>) {
        match result {
            Err(ConciergeError::Capability(CapabilityError::ConfirmationRequired { .. })) => {}
            other => panic!("Expected ConfirmationRequired, got: {:?}", other),
        }
    }
}
