//! Fallback execution.
//!
//! Strategies run strictly in plan order: primary first, then each fallback,
//! stopping at the first valid result. Nothing runs concurrently and nothing
//! is retried. A state-changing operation never runs without clearance from
//! an accepted proposal.

use concierge_core::{
    AuthToken, CapabilityError, ConciergeError, ConciergeResult, ExecutionError, ExecutionPlan,
    ToolCall, ToolResult,
};
use concierge_registry::CapabilityRegistry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Whether state-changing operations may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clearance {
    ReadOnly,
    Approved { proposal_id: Uuid },
}

/// Per-request execution inputs.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub auth: Option<&'a AuthToken>,
    pub clearance: Clearance,
}

impl<'a> ExecutionContext<'a> {
    pub fn read_only(auth: Option<&'a AuthToken>) -> Self {
        Self {
            auth,
            clearance: Clearance::ReadOnly,
        }
    }

    pub fn approved(auth: Option<&'a AuthToken>, proposal_id: Uuid) -> Self {
        Self {
            auth,
            clearance: Clearance::Approved { proposal_id },
        }
    }
}

/// One strategy attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Exactly what the succeeding capability returned.
    pub result: ToolResult,
    /// 0 for the primary, `n` for the n-th fallback.
    pub strategy_index: usize,
    pub call: ToolCall,
    pub attempts: Vec<AttemptRecord>,
}

impl ExecutionReport {
    pub fn used_fallback(&self) -> bool {
        self.strategy_index > 0
    }
}

pub struct Executor {
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
}

impl Executor {
    pub fn new(registry: Arc<CapabilityRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Run the plan's strategies in order until one yields a valid result.
    ///
    /// A missing clearance for a state-changing strategy aborts the whole run
    /// with `ConfirmationRequired`; it is never treated as a strategy failure.
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        ctx: &ExecutionContext<'_>,
    ) -> ConciergeResult<ExecutionReport> {
        let mut attempts = Vec::with_capacity(plan.strategy_count());
        let mut last_error = String::new();

        for (index, strategy) in plan.strategies().enumerate() {
            let call = strategy.to_tool_call();
            tracing::info!(
                attempt = index,
                method = strategy.method(),
                trigger_condition = strategy.trigger_condition().unwrap_or("primary"),
                "executing strategy"
            );

            match self.dispatch(&call, ctx).await {
                Ok(result) => {
                    attempts.push(AttemptRecord {
                        method: call.name.clone(),
                        error: None,
                    });
                    if index > 0 {
                        tracing::info!(attempt = index, method = %call.name, "fallback succeeded");
                    }
                    return Ok(ExecutionReport {
                        result,
                        strategy_index: index,
                        call,
                        attempts,
                    });
                }
                Err(e @ ConciergeError::Capability(CapabilityError::ConfirmationRequired { .. })) => {
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(attempt = index, method = %call.name, error = %e, "strategy failed");
                    last_error = e.to_string();
                    attempts.push(AttemptRecord {
                        method: call.name.clone(),
                        error: Some(last_error.clone()),
                    });
                }
            }
        }

        Err(ExecutionError::AllStrategiesExhausted {
            attempts: attempts.len(),
            last_error,
        }
        .into())
    }

    /// One bounded attempt at a single call.
    ///
    /// Invalid results are failures: `success == false`, or neither data nor
    /// message.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        ctx: &ExecutionContext<'_>,
    ) -> ConciergeResult<ToolResult> {
        let descriptor = self.registry.resolve(&call.name)?;
        if descriptor.requires_confirmation() && ctx.clearance == Clearance::ReadOnly {
            tracing::warn!(method = %call.name, "state-changing call without accepted proposal");
            return Err(CapabilityError::ConfirmationRequired {
                capability: call.name.clone(),
            }
            .into());
        }

        let result = match tokio::time::timeout(self.timeout, self.registry.invoke(call, ctx.auth)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(CapabilityError::Timeout {
                    capability: call.name.clone(),
                    timeout_ms: self.timeout.as_millis() as i64,
                }
                .into())
            }
        };

        if !result.is_valid() {
            return Err(ExecutionError::StrategyFailed {
                method: call.name.clone(),
                reason: result.invalid_reason(),
            }
            .into());
        }
        Ok(result)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::{CapabilityId, Strategy};
    use concierge_test_utils::assertions::{assert_confirmation_required, assert_exhausted};
    use concierge_test_utils::fixtures::{registry_with, strategy};
    use concierge_test_utils::{logged_names, new_log, StubCapability};
    use serde_json::json;

    fn plan(primary: Strategy, fallbacks: Vec<Strategy>) -> ExecutionPlan {
        ExecutionPlan::new(primary, "done", 0.8).with_fallbacks(fallbacks)
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallbacks() {
        let log = new_log();
        let registry = Arc::new(registry_with(log.clone(), vec![]));
        let executor = Executor::new(registry, Duration::from_secs(2));
        let plan = plan(
            strategy("search_messages", json!({"query": "invoices"})),
            vec![strategy("read_chats", json!({"query": "invoices"}))],
        );

        let report = executor.run(&plan, &ExecutionContext::read_only(None)).await.unwrap();
        assert_eq!(report.strategy_index, 0);
        assert!(!report.used_fallback());
        assert_eq!(logged_names(&log), vec!["search_messages"]);
    }

    #[tokio::test]
    async fn test_fallbacks_in_order_and_result_unchanged() {
        let log = new_log();
        let expected = ToolResult::ok(json!({"hits": 3})).with_message("3 chats");
        let registry = Arc::new(registry_with(
            log.clone(),
            vec![
                StubCapability::new("flaky-mail", &[CapabilityId::SearchMessages]).respond(
                    CapabilityId::SearchMessages,
                    Err(CapabilityError::InvocationFailed {
                        capability: "search_messages".to_string(),
                        reason: "mailbox offline".to_string(),
                    }),
                ),
                StubCapability::new("empty-events", &[CapabilityId::ListEvents])
                    .respond(CapabilityId::ListEvents, Ok(ToolResult::default())),
                StubCapability::new("chats", &[CapabilityId::ReadChats])
                    .respond(CapabilityId::ReadChats, Ok(expected.clone())),
            ],
        ));
        let executor = Executor::new(registry, Duration::from_secs(2));
        let plan = plan(
            strategy("search_messages", json!({})),
            vec![
                strategy("list_events", json!({})),
                strategy("read_chats", json!({})),
                strategy("self_reflect", json!({})),
            ],
        );

        let report = executor.run(&plan, &ExecutionContext::read_only(None)).await.unwrap();
        assert_eq!(report.strategy_index, 2);
        assert_eq!(report.result, expected);
        assert_eq!(logged_names(&log), vec!["search_messages", "list_events", "read_chats"]);
        assert_eq!(report.attempts.len(), 3);
        assert!(report.attempts[0].error.as_deref().unwrap().contains("mailbox offline"));
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_failure() {
        let log = new_log();
        let registry = Arc::new(registry_with(
            log.clone(),
            vec![StubCapability::new("broken", &[CapabilityId::SearchMessages, CapabilityId::ReadChats])
                .respond(CapabilityId::SearchMessages, Ok(ToolResult::failure("index corrupt")))
                .respond(CapabilityId::ReadChats, Ok(ToolResult::failure("chat store locked")))],
        ));
        let executor = Executor::new(registry, Duration::from_secs(2));
        let plan = plan(
            strategy("search_messages", json!({})),
            vec![strategy("read_chats", json!({}))],
        );

        let result = executor.run(&plan, &ExecutionContext::read_only(None)).await;
        assert_exhausted(&result, "chat store locked");
        assert_eq!(logged_names(&log).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let log = new_log();
        let registry = Arc::new(registry_with(
            log.clone(),
            vec![StubCapability::new("slow", &[CapabilityId::SearchMessages])
                .delay(CapabilityId::SearchMessages, Duration::from_secs(60))],
        ));
        let executor = Executor::new(registry, Duration::from_secs(2));
        let plan = plan(
            strategy("search_messages", json!({})),
            vec![strategy("read_chats", json!({}))],
        );

        let report = executor.run(&plan, &ExecutionContext::read_only(None)).await.unwrap();
        assert_eq!(report.strategy_index, 1);
        assert!(report.attempts[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_mutation_requires_clearance() {
        let log = new_log();
        let registry = Arc::new(registry_with(log.clone(), vec![]));
        let executor = Executor::new(registry, Duration::from_secs(2));
        let plan = plan(
            strategy("search_messages", json!({"query": "x"})),
            vec![strategy("compose_message", json!({"to": "a@b.com"}))],
        );
        let failing_primary = ExecutionPlan::new(
            strategy("compose_message", json!({"to": "a@b.com"})),
            "sent",
            0.9,
        );

        let result = executor
            .run(&failing_primary, &ExecutionContext::read_only(None))
            .await;
        assert_confirmation_required(&result);
        assert!(logged_names(&log).is_empty());

        let report = executor
            .run(&failing_primary, &ExecutionContext::approved(None, Uuid::now_v7()))
            .await
            .unwrap();
        assert_eq!(report.call.name, "compose_message");

        // Read-only primary still runs when a mutating fallback is never reached.
        let report = executor.run(&plan, &ExecutionContext::read_only(None)).await.unwrap();
        assert_eq!(report.call.name, "search_messages");
    }

    #[tokio::test]
    async fn test_unknown_method_is_strategy_failure() {
        let registry = Arc::new(registry_with(new_log(), vec![]));
        let executor = Executor::new(registry, Duration::from_secs(2));
        let plan = plan(
            strategy("teleport", json!({})),
            vec![strategy("read_chats", json!({}))],
        );
        let report = executor.run(&plan, &ExecutionContext::read_only(None)).await.unwrap();
        assert_eq!(report.strategy_index, 1);
    }
}
