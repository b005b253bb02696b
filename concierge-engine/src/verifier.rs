//! Post-hoc action audit.
//!
//! Each action is judged independently by the backend and the judgements are
//! folded into one status. The audit is advisory: it never blocks or undoes
//! anything, and when it cannot finish the status is `unclear`.

use crate::prompts;
use crate::resolver::{reference_candidates, DependencyBinding};
use concierge_core::{
    aggregate_status, ActionAppraisal, Appropriateness, CapabilityId, GenerationOptions,
    ToolCall, VerificationError, VerificationResult, VerificationStatus,
};
use concierge_llm::{decode_json, GenerativeBackend, ProtectedBackend};
use concierge_registry::CapabilityRegistry;
use futures_util::future::join_all;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct VerdictWire {
    appropriateness: String,
    #[serde(default)]
    justification: String,
    #[serde(default)]
    suggestion: Option<String>,
}

pub struct Verifier {
    backend: Arc<ProtectedBackend>,
    registry: Arc<CapabilityRegistry>,
}

impl Verifier {
    pub fn new(backend: Arc<ProtectedBackend>, registry: Arc<CapabilityRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Audit `actions` against the request that produced them.
    ///
    /// Self-reflection calls are not audited.
    pub async fn audit(&self, request: &str, actions: &[ToolCall]) -> VerificationResult {
        self.audit_with_bindings(request, actions, &[]).await
    }

    /// Audit calls that have not run yet; `bindings` index into `actions`
    /// and mark person references a planned lookup will fill.
    pub async fn audit_with_bindings(
        &self,
        request: &str,
        actions: &[ToolCall],
        bindings: &[DependencyBinding],
    ) -> VerificationResult {
        let auditable: Vec<&ToolCall> = actions
            .iter()
            .filter(|call| call.name != CapabilityId::SelfReflect.as_str())
            .collect();
        if auditable.is_empty() {
            return VerificationResult::unclear("no auditable actions");
        }

        let verdicts = join_all(auditable.iter().map(|call| self.judge(request, call))).await;

        let mut appraisals = Vec::with_capacity(verdicts.len());
        let mut suggestions = Vec::new();
        let mut failure: Option<VerificationError> = None;
        for verdict in verdicts {
            match verdict {
                Ok((appraisal, suggestion)) => {
                    appraisals.push(appraisal);
                    suggestions.extend(suggestion);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "action audit incomplete");
                    failure.get_or_insert(e);
                }
            }
        }
        for suggestion in missing_lookup_suggestions(&self.registry, actions, bindings) {
            if !suggestions.contains(&suggestion) {
                suggestions.push(suggestion);
            }
        }

        let (verification_status, reasoning) = match failure {
            Some(e) => (VerificationStatus::Unclear, e.to_string()),
            None => (
                aggregate_status(appraisals.iter().map(|a| &a.appropriateness)),
                appraisals
                    .iter()
                    .map(|a| format!("{}: {}", a.action.name, a.justification))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        };
        tracing::info!(
            status = verification_status.as_str(),
            audited = appraisals.len(),
            "verification complete"
        );

        VerificationResult {
            verification_status,
            reasoning,
            suggestions,
            per_action_appropriateness: appraisals,
        }
    }

    async fn judge(
        &self,
        request: &str,
        call: &ToolCall,
    ) -> Result<(ActionAppraisal, Option<String>), VerificationError> {
        let raw = self
            .backend
            .generate_text(
                &prompts::verifier_prompt(request, call),
                prompts::VERIFIER_SYSTEM,
                &GenerationOptions::default().with_temperature(0.0),
            )
            .await
            .map_err(|e| VerificationError::VerificationFailure {
                reason: format!("{}: {}", call.name, e),
            })?;
        let wire: VerdictWire =
            decode_json(&raw).map_err(|e| VerificationError::VerificationFailure {
                reason: format!("{}: {}", call.name, e),
            })?;
        let appropriateness = Appropriateness::parse(&wire.appropriateness).ok_or_else(|| {
            VerificationError::VerificationFailure {
                reason: format!("{}: unknown verdict {:?}", call.name, wire.appropriateness),
            }
        })?;

        Ok((
            ActionAppraisal {
                action: call.clone(),
                appropriateness,
                justification: wire.justification,
            },
            wire.suggestion.filter(|s| !s.trim().is_empty()),
        ))
    }
}

/// Suggestions for person references that will reach a capability unresolved.
///
/// A reference is covered only when a binding feeds that exact parameter of
/// that call; a lookup for the same name elsewhere does not count. Literal
/// addresses are never references.
pub fn missing_lookup_suggestions(
    registry: &CapabilityRegistry,
    actions: &[ToolCall],
    bindings: &[DependencyBinding],
) -> Vec<String> {
    let mut suggestions = Vec::new();
    for (index, call) in actions.iter().enumerate() {
        for (parameter, reference) in reference_candidates(registry, call) {
            let covered = bindings.iter().any(|b| {
                b.dependent_index == index
                    && b.parameter == parameter
                    && b.reference.eq_ignore_ascii_case(&reference)
                    && actions
                        .get(b.lookup_index)
                        .map(|lookup| b.lookup_index < index && is_resolution(registry, lookup))
                        .unwrap_or(false)
            });
            if !covered {
                suggestions.push(format!(
                    "Look up {} before {} so that {} holds an address",
                    reference, call.name, parameter
                ));
            }
        }
    }
    suggestions
}

fn is_resolution(registry: &CapabilityRegistry, call: &ToolCall) -> bool {
    registry
        .resolve(&call.name)
        .map(|d| d.resolves_references)
        .unwrap_or(false)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_test_utils::fixtures::{protected, standard_registry};
    use concierge_test_utils::{new_log, FailingBackend, ScriptedBackend};
    use serde_json::json;

    fn verifier(backend: ScriptedBackend) -> (Verifier, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let verifier = Verifier::new(
            protected(backend.clone()),
            Arc::new(standard_registry(new_log())),
        );
        (verifier, backend)
    }

    fn verdict(appropriateness: &str) -> String {
        format!(
            r#"{{"appropriateness": "{}", "justification": "judged {}"}}"#,
            appropriateness, appropriateness
        )
    }

    fn actions() -> Vec<ToolCall> {
        vec![
            ToolCall::new("search_messages", json!({"query": "invoices"})),
            ToolCall::new("list_events", json!({})),
        ]
    }

    async fn status_for(first: &str, second: &str) -> VerificationStatus {
        let backend = ScriptedBackend::new()
            .on_matching(prompts::VERIFIER_SYSTEM, "search_messages", verdict(first))
            .on_matching(prompts::VERIFIER_SYSTEM, "list_events", verdict(second));
        let (verifier, _) = verifier(backend);
        verifier.audit("check things", &actions()).await.verification_status
    }

    #[tokio::test]
    async fn test_aggregation() {
        assert_eq!(status_for("correct", "correct").await, VerificationStatus::Correct);
        assert_eq!(status_for("correct", "suboptimal").await, VerificationStatus::Partial);
        assert_eq!(status_for("suboptimal", "incorrect").await, VerificationStatus::Incorrect);
        assert_eq!(status_for("correct", "incorrect").await, VerificationStatus::Incorrect);
    }

    #[tokio::test]
    async fn test_self_reflection_not_audited() {
        let (verifier, backend) = verifier(
            ScriptedBackend::new().on(prompts::VERIFIER_SYSTEM, verdict("correct")),
        );
        let mut calls = actions();
        calls.push(ToolCall::new("self_reflect", json!({"request": "why?"})));
        let result = verifier.audit("why did you do that", &calls).await;
        assert_eq!(result.per_action_appropriateness.len(), 2);
        assert_eq!(backend.calls_for(prompts::VERIFIER_SYSTEM), 2);

        let only_reflection = [ToolCall::new("self_reflect", json!({}))];
        let result = verifier.audit("why", &only_reflection).await;
        assert_eq!(result.verification_status, VerificationStatus::Unclear);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_unclear() {
        let (verifier, _) = verifier(
            ScriptedBackend::new()
                .on_matching(prompts::VERIFIER_SYSTEM, "search_messages", verdict("correct"))
                .on_matching(prompts::VERIFIER_SYSTEM, "list_events", "not json"),
        );
        let result = verifier.audit("check", &actions()).await;
        assert_eq!(result.verification_status, VerificationStatus::Unclear);
        assert_eq!(result.per_action_appropriateness.len(), 1);
        assert!(result.reasoning.contains("list_events"));

        let unavailable = Verifier::new(
            protected(Arc::new(FailingBackend::new())),
            Arc::new(standard_registry(new_log())),
        );
        let result = unavailable.audit("check", &actions()).await;
        assert_eq!(result.verification_status, VerificationStatus::Unclear);
        assert!(result.per_action_appropriateness.is_empty());
    }

    #[tokio::test]
    async fn test_backend_suggestions_collected() {
        let (verifier, _) = verifier(ScriptedBackend::new().on(
            prompts::VERIFIER_SYSTEM,
            r#"{"appropriateness": "suboptimal", "justification": "too broad", "suggestion": "Limit the search to this month"}"#,
        ));
        let result = verifier.audit("find invoices", &actions()[..1]).await;
        assert_eq!(result.verification_status, VerificationStatus::Partial);
        assert_eq!(result.suggestions, vec!["Limit the search to this month"]);
    }

    #[test]
    fn test_missing_lookup_suggested() {
        let registry = standard_registry(new_log());
        let unresolved = [ToolCall::new("compose_message", json!({"to": "John"}))];
        let suggestions = missing_lookup_suggestions(&registry, &unresolved, &[]);
        assert_eq!(suggestions.len(), 1);
        assert!(suggestions[0].contains("Look up John before compose_message"));

        let planned = [
            ToolCall::new("lookup_contact", json!({"name": "john"})),
            ToolCall::new("compose_message", json!({"to": "John"})),
        ];
        let binding = DependencyBinding {
            lookup_index: 0,
            dependent_index: 1,
            parameter: "to".to_string(),
            reference: "John".to_string(),
        };
        assert!(missing_lookup_suggestions(&registry, &planned, &[binding]).is_empty());

        let addressed = [ToolCall::new("compose_message", json!({"to": "john@example.com"}))];
        assert!(missing_lookup_suggestions(&registry, &addressed, &[]).is_empty());
    }

    #[test]
    fn test_lookup_that_left_the_name_in_place_is_flagged() {
        let registry = standard_registry(new_log());
        let ran = [
            ToolCall::new("lookup_contact", json!({"name": "John"})),
            ToolCall::new("send_chat", json!({"recipient": "John", "text": "Meeting?"})),
        ];
        let suggestions = missing_lookup_suggestions(&registry, &ran, &[]);
        assert_eq!(
            suggestions,
            vec!["Look up John before send_chat so that recipient holds an address"]
        );

        // A binding for another parameter does not cover this one.
        let elsewhere = DependencyBinding {
            lookup_index: 0,
            dependent_index: 1,
            parameter: "to".to_string(),
            reference: "John".to_string(),
        };
        assert_eq!(missing_lookup_suggestions(&registry, &ran, &[elsewhere]).len(), 1);
    }

    #[tokio::test]
    async fn test_planned_lookup_covers_reference() {
        let (verifier, _) = verifier(
            ScriptedBackend::new().on(prompts::VERIFIER_SYSTEM, verdict("correct")),
        );
        let planned = [
            ToolCall::new("lookup_contact", json!({"name": "John"})),
            ToolCall::new("send_chat", json!({"recipient": "John", "text": "Meeting?"})),
        ];
        let binding = DependencyBinding {
            lookup_index: 0,
            dependent_index: 1,
            parameter: "recipient".to_string(),
            reference: "John".to_string(),
        };

        let result = verifier.audit_with_bindings("message John", &planned, &[binding]).await;
        assert!(result.suggestions.is_empty());
        let result = verifier.audit("message John", &planned).await;
        assert_eq!(result.suggestions.len(), 1);
    }
}
