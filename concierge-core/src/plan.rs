//! Execution plans: a primary strategy plus ordered fallbacks.

use crate::intent::clamp_unit;
use crate::tool::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One candidate way to fulfil a request.
///
/// Fields are private so a strategy cannot change once produced; patching
/// parameters yields a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    method: String,
    parameters: Value,
    reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trigger_condition: Option<String>,
}

impl Strategy {
    pub fn new(method: impl Into<String>, parameters: Value, reasoning: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            parameters,
            reasoning: reasoning.into(),
            trigger_condition: None,
        }
    }

    /// Advisory condition under which this strategy is expected to help.
    pub fn with_trigger_condition(mut self, condition: impl Into<String>) -> Self {
        self.trigger_condition = Some(condition.into());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn trigger_condition(&self) -> Option<&str> {
        self.trigger_condition.as_deref()
    }

    pub fn to_tool_call(&self) -> ToolCall {
        ToolCall::new(self.method.clone(), self.parameters.clone())
    }

    /// Copy of this strategy with different parameters.
    pub fn with_parameters(&self, parameters: Value) -> Self {
        Self {
            method: self.method.clone(),
            parameters,
            reasoning: self.reasoning.clone(),
            trigger_condition: self.trigger_condition.clone(),
        }
    }
}

/// The decision artifact consumed by the executor.
///
/// `fallback_strategies` is ordered: earlier entries are tried first. An empty
/// list means no recovery path beyond the primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub primary_strategy: Strategy,
    pub fallback_strategies: Vec<Strategy>,
    pub expected_outcome: String,
    pub confidence: f32,
}

impl ExecutionPlan {
    pub fn new(primary_strategy: Strategy, expected_outcome: impl Into<String>, confidence: f32) -> Self {
        Self {
            primary_strategy,
            fallback_strategies: Vec::new(),
            expected_outcome: expected_outcome.into(),
            confidence: clamp_unit(confidence),
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<Strategy>) -> Self {
        self.fallback_strategies = fallbacks;
        self
    }

    /// Primary followed by fallbacks, in attempt order.
    pub fn strategies(&self) -> impl Iterator<Item = &Strategy> {
        std::iter::once(&self.primary_strategy).chain(self.fallback_strategies.iter())
    }

    pub fn strategy_count(&self) -> usize {
        1 + self.fallback_strategies.len()
    }

    /// Apply `patch` to every strategy's parameters, returning a new plan.
    ///
    /// `patch` receives each strategy's position in attempt order.
    pub fn map_parameters<F>(&self, mut patch: F) -> Self
    where
        F: FnMut(usize, &Strategy) -> Value,
    {
        Self {
            primary_strategy: self
                .primary_strategy
                .with_parameters(patch(0, &self.primary_strategy)),
            fallback_strategies: self
                .fallback_strategies
                .iter()
                .enumerate()
                .map(|(index, s)| s.with_parameters(patch(index + 1, s)))
                .collect(),
            expected_outcome: self.expected_outcome.clone(),
            confidence: self.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan() -> ExecutionPlan {
        ExecutionPlan::new(
            Strategy::new("search_messages", json!({"query": "invoices"}), "direct search"),
            "matching messages",
            0.9,
        )
        .with_fallbacks(vec![
            Strategy::new("read_chats", json!({"query": "invoices"}), "maybe a chat")
                .with_trigger_condition("no email matches"),
        ])
    }

    #[test]
    fn test_strategies_in_attempt_order() {
        let p = plan();
        let methods: Vec<_> = p.strategies().map(Strategy::method).collect();
        assert_eq!(methods, vec!["search_messages", "read_chats"]);
        assert_eq!(p.strategy_count(), 2);
    }

    #[test]
    fn test_map_parameters_leaves_original_untouched() {
        let p = plan();
        let patched = p.map_parameters(|position, _| json!({"query": "receipts", "position": position}));
        assert_eq!(p.primary_strategy.parameters(), &json!({"query": "invoices"}));
        assert_eq!(
            patched.primary_strategy.parameters(),
            &json!({"query": "receipts", "position": 0})
        );
        assert_eq!(patched.fallback_strategies[0].parameters()["position"], 1);
        assert_eq!(
            patched.fallback_strategies[0].trigger_condition(),
            Some("no email matches")
        );
    }

    #[test]
    fn test_confidence_clamped() {
        let p = ExecutionPlan::new(Strategy::new("x", json!({}), ""), "", 7.0);
        assert_eq!(p.confidence, 1.0);
    }
}
