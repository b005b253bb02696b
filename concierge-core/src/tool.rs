//! Executable units dispatched to capabilities and their results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single call dispatched to a capability.
///
/// `name` must match a registered capability; the registry rejects anything
/// else with `CapabilityError::UnknownCapability`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default = "empty_parameters")]
    pub parameters: Value,
}

fn empty_parameters() -> Value {
    Value::Object(Map::new())
}

impl ToolCall {
    pub fn new(name: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// String value of a top-level parameter, if present.
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

/// Result returned by a capability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolResult {
    /// `None` means the capability did not say; only an explicit `false` fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: Some(true),
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: Some(true),
            data: None,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: Some(false),
            data: None,
            message: None,
            error: Some(error.into()),
        }
    }

    /// A result is valid iff `success` is not false and it carries data or a message.
    pub fn is_valid(&self) -> bool {
        self.success != Some(false) && (self.data.is_some() || self.message.is_some())
    }

    /// Why this result is not valid, for diagnostics.
    pub fn invalid_reason(&self) -> String {
        if let Some(error) = &self.error {
            error.clone()
        } else if self.success == Some(false) {
            "capability reported failure".to_string()
        } else {
            "result carried neither data nor message".to_string()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validity_rules() {
        assert!(ToolResult::ok(json!([])).is_valid());
        assert!(ToolResult::message("done").is_valid());
        assert!(!ToolResult::failure("boom").is_valid());
        assert!(!ToolResult::default().is_valid());

        let unflagged = ToolResult {
            success: None,
            data: Some(json!({"id": 1})),
            message: None,
            error: None,
        };
        assert!(unflagged.is_valid());

        let failed_with_data = ToolResult {
            success: Some(false),
            data: Some(json!({"id": 1})),
            message: None,
            error: None,
        };
        assert!(!failed_with_data.is_valid());
    }

    #[test]
    fn test_invalid_reason_prefers_error_text() {
        assert_eq!(ToolResult::failure("quota exceeded").invalid_reason(), "quota exceeded");
        assert!(ToolResult::default().invalid_reason().contains("neither"));
    }

    #[test]
    fn test_tool_call_defaults_parameters() {
        let call: ToolCall = serde_json::from_str(r#"{"name":"list_events"}"#).unwrap();
        assert_eq!(call.parameters, json!({}));
    }

    #[test]
    fn test_tool_result_from_wire() {
        let result: ToolResult =
            serde_json::from_str(r#"{"success":true,"message":"sent"}"#).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.message.as_deref(), Some("sent"));
    }
}
