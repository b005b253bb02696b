//! Proposals awaiting explicit user acceptance.

use crate::tool::ToolCall;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Human-readable description of a pending mutation-class action set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub proposal_id: Uuid,
    pub text: String,
    /// Capability name of the primary state-changing action.
    pub action_type: String,
    pub confidence: f32,
    pub requires_confirmation: bool,
    pub original_tool_calls: Vec<ToolCall>,
    pub created_at: DateTime<Utc>,
}

impl ProposalResponse {
    pub fn new(
        text: impl Into<String>,
        action_type: impl Into<String>,
        confidence: f32,
        original_tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            proposal_id: Uuid::now_v7(),
            text: text.into(),
            action_type: action_type.into(),
            confidence: crate::intent::clamp_unit(confidence),
            requires_confirmation: true,
            original_tool_calls,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.created_at) > ttl,
            Err(_) => false,
        }
    }
}
