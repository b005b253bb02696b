//! Verification verdicts.

use crate::tool::ToolCall;
use serde::{Deserialize, Serialize};

/// Overall verdict on a set of actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Correct,
    Incorrect,
    Partial,
    Unclear,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
            Self::Partial => "partial",
            Self::Unclear => "unclear",
        }
    }
}

/// Judgement on a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Appropriateness {
    Correct,
    Incorrect,
    Suboptimal,
}

impl Appropriateness {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "correct" | "appropriate" => Some(Self::Correct),
            "incorrect" | "inappropriate" | "wrong" => Some(Self::Incorrect),
            "suboptimal" | "partial" => Some(Self::Suboptimal),
            _ => None,
        }
    }
}

/// Per-action audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAppraisal {
    pub action: ToolCall,
    pub appropriateness: Appropriateness,
    pub justification: String,
}

/// Result of auditing a set of actions. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verification_status: VerificationStatus,
    pub reasoning: String,
    pub suggestions: Vec<String>,
    pub per_action_appropriateness: Vec<ActionAppraisal>,
}

impl VerificationResult {
    pub fn unclear(reasoning: impl Into<String>) -> Self {
        Self {
            verification_status: VerificationStatus::Unclear,
            reasoning: reasoning.into(),
            suggestions: Vec::new(),
            per_action_appropriateness: Vec::new(),
        }
    }
}

/// Fold per-action judgements into an overall status.
///
/// Any `Incorrect` wins; otherwise any `Suboptimal` gives `Partial`; all
/// `Correct` gives `Correct`; no judgements at all is `Unclear`.
pub fn aggregate_status<'a, I>(judgements: I) -> VerificationStatus
where
    I: IntoIterator<Item = &'a Appropriateness>,
{
    let mut seen_any = false;
    let mut suboptimal = false;
    for judgement in judgements {
        seen_any = true;
        match judgement {
            Appropriateness::Incorrect => return VerificationStatus::Incorrect,
            Appropriateness::Suboptimal => suboptimal = true,
            Appropriateness::Correct => {}
        }
    }
    if !seen_any {
        VerificationStatus::Unclear
    } else if suboptimal {
        VerificationStatus::Partial
    } else {
        VerificationStatus::Correct
    }
}
