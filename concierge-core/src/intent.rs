//! Structured intent produced by the analyzer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How soon the user needs the request handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
}

/// How many steps the request is likely to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Moderate,
    Complex,
}

/// How much data the request touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestScope {
    #[default]
    Single,
    Multiple,
    Broad,
}

impl Urgency {
    /// Lenient parse; unknown values become `Normal`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" | "urgent" | "critical" => Self::High,
            _ => Self::Normal,
        }
    }
}

impl Complexity {
    /// Lenient parse; unknown values become `Moderate`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "simple" | "low" => Self::Simple,
            "complex" | "high" => Self::Complex,
            _ => Self::Moderate,
        }
    }
}

impl RequestScope {
    /// Lenient parse; unknown values become `Single`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "multiple" | "several" => Self::Multiple,
            "broad" | "all" | "global" => Self::Broad,
            _ => Self::Single,
        }
    }
}

/// Structured classification of a raw request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub primary_action: String,
    pub target_entities: Vec<String>,
    pub parameters: Map<String, Value>,
    pub urgency: Urgency,
    pub complexity: Complexity,
    pub scope: RequestScope,
    pub ambiguities: Vec<String>,
    /// Always within `[0, 1]`.
    pub confidence: f32,
}

impl Intent {
    pub fn new(primary_action: impl Into<String>, confidence: f32) -> Self {
        Self {
            primary_action: primary_action.into(),
            target_entities: Vec::new(),
            parameters: Map::new(),
            urgency: Urgency::default(),
            complexity: Complexity::default(),
            scope: RequestScope::default(),
            ambiguities: Vec::new(),
            confidence: clamp_unit(confidence),
        }
    }

    pub fn with_ambiguity(mut self, ambiguity: impl Into<String>) -> Self {
        self.ambiguities.push(ambiguity.into());
        self
    }
}

/// Clamp a score into `[0, 1]`, mapping NaN to 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
