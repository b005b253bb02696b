//! Conversation context gathered for a single request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where gathered context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    RecentMessages,
    ThreadHistory,
    SearchResults,
    #[default]
    None,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecentMessages => "recent_messages",
            Self::ThreadHistory => "thread_history",
            Self::SearchResults => "search_results",
            Self::None => "none",
        }
    }

    /// Lenient parse; anything unrecognised is `None`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "recent_messages" | "recent" => Self::RecentMessages,
            "thread_history" | "thread" => Self::ThreadHistory,
            "search_results" | "search" => Self::SearchResults,
            _ => Self::None,
        }
    }
}

/// A prior conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub sender: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConversationMessage {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            timestamp: None,
        }
    }
}

/// Context gathered for one request. Never reused across requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextGatheringResult {
    pub messages: Vec<ConversationMessage>,
    /// Summary of `messages` relative to the current request.
    pub relevant_context: String,
    pub context_type: ContextType,
    pub confidence: f32,
}

impl ContextGatheringResult {
    pub fn none() -> Self {
        Self {
            messages: Vec::new(),
            relevant_context: String::new(),
            context_type: ContextType::None,
            confidence: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.context_type == ContextType::None || self.relevant_context.is_empty()
    }
}

impl Default for ContextGatheringResult {
    fn default() -> Self {
        Self::none()
    }
}
