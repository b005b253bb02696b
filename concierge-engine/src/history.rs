//! Conversation history sources.

use async_trait::async_trait;
use concierge_core::{ConciergeResult, ConversationMessage};
use dashmap::DashMap;

/// Where the analyzer fetches prior conversation from.
#[async_trait]
pub trait ConversationSource: Send + Sync {
    /// Most recent messages of the session, oldest first.
    async fn recent_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> ConciergeResult<Vec<ConversationMessage>>;

    /// The whole thread the session belongs to, oldest first.
    async fn thread_history(
        &self,
        session_id: &str,
        limit: usize,
    ) -> ConciergeResult<Vec<ConversationMessage>>;

    /// Messages matching `query`.
    async fn search(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
    ) -> ConciergeResult<Vec<ConversationMessage>>;
}

/// A source with no history at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

#[async_trait]
impl ConversationSource for NoHistory {
    async fn recent_messages(&self, _: &str, _: usize) -> ConciergeResult<Vec<ConversationMessage>> {
        Ok(Vec::new())
    }

    async fn thread_history(&self, _: &str, _: usize) -> ConciergeResult<Vec<ConversationMessage>> {
        Ok(Vec::new())
    }

    async fn search(&self, _: &str, _: &str, _: usize) -> ConciergeResult<Vec<ConversationMessage>> {
        Ok(Vec::new())
    }
}

/// In-process per-session transcript.
///
/// A session is its own thread, so `thread_history` and `recent_messages`
/// differ only in how much they return.
#[derive(Debug, Default)]
pub struct SessionHistory {
    sessions: DashMap<String, Vec<ConversationMessage>>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, session_id: &str, message: ConversationMessage) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .push(message);
    }

    pub fn len(&self, session_id: &str) -> usize {
        self.sessions.get(session_id).map(|m| m.len()).unwrap_or(0)
    }

    fn tail(&self, session_id: &str, limit: usize) -> Vec<ConversationMessage> {
        self.sessions
            .get(session_id)
            .map(|messages| {
                let skip = messages.len().saturating_sub(limit);
                messages[skip..].to_vec()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConversationSource for SessionHistory {
    async fn recent_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> ConciergeResult<Vec<ConversationMessage>> {
        Ok(self.tail(session_id, limit.min(5)))
    }

    async fn thread_history(
        &self,
        session_id: &str,
        limit: usize,
    ) -> ConciergeResult<Vec<ConversationMessage>> {
        Ok(self.tail(session_id, limit))
    }

    async fn search(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
    ) -> ConciergeResult<Vec<ConversationMessage>> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        let Some(messages) = self.sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<ConversationMessage> = messages
            .iter()
            .rev()
            .filter(|m| {
                let content = m.content.to_lowercase();
                words.iter().any(|w| content.contains(w.as_str()))
            })
            .take(limit)
            .cloned()
            .collect();
        hits.reverse();
        Ok(hits)
    }
}
