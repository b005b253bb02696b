//! Intent and context analysis.
//!
//! Intent classification and the context cost/benefit decision run
//! concurrently. History is fetched only when the backend is confident it
//! helps, and only a bounded summary of it leaves this module. No failure
//! here blocks a request: a broken decision or summary yields no context, and
//! a broken classification yields a low-confidence keyword intent.

use crate::history::ConversationSource;
use crate::prompts;
use concierge_core::{
    clamp_unit, AnalysisConfig, Complexity, ContextGatheringResult, ContextType,
    GenerationOptions, Intent, RequestScope, Urgency,
};
use concierge_llm::{decode_json, GenerativeBackend, ProtectedBackend};
use concierge_registry::CapabilityRegistry;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Confidence given to an intent derived from keywords alone.
pub const KEYWORD_INTENT_CONFIDENCE: f32 = 0.2;

/// Output of the analysis stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub intent: Intent,
    pub context: ContextGatheringResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IntentWire {
    primary_action: String,
    target_entities: Vec<String>,
    parameters: Map<String, Value>,
    urgency: String,
    complexity: String,
    scope: String,
    ambiguities: Vec<String>,
    confidence: f32,
}

impl Default for IntentWire {
    fn default() -> Self {
        Self {
            primary_action: String::new(),
            target_entities: Vec::new(),
            parameters: Map::new(),
            urgency: String::new(),
            complexity: String::new(),
            scope: String::new(),
            ambiguities: Vec::new(),
            confidence: 0.5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextDecision {
    #[serde(default)]
    should_fetch: bool,
    #[serde(default)]
    context_type: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    search_query: Option<String>,
    #[serde(default)]
    reasoning: String,
}

pub struct Analyzer {
    backend: Arc<ProtectedBackend>,
    registry: Arc<CapabilityRegistry>,
    source: Arc<dyn ConversationSource>,
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(
        backend: Arc<ProtectedBackend>,
        registry: Arc<CapabilityRegistry>,
        source: Arc<dyn ConversationSource>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            source,
            config,
        }
    }

    pub async fn analyze(&self, request: &str, session_id: &str) -> Analysis {
        let (intent, context) = tokio::join!(
            self.classify_intent(request),
            self.gather_context(request, session_id)
        );
        tracing::debug!(
            primary_action = %intent.primary_action,
            intent_confidence = intent.confidence,
            context_type = context.context_type.as_str(),
            "analysis complete"
        );
        Analysis { intent, context }
    }

    async fn classify_intent(&self, request: &str) -> Intent {
        let raw = match self
            .backend
            .generate_text(
                &prompts::intent_prompt(request),
                prompts::INTENT_SYSTEM,
                &GenerationOptions::default(),
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "intent classification unavailable, using keywords");
                return self.keyword_intent(request);
            }
        };

        match decode_json::<IntentWire>(&raw) {
            Ok(wire) if !wire.primary_action.trim().is_empty() => Intent {
                primary_action: wire.primary_action,
                target_entities: wire.target_entities,
                parameters: wire.parameters,
                urgency: Urgency::parse_lenient(&wire.urgency),
                complexity: Complexity::parse_lenient(&wire.complexity),
                scope: RequestScope::parse_lenient(&wire.scope),
                ambiguities: wire.ambiguities,
                confidence: clamp_unit(wire.confidence),
            },
            Ok(_) => {
                tracing::warn!("intent classification had no primary action, using keywords");
                self.keyword_intent(request)
            }
            Err(e) => {
                tracing::warn!(error = %e, "intent classification unparseable, using keywords");
                self.keyword_intent(request)
            }
        }
    }

    /// Low-confidence intent from keyword matching alone.
    pub fn keyword_intent(&self, request: &str) -> Intent {
        Intent::new(
            self.registry.best_match(request).as_str(),
            KEYWORD_INTENT_CONFIDENCE,
        )
        .with_ambiguity("intent derived from keywords only")
    }

    async fn gather_context(&self, request: &str, session_id: &str) -> ContextGatheringResult {
        let decision = match self
            .backend
            .generate_text(
                &prompts::context_decision_prompt(request),
                prompts::CONTEXT_DECISION_SYSTEM,
                &GenerationOptions::default().with_temperature(0.0),
            )
            .await
        {
            Ok(raw) => match decode_json::<ContextDecision>(&raw) {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::warn!(error = %e, "context decision unparseable, skipping context");
                    return ContextGatheringResult::none();
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "context decision unavailable, skipping context");
                return ContextGatheringResult::none();
            }
        };

        let context_type = ContextType::parse_lenient(&decision.context_type);
        let confidence = clamp_unit(decision.confidence);
        if !decision.should_fetch
            || context_type == ContextType::None
            || confidence < self.config.context_confidence_threshold
        {
            tracing::debug!(
                should_fetch = decision.should_fetch,
                confidence,
                reasoning = %decision.reasoning,
                "context not fetched"
            );
            return ContextGatheringResult::none();
        }

        let limit = self.config.max_context_messages;
        let fetched = match context_type {
            ContextType::RecentMessages => self.source.recent_messages(session_id, limit).await,
            ContextType::ThreadHistory => self.source.thread_history(session_id, limit).await,
            ContextType::SearchResults => {
                let query = decision
                    .search_query
                    .as_deref()
                    .filter(|q| !q.trim().is_empty())
                    .unwrap_or(request);
                self.source.search(session_id, query, limit).await
            }
            ContextType::None => Ok(Vec::new()),
        };

        let mut messages = match fetched {
            Ok(messages) if !messages.is_empty() => messages,
            Ok(_) => return ContextGatheringResult::none(),
            Err(e) => {
                tracing::warn!(error = %e, "conversation history unavailable");
                return ContextGatheringResult::none();
            }
        };
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }

        let summary = match self
            .backend
            .generate_text(
                &prompts::summary_prompt(request, &messages),
                prompts::SUMMARY_SYSTEM,
                &GenerationOptions::default().with_max_tokens(400),
            )
            .await
        {
            Ok(summary) => truncate_chars(summary.trim(), self.config.max_summary_chars),
            Err(e) => {
                tracing::warn!(error = %e, "context summary failed, skipping context");
                return ContextGatheringResult::none();
            }
        };
        if summary.is_empty() {
            return ContextGatheringResult::none();
        }

        ContextGatheringResult {
            messages,
            relevant_context: summary,
            context_type,
            confidence,
        }
    }
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
