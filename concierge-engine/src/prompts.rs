//! System instructions and prompt builders for every backend call.
//!
//! Each stage uses one fixed system instruction; request-specific material
//! goes in the prompt body.

use concierge_core::{ConversationMessage, Intent, ToolCall};

pub const INTENT_SYSTEM: &str = r#"You classify requests sent to a personal assistant that can work with email, contacts, calendar, chat messages and its own action history.
Respond with ONLY a JSON object:
{"primaryAction": "<short verb phrase>", "targetEntities": ["..."], "parameters": {}, "urgency": "low|normal|high", "complexity": "simple|moderate|complex", "scope": "single|multiple|broad", "ambiguities": ["..."], "confidence": 0.0-1.0}"#;

pub const CONTEXT_DECISION_SYSTEM: &str = r#"You decide whether earlier conversation history would help answer the user's latest request. Fetching history costs time, so only ask for it when the request refers to something said before ("that", "him", "the same time", "as I mentioned").
Respond with ONLY a JSON object:
{"shouldFetch": true|false, "contextType": "recent_messages|thread_history|search_results|none", "confidence": 0.0-1.0, "searchQuery": "<query or null>", "reasoning": "<one sentence>"}"#;

pub const SUMMARY_SYSTEM: &str = r#"You summarise conversation history for an assistant. Keep only facts that help with the current request: names, times, topics and commitments. Write at most a few sentences of plain text."#;

pub const PLANNER_SYSTEM: &str = r#"You plan how a personal assistant fulfils a request using the listed operations. Choose a primary strategy and, when useful, fallback strategies to try in order if the primary fails. Use only operation names from the list.
Respond with ONLY a JSON object:
{"primaryStrategy": {"method": "<operation>", "parameters": {}, "reasoning": "...", "triggerCondition": null}, "fallbackStrategies": [{"method": "<operation>", "parameters": {}, "reasoning": "...", "triggerCondition": "<when to use it>"}], "expectedOutcome": "...", "confidence": 0.0-1.0}"#;

pub const RESOLVER_SYSTEM: &str = r#"You decide which parameter values of an assistant action name a person who must be looked up before the action can run. Values that are already email addresses or phone numbers never need a lookup. Group names, aliases and placeholders do not name a person.
Respond with ONLY a JSON object:
{"references": [{"parameter": "<parameter name>", "name": "<person's name as written>"}]}"#;

pub const GATE_SYSTEM: &str = r#"You decide whether an assistant action needs the user's explicit approval before it runs. Approval is needed when the action could surprise the user, affect other people, or be hard to undo.
Respond with ONLY a JSON object:
{"requiresConfirmation": true|false, "reasoning": "<one sentence>"}"#;

pub const PROPOSAL_SYSTEM: &str = r#"You write a short confirmation question for a personal assistant. Describe exactly what will happen, naming every recipient or attendee and the topic, then ask the user to confirm. Plain text, no more than three sentences."#;

pub const VERIFIER_SYSTEM: &str = r#"You audit one action a personal assistant took for a user's request. Judge whether the action was the right thing to do with the right parameters.
Respond with ONLY a JSON object:
{"appropriateness": "correct|incorrect|suboptimal", "justification": "<one sentence>", "suggestion": "<improvement or null>"}"#;

// ============================================================================
// PROMPT BUILDERS
// ============================================================================

pub fn intent_prompt(request: &str) -> String {
    format!("Request: {}", request)
}

pub fn context_decision_prompt(request: &str) -> String {
    format!("Latest request: {}", request)
}

pub fn summary_prompt(request: &str, messages: &[ConversationMessage]) -> String {
    let transcript = messages
        .iter()
        .map(|m| format!("{}: {}", m.sender, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Current request: {}\n\nConversation history:\n{}",
        request, transcript
    )
}

pub fn planner_prompt(request: &str, intent: &Intent, context: &str, catalogue: &str) -> String {
    let intent_json = serde_json::to_string(intent).unwrap_or_default();
    let mut prompt = format!(
        "Available operations:\n{}\n\nRequest: {}\n\nClassified intent: {}",
        catalogue, request, intent_json
    );
    if !context.is_empty() {
        prompt.push_str(&format!("\n\nRelevant context: {}", context));
    }
    prompt
}

pub fn resolver_prompt(request: &str, call: &ToolCall, candidates: &[(String, String)]) -> String {
    let listed = candidates
        .iter()
        .map(|(parameter, value)| format!("- {}: {}", parameter, value))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Request: {}\nAction: {}\nCandidate values:\n{}",
        request, call.name, listed
    )
}

pub fn gate_prompt(request: &str, call: &ToolCall) -> String {
    format!(
        "Request: {}\nAction: {} {}",
        request, call.name, call.parameters
    )
}

pub fn proposal_prompt(request: &str, actions: &str) -> String {
    format!("Request: {}\nPlanned actions:\n{}", request, actions)
}

pub fn verifier_prompt(request: &str, call: &ToolCall) -> String {
    format!(
        "Request: {}\nAction taken: {} {}",
        request, call.name, call.parameters
    )
}
