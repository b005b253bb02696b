//! Capability identifiers and operation descriptors.
//!
//! Dispatch is closed: every operation the engine can call is a `CapabilityId`
//! variant, so an unrecognised name fails fast instead of becoming a no-op.

use serde::{Deserialize, Serialize};

// ============================================================================
// CAPABILITY ID
// ============================================================================

/// Every operation a domain capability can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityId {
    /// Email: search the mailbox
    SearchMessages,
    /// Email: compose and send a message
    ComposeMessage,
    /// Contacts: resolve a person's name to an address
    LookupContact,
    /// Calendar: list upcoming events
    ListEvents,
    /// Calendar: create an event, optionally with attendees
    CreateEvent,
    /// Messaging: read recent chat messages
    ReadChats,
    /// Messaging: send a chat message
    SendChat,
    /// Self-reflection: review the assistant's own recent actions
    SelfReflect,
}

impl CapabilityId {
    pub const ALL: [CapabilityId; 8] = [
        Self::SearchMessages,
        Self::ComposeMessage,
        Self::LookupContact,
        Self::ListEvents,
        Self::CreateEvent,
        Self::ReadChats,
        Self::SendChat,
        Self::SelfReflect,
    ];

    /// Wire name used in tool calls and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchMessages => "search_messages",
            Self::ComposeMessage => "compose_message",
            Self::LookupContact => "lookup_contact",
            Self::ListEvents => "list_events",
            Self::CreateEvent => "create_event",
            Self::ReadChats => "read_chats",
            Self::SendChat => "send_chat",
            Self::SelfReflect => "self_reflect",
        }
    }

    /// Parse from wire name.
    pub fn from_name(s: &str) -> Result<Self, CapabilityIdParseError> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s.trim())
            .ok_or_else(|| CapabilityIdParseError(s.to_string()))
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing CapabilityId from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityIdParseError(pub String);

impl std::fmt::Display for CapabilityIdParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid capability id: {}", self.0)
    }
}

impl std::error::Error for CapabilityIdParseError {}

impl From<CapabilityIdParseError> for crate::CapabilityError {
    fn from(e: CapabilityIdParseError) -> Self {
        crate::CapabilityError::UnknownCapability { name: e.0 }
    }
}

// ============================================================================
// OPERATION DESCRIPTOR
// ============================================================================

/// When an operation needs explicit user approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPolicy {
    /// Never on its own (mutation-class operations still always confirm).
    #[default]
    Never,
    /// Always.
    Always,
    /// Borderline: the backend decides per request.
    Judge,
}

/// One declared parameter of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl ParameterSpec {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: false,
        }
    }
}

/// What a capability declares about one of its operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub id: CapabilityId,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    /// Changes state in an external system.
    pub mutates: bool,
    pub confirmation: ConfirmationPolicy,
    /// Parameters that may hold a person reference needing resolution.
    #[serde(default)]
    pub reference_parameters: Vec<String>,
    /// This operation turns a person reference into an address.
    #[serde(default)]
    pub resolves_references: bool,
    /// Trigger keywords for non-AI matching.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl OperationDescriptor {
    pub fn name(&self) -> &'static str {
        self.id.as_str()
    }

    pub fn requires_confirmation(&self) -> bool {
        self.mutates || self.confirmation == ConfirmationPolicy::Always
    }

    /// Stock descriptor for a capability id.
    pub fn standard(id: CapabilityId) -> Self {
        let words = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match id {
            CapabilityId::SearchMessages => Self {
                id,
                description: "Search the user's email for messages matching a query".to_string(),
                parameters: vec![
                    ParameterSpec::required("query", "Free-text search query"),
                    ParameterSpec::optional("limit", "Maximum number of messages"),
                ],
                mutates: false,
                confirmation: ConfirmationPolicy::Never,
                reference_parameters: vec![],
                resolves_references: false,
                keywords: words(&["search", "find", "messages", "inbox", "recent", "emails"]),
                examples: words(&["search my recent messages about invoices"]),
            },
            CapabilityId::ComposeMessage => Self {
                id,
                description: "Compose and send an email".to_string(),
                parameters: vec![
                    ParameterSpec::required("to", "Recipient address"),
                    ParameterSpec::required("subject", "Subject line"),
                    ParameterSpec::required("body", "Message body"),
                ],
                mutates: true,
                confirmation: ConfirmationPolicy::Always,
                reference_parameters: words(&["to", "cc"]),
                resolves_references: false,
                keywords: words(&["email", "compose", "write", "draft", "reply"]),
                examples: words(&["email John about the meeting tomorrow"]),
            },
            CapabilityId::LookupContact => Self {
                id,
                description: "Look up a contact's address by name".to_string(),
                parameters: vec![ParameterSpec::required("name", "Person's name")],
                mutates: false,
                confirmation: ConfirmationPolicy::Never,
                reference_parameters: vec![],
                resolves_references: true,
                keywords: words(&["contact", "address", "phone", "who"]),
                examples: words(&["what is Sarah's email address"]),
            },
            CapabilityId::ListEvents => Self {
                id,
                description: "List calendar events in a time range".to_string(),
                parameters: vec![
                    ParameterSpec::optional("start", "Range start (ISO 8601)"),
                    ParameterSpec::optional("end", "Range end (ISO 8601)"),
                ],
                mutates: false,
                confirmation: ConfirmationPolicy::Never,
                reference_parameters: vec![],
                resolves_references: false,
                keywords: words(&["calendar", "schedule", "agenda", "events", "free", "busy"]),
                examples: words(&["what's on my calendar tomorrow"]),
            },
            CapabilityId::CreateEvent => Self {
                id,
                description: "Create a calendar event".to_string(),
                parameters: vec![
                    ParameterSpec::required("title", "Event title"),
                    ParameterSpec::required("start", "Start time (ISO 8601)"),
                    ParameterSpec::optional("end", "End time (ISO 8601)"),
                    ParameterSpec::optional("attendees", "Attendee addresses"),
                ],
                mutates: true,
                confirmation: ConfirmationPolicy::Always,
                reference_parameters: words(&["attendees"]),
                resolves_references: false,
                keywords: words(&["schedule", "meeting", "book", "invite", "event"]),
                examples: words(&["set up a meeting with Priya on Friday at 3pm"]),
            },
            CapabilityId::ReadChats => Self {
                id,
                description: "Read recent chat messages".to_string(),
                parameters: vec![ParameterSpec::optional("from", "Sender to filter by")],
                mutates: false,
                confirmation: ConfirmationPolicy::Never,
                reference_parameters: vec![],
                resolves_references: false,
                keywords: words(&["chat", "texts", "dm"]),
                examples: words(&["any new texts from Alex"]),
            },
            CapabilityId::SendChat => Self {
                id,
                description: "Send a chat message".to_string(),
                parameters: vec![
                    ParameterSpec::required("recipient", "Recipient handle or number"),
                    ParameterSpec::required("text", "Message text"),
                ],
                mutates: true,
                confirmation: ConfirmationPolicy::Always,
                reference_parameters: words(&["recipient"]),
                resolves_references: false,
                keywords: words(&["text", "message", "chat", "ping"]),
                examples: words(&["text Alex that I'm running late"]),
            },
            CapabilityId::SelfReflect => Self {
                id,
                description: "Review the assistant's recent actions and answer questions about them"
                    .to_string(),
                parameters: vec![ParameterSpec::optional("request", "What to reflect on")],
                mutates: false,
                confirmation: ConfirmationPolicy::Never,
                reference_parameters: vec![],
                resolves_references: false,
                keywords: words(&["why", "did", "you", "explain", "reflect"]),
                examples: words(&["why did you send that email"]),
            },
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_id_roundtrip() {
        for id in CapabilityId::ALL {
            assert_eq!(CapabilityId::from_name(id.as_str()).unwrap(), id);
        }
    }

    #[test]
    fn test_unknown_capability_rejected() {
        let err = CapabilityId::from_name("teleport").unwrap_err();
        assert_eq!(err, CapabilityIdParseError("teleport".to_string()));
        let cap_err: crate::CapabilityError = err.into();
        assert!(matches!(cap_err, crate::CapabilityError::UnknownCapability { .. }));
    }

    #[test]
    fn test_standard_descriptors_are_consistent() {
        for id in CapabilityId::ALL {
            let d = OperationDescriptor::standard(id);
            assert_eq!(d.id, id);
            assert!(!d.keywords.is_empty());
            if !d.reference_parameters.is_empty() {
                assert!(d.mutates, "{} declares references but does not mutate", id);
            }
        }
        assert!(OperationDescriptor::standard(CapabilityId::LookupContact).resolves_references);
        assert!(OperationDescriptor::standard(CapabilityId::ComposeMessage).requires_confirmation());
        assert!(!OperationDescriptor::standard(CapabilityId::SearchMessages).requires_confirmation());
    }
}
