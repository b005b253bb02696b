//! Pending proposals awaiting acceptance.
//!
//! A proposal is executed at most once: `take` removes it, so a second accept
//! of the same id finds nothing.

use crate::resolver::ActionBatch;
use chrono::{DateTime, Utc};
use concierge_core::{ContextGatheringResult, ExecutionPlan, ProposalError, ProposalResponse};
use dashmap::DashMap;
use std::time::Duration;
use uuid::Uuid;

/// Everything needed to execute a proposal once it is accepted.
#[derive(Debug, Clone)]
pub struct PendingProposal {
    pub proposal: ProposalResponse,
    pub plan: ExecutionPlan,
    pub batch: ActionBatch,
    pub request: String,
    pub session_id: String,
    pub context: ContextGatheringResult,
}

impl PendingProposal {
    pub fn id(&self) -> Uuid {
        self.proposal.proposal_id
    }
}

#[derive(Debug)]
pub struct ProposalLedger {
    entries: DashMap<Uuid, PendingProposal>,
    ttl: Duration,
}

impl ProposalLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn park(&self, pending: PendingProposal) {
        tracing::debug!(proposal_id = %pending.id(), "proposal parked");
        self.entries.insert(pending.id(), pending);
    }

    /// Remove and return a proposal for execution.
    pub fn take(&self, id: Uuid, now: DateTime<Utc>) -> Result<PendingProposal, ProposalError> {
        let (_, pending) = self
            .entries
            .remove(&id)
            .ok_or(ProposalError::NotFound { id })?;
        if pending.proposal.is_expired(self.ttl, now) {
            tracing::info!(proposal_id = %id, "proposal expired before acceptance");
            return Err(ProposalError::Expired { id });
        }
        Ok(pending)
    }

    /// Drop a proposal without executing it.
    pub fn discard(&self, id: Uuid) -> Result<(), ProposalError> {
        self.entries
            .remove(&id)
            .map(|_| ())
            .ok_or(ProposalError::NotFound { id })
    }

    /// Remove every expired proposal, returning how many were dropped.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, pending| !pending.proposal.is_expired(self.ttl, now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::{Strategy, ToolCall};
    use serde_json::json;

    fn pending() -> PendingProposal {
        let call = ToolCall::new("compose_message", json!({"to": "john@example.com"}));
        PendingProposal {
            proposal: ProposalResponse::new("Send it?", "compose_message", 0.9, vec![call.clone()]),
            plan: ExecutionPlan::new(
                Strategy::new("compose_message", json!({"to": "john@example.com"}), "direct"),
                "sent",
                0.9,
            ),
            batch: ActionBatch::unresolved(vec![call]),
            request: "email john@example.com".to_string(),
            session_id: "s1".to_string(),
            context: ContextGatheringResult::none(),
        }
    }

    #[test]
    fn test_take_is_single_use() {
        let ledger = ProposalLedger::new(Duration::from_secs(600));
        let pending = pending();
        let id = pending.id();
        ledger.park(pending);

        assert!(ledger.take(id, Utc::now()).is_ok());
        assert_eq!(
            ledger.take(id, Utc::now()).unwrap_err(),
            ProposalError::NotFound { id }
        );
    }

    #[test]
    fn test_expired_proposal_is_rejected_and_removed() {
        let ledger = ProposalLedger::new(Duration::from_secs(60));
        let pending = pending();
        let id = pending.id();
        let later = pending.proposal.created_at + chrono::Duration::seconds(61);
        ledger.park(pending);

        assert_eq!(ledger.take(id, later).unwrap_err(), ProposalError::Expired { id });
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_discard_and_purge() {
        let ledger = ProposalLedger::new(Duration::from_secs(60));
        let first = pending();
        let first_id = first.id();
        ledger.park(first);
        ledger.park(pending());

        assert!(ledger.discard(first_id).is_ok());
        assert!(ledger.discard(first_id).is_err());
        assert_eq!(ledger.len(), 1);

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(ledger.purge_expired(later), 1);
        assert!(ledger.is_empty());
    }
}
