use std::time::Duration;

use vdl_crypto::VerifyingKey;
use vdl_ledger::{EventDraft, EventPayload};
use vdl_types::ActorId;

use crate::error::GateError;
use crate::stages::governance::GovernancePolicy;

/// An append request as seen by the gate: the draft, who is signing it, and
/// the key they are signing with.
#[derive(Clone, Copy, Debug)]
pub struct AppendProposal<'a> {
    pub draft: &'a EventDraft,
    pub actor: &'a ActorId,
    pub key: &'a VerifyingKey,
}

impl<'a> AppendProposal<'a> {
    pub fn new(draft: &'a EventDraft, actor: &'a ActorId, key: &'a VerifyingKey) -> Self {
        Self { draft, actor, key }
    }

    /// Governance action name, e.g. `event:OrderPlaced`.
    pub fn action(&self) -> String {
        format!("event:{}", self.draft.payload.event_type())
    }

    /// Integer values derived from the payload that rule conditions can test.
    ///
    /// Returns `None` when the field does not apply to this event kind.
    pub fn derived_value(&self, field: &str) -> Option<i64> {
        let payload = &self.draft.payload;
        match (field, payload) {
            ("procurement_total", EventPayload::ProcurementOrdered(p)) => {
                Some(p.total().minor_units())
            }
            ("order_total", EventPayload::OrderPlaced(o)) => Some(o.total().minor_units()),
            ("amount", EventPayload::PaymentCaptured(p)) => Some(p.amount.minor_units()),
            ("amount", EventPayload::RefundIssued(r)) => Some(r.amount.minor_units()),
            ("item_count", _) => item_count(payload).map(|n| n as i64),
            _ => None,
        }
    }
}

fn item_count(payload: &EventPayload) -> Option<usize> {
    match payload {
        EventPayload::ProcurementOrdered(p) => Some(p.items.len()),
        EventPayload::GoodsReceived(g) => Some(g.items.len()),
        EventPayload::OrderPlaced(o) => Some(o.items.len()),
        EventPayload::ShipmentDispatched(s) => Some(s.items.len()),
        EventPayload::InventoryAdjusted(a) => Some(a.items.len()),
        _ => None,
    }
}

/// Verdict of one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageDecision {
    Pass,
    /// Deny the append with a human-readable reason.
    Fail { reason: String },
}

impl StageDecision {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        *self == Self::Pass
    }
}

/// Trace entry for a stage that ran.
#[derive(Clone, Debug)]
pub struct StageOutcome {
    pub stage: String,
    pub passed: bool,
    /// Why the stage failed, when it did.
    pub reason: Option<String>,
    pub took: Duration,
}

/// What a stage can see besides the proposal itself.
pub struct GateContext<'a> {
    /// Rule set in force for this append.
    pub policy: &'a GovernancePolicy,
    /// Stages that ran before this one.
    pub completed: Vec<StageOutcome>,
}

impl<'a> GateContext<'a> {
    pub fn new(policy: &'a GovernancePolicy) -> Self {
        Self {
            policy,
            completed: Vec::new(),
        }
    }
}

/// One check in the append gate. Stages are boxed into the gate's pipeline.
pub trait GateStage: Send + Sync {
    /// Short stage name, reported in denials.
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        proposal: &AppendProposal<'_>,
        context: &GateContext<'_>,
    ) -> Result<StageDecision, GateError>;
}
