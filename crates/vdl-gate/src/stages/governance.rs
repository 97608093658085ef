use serde::{Deserialize, Serialize};
use vdl_crypto::{canonical_hash, EncodingError};
use vdl_types::{ActorKind, Digest};

use crate::error::GateError;
use crate::stage::{AppendProposal, GateContext, GateStage, StageDecision};

/// Procurements above this total (minor units) need a human signer.
pub const HUMAN_APPROVAL_THRESHOLD: i64 = 500_000;

// ---------------------------------------------------------------------------
// Policy types
// ---------------------------------------------------------------------------

/// An ordered rule set. The first rule whose action and conditions match
/// decides; when none match the action is denied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernancePolicy {
    pub id: String,
    pub version: u32,
    pub rules: Vec<GovernanceRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceRule {
    pub id: String,
    /// `event:<EventType>`, or a prefix ending in `*`.
    pub action: String,
    #[serde(default)]
    pub when: Vec<Condition>,
    #[serde(default)]
    pub effect: Effect,
    /// Actor kinds allowed by this rule. Empty means any kind.
    #[serde(default)]
    pub actor_kinds: Vec<ActorKind>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

/// An integer comparison on a value derived from the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Comparison,
    pub value: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Comparison, value: i64) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// A condition on a field the event does not carry never holds.
    fn holds(&self, proposal: &AppendProposal<'_>) -> bool {
        let Some(actual) = proposal.derived_value(&self.field) else {
            return false;
        };
        match self.op {
            Comparison::Gt => actual > self.value,
            Comparison::Gte => actual >= self.value,
            Comparison::Lt => actual < self.value,
            Comparison::Lte => actual <= self.value,
            Comparison::Eq => actual == self.value,
        }
    }
}

impl GovernanceRule {
    pub fn allow(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            when: Vec::new(),
            effect: Effect::Allow,
            actor_kinds: Vec::new(),
        }
    }

    pub fn deny(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow(id, action)
        }
    }

    pub fn only(mut self, kinds: &[ActorKind]) -> Self {
        self.actor_kinds = kinds.to_vec();
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.when.push(condition);
        self
    }

    fn matches(&self, action: &str, proposal: &AppendProposal<'_>) -> bool {
        let action_matches = match self.action.strip_suffix('*') {
            Some(prefix) => action.starts_with(prefix),
            None => self.action == action,
        };
        action_matches && self.when.iter().all(|c| c.holds(proposal))
    }
}

impl GovernancePolicy {
    /// The standard rule set for business operations.
    pub fn standard() -> Self {
        use ActorKind::{Agent, Auditor, Human, System};

        Self {
            id: "governance_standard".into(),
            version: 1,
            rules: vec![
                GovernanceRule::allow("large-procurement-needs-human", "event:ProcurementOrdered")
                    .when(Condition::new(
                        "procurement_total",
                        Comparison::Gt,
                        HUMAN_APPROVAL_THRESHOLD,
                    ))
                    .only(&[Human]),
                GovernanceRule::allow("procurement", "event:ProcurementOrdered"),
                GovernanceRule::allow("goods-received", "event:GoodsReceived"),
                GovernanceRule::allow("order-placed", "event:OrderPlaced"),
                GovernanceRule::allow("payment-captured", "event:PaymentCaptured"),
                GovernanceRule::allow("shipment-dispatched", "event:ShipmentDispatched"),
                GovernanceRule::allow("refund-issued", "event:RefundIssued"),
                GovernanceRule::allow("inventory-adjusted", "event:InventoryAdjusted"),
                GovernanceRule::allow("disclosure-published", "event:DisclosurePublished")
                    .only(&[Agent, System]),
                GovernanceRule::allow(
                    "selective-disclosure-revealed",
                    "event:SelectiveDisclosureRevealed",
                )
                .only(&[Human, Auditor]),
            ],
        }
    }

    /// Hash of the canonical encoding of the rule set.
    pub fn policy_hash(&self) -> Result<Digest, EncodingError> {
        canonical_hash(self)
    }

    /// The rule that decides `proposal`, if any.
    pub fn first_match(&self, proposal: &AppendProposal<'_>) -> Option<&GovernanceRule> {
        let action = proposal.action();
        self.rules.iter().find(|r| r.matches(&action, proposal))
    }
}

// ---------------------------------------------------------------------------
// GovernanceStage
// ---------------------------------------------------------------------------

/// Default-deny governance stage.
pub struct GovernanceStage;

impl GateStage for GovernanceStage {
    fn name(&self) -> &str {
        "governance"
    }

    fn evaluate(
        &self,
        proposal: &AppendProposal<'_>,
        context: &GateContext<'_>,
    ) -> Result<StageDecision, GateError> {
        let action = proposal.action();
        let Some(rule) = context.policy.first_match(proposal) else {
            return Ok(StageDecision::fail(format!("no rule permits {action}")));
        };
        tracing::debug!(rule = %rule.id, action = %action, "governance rule matched");

        if rule.effect == Effect::Deny {
            return Ok(StageDecision::fail(format!("rule {} denies {action}", rule.id)));
        }
        if !rule.actor_kinds.is_empty() && !rule.actor_kinds.contains(&proposal.actor.kind) {
            let kinds: Vec<&str> = rule.actor_kinds.iter().map(ActorKind::as_str).collect();
            return Ok(StageDecision::fail(format!(
                "rule {} requires a {} actor for {action}",
                rule.id,
                kinds.join(" or ")
            )));
        }
        Ok(StageDecision::Pass)
    }
}
