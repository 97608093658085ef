use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vdl_crypto::{canonical_hash, ChainLink, EncodingError, Signature};
use vdl_types::{ActorId, Digest, EventId, Money, Period, Timestamp};

use crate::error::LedgerError;

/// Version of the event schema written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostItem {
    pub sku: String,
    pub qty: i64,
    pub unit_cost: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedItem {
    pub sku: String,
    pub qty: i64,
    pub expiry_date: String,
    /// Falls back to the procurement order's unit cost when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<Money>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub sku: String,
    pub qty: i64,
    pub unit_price: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentItem {
    pub sku: String,
    pub qty: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentItem {
    pub sku: String,
    pub qty_delta: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementOrdered {
    pub procurement_id: String,
    pub supplier_id: String,
    pub items: Vec<CostItem>,
    pub expected_date: String,
}

impl ProcurementOrdered {
    /// Σ qty · unit_cost.
    pub fn total(&self) -> Money {
        self.items.iter().map(|i| i.unit_cost.times(i.qty)).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub procurement_id: String,
    pub batch_id: String,
    pub items: Vec<ReceivedItem>,
    pub qc_passed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: String,
    pub customer_ref: String,
    pub items: Vec<OrderItem>,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl OrderPlaced {
    /// Σ qty · unit_price.
    pub fn total(&self) -> Money {
        self.items.iter().map(|i| i.unit_price.times(i.qty)).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCaptured {
    pub order_id: String,
    pub amount: Money,
    pub method: String,
    pub receipt_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentDispatched {
    pub order_id: String,
    pub items: Vec<ShipmentItem>,
    pub carrier_ref: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundIssued {
    pub order_id: String,
    pub amount: Money,
    pub receipt_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAdjusted {
    pub reason: String,
    pub items: Vec<AdjustmentItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosurePublished {
    pub disclosure_id: Digest,
    pub policy_id: String,
    pub period: Period,
    pub root_summary: Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_details: Option<Digest>,
    pub statement_sig_hash: Digest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectiveDisclosureRevealed {
    pub disclosure_id: Digest,
    pub metric_key: String,
    pub group: BTreeMap<String, String>,
    pub revealed_event_hashes: Vec<Digest>,
}

/// Every kind of event the ledger accepts, with its fixed schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum EventPayload {
    ProcurementOrdered(ProcurementOrdered),
    GoodsReceived(GoodsReceived),
    OrderPlaced(OrderPlaced),
    PaymentCaptured(PaymentCaptured),
    ShipmentDispatched(ShipmentDispatched),
    RefundIssued(RefundIssued),
    InventoryAdjusted(InventoryAdjusted),
    DisclosurePublished(DisclosurePublished),
    SelectiveDisclosureRevealed(SelectiveDisclosureRevealed),
}

impl EventPayload {
    /// The wire tag of this payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ProcurementOrdered(_) => "ProcurementOrdered",
            Self::GoodsReceived(_) => "GoodsReceived",
            Self::OrderPlaced(_) => "OrderPlaced",
            Self::PaymentCaptured(_) => "PaymentCaptured",
            Self::ShipmentDispatched(_) => "ShipmentDispatched",
            Self::RefundIssued(_) => "RefundIssued",
            Self::InventoryAdjusted(_) => "InventoryAdjusted",
            Self::DisclosurePublished(_) => "DisclosurePublished",
            Self::SelectiveDisclosureRevealed(_) => "SelectiveDisclosureRevealed",
        }
    }

    /// The order this event refers to, if any (excluding `OrderPlaced` itself).
    pub fn order_reference(&self) -> Option<&str> {
        match self {
            Self::PaymentCaptured(p) => Some(&p.order_id),
            Self::ShipmentDispatched(s) => Some(&s.order_id),
            Self::RefundIssued(r) => Some(&r.order_id),
            _ => None,
        }
    }

    /// Structural checks applied before an event is hashed.
    pub fn validate(&self) -> Result<(), LedgerError> {
        let fail = |reason: String| LedgerError::InvalidPayload {
            event_type: self.event_type(),
            reason,
        };
        match self {
            Self::ProcurementOrdered(p) => {
                require_text("procurement_id", &p.procurement_id).map_err(fail)?;
                require_text("supplier_id", &p.supplier_id).map_err(fail)?;
                require_items(p.items.len()).map_err(fail)?;
                for item in &p.items {
                    require_text("sku", &item.sku).map_err(fail)?;
                    require_positive(item.qty).map_err(fail)?;
                    require_non_negative("unit_cost", item.unit_cost).map_err(fail)?;
                }
            }
            Self::GoodsReceived(g) => {
                require_text("procurement_id", &g.procurement_id).map_err(fail)?;
                require_text("batch_id", &g.batch_id).map_err(fail)?;
                require_items(g.items.len()).map_err(fail)?;
                for item in &g.items {
                    require_text("sku", &item.sku).map_err(fail)?;
                    require_positive(item.qty).map_err(fail)?;
                    if let Some(cost) = item.unit_cost {
                        require_non_negative("unit_cost", cost).map_err(fail)?;
                    }
                }
            }
            Self::OrderPlaced(o) => {
                require_text("order_id", &o.order_id).map_err(fail)?;
                require_text("channel", &o.channel).map_err(fail)?;
                require_items(o.items.len()).map_err(fail)?;
                for item in &o.items {
                    require_text("sku", &item.sku).map_err(fail)?;
                    require_positive(item.qty).map_err(fail)?;
                    require_non_negative("unit_price", item.unit_price).map_err(fail)?;
                }
            }
            Self::PaymentCaptured(p) => {
                require_text("order_id", &p.order_id).map_err(fail)?;
                require_non_negative("amount", p.amount).map_err(fail)?;
            }
            Self::ShipmentDispatched(s) => {
                require_text("order_id", &s.order_id).map_err(fail)?;
                require_items(s.items.len()).map_err(fail)?;
                for item in &s.items {
                    require_text("sku", &item.sku).map_err(fail)?;
                    require_positive(item.qty).map_err(fail)?;
                }
            }
            Self::RefundIssued(r) => {
                require_text("order_id", &r.order_id).map_err(fail)?;
                require_non_negative("amount", r.amount).map_err(fail)?;
            }
            Self::InventoryAdjusted(a) => {
                require_text("reason", &a.reason).map_err(fail)?;
                require_items(a.items.len()).map_err(fail)?;
                for item in &a.items {
                    require_text("sku", &item.sku).map_err(fail)?;
                    if item.qty_delta == 0 {
                        return Err(fail("qty_delta must be non-zero".into()));
                    }
                }
            }
            Self::DisclosurePublished(d) => {
                require_text("policy_id", &d.policy_id).map_err(fail)?;
            }
            Self::SelectiveDisclosureRevealed(s) => {
                require_text("metric_key", &s.metric_key).map_err(fail)?;
            }
        }
        Ok(())
    }
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(())
    }
}

fn require_items(count: usize) -> Result<(), String> {
    if count == 0 {
        Err("at least one item is required".into())
    } else {
        Ok(())
    }
}

fn require_positive(qty: i64) -> Result<(), String> {
    if qty <= 0 {
        Err(format!("qty must be positive, got {qty}"))
    } else {
        Ok(())
    }
}

fn require_non_negative(field: &str, amount: Money) -> Result<(), String> {
    if amount.is_negative() {
        Err(format!("{field} must not be negative, got {amount}"))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Draft and committed event
// ---------------------------------------------------------------------------

/// What a caller submits to `append`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDraft {
    pub payload: EventPayload,
    /// Business time; the ledger clock is used when absent.
    pub occurred_at: Option<Timestamp>,
    /// The event this one corrects, if any.
    pub corrects: Option<EventId>,
}

impl EventDraft {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            occurred_at: None,
            corrects: None,
        }
    }

    pub fn at(mut self, occurred_at: Timestamp) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub fn correcting(mut self, original: EventId) -> Self {
        self.corrects = Some(original);
        self
    }
}

/// A committed ledger event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub seq: u64,
    pub schema_version: u32,
    #[serde(flatten)]
    pub payload: EventPayload,
    pub occurred_at: Timestamp,
    pub actor: ActorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrects: Option<EventId>,
    pub prev_hash: Digest,
    pub event_hash: Digest,
    pub signature: Signature,
}

/// The fields covered by `event_hash`: everything except the hash itself and
/// the signature over it.
#[derive(Serialize)]
pub(crate) struct HashInput<'a> {
    pub event_id: &'a EventId,
    pub seq: u64,
    pub schema_version: u32,
    #[serde(flatten)]
    pub payload: &'a EventPayload,
    pub occurred_at: &'a Timestamp,
    pub actor: &'a ActorId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrects: &'a Option<EventId>,
    pub prev_hash: &'a Digest,
}

impl HashInput<'_> {
    pub(crate) fn digest(&self) -> Result<Digest, EncodingError> {
        canonical_hash(self)
    }
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    /// Recompute `event_hash` from the event's content.
    pub fn compute_hash(&self) -> Result<Digest, EncodingError> {
        HashInput {
            event_id: &self.event_id,
            seq: self.seq,
            schema_version: self.schema_version,
            payload: &self.payload,
            occurred_at: &self.occurred_at,
            actor: &self.actor,
            corrects: &self.corrects,
            prev_hash: &self.prev_hash,
        }
        .digest()
    }
}

impl ChainLink for Event {
    fn link_hash(&self) -> Digest {
        self.event_hash
    }

    fn prev_link(&self) -> Digest {
        self.prev_hash
    }

    fn recompute_hash(&self) -> Result<Digest, EncodingError> {
        self.compute_hash()
    }
}
