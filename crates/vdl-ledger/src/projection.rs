//! Order, inventory, and accounting state folded from ledger events.
//!
//! Every transition here is a pure function of the event and the state built
//! so far. Business irregularities (orphan references, stock shortfalls) are
//! recorded as [`Anomaly`] rows instead of aborting the fold, so that
//! reconciliation can report them against the offending events.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use vdl_types::{Digest, EventId, Money, Timestamp};

use crate::events::{
    Event, EventPayload, GoodsReceived, InventoryAdjusted, OrderItem, OrderPlaced,
    PaymentCaptured, ProcurementOrdered, RefundIssued, ShipmentDispatched,
};

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Paid,
    Shipped,
    Refunded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    pub order_id: String,
    pub customer_ref: String,
    pub channel: String,
    pub region: Option<String>,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub paid: Money,
    pub refunded: Money,
    /// Shipped quantity per SKU.
    pub shipped: BTreeMap<String, i64>,
    pub status: OrderStatus,
    /// The `OrderPlaced` event, absent for orders only known by reference.
    pub placed_by: Option<EventId>,
    pub placed_at: Option<Timestamp>,
}

impl OrderState {
    fn placeholder(order_id: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            customer_ref: String::new(),
            channel: String::new(),
            region: None,
            items: vec![],
            total: Money::ZERO,
            paid: Money::ZERO,
            refunded: Money::ZERO,
            shipped: BTreeMap::new(),
            status: OrderStatus::Placed,
            placed_by: None,
            placed_at: None,
        }
    }

    pub fn is_placed(&self) -> bool {
        self.placed_by.is_some()
    }

    /// Ordered quantity per SKU.
    pub fn ordered_qty(&self) -> BTreeMap<String, i64> {
        let mut qty = BTreeMap::new();
        for item in &self.items {
            *qty.entry(item.sku.clone()).or_insert(0) += item.qty;
        }
        qty
    }

    fn advance(&mut self, status: OrderStatus) {
        self.status = self.status.max(status);
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// A batch of one SKU on hand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub batch_id: String,
    pub qty: i64,
    pub expiry_date: Option<String>,
    pub unit_cost: Money,
}

impl Lot {
    /// FIFO order: earliest expiry first, undated lots last, then batch id.
    fn fifo_key(&self) -> (bool, &str, &str) {
        (
            self.expiry_date.is_none(),
            self.expiry_date.as_deref().unwrap_or(""),
            &self.batch_id,
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryState {
    /// Lots per SKU, kept in FIFO order.
    pub lots: BTreeMap<String, Vec<Lot>>,
    pub procurements: BTreeMap<String, ProcurementOrdered>,
    /// Most recent procurement unit cost per SKU.
    pub latest_unit_cost: BTreeMap<String, Money>,
    /// Cost of goods removed by each shipment event.
    pub shipment_costs: BTreeMap<EventId, Money>,
}

struct Depletion {
    cost: Money,
    shortfall: i64,
}

impl InventoryState {
    pub fn on_hand(&self, sku: &str) -> i64 {
        self.lots
            .get(sku)
            .map(|lots| lots.iter().map(|l| l.qty).sum())
            .unwrap_or(0)
    }

    /// Carrying value of all stock on hand.
    pub fn value(&self) -> Money {
        self.lots
            .values()
            .flatten()
            .map(|l| l.unit_cost.times(l.qty))
            .sum()
    }

    /// Unit cost for a received item: explicit cost, then the referenced
    /// procurement's line cost, then the latest procurement cost for the SKU.
    fn resolve_unit_cost(&self, procurement_id: &str, sku: &str, explicit: Option<Money>) -> Money {
        if let Some(cost) = explicit.filter(|c| *c != Money::ZERO) {
            return cost;
        }
        self.procurements
            .get(procurement_id)
            .and_then(|p| p.items.iter().find(|i| i.sku == sku))
            .map(|i| i.unit_cost)
            .or_else(|| self.latest_unit_cost.get(sku).copied())
            .unwrap_or(Money::ZERO)
    }

    fn upsert_lot(&mut self, sku: &str, batch_id: &str, qty: i64, expiry: Option<&str>, cost: Money) {
        let lots = self.lots.entry(sku.to_string()).or_default();
        match lots.iter_mut().find(|l| l.batch_id == batch_id) {
            Some(lot) => {
                lot.qty += qty;
                if let Some(expiry) = expiry {
                    lot.expiry_date = Some(expiry.to_string());
                }
                if cost != Money::ZERO {
                    lot.unit_cost = cost;
                }
            }
            None => lots.push(Lot {
                batch_id: batch_id.to_string(),
                qty,
                expiry_date: expiry.map(str::to_string),
                unit_cost: cost,
            }),
        }
        lots.sort_by(|a, b| a.fifo_key().cmp(&b.fifo_key()));
    }

    /// Remove `qty` units, from `batch` first when named, then FIFO.
    fn deplete(&mut self, sku: &str, qty: i64, batch: Option<&str>) -> Depletion {
        let mut remaining = qty;
        let mut cost = Money::ZERO;
        if let Some(lots) = self.lots.get_mut(sku) {
            let named = batch.and_then(|b| lots.iter().position(|l| l.batch_id == b));
            let order: Vec<usize> = named
                .into_iter()
                .chain((0..lots.len()).filter(|i| Some(*i) != named))
                .collect();
            for index in order {
                if remaining == 0 {
                    break;
                }
                let lot = &mut lots[index];
                let take = lot.qty.min(remaining);
                lot.qty -= take;
                remaining -= take;
                cost += lot.unit_cost.times(take);
            }
            lots.retain(|l| l.qty > 0);
        }
        Depletion {
            cost,
            shortfall: remaining,
        }
    }
}

// ---------------------------------------------------------------------------
// Accounting
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Account {
    Cash,
    Inventory,
    Sales,
    Cogs,
    Refunds,
    Shrinkage,
}

/// One double-entry line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub event_id: EventId,
    pub event_hash: Digest,
    pub occurred_at: Timestamp,
    pub debit: Account,
    pub credit: Account,
    pub amount: Money,
    pub narration: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingState {
    pub postings: Vec<Posting>,
    /// Debit-positive balance per account.
    pub balances: BTreeMap<Account, Money>,
}

impl AccountingState {
    fn post(&mut self, event: &Event, debit: Account, credit: Account, amount: Money, narration: String) {
        if amount == Money::ZERO {
            return;
        }
        *self.balances.entry(debit).or_default() += amount;
        *self.balances.entry(credit).or_default() += Money::ZERO - amount;
        self.postings.push(Posting {
            event_id: event.event_id,
            event_hash: event.event_hash,
            occurred_at: event.occurred_at,
            debit,
            credit,
            amount,
            narration,
        });
    }

    pub fn balance(&self, account: Account) -> Money {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    /// Postings hitting `account` on either side.
    pub fn postings_for(&self, account: Account) -> impl Iterator<Item = &Posting> {
        self.postings
            .iter()
            .filter(move |p| p.debit == account || p.credit == account)
    }
}

// ---------------------------------------------------------------------------
// Anomalies
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Payment, shipment, or refund for an order never placed.
    OrphanOrderReference,
    /// Goods received against an unknown procurement.
    UnknownProcurement,
    /// Shipment or adjustment removed more than was on hand.
    InventoryShortfall,
    /// A `corrects` reference to an event not seen before.
    UnknownCorrection,
    DuplicateOrder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub event_id: EventId,
    pub event_hash: Digest,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Combined order, inventory, and accounting state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    pub orders: BTreeMap<String, OrderState>,
    pub inventory: InventoryState,
    pub accounting: AccountingState,
    pub anomalies: Vec<Anomaly>,
    /// Disclosure ids announced by `DisclosurePublished` events.
    pub disclosures: BTreeSet<Digest>,
    pub applied: u64,
    pub head: Option<Digest>,
    seen: BTreeSet<EventId>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_seen(&self, id: &EventId) -> bool {
        self.seen.contains(id)
    }

    pub fn order(&self, order_id: &str) -> Option<&OrderState> {
        self.orders.get(order_id)
    }

    /// Anomalies raised by the given event.
    pub fn anomalies_for<'a>(&'a self, event_id: &'a EventId) -> impl Iterator<Item = &'a Anomaly> {
        self.anomalies.iter().filter(move |a| &a.event_id == event_id)
    }

    /// Fold one event into the projection.
    pub fn apply(&mut self, event: &Event) {
        if let Some(original) = &event.corrects {
            if !self.seen.contains(original) {
                self.flag(event, AnomalyKind::UnknownCorrection, format!("corrects {original}"));
            }
        }

        match &event.payload {
            EventPayload::ProcurementOrdered(p) => self.on_procurement(p),
            EventPayload::GoodsReceived(g) => self.on_goods_received(event, g),
            EventPayload::OrderPlaced(o) => self.on_order_placed(event, o),
            EventPayload::PaymentCaptured(p) => self.on_payment(event, p),
            EventPayload::ShipmentDispatched(s) => self.on_shipment(event, s),
            EventPayload::RefundIssued(r) => self.on_refund(event, r),
            EventPayload::InventoryAdjusted(a) => self.on_adjustment(event, a),
            EventPayload::DisclosurePublished(d) => {
                self.disclosures.insert(d.disclosure_id);
            }
            EventPayload::SelectiveDisclosureRevealed(_) => {}
        }

        self.seen.insert(event.event_id);
        self.head = Some(event.event_hash);
        self.applied += 1;
    }

    fn flag(&mut self, event: &Event, kind: AnomalyKind, detail: String) {
        self.anomalies.push(Anomaly {
            kind,
            event_id: event.event_id,
            event_hash: event.event_hash,
            detail,
        });
    }

    /// The referenced order, created as a placeholder if it was never placed.
    fn referenced_order(&mut self, event: &Event, order_id: &str) -> &mut OrderState {
        let known = self.orders.get(order_id).is_some_and(OrderState::is_placed);
        if !known {
            self.flag(
                event,
                AnomalyKind::OrphanOrderReference,
                format!("order {order_id} was never placed"),
            );
        }
        self.orders
            .entry(order_id.to_string())
            .or_insert_with(|| OrderState::placeholder(order_id))
    }

    fn on_procurement(&mut self, p: &ProcurementOrdered) {
        for item in &p.items {
            self.inventory
                .latest_unit_cost
                .insert(item.sku.clone(), item.unit_cost);
        }
        self.inventory
            .procurements
            .insert(p.procurement_id.clone(), p.clone());
    }

    fn on_goods_received(&mut self, event: &Event, g: &GoodsReceived) {
        if !self.inventory.procurements.contains_key(&g.procurement_id) {
            self.flag(
                event,
                AnomalyKind::UnknownProcurement,
                format!("procurement {} not found", g.procurement_id),
            );
        }
        if !g.qc_passed {
            return;
        }

        let mut cost = Money::ZERO;
        for item in &g.items {
            let unit_cost = self
                .inventory
                .resolve_unit_cost(&g.procurement_id, &item.sku, item.unit_cost);
            let expiry = Some(item.expiry_date.as_str()).filter(|d| !d.is_empty());
            self.inventory
                .upsert_lot(&item.sku, &g.batch_id, item.qty, expiry, unit_cost);
            cost += unit_cost.times(item.qty);
        }
        self.accounting.post(
            event,
            Account::Inventory,
            Account::Cash,
            cost,
            format!("goods received batch {}", g.batch_id),
        );
    }

    fn on_order_placed(&mut self, event: &Event, o: &OrderPlaced) {
        if self.orders.get(&o.order_id).is_some_and(OrderState::is_placed) {
            self.flag(
                event,
                AnomalyKind::DuplicateOrder,
                format!("order {} already placed", o.order_id),
            );
            return;
        }
        let order = self
            .orders
            .entry(o.order_id.clone())
            .or_insert_with(|| OrderState::placeholder(&o.order_id));
        order.customer_ref = o.customer_ref.clone();
        order.channel = o.channel.clone();
        order.region = o.region.clone();
        order.items = o.items.clone();
        order.total = o.total();
        order.placed_by = Some(event.event_id);
        order.placed_at = Some(event.occurred_at);
    }

    fn on_payment(&mut self, event: &Event, p: &PaymentCaptured) {
        let order = self.referenced_order(event, &p.order_id);
        order.paid += p.amount;
        order.advance(OrderStatus::Paid);
        self.accounting.post(
            event,
            Account::Cash,
            Account::Sales,
            p.amount,
            format!("payment for order {}", p.order_id),
        );
    }

    fn on_shipment(&mut self, event: &Event, s: &ShipmentDispatched) {
        let order = self.referenced_order(event, &s.order_id);
        for item in &s.items {
            *order.shipped.entry(item.sku.clone()).or_insert(0) += item.qty;
        }
        order.advance(OrderStatus::Shipped);

        let mut cost = Money::ZERO;
        for item in &s.items {
            let depletion = self.inventory.deplete(&item.sku, item.qty, None);
            cost += depletion.cost;
            if depletion.shortfall > 0 {
                self.flag(
                    event,
                    AnomalyKind::InventoryShortfall,
                    format!("{} short by {}", item.sku, depletion.shortfall),
                );
            }
        }
        self.inventory.shipment_costs.insert(event.event_id, cost);
        self.accounting.post(
            event,
            Account::Cogs,
            Account::Inventory,
            cost,
            format!("shipment for order {}", s.order_id),
        );
    }

    fn on_refund(&mut self, event: &Event, r: &RefundIssued) {
        let order = self.referenced_order(event, &r.order_id);
        order.refunded += r.amount;
        order.advance(OrderStatus::Refunded);
        self.accounting.post(
            event,
            Account::Refunds,
            Account::Cash,
            r.amount,
            format!("refund for order {}", r.order_id),
        );
    }

    fn on_adjustment(&mut self, event: &Event, a: &InventoryAdjusted) {
        for item in &a.items {
            let batch = item.batch_id.as_deref();
            if item.qty_delta > 0 {
                let unit_cost = self
                    .inventory
                    .latest_unit_cost
                    .get(&item.sku)
                    .copied()
                    .unwrap_or_default();
                self.inventory.upsert_lot(
                    &item.sku,
                    batch.unwrap_or("adjustment"),
                    item.qty_delta,
                    None,
                    unit_cost,
                );
                self.accounting.post(
                    event,
                    Account::Inventory,
                    Account::Shrinkage,
                    unit_cost.times(item.qty_delta),
                    format!("adjustment +{} {}: {}", item.qty_delta, item.sku, a.reason),
                );
            } else {
                let depletion = self.inventory.deplete(&item.sku, -item.qty_delta, batch);
                if depletion.shortfall > 0 {
                    self.flag(
                        event,
                        AnomalyKind::InventoryShortfall,
                        format!("{} short by {}", item.sku, depletion.shortfall),
                    );
                }
                self.accounting.post(
                    event,
                    Account::Shrinkage,
                    Account::Inventory,
                    depletion.cost,
                    format!("adjustment {} {}: {}", item.qty_delta, item.sku, a.reason),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AdjustmentItem, CostItem, ReceivedItem, ShipmentItem};
    use vdl_crypto::SigningKey;
    use vdl_types::ActorId;

    fn event(seq: u64, payload: EventPayload) -> Event {
        let key = SigningKey::from_bytes([7; 32]);
        let event_hash = Digest::of(&seq.to_be_bytes());
        Event {
            event_id: EventId::new(),
            seq,
            schema_version: 1,
            payload,
            occurred_at: Timestamp::from_unix_secs(1_700_000_000 + seq as i64).unwrap(),
            actor: ActorId::agent("ops"),
            corrects: None,
            prev_hash: Digest::ZERO,
            event_hash,
            signature: key.sign(event_hash.as_bytes()),
        }
    }

    fn procurement(id: &str, sku: &str, cost: i64) -> EventPayload {
        EventPayload::ProcurementOrdered(ProcurementOrdered {
            procurement_id: id.into(),
            supplier_id: "sup".into(),
            items: vec![CostItem {
                sku: sku.into(),
                qty: 100,
                unit_cost: Money::from_minor(cost),
            }],
            expected_date: "2024-01-10".into(),
        })
    }

    fn receipt(proc_id: &str, batch: &str, sku: &str, qty: i64, expiry: &str) -> EventPayload {
        EventPayload::GoodsReceived(GoodsReceived {
            procurement_id: proc_id.into(),
            batch_id: batch.into(),
            items: vec![ReceivedItem {
                sku: sku.into(),
                qty,
                expiry_date: expiry.into(),
                unit_cost: None,
            }],
            qc_passed: true,
        })
    }

    fn placed(order: &str, sku: &str, qty: i64, price: i64) -> EventPayload {
        EventPayload::OrderPlaced(OrderPlaced {
            order_id: order.into(),
            customer_ref: "cust".into(),
            items: vec![OrderItem {
                sku: sku.into(),
                qty,
                unit_price: Money::from_minor(price),
            }],
            channel: "web".into(),
            region: Some("eu".into()),
        })
    }

    fn shipped(order: &str, sku: &str, qty: i64) -> EventPayload {
        EventPayload::ShipmentDispatched(ShipmentDispatched {
            order_id: order.into(),
            items: vec![ShipmentItem {
                sku: sku.into(),
                qty,
            }],
            carrier_ref: "dhl".into(),
        })
    }

    fn fold(payloads: Vec<EventPayload>) -> (Projection, Vec<Event>) {
        let events: Vec<Event> = payloads
            .into_iter()
            .enumerate()
            .map(|(i, p)| event(i as u64 + 1, p))
            .collect();
        let mut projection = Projection::new();
        for e in &events {
            projection.apply(e);
        }
        (projection, events)
    }

    // -----------------------------------------------------------------------
    // 1. Inventory
    // -----------------------------------------------------------------------

    #[test]
    fn receipt_falls_back_to_procurement_cost() {
        let (p, _) = fold(vec![
            procurement("po-1", "tea", 300),
            receipt("po-1", "b-1", "tea", 10, "2025-01-01"),
        ]);
        assert_eq!(p.inventory.on_hand("tea"), 10);
        assert_eq!(p.inventory.value(), Money::from_minor(3000));
        assert_eq!(p.accounting.balance(Account::Inventory), Money::from_minor(3000));
        assert_eq!(p.accounting.balance(Account::Cash), Money::from_minor(-3000));
    }

    #[test]
    fn failed_qc_adds_no_stock() {
        let mut payload = receipt("po-1", "b-1", "tea", 10, "2025-01-01");
        if let EventPayload::GoodsReceived(g) = &mut payload {
            g.qc_passed = false;
        }
        let (p, _) = fold(vec![procurement("po-1", "tea", 300), payload]);
        assert_eq!(p.inventory.on_hand("tea"), 0);
        assert!(p.accounting.postings.is_empty());
    }

    #[test]
    fn shipment_consumes_earliest_expiry_first() {
        let (p, events) = fold(vec![
            procurement("po-1", "tea", 100),
            receipt("po-1", "late", "tea", 5, "2025-06-01"),
            receipt("po-1", "early", "tea", 5, "2025-01-01"),
            placed("o-1", "tea", 6, 500),
            shipped("o-1", "tea", 6),
        ]);
        let lots = &p.inventory.lots["tea"];
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].batch_id, "late");
        assert_eq!(lots[0].qty, 4);
        assert_eq!(
            p.inventory.shipment_costs[&events[4].event_id],
            Money::from_minor(600)
        );
        assert_eq!(p.accounting.balance(Account::Cogs), Money::from_minor(600));
    }

    #[test]
    fn undated_lots_are_consumed_last() {
        let (p, _) = fold(vec![
            procurement("po-1", "tea", 100),
            receipt("po-1", "a-undated", "tea", 3, ""),
            receipt("po-1", "z-dated", "tea", 3, "2030-01-01"),
            placed("o-1", "tea", 3, 500),
            shipped("o-1", "tea", 3),
        ]);
        assert_eq!(p.inventory.lots["tea"][0].batch_id, "a-undated");
    }

    #[test]
    fn shortfall_is_an_anomaly() {
        let (p, events) = fold(vec![placed("o-1", "tea", 4, 500), shipped("o-1", "tea", 4)]);
        let anomalies: Vec<_> = p.anomalies_for(&events[1].event_id).collect();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::InventoryShortfall);
    }

    #[test]
    fn negative_adjustment_posts_shrinkage() {
        let (p, _) = fold(vec![
            procurement("po-1", "tea", 200),
            receipt("po-1", "b-1", "tea", 10, "2025-01-01"),
            EventPayload::InventoryAdjusted(InventoryAdjusted {
                reason: "spoiled".into(),
                items: vec![AdjustmentItem {
                    sku: "tea".into(),
                    qty_delta: -2,
                    batch_id: Some("b-1".into()),
                }],
            }),
        ]);
        assert_eq!(p.inventory.on_hand("tea"), 8);
        assert_eq!(p.accounting.balance(Account::Shrinkage), Money::from_minor(400));
    }

    // -----------------------------------------------------------------------
    // 2. Orders and accounting
    // -----------------------------------------------------------------------

    #[test]
    fn order_lifecycle_and_postings() {
        let (p, _) = fold(vec![
            procurement("po-1", "tea", 100),
            receipt("po-1", "b-1", "tea", 10, "2025-01-01"),
            placed("o-1", "tea", 2, 500),
            EventPayload::PaymentCaptured(PaymentCaptured {
                order_id: "o-1".into(),
                amount: Money::from_minor(1000),
                method: "card".into(),
                receipt_hash: "r".into(),
            }),
            shipped("o-1", "tea", 2),
            EventPayload::RefundIssued(RefundIssued {
                order_id: "o-1".into(),
                amount: Money::from_minor(300),
                receipt_hash: "r2".into(),
            }),
        ]);
        let order = p.order("o-1").unwrap();
        assert_eq!(order.total, Money::from_minor(1000));
        assert_eq!(order.paid, Money::from_minor(1000));
        assert_eq!(order.refunded, Money::from_minor(300));
        assert_eq!(order.shipped["tea"], 2);
        assert_eq!(order.status, OrderStatus::Refunded);

        assert_eq!(p.accounting.balance(Account::Sales), Money::from_minor(-1000));
        assert_eq!(p.accounting.balance(Account::Refunds), Money::from_minor(300));
        let total: Money = p.accounting.balances.values().copied().sum();
        assert_eq!(total, Money::ZERO);
        assert!(p.anomalies.is_empty());
    }

    #[test]
    fn orphan_payment_is_flagged() {
        let (p, _) = fold(vec![EventPayload::PaymentCaptured(PaymentCaptured {
            order_id: "ghost".into(),
            amount: Money::from_minor(10),
            method: "card".into(),
            receipt_hash: "r".into(),
        })]);
        assert_eq!(p.anomalies[0].kind, AnomalyKind::OrphanOrderReference);
        assert!(!p.order("ghost").unwrap().is_placed());
    }

    #[test]
    fn duplicate_order_keeps_first() {
        let (p, _) = fold(vec![placed("o-1", "tea", 1, 100), placed("o-1", "tea", 9, 100)]);
        assert_eq!(p.order("o-1").unwrap().total, Money::from_minor(100));
        assert_eq!(p.anomalies[0].kind, AnomalyKind::DuplicateOrder);
    }

    #[test]
    fn fold_is_deterministic() {
        let payloads = vec![
            procurement("po-1", "tea", 100),
            receipt("po-1", "b-1", "tea", 10, "2025-01-01"),
            placed("o-1", "tea", 2, 500),
            shipped("o-1", "tea", 2),
        ];
        let (_, events) = fold(payloads);
        let mut a = Projection::new();
        let mut b = Projection::new();
        for e in &events {
            a.apply(e);
            b.apply(e);
        }
        assert_eq!(a, b);
        assert_eq!(a.applied, 4);
    }
}
