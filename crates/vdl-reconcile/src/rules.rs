//! Built-in cross-domain identities.
//!
//! Each rule compares a figure derived from raw in-period events (the order
//! or inventory domain) against the same figure read from another domain's
//! projection, and names the events where the two disagree.

use std::collections::BTreeMap;

use vdl_ledger::{Account, AnomalyKind, Event, EventPayload, PeriodView};
use vdl_types::{EventId, Money};

use crate::report::Discrepancy;

/// A single reconciliation identity evaluated over a period.
pub trait ReconciliationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, view: &PeriodView) -> Vec<Discrepancy>;
}

/// In-period events that reference `order_id`, matching `pick`.
fn order_events<'a>(
    view: &'a PeriodView,
    pick: impl Fn(&EventPayload) -> bool + 'a,
) -> BTreeMap<&'a str, Vec<&'a Event>> {
    let mut by_order: BTreeMap<&str, Vec<&Event>> = BTreeMap::new();
    for event in view.events.iter().filter(|e| pick(&e.payload)) {
        if let Some(order_id) = event.payload.order_reference() {
            by_order.entry(order_id).or_default().push(event);
        }
    }
    by_order
}

fn ids(events: &[&Event]) -> Vec<EventId> {
    events.iter().map(|e| e.event_id).collect()
}

/// Sum of postings for an account side, keyed by event, over the period.
fn posted_by_event(view: &PeriodView, debit: Account, credit: Account) -> BTreeMap<EventId, Money> {
    let mut posted = BTreeMap::new();
    for p in view.postings().filter(|p| p.debit == debit && p.credit == credit) {
        *posted.entry(p.event_id).or_insert(Money::ZERO) += p.amount;
    }
    posted
}

/// Compare event-level amounts from the source domain with postings.
fn compare_postings(
    rule: &str,
    expected: Vec<(EventId, Money)>,
    posted: BTreeMap<EventId, Money>,
    what: &str,
) -> Vec<Discrepancy> {
    let mut found = Vec::new();
    let mut expected_total = Money::ZERO;
    let mut mismatched = Vec::new();
    for (event_id, amount) in &expected {
        expected_total += *amount;
        let booked = posted.get(event_id).copied().unwrap_or_default();
        if booked != *amount {
            mismatched.push(*event_id);
        }
    }
    let orphans: Vec<EventId> = posted
        .keys()
        .filter(|id| !expected.iter().any(|(e, _)| e == *id))
        .copied()
        .collect();
    let posted_total: Money = posted.values().copied().sum();

    if !mismatched.is_empty() || !orphans.is_empty() || expected_total != posted_total {
        let mut event_ids = mismatched;
        event_ids.extend(orphans);
        found.push(Discrepancy::new(
            rule,
            event_ids,
            format!("{what}: source {expected_total}, posted {posted_total}"),
        ));
    }
    found
}

// ---------------------------------------------------------------------------
// Order domain
// ---------------------------------------------------------------------------

/// Payments reference placed orders and do not exceed order totals.
pub struct PaymentMatchesOrder;

impl ReconciliationRule for PaymentMatchesOrder {
    fn name(&self) -> &'static str {
        "payment_matches_order"
    }

    fn check(&self, view: &PeriodView) -> Vec<Discrepancy> {
        let payments = order_events(view, |p| matches!(p, EventPayload::PaymentCaptured(_)));
        let mut found = Vec::new();
        for (order_id, events) in payments {
            match view.projection.order(order_id).filter(|o| o.is_placed()) {
                None => found.push(Discrepancy::new(
                    self.name(),
                    ids(&events),
                    format!("payment for unplaced order {order_id}"),
                )),
                Some(order) if order.paid > order.total => found.push(Discrepancy::new(
                    self.name(),
                    ids(&events),
                    format!(
                        "order {order_id} paid {} exceeds total {}",
                        order.paid, order.total
                    ),
                )),
                Some(_) => {}
            }
        }
        found
    }
}

/// Shipped quantity per SKU stays within the ordered quantity.
pub struct ShipmentWithinOrder;

impl ReconciliationRule for ShipmentWithinOrder {
    fn name(&self) -> &'static str {
        "shipment_within_order"
    }

    fn check(&self, view: &PeriodView) -> Vec<Discrepancy> {
        let shipments = order_events(view, |p| matches!(p, EventPayload::ShipmentDispatched(_)));
        let mut found = Vec::new();
        for (order_id, events) in shipments {
            let Some(order) = view.projection.order(order_id) else {
                continue;
            };
            let ordered = order.ordered_qty();
            for (sku, shipped) in &order.shipped {
                let allowed = ordered.get(sku).copied().unwrap_or(0);
                if *shipped > allowed {
                    found.push(Discrepancy::new(
                        self.name(),
                        ids(&events),
                        format!("order {order_id} shipped {shipped} {sku}, ordered {allowed}"),
                    ));
                }
            }
        }
        found
    }
}

/// Refunds never exceed what was paid on the order.
pub struct RefundWithinPayment;

impl ReconciliationRule for RefundWithinPayment {
    fn name(&self) -> &'static str {
        "refund_within_payment"
    }

    fn check(&self, view: &PeriodView) -> Vec<Discrepancy> {
        let refunds = order_events(view, |p| matches!(p, EventPayload::RefundIssued(_)));
        let mut found = Vec::new();
        for (order_id, events) in refunds {
            let (paid, refunded) = view
                .projection
                .order(order_id)
                .map(|o| (o.paid, o.refunded))
                .unwrap_or_default();
            if refunded > paid {
                found.push(Discrepancy::new(
                    self.name(),
                    ids(&events),
                    format!("order {order_id} refunded {refunded} of {paid} paid"),
                ));
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// Order vs accounting
// ---------------------------------------------------------------------------

/// Recognised sales equal captured payments.
pub struct RevenueEqualsPayments;

impl ReconciliationRule for RevenueEqualsPayments {
    fn name(&self) -> &'static str {
        "revenue_equals_payments"
    }

    fn check(&self, view: &PeriodView) -> Vec<Discrepancy> {
        let expected = view
            .events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::PaymentCaptured(p) => Some((e.event_id, p.amount)),
                _ => None,
            })
            .collect();
        let posted = posted_by_event(view, Account::Cash, Account::Sales);
        compare_postings(self.name(), expected, posted, "captured payments vs sales")
    }
}

/// Refund postings equal refunds issued.
pub struct RefundPostingsMatch;

impl ReconciliationRule for RefundPostingsMatch {
    fn name(&self) -> &'static str {
        "refund_postings_match"
    }

    fn check(&self, view: &PeriodView) -> Vec<Discrepancy> {
        let expected = view
            .events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::RefundIssued(r) => Some((e.event_id, r.amount)),
                _ => None,
            })
            .collect();
        let posted = posted_by_event(view, Account::Refunds, Account::Cash);
        compare_postings(self.name(), expected, posted, "refunds issued vs refund postings")
    }
}

// ---------------------------------------------------------------------------
// Inventory vs accounting
// ---------------------------------------------------------------------------

/// Cost-of-goods postings equal the FIFO cost depleted by shipments.
pub struct CogsEqualsInventoryDepletion;

impl ReconciliationRule for CogsEqualsInventoryDepletion {
    fn name(&self) -> &'static str {
        "cogs_equals_inventory_depletion"
    }

    fn check(&self, view: &PeriodView) -> Vec<Discrepancy> {
        let costs = &view.projection.inventory.shipment_costs;
        let expected = view
            .events
            .iter()
            .filter(|e| matches!(e.payload, EventPayload::ShipmentDispatched(_)))
            .map(|e| (e.event_id, costs.get(&e.event_id).copied().unwrap_or_default()))
            .collect();
        let posted = posted_by_event(view, Account::Cogs, Account::Inventory);
        compare_postings(self.name(), expected, posted, "inventory depletion vs COGS")
    }
}

/// No shipment or adjustment removed more stock than was on hand.
pub struct InventoryNonNegative;

impl ReconciliationRule for InventoryNonNegative {
    fn name(&self) -> &'static str {
        "inventory_non_negative"
    }

    fn check(&self, view: &PeriodView) -> Vec<Discrepancy> {
        view.events
            .iter()
            .flat_map(|e| view.projection.anomalies_for(&e.event_id))
            .filter(|a| a.kind == AnomalyKind::InventoryShortfall)
            .map(|a| Discrepancy::new(self.name(), vec![a.event_id], a.detail.clone()))
            .collect()
    }
}

/// The standard rule set, in evaluation order.
pub fn standard_rules() -> Vec<Box<dyn ReconciliationRule>> {
    vec![
        Box::new(PaymentMatchesOrder),
        Box::new(RevenueEqualsPayments),
        Box::new(CogsEqualsInventoryDepletion),
        Box::new(InventoryNonNegative),
        Box::new(ShipmentWithinOrder),
        Box::new(RefundPostingsMatch),
        Box::new(RefundWithinPayment),
    ]
}
