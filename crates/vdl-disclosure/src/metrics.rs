//! Policy-scoped KPI computation.
//!
//! Every candidate metric is derived from a [`PeriodView`]; the policy then
//! acts as a default-deny filter. A record whose metric key or any grouping
//! dimension is not allow-listed (or is redacted for the audience) is dropped
//! whole, never partially included.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use vdl_crypto::{canonical_string, EncodingError};
use vdl_ledger::{Account, Event, EventPayload, PeriodView};
use vdl_types::{Digest, Period, Timestamp};

use crate::error::PolicyError;
use crate::policy::DisclosurePolicy;

/// Metric keys.
pub mod metric {
    pub const REVENUE: &str = "revenue_cents";
    pub const REFUNDS: &str = "refunds_cents";
    pub const NET_REVENUE: &str = "net_revenue_cents";
    pub const ORDERS_COUNT: &str = "orders_count";
    pub const SHIPMENT_QTY: &str = "shipment_qty";
    pub const REFUND_RATE_BPS: &str = "refund_rate_bps";
    pub const COGS: &str = "cogs_cents";
    pub const GROSS_PROFIT: &str = "gross_profit_cents";

    pub const ALL: &[&str] = &[
        REVENUE,
        REFUNDS,
        NET_REVENUE,
        ORDERS_COUNT,
        SHIPMENT_QTY,
        REFUND_RATE_BPS,
        COGS,
        GROSS_PROFIT,
    ];
}

/// Grouping dimensions.
pub mod dimension {
    pub const CHANNEL: &str = "channel";
    pub const REGION: &str = "region";
    pub const SKU: &str = "sku";
    /// Counterparty identity. Never computed, only ever redacted.
    pub const CUSTOMER: &str = "customer";

    /// Group value for an order without a region.
    pub const UNSPECIFIED: &str = "unspecified";
}

/// Dimension name to value. Empty for an ungrouped metric.
pub type Group = BTreeMap<String, String>;

/// One computed KPI value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub metric_key: String,
    pub group: Group,
    pub period: Period,
    pub value: i64,
    /// Hashes of the ledger events the value was derived from, sorted.
    pub event_hashes: Vec<Digest>,
    /// Set once the record is committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf_hash: Option<Digest>,
}

impl MetricRecord {
    fn new(
        metric_key: &str,
        group: Group,
        period: Period,
        value: i64,
        event_hashes: impl IntoIterator<Item = Digest>,
    ) -> Self {
        let hashes: BTreeSet<Digest> = event_hashes.into_iter().collect();
        Self {
            metric_key: metric_key.to_string(),
            group,
            period,
            value,
            event_hashes: hashes.into_iter().collect(),
            leaf_hash: None,
        }
    }

    /// Composite ordering key: metric key, canonical group, period bounds.
    pub fn sort_key(&self) -> Result<(String, String, Timestamp, Timestamp), EncodingError> {
        Ok((
            self.metric_key.clone(),
            canonical_string(&self.group)?,
            self.period.start,
            self.period.end,
        ))
    }

    /// Whether `group` is exactly this record's group.
    pub fn is_group(&self, group: &Group) -> bool {
        &self.group == group
    }
}

/// Sort records by [`MetricRecord::sort_key`].
pub fn sort_records(records: &mut Vec<MetricRecord>) -> Result<(), EncodingError> {
    let mut keyed = records
        .drain(..)
        .map(|r| Ok((r.sort_key()?, r)))
        .collect::<Result<Vec<_>, EncodingError>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    records.extend(keyed.into_iter().map(|(_, r)| r));
    Ok(())
}

/// Compute every metric the policy admits for the period, sorted.
///
/// The policy hash is checked first; a drifted policy computes nothing.
pub fn compute_metrics(
    policy: &DisclosurePolicy,
    view: &PeriodView,
) -> Result<Vec<MetricRecord>, PolicyError> {
    policy.verify_hash()?;

    let candidates = candidate_metrics(view);
    let total = candidates.len();
    let mut records: Vec<MetricRecord> = candidates
        .into_iter()
        .filter(|r| admits(policy, r))
        .collect();
    sort_records(&mut records)?;

    tracing::debug!(
        policy_id = %policy.id,
        period = %view.period,
        computed = total,
        admitted = records.len(),
        "metrics computed"
    );
    Ok(records)
}

fn admits(policy: &DisclosurePolicy, record: &MetricRecord) -> bool {
    policy.allows_metric(&record.metric_key)
        && record.group.keys().all(|d| policy.allows_dimension(d))
}

fn single(dim: &str, value: &str) -> Group {
    Group::from([(dim.to_string(), value.to_string())])
}

/// The groups an order line contributes to: each order dimension alone,
/// then channel and region jointly.
fn order_groups(channel: &str, region: Option<&str>) -> [Group; 3] {
    let channel = channel.to_string();
    let region = region.unwrap_or(dimension::UNSPECIFIED).to_string();
    [
        single(dimension::CHANNEL, &channel),
        single(dimension::REGION, &region),
        Group::from([
            (dimension::CHANNEL.to_string(), channel),
            (dimension::REGION.to_string(), region),
        ]),
    ]
}

/// Floor of `amount * part / whole`, zero when `whole` is zero.
pub(crate) fn pro_rata(amount: i64, part: i64, whole: i64) -> i64 {
    if whole == 0 {
        return 0;
    }
    let share = i128::from(amount) * i128::from(part) / i128::from(whole);
    i64::try_from(share).unwrap_or(if share < 0 { i64::MIN } else { i64::MAX })
}

#[derive(Default)]
struct Bucket {
    value: i64,
    hashes: BTreeSet<Digest>,
}

impl Bucket {
    fn add(&mut self, value: i64, hash: Digest) {
        self.value = self.value.saturating_add(value);
        self.hashes.insert(hash);
    }
}

/// Accumulates grouped values per (metric, group).
#[derive(Default)]
struct Grouped(BTreeMap<(&'static str, Group), Bucket>);

impl Grouped {
    fn add(&mut self, metric: &'static str, group: Group, amount: i64, hash: Digest) {
        self.0.entry((metric, group)).or_default().add(amount, hash);
    }

    fn into_records(self, period: Period) -> impl Iterator<Item = MetricRecord> {
        self.0.into_iter().map(move |((metric, group), bucket)| {
            MetricRecord::new(metric, group, period, bucket.value, bucket.hashes)
        })
    }
}

fn hashes_of<'a>(events: impl Iterator<Item = &'a Event>) -> Vec<Digest> {
    events.map(|e| e.event_hash).collect()
}

/// Every metric derivable from the view, before policy filtering.
fn candidate_metrics(view: &PeriodView) -> Vec<MetricRecord> {
    let period = view.period;
    let orders = &view.projection;

    let payments: Vec<&Event> = view
        .events
        .iter()
        .filter(|e| matches!(e.payload, EventPayload::PaymentCaptured(_)))
        .collect();
    let refunds: Vec<&Event> = view
        .events
        .iter()
        .filter(|e| matches!(e.payload, EventPayload::RefundIssued(_)))
        .collect();
    let shipments: Vec<&Event> = view
        .events
        .iter()
        .filter(|e| matches!(e.payload, EventPayload::ShipmentDispatched(_)))
        .collect();
    let placements: Vec<&Event> = view
        .events
        .iter()
        .filter(|e| matches!(e.payload, EventPayload::OrderPlaced(_)))
        .collect();

    let amount = |e: &Event| match &e.payload {
        EventPayload::PaymentCaptured(p) => p.amount.minor_units(),
        EventPayload::RefundIssued(r) => r.amount.minor_units(),
        _ => 0,
    };
    let revenue: i64 = payments.iter().copied().map(amount).fold(0, i64::saturating_add);
    let refunded: i64 = refunds.iter().copied().map(amount).fold(0, i64::saturating_add);

    let mut shipped_qty = 0i64;
    for e in &shipments {
        if let EventPayload::ShipmentDispatched(s) = &e.payload {
            shipped_qty = s.items.iter().map(|i| i.qty).fold(shipped_qty, i64::saturating_add);
        }
    }

    let placed: BTreeSet<&str> = placements
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::OrderPlaced(o) => Some(o.order_id.as_str()),
            _ => None,
        })
        .collect();

    let cogs_postings: Vec<_> = view
        .postings()
        .filter(|p| p.debit == Account::Cogs)
        .collect();
    let cogs: i64 = cogs_postings
        .iter()
        .map(|p| p.amount.minor_units())
        .fold(0, i64::saturating_add);

    let refund_rate = pro_rata(refunded, 10_000, revenue);

    let payment_hashes = hashes_of(payments.iter().copied());
    let refund_hashes = hashes_of(refunds.iter().copied());
    let shipment_hashes = hashes_of(shipments.iter().copied());
    let cogs_hashes: Vec<Digest> = cogs_postings.iter().map(|p| p.event_hash).collect();
    let cash_hashes: Vec<Digest> = payment_hashes.iter().chain(&refund_hashes).copied().collect();

    let none = Group::new;
    let mut records = vec![
        MetricRecord::new(metric::REVENUE, none(), period, revenue, payment_hashes.clone()),
        MetricRecord::new(metric::REFUNDS, none(), period, refunded, refund_hashes.clone()),
        MetricRecord::new(
            metric::NET_REVENUE,
            none(),
            period,
            revenue.saturating_sub(refunded),
            cash_hashes.clone(),
        ),
        MetricRecord::new(
            metric::ORDERS_COUNT,
            none(),
            period,
            i64::try_from(placed.len()).unwrap_or(i64::MAX),
            hashes_of(placements.iter().copied()),
        ),
        MetricRecord::new(metric::SHIPMENT_QTY, none(), period, shipped_qty, shipment_hashes),
        MetricRecord::new(metric::REFUND_RATE_BPS, none(), period, refund_rate, cash_hashes.clone()),
        MetricRecord::new(metric::COGS, none(), period, cogs, cogs_hashes.clone()),
        MetricRecord::new(
            metric::GROSS_PROFIT,
            none(),
            period,
            revenue.saturating_sub(refunded).saturating_sub(cogs),
            cash_hashes.into_iter().chain(cogs_hashes),
        ),
    ];

    let mut grouped = Grouped::default();

    // Revenue by dimension follows the order lines placed in the period.
    for e in &placements {
        let EventPayload::OrderPlaced(o) = &e.payload else {
            continue;
        };
        let groups = order_groups(&o.channel, o.region.as_deref());
        for item in &o.items {
            let line = item.unit_price.times(item.qty).minor_units();
            for group in &groups {
                grouped.add(metric::REVENUE, group.clone(), line, e.event_hash);
            }
            grouped.add(metric::REVENUE, single(dimension::SKU, &item.sku), line, e.event_hash);
        }
    }

    for e in &shipments {
        let EventPayload::ShipmentDispatched(s) = &e.payload else {
            continue;
        };
        let groups = orders
            .order(&s.order_id)
            .map(|o| order_groups(&o.channel, o.region.as_deref()));
        for item in &s.items {
            for group in groups.iter().flatten() {
                grouped.add(metric::SHIPMENT_QTY, group.clone(), item.qty, e.event_hash);
            }
            grouped.add(metric::SHIPMENT_QTY, single(dimension::SKU, &item.sku), item.qty, e.event_hash);
        }
    }

    // Refunds are spread over the order's lines by line revenue, floored.
    for e in &refunds {
        let EventPayload::RefundIssued(r) = &e.payload else {
            continue;
        };
        let Some(order) = orders.order(&r.order_id).filter(|o| o.is_placed()) else {
            continue;
        };
        let order_revenue = order.total.minor_units();
        let groups = order_groups(&order.channel, order.region.as_deref());
        for item in &order.items {
            let line = item.unit_price.times(item.qty).minor_units();
            let share = pro_rata(r.amount.minor_units(), line, order_revenue);
            for group in &groups {
                grouped.add(metric::REFUNDS, group.clone(), share, e.event_hash);
            }
        }
    }

    records.extend(grouped.into_records(period));
    records
}
