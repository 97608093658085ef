use vdl_types::{Digest, Period};

use crate::error::LedgerError;
use crate::events::Event;
use crate::projection::{Posting, Projection};
use crate::replay::ReplayEngine;
use crate::traits::LedgerReader;

/// A consistent snapshot of the ledger for one reporting period.
///
/// `projection` is the genesis replay of every event with
/// `occurred_at < period.end`; `events` is the subset inside the period.
/// Appends for later periods do not change a view once built.
#[derive(Clone, Debug)]
pub struct PeriodView {
    pub period: Period,
    pub projection: Projection,
    pub events: Vec<Event>,
    /// Hash of the last event included in the snapshot.
    pub snapshot_head: Option<Digest>,
}

impl PeriodView {
    /// Build from a full history ordered by sequence.
    pub fn build(history: &[Event], period: Period) -> Self {
        let cut = history.partition_point(|e| e.occurred_at < period.end);
        let snapshot = &history[..cut];
        let projection = ReplayEngine::replay(snapshot);
        let events = snapshot
            .iter()
            .filter(|e| period.contains(&e.occurred_at))
            .cloned()
            .collect();
        Self {
            period,
            snapshot_head: projection.head,
            projection,
            events,
        }
    }

    pub fn from_reader<R: LedgerReader + ?Sized>(
        reader: &R,
        period: Period,
    ) -> Result<Self, LedgerError> {
        let snapshot = reader.read_until(&period.end)?;
        Ok(Self::build(&snapshot, period))
    }

    /// Postings dated inside the period.
    pub fn postings(&self) -> impl Iterator<Item = &Posting> {
        self.projection
            .accounting
            .postings
            .iter()
            .filter(move |p| self.period.contains(&p.occurred_at))
    }

    pub fn event_hashes(&self) -> Vec<Digest> {
        self.events.iter().map(|e| e.event_hash).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
