//! Persistence of disclosure runs, committed metrics, and grants.

use std::collections::BTreeMap;
use std::sync::RwLock;

use uuid::Uuid;
use vdl_types::{Digest, EventId, Timestamp};

use crate::anchor::AnchorStatus;
use crate::commitment::CommittedMetric;
use crate::error::StoreError;
use crate::publisher::DisclosureRun;
use crate::selective::{GrantState, SelectiveGrant};

/// Durable store for the disclosure side of the engine.
///
/// Runs are insert-only apart from their anchor outcome. Grant updates are
/// compare-and-set so that concurrent transitions cannot both win.
pub trait DisclosureStore: Send + Sync {
    /// Insert a run and its metrics unless a run with the same id exists.
    /// Returns the stored run and whether this call created it.
    fn insert_run(
        &self,
        run: DisclosureRun,
        metrics: Vec<CommittedMetric>,
    ) -> Result<(DisclosureRun, bool), StoreError>;

    fn get_run(&self, disclosure_id: &Digest) -> Result<Option<DisclosureRun>, StoreError>;

    fn runs(&self) -> Result<Vec<DisclosureRun>, StoreError>;

    fn metrics(&self, disclosure_id: &Digest) -> Result<Vec<CommittedMetric>, StoreError>;

    /// Record the announcing ledger event and the anchor outcome. A run that
    /// is already anchored is final.
    fn record_outcome(
        &self,
        disclosure_id: &Digest,
        published_event: Option<EventId>,
        status: AnchorStatus,
        receipt_hash: Option<Digest>,
    ) -> Result<DisclosureRun, StoreError>;

    fn insert_grant(&self, grant: SelectiveGrant) -> Result<(), StoreError>;

    fn get_grant(&self, grant_id: &Uuid) -> Result<Option<SelectiveGrant>, StoreError>;

    fn grants(&self) -> Result<Vec<SelectiveGrant>, StoreError>;

    /// Replace a grant if its stored state is still `expected`.
    fn replace_grant(&self, expected: GrantState, grant: SelectiveGrant) -> Result<(), StoreError>;

    /// Atomically flip `used` from false to true on an approved grant and
    /// move it to `Revealed`. Exactly one caller can win.
    fn try_mark_used(&self, grant_id: &Uuid, at: Timestamp) -> Result<SelectiveGrant, StoreError>;

    /// Undo [`try_mark_used`](Self::try_mark_used) when the reveal could not
    /// be recorded. The grant returns to `Approved` and unused.
    fn release_use(&self, grant_id: &Uuid) -> Result<SelectiveGrant, StoreError>;
}

#[derive(Default)]
struct StoreState {
    runs: BTreeMap<Digest, DisclosureRun>,
    metrics: BTreeMap<Digest, Vec<CommittedMetric>>,
    grants: BTreeMap<Uuid, SelectiveGrant>,
}

/// In-memory [`DisclosureStore`].
#[derive(Default)]
pub struct InMemoryDisclosureStore {
    inner: RwLock<StoreState>,
}

impl InMemoryDisclosureStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState>, StoreError> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl DisclosureStore for InMemoryDisclosureStore {
    fn insert_run(
        &self,
        run: DisclosureRun,
        metrics: Vec<CommittedMetric>,
    ) -> Result<(DisclosureRun, bool), StoreError> {
        let mut state = self.write()?;
        if let Some(existing) = state.runs.get(&run.disclosure_id) {
            return Ok((existing.clone(), false));
        }
        state.metrics.insert(run.disclosure_id, metrics);
        state.runs.insert(run.disclosure_id, run.clone());
        Ok((run, true))
    }

    fn get_run(&self, disclosure_id: &Digest) -> Result<Option<DisclosureRun>, StoreError> {
        Ok(self.read()?.runs.get(disclosure_id).cloned())
    }

    fn runs(&self) -> Result<Vec<DisclosureRun>, StoreError> {
        Ok(self.read()?.runs.values().cloned().collect())
    }

    fn metrics(&self, disclosure_id: &Digest) -> Result<Vec<CommittedMetric>, StoreError> {
        self.read()?
            .metrics
            .get(disclosure_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("disclosure {disclosure_id}")))
    }

    fn record_outcome(
        &self,
        disclosure_id: &Digest,
        published_event: Option<EventId>,
        status: AnchorStatus,
        receipt_hash: Option<Digest>,
    ) -> Result<DisclosureRun, StoreError> {
        let mut state = self.write()?;
        let run = state
            .runs
            .get_mut(disclosure_id)
            .ok_or_else(|| StoreError::NotFound(format!("disclosure {disclosure_id}")))?;
        if run.is_sealed() {
            return Err(StoreError::Conflict(format!(
                "disclosure {disclosure_id} is already {:?}",
                run.anchor_status
            )));
        }
        run.anchor_status = status;
        if published_event.is_some() {
            run.published_event = published_event;
        }
        if receipt_hash.is_some() {
            run.receipt_hash = receipt_hash;
        }
        Ok(run.clone())
    }

    fn insert_grant(&self, grant: SelectiveGrant) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.grants.contains_key(&grant.grant_id) {
            return Err(StoreError::Conflict(format!("grant {} exists", grant.grant_id)));
        }
        state.grants.insert(grant.grant_id, grant);
        Ok(())
    }

    fn get_grant(&self, grant_id: &Uuid) -> Result<Option<SelectiveGrant>, StoreError> {
        Ok(self.read()?.grants.get(grant_id).cloned())
    }

    fn grants(&self) -> Result<Vec<SelectiveGrant>, StoreError> {
        Ok(self.read()?.grants.values().cloned().collect())
    }

    fn replace_grant(&self, expected: GrantState, grant: SelectiveGrant) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let current = state
            .grants
            .get_mut(&grant.grant_id)
            .ok_or_else(|| StoreError::NotFound(format!("grant {}", grant.grant_id)))?;
        if current.state != expected || current.used != grant.used {
            return Err(StoreError::Conflict(format!(
                "grant {} is {:?}, expected {expected:?}",
                grant.grant_id, current.state
            )));
        }
        *current = grant;
        Ok(())
    }

    fn try_mark_used(&self, grant_id: &Uuid, at: Timestamp) -> Result<SelectiveGrant, StoreError> {
        let mut state = self.write()?;
        let grant = state
            .grants
            .get_mut(grant_id)
            .ok_or_else(|| StoreError::NotFound(format!("grant {grant_id}")))?;
        if grant.used || grant.state != GrantState::Approved {
            return Err(StoreError::Conflict(format!("grant {grant_id} already used")));
        }
        grant.used = true;
        grant.state = GrantState::Revealed;
        grant.revealed_at = Some(at);
        Ok(grant.clone())
    }

    fn release_use(&self, grant_id: &Uuid) -> Result<SelectiveGrant, StoreError> {
        let mut state = self.write()?;
        let grant = state
            .grants
            .get_mut(grant_id)
            .ok_or_else(|| StoreError::NotFound(format!("grant {grant_id}")))?;
        if !grant.used || grant.state != GrantState::Revealed {
            return Err(StoreError::Conflict(format!("grant {grant_id} is not revealed")));
        }
        grant.used = false;
        grant.state = GrantState::Approved;
        grant.revealed_at = None;
        Ok(grant.clone())
    }
}
