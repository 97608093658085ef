//! The disclosure publication pipeline.
//!
//! For one (policy, period) the [`Publisher`] reconciles the period, computes
//! the admitted metrics, commits them, signs a [`Statement`], persists the
//! run, records a `DisclosurePublished` event on the ledger, and anchors the
//! result. Publication is idempotent: the disclosure id is derived from the
//! policy and period, and a repeat call returns the stored run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vdl_crypto::{ActorSigner, KeyResolver, ProofStep};
use vdl_ledger::{DisclosurePublished, EventDraft, EventPayload, Ledger, LedgerWriter, PeriodView};
use vdl_reconcile::Reconciler;
use vdl_types::{Clock, Digest, EventId, Period, SystemClock};

use crate::anchor::{AnchorReceipt, AnchorStatus, Anchorer};
use crate::commitment::{Commitment, LeafPayload};
use crate::error::{PublishError, StoreError};
use crate::metrics::{compute_metrics, Group};
use crate::policy::{DisclosurePolicy, ProofLevel};
use crate::statement::{disclosure_id, SignedStatement, Statement};
use crate::store::DisclosureStore;

/// A published disclosure. Immutable apart from its anchor outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureRun {
    pub disclosure_id: Digest,
    pub policy_id: String,
    pub policy_hash: Digest,
    pub period: Period,
    pub root_summary: Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_details: Option<Digest>,
    pub proof_level: ProofLevel,
    pub statement: SignedStatement,
    pub statement_sig_hash: Digest,
    /// Ledger event announcing the run.
    pub published_event: Option<EventId>,
    pub receipt_hash: Option<Digest>,
    pub anchor_status: AnchorStatus,
    /// Ledger head the metrics were computed from.
    pub snapshot_head: Option<Digest>,
    pub metric_count: usize,
}

impl DisclosureRun {
    /// Anchored runs are final.
    pub fn is_sealed(&self) -> bool {
        matches!(
            self.anchor_status,
            AnchorStatus::Anchored | AnchorStatus::AnchoredLocally
        )
    }
}

/// What the verification client receives for one metric.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub disclosure_id: Digest,
    pub leaf: LeafPayload,
    pub leaf_hash: Digest,
    pub path: Vec<ProofStep>,
    pub root: Digest,
    pub statement: SignedStatement,
}

pub struct Publisher {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn DisclosureStore>,
    anchorer: Anchorer,
    reconciler: Reconciler,
    issuer: ActorSigner,
    keys: Arc<dyn KeyResolver>,
    clock: Arc<dyn Clock>,
}

impl Publisher {
    /// `issuer` signs statements and the `DisclosurePublished` events.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn DisclosureStore>,
        anchorer: Anchorer,
        issuer: ActorSigner,
        keys: Arc<dyn KeyResolver>,
    ) -> Self {
        Self {
            ledger,
            store,
            anchorer,
            reconciler: Reconciler::standard(),
            issuer,
            keys,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn keys(&self) -> &Arc<dyn KeyResolver> {
        &self.keys
    }

    pub fn store(&self) -> &Arc<dyn DisclosureStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn anchorer(&self) -> &Anchorer {
        &self.anchorer
    }

    /// Publish `policy` for `period`.
    ///
    /// Fails closed on policy drift and on any reconciliation discrepancy;
    /// neither persists anything. A repeat call returns the stored run once
    /// it is sealed, and otherwise resumes it: a run never announced on the
    /// ledger is announced, and a run not yet anchored is anchored.
    pub async fn publish(
        &self,
        policy: &DisclosurePolicy,
        period: Period,
    ) -> Result<DisclosureRun, PublishError> {
        let policy_hash = policy.verify_hash()?;
        let id = disclosure_id(&policy.id, &period, &policy_hash)?;

        if let Some(existing) = self.store.get_run(&id)? {
            tracing::info!(
                disclosure_id = %id.short_hex(),
                policy_id = %policy.id,
                status = ?existing.anchor_status,
                announced = existing.published_event.is_some(),
                "publish idempotent hit"
            );
            return self.complete(existing).await;
        }

        let view = PeriodView::from_reader(self.ledger.as_ref(), period)?;
        let report = self.reconciler.reconcile(&view);
        if !report.passed {
            tracing::warn!(
                disclosure_id = %id.short_hex(),
                policy_id = %policy.id,
                failed = ?report.failed_rules(),
                "publish blocked by reconciliation"
            );
            return Err(PublishError::ReconciliationFailed(Box::new(report)));
        }

        let records = compute_metrics(policy, &view)?;
        if records.is_empty() && policy.require_metrics {
            return Err(PublishError::EmptyDisclosure {
                policy_id: policy.id.clone(),
            });
        }
        let commitment = Commitment::build(policy, records)?;

        let statement = Statement {
            disclosure_id: id,
            policy_id: policy.id.clone(),
            policy_hash,
            period,
            root_summary: commitment.root_summary(),
            root_details: commitment.root_details(),
            proof_level: policy.proof_level,
            issued_at: self.clock.now(),
        };
        let signed = SignedStatement::sign(statement, &self.issuer)?;
        let run = DisclosureRun {
            disclosure_id: id,
            policy_id: policy.id.clone(),
            policy_hash,
            period,
            root_summary: signed.statement.root_summary,
            root_details: signed.statement.root_details,
            proof_level: policy.proof_level,
            statement_sig_hash: signed.sig_hash(),
            statement: signed,
            published_event: None,
            receipt_hash: None,
            anchor_status: AnchorStatus::Pending,
            snapshot_head: view.snapshot_head,
            metric_count: commitment.len(),
        };

        let (run, created) = self.store.insert_run(run, commitment.into_metrics())?;
        if !created {
            // A concurrent publish of the same inputs got there first.
            return Ok(run);
        }
        self.complete(run).await
    }

    /// Drive a stored run to sealed: announce it if needed, then anchor.
    async fn complete(&self, run: DisclosureRun) -> Result<DisclosureRun, PublishError> {
        if run.is_sealed() {
            return Ok(run);
        }
        let run = match run.published_event {
            Some(_) => run,
            None => self.announce(run)?,
        };
        self.anchor(run).await
    }

    fn announce(&self, run: DisclosureRun) -> Result<DisclosureRun, PublishError> {
        let event = self.ledger.append(
            EventDraft::new(EventPayload::DisclosurePublished(DisclosurePublished {
                disclosure_id: run.disclosure_id,
                policy_id: run.policy_id.clone(),
                period: run.period,
                root_summary: run.root_summary,
                root_details: run.root_details,
                statement_sig_hash: run.statement_sig_hash,
            })),
            &self.issuer,
        );
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    disclosure_id = %run.disclosure_id.short_hex(),
                    policy_id = %run.policy_id,
                    error = %e,
                    "disclosure announcement rejected; run stays pending"
                );
                return Err(e.into());
            }
        };
        tracing::info!(
            disclosure_id = %run.disclosure_id.short_hex(),
            policy_id = %run.policy_id,
            seq = event.seq,
            metrics = run.metric_count,
            "disclosure published"
        );
        Ok(self.store.record_outcome(
            &run.disclosure_id,
            Some(event.event_id),
            AnchorStatus::Pending,
            None,
        )?)
    }

    async fn anchor(&self, run: DisclosureRun) -> Result<DisclosureRun, PublishError> {
        let id = run.disclosure_id;
        let outcome = self.anchorer.anchor(&run.statement).await;
        let (status, receipt_hash) = match &outcome {
            Ok(AnchorReceipt {
                receipt_hash,
                status,
                ..
            }) => (*status, Some(*receipt_hash)),
            Err(_) => (AnchorStatus::AnchorFailed, None),
        };
        let recorded = match self
            .store
            .record_outcome(&id, run.published_event, status, receipt_hash)
        {
            // Sealed concurrently by another publish of the same run.
            Err(StoreError::Conflict(_)) => return self.run(&id),
            other => other?,
        };
        match outcome {
            Ok(_) => Ok(recorded),
            Err(source) => Err(PublishError::AnchorWrite {
                disclosure_id: id,
                source,
            }),
        }
    }

    pub fn run(&self, disclosure_id: &Digest) -> Result<DisclosureRun, PublishError> {
        self.store
            .get_run(disclosure_id)?
            .ok_or(PublishError::DisclosureNotFound(*disclosure_id))
    }

    /// Load a run with its commitment rebuilt from the stored records.
    ///
    /// A run that was never announced on the ledger is not served.
    pub fn commitment(&self, disclosure_id: &Digest) -> Result<(DisclosureRun, Commitment), PublishError> {
        let run = self.run(disclosure_id)?;
        if run.published_event.is_none() {
            return Err(PublishError::DisclosureNotFound(*disclosure_id));
        }
        let metrics = match self.store.metrics(disclosure_id) {
            Ok(metrics) => metrics,
            Err(StoreError::NotFound(_)) => return Err(PublishError::DisclosureNotFound(*disclosure_id)),
            Err(e) => return Err(e.into()),
        };
        let commitment = Commitment::restore(metrics, run.root_details.is_some());
        Ok((run, commitment))
    }

    /// Inclusion proof for one published metric.
    ///
    /// Refused outright for `root_only` runs, whatever is requested.
    pub fn proof(
        &self,
        disclosure_id: &Digest,
        metric_key: &str,
        group: &Group,
    ) -> Result<ProofBundle, PublishError> {
        let run = self.run(disclosure_id)?;
        if !run.proof_level.serves_paths() {
            tracing::debug!(
                disclosure_id = %disclosure_id.short_hex(),
                metric_key,
                "proof denied for root_only disclosure"
            );
            return Err(PublishError::ProofDenied(*disclosure_id));
        }
        let (run, commitment) = self.commitment(disclosure_id)?;
        let not_found = || PublishError::MetricNotFound {
            disclosure_id: *disclosure_id,
            metric_key: metric_key.to_string(),
        };
        let (index, metric) = commitment.find(metric_key, group).ok_or_else(not_found)?;
        let proof = commitment.summary_proof(index).ok_or_else(not_found)?;
        Ok(ProofBundle {
            disclosure_id: *disclosure_id,
            leaf: metric.leaf.clone(),
            leaf_hash: proof.leaf_hash,
            path: proof.path,
            root: proof.root,
            statement: run.statement,
        })
    }

    /// Stored runs whose period overlaps `period`.
    pub fn runs_overlapping(&self, period: &Period) -> Result<Vec<DisclosureRun>, PublishError> {
        Ok(self
            .store
            .runs()?
            .into_iter()
            .filter(|r| r.period.overlaps(period))
            .collect())
    }
}
