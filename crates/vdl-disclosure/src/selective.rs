//! Selective disclosure: scoped, single-use reveals of the detail behind a
//! published summary.
//!
//! A grant moves `requested -> approved -> revealed -> expired` or
//! `requested -> denied`. Only human and auditor actors may request or
//! approve. The bearer token is handed to the requester once; the store only
//! keeps its hash.

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vdl_crypto::{ActorSigner, KeyResolver, MerkleProof};
use vdl_ledger::{EventDraft, EventPayload, Ledger, LedgerWriter, SelectiveDisclosureRevealed};
use vdl_types::{ActorId, Clock, Digest, EventId, SystemClock, Timestamp};

use crate::commitment::LeafPayload;
use crate::error::{GrantError, PublishError, StoreError};
use crate::metrics::Group;
use crate::publisher::{DisclosureRun, Publisher};
use crate::store::DisclosureStore;

/// Default grant lifetime.
pub const DEFAULT_GRANT_TTL_SECS: i64 = 600;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    Requested,
    Approved,
    Denied,
    Revealed,
    Expired,
}

impl GrantState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Denied | Self::Expired)
    }
}

/// One `(metric_key, group)` pair a grant may reveal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantScope {
    pub metric_key: String,
    #[serde(default)]
    pub group: Group,
}

impl GrantScope {
    pub fn new(metric_key: impl Into<String>, group: Group) -> Self {
        Self {
            metric_key: metric_key.into(),
            group,
        }
    }

    pub fn ungrouped(metric_key: impl Into<String>) -> Self {
        Self::new(metric_key, Group::new())
    }

    fn covers(&self, metric_key: &str, group: &Group) -> bool {
        self.metric_key == metric_key && &self.group == group
    }
}

/// Bearer token for a grant. Never logged or printed.
#[derive(Clone, PartialEq, Eq)]
pub struct GrantToken(String);

impl GrantToken {
    /// 32 random bytes, hex encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap a token received from a caller.
    pub fn from_secret(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn hash(&self) -> Digest {
        Digest::of(self.0.as_bytes())
    }
}

impl fmt::Debug for GrantToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GrantToken(<redacted>)")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectiveGrant {
    pub grant_id: Uuid,
    pub disclosure_id: Digest,
    pub requester: ActorId,
    pub scope: Vec<GrantScope>,
    pub token_hash: Digest,
    pub state: GrantState,
    /// Flips false to true exactly once.
    pub used: bool,
    pub requested_at: Timestamp,
    pub expires_at: Timestamp,
    pub approver: Option<ActorId>,
    pub decided_at: Option<Timestamp>,
    pub revealed_at: Option<Timestamp>,
}

impl SelectiveGrant {
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        self.state == GrantState::Expired || *now >= self.expires_at
    }

    pub fn covers(&self, metric_key: &str, group: &Group) -> bool {
        self.scope.iter().any(|s| s.covers(metric_key, group))
    }
}

/// Everything a successful reveal hands back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealBundle {
    pub grant_id: Uuid,
    pub disclosure_id: Digest,
    pub leaf: LeafPayload,
    /// Position of the leaf under `root_summary`.
    pub summary_proof: MerkleProof,
    pub detail_root: Digest,
    pub event_hashes: Vec<Digest>,
    /// One proof per event hash under `detail_root`.
    pub detail_proofs: Vec<MerkleProof>,
    /// Position of `detail_root` under `root_details`, when committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_proof: Option<MerkleProof>,
    /// The `SelectiveDisclosureRevealed` ledger event.
    pub ledger_event: EventId,
}

fn check_authority(actor: &ActorId, action: &str) -> Result<(), GrantError> {
    if actor.kind.may_authorize_disclosure() {
        Ok(())
    } else {
        tracing::warn!(actor = %actor, action, "selective disclosure refused for actor kind");
        Err(GrantError::NotAuthorized(format!(
            "{} actors may not {action} selective disclosure grants",
            actor.kind
        )))
    }
}

/// The grant workflow over published disclosures.
pub struct SelectiveDisclosure {
    publisher: Arc<Publisher>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl SelectiveDisclosure {
    pub fn new(publisher: Arc<Publisher>) -> Self {
        Self {
            publisher,
            clock: Arc::new(SystemClock),
            ttl: chrono::Duration::seconds(DEFAULT_GRANT_TTL_SECS),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn store(&self) -> &Arc<dyn DisclosureStore> {
        self.publisher.store()
    }

    fn ledger(&self) -> &Arc<dyn Ledger> {
        self.publisher.ledger()
    }

    fn load(&self, grant_id: &Uuid) -> Result<SelectiveGrant, GrantError> {
        self.store().get_grant(grant_id)?.ok_or(GrantError::NotFound)
    }

    fn require_paths(run: &DisclosureRun) -> Result<(), GrantError> {
        if run.proof_level.serves_paths() {
            Ok(())
        } else {
            Err(PublishError::ProofDenied(run.disclosure_id).into())
        }
    }

    /// Open a grant for `scope` on a published disclosure. The token is
    /// returned only here.
    pub fn request(
        &self,
        requester: &ActorId,
        disclosure_id: &Digest,
        scope: Vec<GrantScope>,
    ) -> Result<(SelectiveGrant, GrantToken), GrantError> {
        check_authority(requester, "request")?;
        let (run, commitment) = self.publisher.commitment(disclosure_id)?;
        Self::require_paths(&run)?;
        if scope.is_empty() {
            return Err(GrantError::OutOfScope {
                metric_key: String::new(),
            });
        }
        if let Some(missing) = scope
            .iter()
            .find(|s| commitment.find(&s.metric_key, &s.group).is_none())
        {
            return Err(GrantError::OutOfScope {
                metric_key: missing.metric_key.clone(),
            });
        }

        let now = self.clock.now();
        let token = GrantToken::generate();
        let grant = SelectiveGrant {
            grant_id: Uuid::now_v7(),
            disclosure_id: *disclosure_id,
            requester: requester.clone(),
            scope,
            token_hash: token.hash(),
            state: GrantState::Requested,
            used: false,
            requested_at: now,
            expires_at: now.plus(self.ttl),
            approver: None,
            decided_at: None,
            revealed_at: None,
        };
        self.store().insert_grant(grant.clone())?;
        tracing::info!(
            grant_id = %grant.grant_id,
            disclosure_id = %disclosure_id.short_hex(),
            requester = %requester,
            "grant requested"
        );
        Ok((grant, token))
    }

    pub fn approve(&self, grant_id: &Uuid, approver: &ActorId) -> Result<SelectiveGrant, GrantError> {
        self.decide(grant_id, approver, GrantState::Approved, "approve")
    }

    pub fn deny(&self, grant_id: &Uuid, approver: &ActorId) -> Result<SelectiveGrant, GrantError> {
        self.decide(grant_id, approver, GrantState::Denied, "deny")
    }

    fn decide(
        &self,
        grant_id: &Uuid,
        approver: &ActorId,
        to: GrantState,
        action: &'static str,
    ) -> Result<SelectiveGrant, GrantError> {
        check_authority(approver, action)?;
        let grant = self.load(grant_id)?;
        if grant.state != GrantState::Requested {
            return Err(GrantError::InvalidTransition {
                from: grant.state,
                action,
            });
        }
        let now = self.clock.now();
        if to == GrantState::Approved && grant.is_expired_at(&now) {
            return Err(GrantError::Expired);
        }

        let updated = SelectiveGrant {
            state: to,
            approver: Some(approver.clone()),
            decided_at: Some(now),
            ..grant
        };
        self.store()
            .replace_grant(GrantState::Requested, updated.clone())
            .map_err(|e| match e {
                StoreError::Conflict(_) => GrantError::InvalidTransition {
                    from: GrantState::Requested,
                    action,
                },
                other => other.into(),
            })?;
        tracing::info!(grant_id = %grant_id, approver = %approver, state = ?to, "grant decided");
        Ok(updated)
    }

    /// Reveal one scoped metric's detail.
    ///
    /// `signer` must be the requester; the reveal is recorded on the ledger
    /// under its signature. Of several concurrent reveals with the same
    /// token exactly one succeeds; the rest fail with `AlreadyUsed`.
    pub fn reveal(
        &self,
        grant_id: &Uuid,
        token: &GrantToken,
        signer: &ActorSigner,
        metric_key: &str,
        group: &Group,
    ) -> Result<RevealBundle, GrantError> {
        let grant = self.load(grant_id)?;
        if grant.token_hash != token.hash() {
            return Err(GrantError::NotFound);
        }
        match grant.state {
            GrantState::Denied => return Err(GrantError::Denied),
            GrantState::Revealed => return Err(GrantError::AlreadyUsed),
            _ if grant.used => return Err(GrantError::AlreadyUsed),
            _ => {}
        }
        let now = self.clock.now();
        if grant.is_expired_at(&now) {
            return Err(GrantError::Expired);
        }
        if grant.state != GrantState::Approved {
            return Err(GrantError::InvalidTransition {
                from: grant.state,
                action: "reveal",
            });
        }
        if signer.actor() != &grant.requester {
            return Err(GrantError::NotAuthorized(format!(
                "grant belongs to {}",
                grant.requester
            )));
        }
        if !grant.covers(metric_key, group) {
            return Err(GrantError::OutOfScope {
                metric_key: metric_key.to_string(),
            });
        }
        self.check_signing_key(signer)?;

        // Checked against the stored run at read time.
        let (run, commitment) = self.publisher.commitment(&grant.disclosure_id)?;
        Self::require_paths(&run)?;
        let (index, metric) = commitment
            .find(metric_key, group)
            .ok_or(GrantError::NoDetail(run.disclosure_id))?;
        let summary_proof = commitment
            .summary_proof(index)
            .ok_or(GrantError::NoDetail(run.disclosure_id))?;
        let detail_root = metric
            .leaf
            .detail_root
            .ok_or(GrantError::NoDetail(run.disclosure_id))?;
        let leaf = metric.leaf.clone();
        let event_hashes = metric.record.event_hashes.clone();
        let detail_proofs = commitment.detail_proofs(index);
        let details_proof = commitment.details_proof(index);

        let grant = self.store().try_mark_used(grant_id, now).map_err(|e| match e {
            StoreError::Conflict(_) => GrantError::AlreadyUsed,
            other => other.into(),
        })?;

        let appended = self.ledger().append(
            EventDraft::new(EventPayload::SelectiveDisclosureRevealed(
                SelectiveDisclosureRevealed {
                    disclosure_id: grant.disclosure_id,
                    metric_key: metric_key.to_string(),
                    group: group.clone(),
                    revealed_event_hashes: event_hashes.clone(),
                },
            )),
            signer,
        );
        let event = match appended {
            Ok(event) => event,
            Err(e) => {
                // Unrecorded reveals do not consume the grant.
                self.store().release_use(grant_id)?;
                tracing::warn!(grant_id = %grant_id, error = %e, "reveal not recorded; grant released");
                return Err(e.into());
            }
        };
        tracing::info!(
            grant_id = %grant_id,
            disclosure_id = %grant.disclosure_id.short_hex(),
            metric_key,
            revealed = event_hashes.len(),
            seq = event.seq,
            "grant revealed"
        );

        Ok(RevealBundle {
            grant_id: grant.grant_id,
            disclosure_id: grant.disclosure_id,
            leaf,
            summary_proof,
            detail_root,
            event_hashes,
            detail_proofs,
            details_proof,
            ledger_event: event.event_id,
        })
    }

    /// The signer's key must be the one registered for its actor.
    fn check_signing_key(&self, signer: &ActorSigner) -> Result<(), GrantError> {
        let registered = self.publisher.keys().resolve(signer.actor()).map_err(|e| {
            GrantError::NotAuthorized(format!("no key for {}: {e}", signer.actor()))
        })?;
        if registered != signer.verifying_key() {
            tracing::warn!(actor = %signer.actor(), "reveal refused: signing key not registered");
            return Err(GrantError::NotAuthorized(format!(
                "signing key is not the one registered for {}",
                signer.actor()
            )));
        }
        Ok(())
    }

    /// Move every non-terminal grant past its expiry to `Expired`.
    pub fn expire_stale(&self) -> Result<Vec<Uuid>, GrantError> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for grant in self.store().grants()? {
            if grant.state.is_terminal() || now < grant.expires_at {
                continue;
            }
            let from = grant.state;
            let grant_id = grant.grant_id;
            let updated = SelectiveGrant {
                state: GrantState::Expired,
                ..grant
            };
            match self.store().replace_grant(from, updated) {
                Ok(()) => {
                    tracing::info!(grant_id = %grant_id, from = ?from, "grant expired");
                    expired.push(grant_id);
                }
                // Moved on concurrently; the next sweep sees the new state.
                Err(StoreError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(expired)
    }

    pub fn grant(&self, grant_id: &Uuid) -> Result<SelectiveGrant, GrantError> {
        self.load(grant_id)
    }
}
