//! Anchoring of published commitments in an independent store.
//!
//! Every write is an idempotent upsert, so a write that failed or timed out
//! is retried up to `max_attempts` times. No lock is held across a write.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vdl_crypto::{canonical_string, ContentHasher, EncodingError};
use vdl_types::Digest;

use crate::error::AnchorError;
use crate::statement::SignedStatement;

/// Key/value interface of the anchoring collaborator.
#[async_trait]
pub trait AnchorStore: Send + Sync {
    /// Idempotent upsert.
    async fn write(&self, key: &str, value: &str) -> Result<(), AnchorError>;

    async fn read(&self, key: &str) -> Result<String, AnchorError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    /// Anchor failures fail the publication.
    #[default]
    Strict,
    /// Anchor failures degrade to the local fallback store.
    NonStrict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    Pending,
    Anchored,
    AnchoredLocally,
    AnchorFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    pub mode: AnchorMode,
    /// Per-attempt write timeout.
    pub timeout_ms: u64,
    pub max_attempts: u32,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            mode: AnchorMode::Strict,
            timeout_ms: 5_000,
            max_attempts: 3,
        }
    }
}

/// Anchor keys for one disclosure.
pub mod keys {
    use vdl_types::{Digest, Timestamp};

    pub fn disclosure(disclosure_id: &Digest) -> String {
        format!("disclosure:{disclosure_id}")
    }

    pub fn root_summary(period_start: &Timestamp, policy_id: &str) -> String {
        format!("root:summary:{period_start}:{policy_id}")
    }

    pub fn root_details(period_start: &Timestamp, policy_id: &str) -> String {
        format!("root:details:{period_start}:{policy_id}")
    }

    pub fn receipt(receipt_hash: &Digest) -> String {
        format!("receipt:{receipt_hash}")
    }
}

/// What the receipt hash commits to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptBody {
    pub disclosure_id: Digest,
    pub root_summary: Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_details: Option<Digest>,
    pub statement_sig_hash: Digest,
}

impl ReceiptBody {
    pub fn for_statement(signed: &SignedStatement) -> Self {
        Self {
            disclosure_id: signed.statement.disclosure_id,
            root_summary: signed.statement.root_summary,
            root_details: signed.statement.root_details,
            statement_sig_hash: signed.sig_hash(),
        }
    }

    pub fn receipt_hash(&self) -> Result<Digest, EncodingError> {
        ContentHasher::ANCHOR_RECEIPT.hash_canonical(self)
    }
}

/// Outcome of anchoring one statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchorReceipt {
    pub receipt_hash: Digest,
    pub status: AnchorStatus,
    pub keys: Vec<String>,
}

/// Writes a statement's anchor entries, with timeout, retry, and the
/// configured failure mode.
pub struct Anchorer {
    remote: Arc<dyn AnchorStore>,
    fallback: Arc<InMemoryAnchorStore>,
    config: AnchorConfig,
}

impl Anchorer {
    pub fn new(remote: Arc<dyn AnchorStore>, config: AnchorConfig) -> Self {
        Self {
            remote,
            fallback: Arc::new(InMemoryAnchorStore::new()),
            config,
        }
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    /// Local store used when non-strict anchoring degrades.
    pub fn fallback(&self) -> &InMemoryAnchorStore {
        &self.fallback
    }

    /// Key/value entries for `signed`, plus its receipt hash.
    pub fn entries(signed: &SignedStatement) -> Result<(Digest, Vec<(String, String)>), EncodingError> {
        let statement = &signed.statement;
        let body = ReceiptBody::for_statement(signed);
        let receipt_hash = body.receipt_hash()?;

        let mut entries = vec![
            (keys::disclosure(&statement.disclosure_id), canonical_string(signed)?),
            (
                keys::root_summary(&statement.period.start, &statement.policy_id),
                statement.root_summary.to_hex(),
            ),
        ];
        if let Some(details) = statement.root_details {
            entries.push((
                keys::root_details(&statement.period.start, &statement.policy_id),
                details.to_hex(),
            ));
        }
        entries.push((keys::receipt(&receipt_hash), canonical_string(&body)?));
        Ok((receipt_hash, entries))
    }

    /// Anchor `signed`.
    ///
    /// In strict mode the first entry that cannot be written fails the call.
    /// In non-strict mode every entry goes to the local fallback instead and
    /// the status is `AnchoredLocally`.
    pub async fn anchor(&self, signed: &SignedStatement) -> Result<AnchorReceipt, AnchorError> {
        let disclosure_id = signed.statement.disclosure_id;
        let (receipt_hash, entries) = Self::entries(signed).map_err(|e| AnchorError::Write {
            key: keys::disclosure(&disclosure_id),
            reason: e.to_string(),
        })?;
        let written: Vec<String> = entries.iter().map(|(k, _)| k.clone()).collect();

        let mut failure = None;
        for (key, value) in &entries {
            if let Err(e) = self.write_with_retry(key, value).await {
                failure = Some(e);
                break;
            }
        }

        let Some(error) = failure else {
            tracing::info!(
                disclosure_id = %disclosure_id.short_hex(),
                receipt = %receipt_hash.short_hex(),
                "disclosure anchored"
            );
            return Ok(AnchorReceipt {
                receipt_hash,
                status: AnchorStatus::Anchored,
                keys: written,
            });
        };

        match self.config.mode {
            AnchorMode::Strict => {
                tracing::warn!(
                    disclosure_id = %disclosure_id.short_hex(),
                    error = %error,
                    "anchoring failed"
                );
                Err(error)
            }
            AnchorMode::NonStrict => {
                tracing::warn!(
                    disclosure_id = %disclosure_id.short_hex(),
                    error = %error,
                    "anchoring degraded to local fallback"
                );
                for (key, value) in &entries {
                    self.fallback.write(key, value).await?;
                }
                Ok(AnchorReceipt {
                    receipt_hash,
                    status: AnchorStatus::AnchoredLocally,
                    keys: written,
                })
            }
        }
    }

    async fn write_with_retry(&self, key: &str, value: &str) -> Result<(), AnchorError> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let attempts = self.config.max_attempts.max(1);
        let mut last = None;
        for attempt in 1..=attempts {
            let result = tokio::time::timeout(timeout, self.remote.write(key, value))
                .await
                .map_err(|_| AnchorError::Timeout {
                    key: key.to_string(),
                    timeout_ms: self.config.timeout_ms,
                })
                .and_then(|r| r);
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(key, attempt, error = %e, "anchor write attempt failed");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| AnchorError::Write {
            key: key.to_string(),
            reason: "no attempt made".into(),
        }))
    }
}

/// In-memory anchor store with injectable failures.
#[derive(Debug, Default)]
pub struct InMemoryAnchorStore {
    entries: RwLock<BTreeMap<String, String>>,
    failures_left: AtomicUsize,
    delay: RwLock<Option<Duration>>,
    writes: AtomicUsize,
}

impl InMemoryAnchorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` writes.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Delay every write by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.delay.write() {
            *d = delay;
        }
    }

    /// Successful plus failed write attempts.
    pub fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AnchorStore for InMemoryAnchorStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), AnchorError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay.read().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AnchorError::Write {
                key: key.to_string(),
                reason: "injected failure".into(),
            });
        }
        let mut entries = self.entries.write().map_err(|_| AnchorError::Write {
            key: key.to_string(),
            reason: "anchor store lock poisoned".into(),
        })?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<String, AnchorError> {
        let entries = self.entries.read().map_err(|_| AnchorError::NotFound(key.to_string()))?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| AnchorError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ProofLevel;
    use crate::statement::Statement;
    use vdl_crypto::ActorSigner;
    use vdl_types::{ActorId, Period, Timestamp};

    fn signed(details: bool) -> SignedStatement {
        let start = Timestamp::from_unix_secs(1_704_067_200).unwrap();
        let end = Timestamp::from_unix_secs(1_704_153_600).unwrap();
        let statement = Statement {
            disclosure_id: Digest::of(b"d"),
            policy_id: "policy_public_v1".into(),
            policy_hash: Digest::of(b"p"),
            period: Period::new(start, end).unwrap(),
            root_summary: Digest::of(b"summary"),
            root_details: details.then(|| Digest::of(b"details")),
            proof_level: ProofLevel::RootAndPaths,
            issued_at: end,
        };
        SignedStatement::sign(statement, &ActorSigner::generate(ActorId::system("pub"))).unwrap()
    }

    fn anchorer(store: &Arc<InMemoryAnchorStore>, mode: AnchorMode) -> Anchorer {
        Anchorer::new(
            store.clone(),
            AnchorConfig {
                mode,
                timeout_ms: 50,
                max_attempts: 3,
            },
        )
    }

    #[tokio::test]
    async fn writes_all_keys() {
        let store = Arc::new(InMemoryAnchorStore::new());
        let statement = signed(true);
        let receipt = anchorer(&store, AnchorMode::Strict).anchor(&statement).await.unwrap();

        assert_eq!(receipt.status, AnchorStatus::Anchored);
        assert_eq!(store.len(), 4);
        let summary_key = keys::root_summary(&statement.statement.period.start, "policy_public_v1");
        assert_eq!(summary_key, "root:summary:2024-01-01T00:00:00.000000Z:policy_public_v1");
        assert_eq!(
            store.read(&summary_key).await.unwrap(),
            Digest::of(b"summary").to_hex()
        );
        assert!(store.read(&keys::receipt(&receipt.receipt_hash)).await.is_ok());
        assert!(matches!(
            store.read("root:details:nope").await,
            Err(AnchorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn details_key_only_when_present() {
        let store = Arc::new(InMemoryAnchorStore::new());
        anchorer(&store, AnchorMode::Strict).anchor(&signed(false)).await.unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.keys().iter().all(|k| !k.starts_with("root:details:")));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let store = Arc::new(InMemoryAnchorStore::new());
        store.fail_next(2);
        let receipt = anchorer(&store, AnchorMode::Strict).anchor(&signed(false)).await.unwrap();
        assert_eq!(receipt.status, AnchorStatus::Anchored);
        assert_eq!(store.write_attempts(), 5);
    }

    #[tokio::test]
    async fn strict_mode_surfaces_persistent_failure() {
        let store = Arc::new(InMemoryAnchorStore::new());
        store.fail_next(usize::MAX);
        let err = anchorer(&store, AnchorMode::Strict).anchor(&signed(false)).await.unwrap_err();
        assert!(matches!(err, AnchorError::Write { ref key, .. } if key.starts_with("disclosure:")));
        assert_eq!(store.write_attempts(), 3);
    }

    #[tokio::test]
    async fn non_strict_mode_degrades_locally() {
        let store = Arc::new(InMemoryAnchorStore::new());
        store.fail_next(usize::MAX);
        let anchorer = anchorer(&store, AnchorMode::NonStrict);
        let receipt = anchorer.anchor(&signed(true)).await.unwrap();
        assert_eq!(receipt.status, AnchorStatus::AnchoredLocally);
        assert!(store.is_empty());
        assert_eq!(anchorer.fallback().len(), 4);
    }

    #[tokio::test]
    async fn slow_writes_time_out() {
        let store = Arc::new(InMemoryAnchorStore::new());
        store.set_delay(Some(Duration::from_millis(500)));
        let err = anchorer(&store, AnchorMode::Strict).anchor(&signed(false)).await.unwrap_err();
        assert_eq!(
            err,
            AnchorError::Timeout {
                key: keys::disclosure(&Digest::of(b"d")),
                timeout_ms: 50
            }
        );
    }

    #[test]
    fn receipt_hash_depends_on_signature() {
        let a = ReceiptBody::for_statement(&signed(false)).receipt_hash().unwrap();
        let b = ReceiptBody::for_statement(&signed(false)).receipt_hash().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn config_defaults() {
        let config = AnchorConfig::default();
        assert_eq!(config.mode, AnchorMode::Strict);
        assert_eq!(config.timeout_ms, 5_000);
        assert_eq!(config.max_attempts, 3);
    }
}
