use std::sync::Arc;

use vdl_crypto::{ActorSigner, InMemoryKeyRing, KeyResolver};
use vdl_gate::AppendGate;
use vdl_ledger::InMemoryLedger;
use vdl_types::{Clock, Period};

use crate::anchor::{AnchorStore, Anchorer};
use crate::config::EngineConfig;
use crate::error::{ConfigError, PolicyError, PublishError};
use crate::policy::DisclosurePolicy;
use crate::publisher::{DisclosureRun, Publisher};
use crate::selective::SelectiveDisclosure;
use crate::store::{DisclosureStore, InMemoryDisclosureStore};

/// The assembled engine: gated ledger, publisher, and grant workflow
/// sharing one key ring, store, and clock.
pub struct DisclosureEngine {
    config: EngineConfig,
    keys: Arc<InMemoryKeyRing>,
    ledger: Arc<InMemoryLedger>,
    publisher: Arc<Publisher>,
    selective: SelectiveDisclosure,
}

impl DisclosureEngine {
    pub fn from_config(
        config: EngineConfig,
        anchor_store: Arc<dyn AnchorStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let keys = Arc::new(config.key_ring()?);
        let resolver: Arc<dyn KeyResolver> = keys.clone();

        let gate = AppendGate::with_default_stages(config.gate.clone(), resolver.clone());
        let ledger = Arc::new(
            InMemoryLedger::new(resolver.clone())
                .with_guard(Arc::new(gate))
                .with_clock(clock.clone()),
        );

        let issuer = config.signer(&config.issuer_id()?)?;
        let store: Arc<dyn DisclosureStore> = Arc::new(InMemoryDisclosureStore::new());
        let publisher = Arc::new(
            Publisher::new(
                ledger.clone(),
                store,
                Anchorer::new(anchor_store, config.anchor.clone()),
                issuer,
                resolver,
            )
            .with_clock(clock.clone()),
        );
        let selective = SelectiveDisclosure::new(publisher.clone())
            .with_clock(clock)
            .with_ttl(config.grant_ttl());

        tracing::info!(
            issuer = %config.issuer,
            keys = keys.len(),
            anchor_mode = ?config.anchor.mode,
            policies = config.policies.len(),
            "disclosure engine ready"
        );
        Ok(Self {
            config,
            keys,
            ledger,
            publisher,
            selective,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn keys(&self) -> &Arc<InMemoryKeyRing> {
        &self.keys
    }

    pub fn ledger(&self) -> &Arc<InMemoryLedger> {
        &self.ledger
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn selective(&self) -> &SelectiveDisclosure {
        &self.selective
    }

    pub fn store(&self) -> &Arc<dyn DisclosureStore> {
        self.publisher.store()
    }

    /// Signer for an actor whose seed is in the configuration.
    pub fn signer(&self, actor: &vdl_types::ActorId) -> Result<ActorSigner, ConfigError> {
        self.config.signer(actor)
    }

    /// Resolve a policy by id, configured policies first.
    pub fn policy(&self, policy_id: &str) -> Result<DisclosurePolicy, PolicyError> {
        match self.config.policies.iter().find(|p| p.id == policy_id) {
            Some(policy) => Ok(policy.clone()),
            None => DisclosurePolicy::builtin(policy_id),
        }
    }

    /// Publish a policy by id for `period`.
    pub async fn publish(&self, policy_id: &str, period: Period) -> Result<DisclosureRun, PublishError> {
        let policy = self.policy(policy_id)?;
        self.publisher.publish(&policy, period).await
    }
}
