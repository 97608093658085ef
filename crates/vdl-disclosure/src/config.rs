use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use vdl_crypto::{ActorSigner, InMemoryKeyRing, SigningKey};
use vdl_gate::GateConfig;
use vdl_types::{ActorId, Digest};

use crate::anchor::AnchorConfig;
use crate::error::ConfigError;
use crate::policy::DisclosurePolicy;
use crate::selective::DEFAULT_GRANT_TTL_SECS;

/// Hex Ed25519 seed. Never printed.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct KeySeed(String);

impl KeySeed {
    pub fn new(hex_seed: impl Into<String>) -> Self {
        Self(hex_seed.into())
    }

    fn signing_key(&self, actor: &str) -> Result<SigningKey, ConfigError> {
        SigningKey::from_hex_seed(&self.0)
            .map_err(|e| ConfigError::Invalid(format!("key for {actor}: {e}")))
    }
}

impl fmt::Debug for KeySeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeySeed(<redacted>)")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SelectiveConfig {
    pub grant_ttl_secs: i64,
}

impl Default for SelectiveConfig {
    fn default() -> Self {
        Self {
            grant_ttl_secs: DEFAULT_GRANT_TTL_SECS,
        }
    }
}

/// Engine configuration, loadable from TOML.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub anchor: AnchorConfig,
    pub selective: SelectiveConfig,
    /// Actor (`kind:id`) signing publications and `DisclosurePublished`
    /// events.
    pub issuer: String,
    /// Seeds for the in-memory key ring, keyed by `kind:id`.
    pub keys: BTreeMap<String, KeySeed>,
    pub gate: GateConfig,
    /// Policies beyond the built-in ones. Unsealed entries are sealed on
    /// load; entries carrying a hash must match it.
    pub policies: Vec<DisclosurePolicy>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            anchor: AnchorConfig::default(),
            selective: SelectiveConfig::default(),
            issuer: "system:publisher".into(),
            keys: BTreeMap::new(),
            gate: GateConfig::default(),
            policies: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(raw)?;
        config.policies = std::mem::take(&mut config.policies)
            .into_iter()
            .map(|p| {
                if p.policy_hash == Digest::ZERO {
                    p.seal()
                } else {
                    p.verify_hash().map(|_| p)
                }
                .map_err(|e| ConfigError::Invalid(e.to_string()))
            })
            .collect::<Result<_, _>>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.anchor.max_attempts == 0 {
            return Err(ConfigError::Invalid("anchor.max_attempts must be at least 1".into()));
        }
        if self.anchor.timeout_ms == 0 {
            return Err(ConfigError::Invalid("anchor.timeout_ms must be positive".into()));
        }
        if self.selective.grant_ttl_secs <= 0 {
            return Err(ConfigError::Invalid("selective.grant_ttl_secs must be positive".into()));
        }
        self.issuer_id()?;
        for (actor, seed) in &self.keys {
            parse_actor(actor)?;
            seed.signing_key(actor)?;
        }
        Ok(())
    }

    pub fn issuer_id(&self) -> Result<ActorId, ConfigError> {
        parse_actor(&self.issuer)
    }

    pub fn grant_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.selective.grant_ttl_secs)
    }

    /// A key ring holding the public half of every configured seed.
    pub fn key_ring(&self) -> Result<InMemoryKeyRing, ConfigError> {
        let ring = InMemoryKeyRing::new();
        for (actor, seed) in &self.keys {
            let key = seed.signing_key(actor)?.verifying_key();
            ring.register(parse_actor(actor)?, key)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(ring)
    }

    /// Signer for a configured actor.
    pub fn signer(&self, actor: &ActorId) -> Result<ActorSigner, ConfigError> {
        let name = actor.to_string();
        let seed = self
            .keys
            .get(&name)
            .ok_or_else(|| ConfigError::Invalid(format!("no key configured for {name}")))?;
        Ok(ActorSigner::new(actor.clone(), seed.signing_key(&name)?))
    }

    /// A configured policy, falling back to the built-in set.
    pub fn policy(&self, id: &str) -> Result<DisclosurePolicy, ConfigError> {
        if let Some(p) = self.policies.iter().find(|p| p.id == id) {
            return Ok(p.clone());
        }
        DisclosurePolicy::builtin(id).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn parse_actor(raw: &str) -> Result<ActorId, ConfigError> {
    raw.parse()
        .map_err(|e| ConfigError::Invalid(format!("actor {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::AnchorMode;
    use crate::policy::ProofLevel;

    const SEED: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.anchor, AnchorConfig::default());
        assert_eq!(config.selective.grant_ttl_secs, 600);
        assert_eq!(config.issuer_id().unwrap(), ActorId::system("publisher"));
        assert!(config.key_ring().unwrap().is_empty());
        assert_eq!(config.gate, GateConfig::default());
    }

    #[test]
    fn full_config() {
        let raw = format!(
            r#"
            issuer = "system:kpi-bot"

            [anchor]
            mode = "non_strict"
            timeout_ms = 250

            [selective]
            grant_ttl_secs = 60

            [keys]
            "system:kpi-bot" = "{SEED}"
            "auditor:kpmg" = "{SEED}"

            [[policies]]
            id = "policy_board_v1"
            version = 1
            audience = "investor"
            allowed_metrics = ["revenue_cents", "cogs_cents"]
            proof_level = "root_only"
            "#
        );
        let config = EngineConfig::from_toml_str(&raw).unwrap();
        assert_eq!(config.anchor.mode, AnchorMode::NonStrict);
        assert_eq!(config.anchor.timeout_ms, 250);
        assert_eq!(config.anchor.max_attempts, 3);
        assert_eq!(config.grant_ttl(), chrono::Duration::seconds(60));
        assert_eq!(config.key_ring().unwrap().len(), 2);

        let issuer = config.signer(&config.issuer_id().unwrap()).unwrap();
        assert_eq!(issuer.actor(), &ActorId::system("kpi-bot"));

        let board = config.policy("policy_board_v1").unwrap();
        assert_eq!(board.proof_level, ProofLevel::RootOnly);
        assert!(board.verify_hash().is_ok());
        assert!(config.policy("policy_public_v1").is_ok());
        assert!(config.policy("policy_missing").is_err());
    }

    #[test]
    fn invalid_values_rejected() {
        for raw in [
            "[anchor]\nmax_attempts = 0",
            "[anchor]\ntimeout_ms = 0",
            "[selective]\ngrant_ttl_secs = 0",
            "issuer = \"publisher\"",
            "[keys]\n\"robot:x\" = \"00\"",
            "[keys]\n\"system:x\" = \"zz\"",
            "[anchor]\nmode = \"lenient\"",
        ] {
            assert!(EngineConfig::from_toml_str(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn drifted_policy_hash_rejected() {
        let raw = r#"
            [[policies]]
            id = "p"
            version = 1
            audience = "public"
            allowed_metrics = ["revenue_cents"]
            proof_level = "root_only"
            policy_hash = "0000000000000000000000000000000000000000000000000000000000000001"
        "#;
        assert!(matches!(
            EngineConfig::from_toml_str(raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn seeds_are_redacted() {
        let config = EngineConfig::from_toml_str(&format!("[keys]\n\"system:publisher\" = \"{SEED}\"")).unwrap();
        assert!(!format!("{config:?}").contains(SEED));
    }

    #[test]
    fn missing_signer_key() {
        let config = EngineConfig::default();
        assert!(config.signer(&ActorId::human("alice")).is_err());
    }
}
