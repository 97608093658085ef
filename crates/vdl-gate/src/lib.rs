//! Governance gate for the Verifiable Disclosure Ledger.
//!
//! Every ledger append passes through the gate before it is hashed and
//! signed. The gate runs a pipeline of stages (payload validation, signer
//! verification, governance rules) and produces an accept/deny decision with
//! a per-stage audit trail. Governance is default-deny: an action that no
//! rule matches is refused.
//!
//! `InMemoryLedger::append` validates the payload and matches the signing
//! key against the key ring itself, with or without a gate installed. The
//! validation and signer stages repeat those two checks, so on a gated
//! ledger only governance can deny. Calling [`AppendGate::evaluate`]
//! directly still runs all three and records each in the trace.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use vdl_crypto::{ActorSigner, InMemoryKeyRing};
//! use vdl_gate::{AppendGate, GateConfig};
//! use vdl_ledger::InMemoryLedger;
//! use vdl_types::ActorId;
//!
//! let keys = Arc::new(InMemoryKeyRing::new());
//! let ops = ActorSigner::generate(ActorId::agent("ops"));
//! ops.register_with(&keys).unwrap();
//!
//! let gate = AppendGate::with_default_stages(GateConfig::default(), keys.clone());
//! let ledger = InMemoryLedger::new(keys).with_guard(Arc::new(gate));
//! # let _ = ledger;
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod stage;
pub mod stages;

pub use config::GateConfig;
pub use error::GateError;
pub use gate::{AppendGate, GateDecision, GateResult};
pub use stage::{AppendProposal, GateContext, GateStage, StageDecision, StageOutcome};
pub use stages::governance::{
    Comparison, Condition, Effect, GovernancePolicy, GovernanceRule, GovernanceStage,
    HUMAN_APPROVAL_THRESHOLD,
};
pub use stages::signer::SignerStage;
pub use stages::validation::ValidationStage;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use vdl_crypto::{ActorSigner, InMemoryKeyRing};
    use vdl_ledger::{
        CostItem, DisclosurePublished, EventDraft, EventPayload, InMemoryLedger, LedgerError,
        LedgerReader, LedgerWriter, OrderItem, OrderPlaced, ProcurementOrdered,
    };
    use vdl_types::{ActorId, Digest, Money, Period, Timestamp};

    struct Fixture {
        keys: Arc<InMemoryKeyRing>,
        agent: ActorSigner,
        human: ActorSigner,
    }

    fn fixture() -> Fixture {
        let keys = Arc::new(InMemoryKeyRing::new());
        let agent = ActorSigner::generate(ActorId::agent("ops-bot"));
        let human = ActorSigner::generate(ActorId::human("alice"));
        agent.register_with(&keys).unwrap();
        human.register_with(&keys).unwrap();
        Fixture { keys, agent, human }
    }

    fn gate(f: &Fixture) -> AppendGate {
        AppendGate::with_default_stages(GateConfig::default(), f.keys.clone())
    }

    fn order() -> EventDraft {
        EventDraft::new(EventPayload::OrderPlaced(OrderPlaced {
            order_id: "o-1".into(),
            customer_ref: "c-1".into(),
            items: vec![OrderItem {
                sku: "tea".into(),
                qty: 1,
                unit_price: Money::from_minor(1200),
            }],
            channel: "web".into(),
            region: None,
        }))
    }

    fn procurement(unit_cost: i64, qty: i64) -> EventDraft {
        EventDraft::new(EventPayload::ProcurementOrdered(ProcurementOrdered {
            procurement_id: "po-1".into(),
            supplier_id: "sup-1".into(),
            items: vec![CostItem {
                sku: "tea".into(),
                qty,
                unit_cost: Money::from_minor(unit_cost),
            }],
            expected_date: "2024-02-01".into(),
        }))
    }

    fn published() -> EventDraft {
        let t0 = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        let t1 = Timestamp::from_unix_secs(1_700_086_400).unwrap();
        EventDraft::new(EventPayload::DisclosurePublished(DisclosurePublished {
            disclosure_id: Digest::of(b"d"),
            policy_id: "policy_public_v1".into(),
            period: Period::new(t0, t1).unwrap(),
            root_summary: Digest::of(b"root"),
            root_details: None,
            statement_sig_hash: Digest::of(b"sig"),
        }))
    }

    fn evaluate(gate: &AppendGate, draft: &EventDraft, signer: &ActorSigner) -> GateResult {
        let key = signer.verifying_key();
        gate.evaluate(&AppendProposal::new(draft, signer.actor(), &key))
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // 1. Default gate accepts ordinary business events
    // -----------------------------------------------------------------------
    #[test]
    fn default_gate_accepts_order_from_agent() {
        let f = fixture();
        let result = evaluate(&gate(&f), &order(), &f.agent);
        assert!(result.is_accepted());
        assert_eq!(result.trace.len(), 3); // validation, signer, governance
        assert!(result.trace.iter().all(|r| r.passed));
    }

    // -----------------------------------------------------------------------
    // 2. Validation is fail-fast
    // -----------------------------------------------------------------------
    #[test]
    fn validation_rejects_bad_payload() {
        let f = fixture();
        let result = evaluate(&gate(&f), &procurement(100, 0), &f.agent);
        assert!(!result.is_accepted());
        assert_eq!(result.trace.len(), 1);
        assert_eq!(result.trace[0].stage, "validation");
    }

    // -----------------------------------------------------------------------
    // 3. Signer must be registered with the presented key
    // -----------------------------------------------------------------------
    #[test]
    fn signer_stage_rejects_unknown_and_mismatched_keys() {
        let f = fixture();
        let gate = gate(&f);

        let stranger = ActorSigner::generate(ActorId::agent("stranger"));
        let result = evaluate(&gate, &order(), &stranger);
        assert_eq!(
            result.decision,
            GateDecision::Denied {
                stage: "signer".into(),
                reason: "no key registered for agent:stranger".into()
            }
        );

        let impostor = ActorSigner::generate(ActorId::agent("ops-bot"));
        let result = evaluate(&gate, &order(), &impostor);
        assert!(matches!(result.decision, GateDecision::Denied { ref stage, .. } if stage == "signer"));
    }

    // -----------------------------------------------------------------------
    // 4. Large procurements require a human
    // -----------------------------------------------------------------------
    #[test]
    fn large_procurement_requires_human() {
        let f = fixture();
        let gate = gate(&f);
        // 1_000 x 600 = 600_000 > threshold
        let large = procurement(600, 1_000);

        let by_agent = evaluate(&gate, &large, &f.agent);
        assert!(!by_agent.is_accepted());
        let reason = by_agent.trace[2].reason.as_deref().unwrap();
        assert!(reason.contains("large-procurement-needs-human"));

        assert!(evaluate(&gate, &large, &f.human).is_accepted());
        assert!(evaluate(&gate, &procurement(500, 1_000), &f.agent).is_accepted());
    }

    // -----------------------------------------------------------------------
    // 5. Disclosure events are restricted by actor kind
    // -----------------------------------------------------------------------
    #[test]
    fn disclosure_published_only_by_agent_or_system() {
        let f = fixture();
        let gate = gate(&f);
        assert!(evaluate(&gate, &published(), &f.agent).is_accepted());
        assert!(!evaluate(&gate, &published(), &f.human).is_accepted());
    }

    // -----------------------------------------------------------------------
    // 6. Absence of a rule is never permission
    // -----------------------------------------------------------------------
    #[test]
    fn empty_policy_denies_everything() {
        let f = fixture();
        let policy = GovernancePolicy {
            id: "empty".into(),
            version: 1,
            rules: vec![],
        };
        let gate = AppendGate::with_default_stages(GateConfig::with_policy(policy), f.keys.clone());
        let result = evaluate(&gate, &order(), &f.human);
        assert_eq!(
            result.decision,
            GateDecision::Denied {
                stage: "governance".into(),
                reason: "no rule permits event:OrderPlaced".into()
            }
        );
    }

    // -----------------------------------------------------------------------
    // 7. First matching rule wins
    // -----------------------------------------------------------------------
    #[test]
    fn deny_rule_before_wildcard_allow() {
        let f = fixture();
        let policy = GovernancePolicy {
            id: "custom".into(),
            version: 1,
            rules: vec![
                GovernanceRule::deny("no-orders", "event:OrderPlaced"),
                GovernanceRule::allow("all", "event:*"),
            ],
        };
        let gate = AppendGate::with_default_stages(GateConfig::with_policy(policy), f.keys.clone());
        assert!(!evaluate(&gate, &order(), &f.agent).is_accepted());
        assert!(evaluate(&gate, &procurement(1, 1), &f.agent).is_accepted());
    }

    // -----------------------------------------------------------------------
    // 8. Policy hash is canonical
    // -----------------------------------------------------------------------
    #[test]
    fn policy_hash_is_stable_and_content_sensitive() {
        let a = GovernancePolicy::standard();
        let b = GovernancePolicy::standard();
        assert_eq!(a.policy_hash().unwrap(), b.policy_hash().unwrap());

        let mut c = GovernancePolicy::standard();
        c.rules.pop();
        assert_ne!(a.policy_hash().unwrap(), c.policy_hash().unwrap());

        let f = fixture();
        let result = evaluate(&gate(&f), &order(), &f.agent);
        assert_eq!(result.policy_hash, a.policy_hash().unwrap());
    }

    // -----------------------------------------------------------------------
    // 9. Config loads from TOML
    // -----------------------------------------------------------------------
    #[test]
    fn config_from_toml() {
        let raw = r#"
            [policy]
            id = "custom"
            version = 2

            [[policy.rules]]
            id = "no-refunds"
            action = "event:RefundIssued"
            effect = "deny"

            [[policy.rules]]
            id = "humans-only"
            action = "event:*"
            actor_kinds = ["human"]

            [[policy.rules.when]]
            field = "item_count"
            op = "lte"
            value = 10
        "#;
        let config: GateConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.policy.rules.len(), 2);
        assert_eq!(config.policy.rules[0].effect, Effect::Deny);
        assert_eq!(config.policy.rules[1].when[0].op, Comparison::Lte);

        let empty: GateConfig = toml::from_str("").unwrap();
        assert_eq!(empty, GateConfig::default());
    }

    // -----------------------------------------------------------------------
    // 10. Installed on a ledger, denials block the append
    // -----------------------------------------------------------------------
    #[test]
    fn ledger_append_goes_through_gate() {
        let f = fixture();
        let ledger = InMemoryLedger::new(f.keys.clone()).with_guard(Arc::new(gate(&f)));

        ledger.append(order(), &f.agent).unwrap();
        let err = ledger.append(procurement(600, 1_000), &f.agent).unwrap_err();
        assert!(matches!(err, LedgerError::GovernanceDenied { ref stage, .. } if stage == "governance"));
        assert_eq!(ledger.len().unwrap(), 1);
        ledger.verify().unwrap();
    }

    #[test]
    fn gated_ledger_rejects_bad_signer_before_the_gate() {
        let f = fixture();
        let ledger = InMemoryLedger::new(f.keys.clone()).with_guard(Arc::new(gate(&f)));

        let impostor = ActorSigner::generate(ActorId::agent("ops-bot"));
        let err = ledger.append(order(), &impostor).unwrap_err();
        assert!(matches!(err, LedgerError::SignerMismatch { .. }));
        assert!(ledger.is_empty().unwrap());

        // The same append evaluated directly is refused by the signer stage.
        let result = evaluate(&gate(&f), &order(), &impostor);
        assert!(!result.is_accepted());
        assert_eq!(result.trace.last().map(|o| o.stage.as_str()), Some("signer"));
    }
}
