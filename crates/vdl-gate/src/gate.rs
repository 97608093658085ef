use std::sync::Arc;
use std::time::{Duration, Instant};

use vdl_crypto::{KeyResolver, VerifyingKey};
use vdl_ledger::{AppendGuard, EventDraft, GuardDenial};
use vdl_types::{ActorId, Digest};

use crate::config::GateConfig;
use crate::error::GateError;
use crate::stage::{AppendProposal, GateContext, GateStage, StageDecision, StageOutcome};
use crate::stages::{GovernanceStage, SignerStage, ValidationStage};

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Accepted,
    Denied { stage: String, reason: String },
}

/// What the gate concluded about one append.
#[derive(Clone, Debug)]
pub struct GateResult {
    pub decision: GateDecision,
    /// Hash of the governance rule set this verdict was reached under.
    pub policy_hash: Digest,
    /// One entry per stage that ran, in order. A denial ends the trace.
    pub trace: Vec<StageOutcome>,
    pub took: Duration,
}

impl GateResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self.decision, GateDecision::Accepted)
    }

    pub fn into_result(self) -> Result<Self, GateError> {
        if let GateDecision::Denied { stage, reason } = &self.decision {
            return Err(GateError::Denied {
                stage: stage.clone(),
                reason: reason.clone(),
            });
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// AppendGate
// ---------------------------------------------------------------------------

/// Ordered stages every ledger append must clear.
///
/// Installed on the ledger as its [`AppendGuard`]; people, agents, and
/// automation all go through it.
pub struct AppendGate {
    config: GateConfig,
    stages: Vec<Box<dyn GateStage>>,
}

impl AppendGate {
    /// A gate with no stages. Accepts everything until stages are added.
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            stages: Vec::new(),
        }
    }

    /// Payload validation, then the signer check, then governance.
    pub fn with_default_stages(config: GateConfig, keys: Arc<dyn KeyResolver>) -> Self {
        let mut gate = Self::new(config);
        gate.add_stage(Box::new(ValidationStage));
        gate.add_stage(Box::new(SignerStage::new(keys)));
        gate.add_stage(Box::new(GovernanceStage));
        gate
    }

    pub fn add_stage(&mut self, stage: Box<dyn GateStage>) {
        self.stages.push(stage);
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn policy_hash(&self) -> Result<Digest, GateError> {
        Ok(self.config.policy.policy_hash()?)
    }

    /// Run `proposal` through the stages, stopping at the first failure.
    pub fn evaluate(&self, proposal: &AppendProposal<'_>) -> Result<GateResult, GateError> {
        let started = Instant::now();
        let policy_hash = self.policy_hash()?;
        let mut context = GateContext::new(&self.config.policy);

        for stage in &self.stages {
            let stage_started = Instant::now();
            let decision = stage.evaluate(proposal, &context)?;
            let denial = match decision {
                StageDecision::Pass => None,
                StageDecision::Fail { reason } => Some(reason),
            };
            context.completed.push(StageOutcome {
                stage: stage.name().to_string(),
                passed: denial.is_none(),
                reason: denial.clone(),
                took: stage_started.elapsed(),
            });

            if let Some(reason) = denial {
                tracing::debug!(
                    stage = stage.name(),
                    action = %proposal.action(),
                    actor = %proposal.actor,
                    reason = %reason,
                    "append denied"
                );
                return Ok(GateResult {
                    decision: GateDecision::Denied {
                        stage: stage.name().to_string(),
                        reason,
                    },
                    policy_hash,
                    trace: context.completed,
                    took: started.elapsed(),
                });
            }
        }

        Ok(GateResult {
            decision: GateDecision::Accepted,
            policy_hash,
            trace: context.completed,
            took: started.elapsed(),
        })
    }
}

impl AppendGuard for AppendGate {
    fn check(
        &self,
        draft: &EventDraft,
        actor: &ActorId,
        key: &VerifyingKey,
    ) -> Result<(), GuardDenial> {
        let proposal = AppendProposal::new(draft, actor, key);
        match self.evaluate(&proposal).and_then(GateResult::into_result) {
            Ok(_) => Ok(()),
            Err(GateError::Denied { stage, reason }) => Err(GuardDenial { stage, reason }),
            Err(other) => Err(GuardDenial {
                stage: "gate".into(),
                reason: other.to_string(),
            }),
        }
    }
}
