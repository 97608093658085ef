use std::sync::Arc;

use vdl_crypto::{KeyError, KeyResolver};

use crate::error::GateError;
use crate::stage::{AppendProposal, GateContext, GateStage, StageDecision};

/// Signer verification stage.
///
/// The key presented for the append must be the one registered for the
/// actor. An unknown actor fails the stage; a broken key store is an error.
pub struct SignerStage {
    keys: Arc<dyn KeyResolver>,
}

impl SignerStage {
    pub fn new(keys: Arc<dyn KeyResolver>) -> Self {
        Self { keys }
    }
}

impl GateStage for SignerStage {
    fn name(&self) -> &str {
        "signer"
    }

    fn evaluate(
        &self,
        proposal: &AppendProposal<'_>,
        _context: &GateContext<'_>,
    ) -> Result<StageDecision, GateError> {
        match self.keys.resolve(proposal.actor) {
            Ok(registered) if registered == *proposal.key => Ok(StageDecision::Pass),
            Ok(_) => Ok(StageDecision::fail(format!(
                "key presented by {} is not the registered key",
                proposal.actor
            ))),
            Err(KeyError::UnknownActor(actor)) => Ok(StageDecision::fail(format!(
                "no key registered for {actor}"
            ))),
            Err(e) => Err(GateError::stage(self.name(), e.to_string())),
        }
    }
}
