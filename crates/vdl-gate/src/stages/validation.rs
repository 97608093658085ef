use crate::error::GateError;
use crate::stage::{AppendProposal, GateContext, GateStage, StageDecision};

/// Structural validation stage.
///
/// Runs the payload's own schema checks (positive quantities, non-negative
/// money, non-empty identifiers and item lists).
pub struct ValidationStage;

impl GateStage for ValidationStage {
    fn name(&self) -> &str {
        "validation"
    }

    fn evaluate(
        &self,
        proposal: &AppendProposal<'_>,
        _context: &GateContext<'_>,
    ) -> Result<StageDecision, GateError> {
        match proposal.draft.payload.validate() {
            Ok(()) => Ok(StageDecision::Pass),
            Err(e) => Ok(StageDecision::fail(e.to_string())),
        }
    }
}
