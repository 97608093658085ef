//! Built-in gate stages.

pub mod governance;
pub mod signer;
pub mod validation;

pub use governance::GovernanceStage;
pub use signer::SignerStage;
pub use validation::ValidationStage;
