use serde::{Deserialize, Serialize};

use crate::stages::governance::GovernancePolicy;

/// Configuration for the append gate pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// The governance rule set enforced on every append.
    #[serde(default = "GovernancePolicy::standard")]
    pub policy: GovernancePolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            policy: GovernancePolicy::standard(),
        }
    }
}

impl GateConfig {
    pub fn with_policy(policy: GovernancePolicy) -> Self {
        Self { policy }
    }
}
