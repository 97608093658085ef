use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The kind of principal behind an action.
///
/// Automation (skills, agents) and people use the same append path; the kind
/// only matters to governance rules and to selective disclosure, where only
/// `Human` and `Auditor` may request or approve grants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Agent,
    Human,
    System,
    Auditor,
}

impl ActorKind {
    /// Whether this kind may request or approve selective disclosure grants.
    pub fn may_authorize_disclosure(&self) -> bool {
        matches!(self, Self::Human | Self::Auditor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Human => "human",
            Self::System => "system",
            Self::Auditor => "auditor",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "human" => Ok(Self::Human),
            "system" => Ok(Self::System),
            "auditor" => Ok(Self::Auditor),
            other => Err(TypeError::UnknownActorKind(other.to_string())),
        }
    }
}

/// Identity of an actor: its kind plus a stable identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId {
    pub kind: ActorKind,
    pub id: String,
}

impl ActorId {
    pub fn new(kind: ActorKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Self::new(ActorKind::Agent, id)
    }

    pub fn human(id: impl Into<String>) -> Self {
        Self::new(ActorKind::Human, id)
    }

    pub fn system(id: impl Into<String>) -> Self {
        Self::new(ActorKind::System, id)
    }

    pub fn auditor(id: impl Into<String>) -> Self {
        Self::new(ActorKind::Auditor, id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for ActorId {
    type Err = TypeError;

    /// Parse the `kind:id` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, id)) if !id.is_empty() => Ok(Self::new(kind.parse()?, id)),
            _ => Err(TypeError::InvalidActorId(s.to_string())),
        }
    }
}
