use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a dynamic task orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    /// Task instance handed to the orchestrator
    #[default]
    Init,
    /// Expanding parameters and persisting the plan
    Planning,
    /// Filling free parallelism slots with dispatches
    Launching,
    /// Suspended until a sub-workflow status change arrives
    Awaiting,
    Succeeded,
    Failed,
    /// Parent task was cancelled by the user
    Killed,
}

impl OrchestratorState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Killed)
    }

    /// Plan is durable and the run has not finished
    pub fn is_tracking(&self) -> bool {
        matches!(self, Self::Launching | Self::Awaiting)
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Planning => write!(f, "planning"),
            Self::Launching => write!(f, "launching"),
            Self::Awaiting => write!(f, "awaiting"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Killed => write!(f, "killed"),
        }
    }
}

impl std::str::FromStr for OrchestratorState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "planning" => Ok(Self::Planning),
            "launching" => Ok(Self::Launching),
            "awaiting" => Ok(Self::Awaiting),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "killed" => Ok(Self::Killed),
            _ => Err(format!("Invalid orchestrator state: {s}")),
        }
    }
}
