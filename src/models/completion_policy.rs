use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule deciding the aggregate outcome of a dynamic task and whether
/// remaining launches are suppressed after a partial failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionPolicy {
    /// First failure fails the parent, suppresses unlaunched sets and kills running instances
    FailFast,
    /// Every planned set runs to completion; the parent fails afterwards if any failed
    #[default]
    ContinueThenFail,
    /// First failure suppresses unlaunched sets; running instances finish naturally
    AllMustSucceed,
}

impl CompletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailFast => "FAIL_FAST",
            Self::ContinueThenFail => "CONTINUE_THEN_FAIL",
            Self::AllMustSucceed => "ALL_MUST_SUCCEED",
        }
    }
}

impl fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CompletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FAIL_FAST" => Ok(Self::FailFast),
            "CONTINUE_THEN_FAIL" => Ok(Self::ContinueThenFail),
            "ALL_MUST_SUCCEED" => Ok(Self::AllMustSucceed),
            _ => Err(format!("Invalid completion policy: {s}")),
        }
    }
}

/// Aggregate status of a dynamic task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    Running,
    Success,
    Failure,
}

impl RunVerdict {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for RunVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}
