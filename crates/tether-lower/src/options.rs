use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How suspension points are physically realized. Chosen once for a whole
/// compilation unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionStrategyKind {
    /// Asynchronous routines become resumable state machines with hoisted
    /// locals and a resume dispatch at entry.
    #[default]
    StateMachine,
    /// Asynchronous routines run on scheduler-driven fibers; a suspension is
    /// a blocking wait on the awaited task.
    Direct,
}

impl fmt::Display for SuspensionStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspensionStrategyKind::StateMachine => write!(f, "state_machine"),
            SuspensionStrategyKind::Direct => write!(f, "direct"),
        }
    }
}

impl FromStr for SuspensionStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "state_machine" | "state-machine" => Ok(SuspensionStrategyKind::StateMachine),
            "direct" => Ok(SuspensionStrategyKind::Direct),
            other => Err(format!(
                "unknown suspension strategy '{}' (expected 'state_machine' or 'direct')",
                other
            )),
        }
    }
}

/// What happens when a disposal throws while a body exception is pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupFailurePolicy {
    /// The disposal exception propagates and the body exception is dropped.
    #[default]
    Replace,
    /// Both are raised together as an `AggregateException`, body first.
    Aggregate,
}

impl fmt::Display for CleanupFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupFailurePolicy::Replace => write!(f, "replace"),
            CleanupFailurePolicy::Aggregate => write!(f, "aggregate"),
        }
    }
}

impl FromStr for CleanupFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(CleanupFailurePolicy::Replace),
            "aggregate" => Ok(CleanupFailurePolicy::Aggregate),
            other => Err(format!(
                "unknown cleanup failure policy '{}' (expected 'replace' or 'aggregate')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowerOptions {
    pub strategy: SuspensionStrategyKind,
    pub cleanup_failure: CleanupFailurePolicy,
}

impl LowerOptions {
    pub fn with_strategy(strategy: SuspensionStrategyKind) -> Self {
        LowerOptions {
            strategy,
            ..LowerOptions::default()
        }
    }
}
