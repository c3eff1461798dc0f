//! Quality-switch supporting types

use serde::{Deserialize, Serialize};

/// Why an in-flight quality request was abandoned
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Candidate surface reported an error
    SurfaceError,
    /// Pipeline did not reach commit before the request timeout
    Timeout,
    /// A newer request replaced this one
    Superseded,
    /// Engine stopped or shut down
    Stopped,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::SurfaceError => write!(f, "surface_error"),
            AbortReason::Timeout => write!(f, "timeout"),
            AbortReason::Superseded => write!(f, "superseded"),
            AbortReason::Stopped => write!(f, "stopped"),
        }
    }
}
