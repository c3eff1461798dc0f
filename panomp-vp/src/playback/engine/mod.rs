//! Adaptive playback engine
//!
//! **Module Structure:**
//! - `core.rs`: Engine struct, construction, host API, commit/abort
//! - `pipeline.rs`: Request/commit state machine driven by surface events
//! - `sync.rs`: Candidate/live alignment check and polling
//! - `decision.rs`: Auto-quality decision loop
//!
//! All entry points (`handle_surface_event`, `on_timer` and the host API) run
//! to completion without blocking; anything that has to wait returns and
//! resumes on a later event or timer tick.

mod core;
mod decision;
mod pipeline;
mod sync;

pub use self::core::Engine;
pub use self::decision::{decide, DecisionInput, DecisionReason, QualityDecision};
pub use self::sync::{alignment, Alignment};

use panomp_common::QualityMode;

/// Pipeline stage of a slot
///
/// A candidate moves `Priming → PreSeekWait → Seeking → SyncWait →
/// Committed`, or ends in `Aborted`. `PreSeekWait` is skipped when the
/// platform cannot autoplay; a first request with nothing to synchronize
/// against commits straight from `Priming`; forced requests commit on
/// entering `SyncWait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No request targets this slot
    Idle,
    /// Surface created, waiting for usable data
    Priming,
    /// Candidate paused, waiting for a definite readiness signal before seeking
    PreSeekWait,
    /// Seek issued; `seeked` records whether it completed and the candidate
    /// is now waiting for sufficient data
    Seeking { seeked: bool },
    /// Waiting for the live playhead to reach the candidate
    SyncWait,
    /// Promoted to current
    Committed,
    /// Torn down before committing
    Aborted,
}

impl PipelineState {
    /// True while a request for this slot is mid-pipeline
    pub fn is_in_flight(&self) -> bool {
        !matches!(
            self,
            PipelineState::Idle | PipelineState::Committed | PipelineState::Aborted
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Priming => write!(f, "Priming"),
            PipelineState::PreSeekWait => write!(f, "PreSeekWait"),
            PipelineState::Seeking { seeked: false } => write!(f, "Seeking"),
            PipelineState::Seeking { seeked: true } => write!(f, "Seeking(seeked)"),
            PipelineState::SyncWait => write!(f, "SyncWait"),
            PipelineState::Committed => write!(f, "Committed"),
            PipelineState::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Point-in-time view of an engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub current_index: Option<usize>,
    pub request_index: Option<usize>,
    pub pipeline_state: PipelineState,
    pub quality_mode: Option<QualityMode>,
    pub playing: bool,
    /// Playhead of the committed surface
    pub position: Option<f64>,
    pub live_surfaces: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_states() {
        assert!(!PipelineState::Idle.is_in_flight());
        assert!(!PipelineState::Committed.is_in_flight());
        assert!(!PipelineState::Aborted.is_in_flight());
        assert!(PipelineState::Priming.is_in_flight());
        assert!(PipelineState::PreSeekWait.is_in_flight());
        assert!(PipelineState::Seeking { seeked: true }.is_in_flight());
        assert!(PipelineState::SyncWait.is_in_flight());
    }

    #[test]
    fn test_display() {
        assert_eq!(PipelineState::Seeking { seeked: false }.to_string(), "Seeking");
        assert_eq!(PipelineState::SyncWait.to_string(), "SyncWait");
    }
}
