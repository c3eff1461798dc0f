//! Candidate/live alignment
//!
//! A synchronized candidate sits paused at its seek target while the live
//! surface plays toward it. The swap happens when the live playhead lands
//! in `[candidate, candidate + tolerance)`, so the new surface picks up
//! exactly where the old one is.

use super::core::Engine;
use crate::playback::surface::{PlaybackSurface, SurfaceFactory};
use crate::playback::timer::TimerService;
use tracing::trace;

/// Relation of the live playhead to a waiting candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alignment {
    /// Live is inside the commit window; `drift` is live minus candidate
    Aligned { drift: f64 },
    /// Live has `remaining` seconds to go
    Behind { remaining: f64 },
    /// Live has passed the window by `by` seconds
    Overshot { by: f64 },
}

/// Classify `live` against a candidate parked at `candidate`
pub fn alignment(live: f64, candidate: f64, tolerance: f64) -> Alignment {
    if live < candidate {
        Alignment::Behind {
            remaining: candidate - live,
        }
    } else if live < candidate + tolerance {
        Alignment::Aligned {
            drift: live - candidate,
        }
    } else {
        Alignment::Overshot {
            by: live - candidate,
        }
    }
}

impl<F: SurfaceFactory, T: TimerService> Engine<F, T> {
    /// Sync poll tick
    pub(super) fn poll_alignment(&mut self) {
        self.try_commit_aligned();
    }

    /// Commit if the live playhead is inside the window
    ///
    /// An overshot candidate keeps waiting; the live surface may be seeked
    /// back, and otherwise the request timeout ends it.
    pub(super) fn try_commit_aligned(&mut self) -> bool {
        let Some(request) = self.request else {
            return false;
        };
        let Some(live) = self.current_surface().map(|s| s.current_time()) else {
            return false;
        };
        let Some(candidate) = self.pool.surface(request.index).map(|s| s.current_time()) else {
            return false;
        };

        match alignment(live, candidate, self.config.sync_tolerance_secs) {
            Alignment::Aligned { drift } => {
                self.commit(Some(drift));
                true
            }
            Alignment::Behind { remaining } => {
                trace!(index = request.index, remaining, "Live behind candidate");
                false
            }
            Alignment::Overshot { by } => {
                trace!(index = request.index, by, "Live overshot candidate");
                false
            }
        }
    }
}
