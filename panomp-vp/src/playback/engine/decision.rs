//! Auto-quality decision loop
//!
//! Runs every `decision_interval` while the engine is in AUTO mode. Each tick
//! updates the stall tracker of the committed rendition, then picks at most
//! one action:
//! - `stall_ticks` consecutive ticks without playhead progress force a
//!   downgrade by one rung
//! - a buffer of at least `sync_window` ahead of the playhead allows an
//!   upgrade by one rung, unless the next rung has a bad record
//!
//! Stall ticks keep counting while a request is in flight; only the action
//! waits for the request to resolve.

use super::core::Engine;
use crate::playback::pool::SlotCounters;
use crate::playback::surface::{PlaybackSurface, SurfaceFactory};
use crate::playback::timer::TimerService;
use panomp_common::QualityMode;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// Stall threshold reached, stepping down
    Stalled,
    /// Stall threshold reached on the lowest rung
    StalledAtLowest,
    /// Enough buffer ahead, stepping up
    Upgrade,
    /// Next rung was aborted before or left more than once
    UpgradeSuppressed,
    BufferTooLow,
    AlreadyHighest,
}

/// Outcome of one decision tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityDecision {
    /// Rendition to request, if any
    pub target: Option<usize>,
    pub forced: bool,
    pub reason: DecisionReason,
}

impl QualityDecision {
    fn hold(reason: DecisionReason) -> Self {
        Self {
            target: None,
            forced: false,
            reason,
        }
    }
}

/// What one tick sees of the committed rendition
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput {
    pub current: usize,
    pub highest: usize,
    pub down_count: u32,
    pub stall_ticks: u32,
    pub buffered_ahead: f64,
    pub sync_window: f64,
    /// History of the next rung up, if there is one
    pub next: Option<SlotCounters>,
}

/// Choose the action for one tick
pub fn decide(input: &DecisionInput) -> QualityDecision {
    if input.down_count >= input.stall_ticks {
        if input.current == 0 {
            return QualityDecision::hold(DecisionReason::StalledAtLowest);
        }
        return QualityDecision {
            target: Some(input.current - 1),
            forced: true,
            reason: DecisionReason::Stalled,
        };
    }

    if input.buffered_ahead < input.sync_window {
        return QualityDecision::hold(DecisionReason::BufferTooLow);
    }

    let Some(next) = input.next.filter(|_| input.current < input.highest) else {
        return QualityDecision::hold(DecisionReason::AlreadyHighest);
    };
    if next.abort_count > 0 || next.leave_count > 1 {
        return QualityDecision::hold(DecisionReason::UpgradeSuppressed);
    }

    QualityDecision {
        target: Some(input.current + 1),
        forced: false,
        reason: DecisionReason::Upgrade,
    }
}

impl<F: SurfaceFactory, T: TimerService> Engine<F, T> {
    /// Decision loop tick
    pub(super) fn decision_tick(&mut self) {
        if self.quality_mode != Some(QualityMode::Auto) || !self.playing {
            return;
        }
        let Some(current) = self.current_index else {
            return;
        };
        let Some((time, paused, buffered_ahead)) = self.current_surface().map(|s| {
            let t = s.current_time();
            (t, s.is_paused(), s.buffered().buffered_ahead(t))
        }) else {
            return;
        };

        let Some(slot) = self.pool.get_mut(current) else {
            return;
        };
        let stalled = !paused && slot.last_time_stamp == Some(time);
        if stalled {
            slot.counters.down_count += 1;
        } else {
            slot.counters.down_count = 0;
        }
        slot.last_time_stamp = Some(time);
        let down_count = slot.counters.down_count;

        if stalled {
            debug!(index = current, time, down_count, "Playhead not advancing");
        }

        if self.request.is_some() {
            return;
        }

        let input = DecisionInput {
            current,
            highest: self.ladder.highest_index(),
            down_count,
            stall_ticks: self.config.stall_ticks,
            buffered_ahead,
            sync_window: self.config.sync_window_secs,
            next: self.pool.get(current + 1).map(|s| s.counters()),
        };
        let decision = decide(&input);

        match decision.reason {
            DecisionReason::Stalled | DecisionReason::StalledAtLowest => {
                if let Some(slot) = self.pool.get_mut(current) {
                    slot.counters.down_count = 0;
                }
            }
            DecisionReason::UpgradeSuppressed => {
                debug!(index = current + 1, "Upgrade suppressed by rendition history");
            }
            _ => {}
        }

        let Some(target) = decision.target else {
            if decision.reason == DecisionReason::StalledAtLowest {
                warn!(media_id = %self.media_id, time, "Stalled on lowest quality");
            }
            return;
        };

        if decision.reason == DecisionReason::Stalled {
            if let Some(slot) = self.pool.get_mut(current) {
                slot.counters.leave_count += 1;
            }
        }

        info!(
            media_id = %self.media_id,
            from = current,
            to = target,
            reason = ?decision.reason,
            buffered_ahead,
            "Auto quality switch"
        );
        if let Err(e) = self.start_request(target, decision.forced, false) {
            warn!(target, error = %e, "Auto quality request failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> DecisionInput {
        DecisionInput {
            current: 1,
            highest: 2,
            down_count: 0,
            stall_ticks: 3,
            buffered_ahead: 0.0,
            sync_window: 6.0,
            next: Some(SlotCounters::default()),
        }
    }

    #[test]
    fn test_stall_forces_downgrade() {
        let decision = decide(&DecisionInput {
            down_count: 3,
            buffered_ahead: 30.0,
            ..input()
        });
        assert_eq!(decision.target, Some(0));
        assert!(decision.forced);
        assert_eq!(decision.reason, DecisionReason::Stalled);
    }

    #[test]
    fn test_stall_on_lowest_only_holds() {
        let decision = decide(&DecisionInput {
            current: 0,
            down_count: 5,
            ..input()
        });
        assert_eq!(decision.target, None);
        assert_eq!(decision.reason, DecisionReason::StalledAtLowest);
    }

    #[test]
    fn test_upgrade_needs_full_window() {
        let low = decide(&DecisionInput {
            buffered_ahead: 5.9,
            ..input()
        });
        assert_eq!(low.reason, DecisionReason::BufferTooLow);

        let up = decide(&DecisionInput {
            buffered_ahead: 6.0,
            ..input()
        });
        assert_eq!(up.target, Some(2));
        assert!(!up.forced);
    }

    #[test]
    fn test_upgrade_suppression_thresholds() {
        let aborted = SlotCounters {
            abort_count: 1,
            ..SlotCounters::default()
        };
        let left_once = SlotCounters {
            leave_count: 1,
            ..SlotCounters::default()
        };
        let left_twice = SlotCounters {
            leave_count: 2,
            ..SlotCounters::default()
        };

        let with_next = |next| {
            decide(&DecisionInput {
                buffered_ahead: 10.0,
                next: Some(next),
                ..input()
            })
        };
        assert_eq!(with_next(aborted).reason, DecisionReason::UpgradeSuppressed);
        assert_eq!(with_next(left_once).reason, DecisionReason::Upgrade);
        assert_eq!(with_next(left_twice).reason, DecisionReason::UpgradeSuppressed);
    }

    #[test]
    fn test_highest_rung_holds() {
        let decision = decide(&DecisionInput {
            current: 2,
            buffered_ahead: 10.0,
            next: None,
            ..input()
        });
        assert_eq!(decision.reason, DecisionReason::AlreadyHighest);
    }
}
