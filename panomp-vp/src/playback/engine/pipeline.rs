//! Request pipeline
//!
//! Advances the candidate through `Priming → PreSeekWait → Seeking →
//! SyncWait` as its surface reports progress, and routes timer firings.
//! Events from the committed surface are passed through to the host; events
//! from surfaces that are neither current nor candidate are stale and dropped.

use super::core::Engine;
use super::PipelineState;
use crate::playback::surface::{PlaybackSurface, ReadyState, SurfaceEvent, SurfaceFactory, SurfaceId};
use crate::playback::timer::{TimerId, TimerService};
use panomp_common::events::{AbortReason, EngineEvent};
use panomp_common::time;
use tracing::{debug, info, trace, warn};

impl<F: SurfaceFactory, T: TimerService> Engine<F, T> {
    /// Deliver a lifecycle event from the surface identified by `id`
    pub fn handle_surface_event(&mut self, id: SurfaceId, event: SurfaceEvent) {
        if self.shut_down {
            return;
        }

        if self.request.map(|r| r.surface) == Some(id) {
            self.on_candidate_event(event);
        } else if self.current_surface_id() == Some(id) {
            self.on_live_event(event);
        } else {
            trace!(surface = %id, ?event, "Dropping event from stale surface");
        }
    }

    /// Deliver a timer firing
    pub fn on_timer(&mut self, id: TimerId) {
        if self.shut_down {
            return;
        }

        if self.decision_timer == Some(id) {
            self.decision_tick();
            return;
        }

        let Some(request) = self.request else {
            trace!(?id, "Ignoring stale timer");
            return;
        };
        if request.timeout_timer == id {
            warn!(
                media_id = %self.media_id,
                index = request.index,
                state = %self.pipeline_state(),
                "Quality request timed out"
            );
            self.abort_candidate(AbortReason::Timeout);
        } else if request.sync_timer == Some(id) {
            self.poll_alignment();
        } else {
            trace!(?id, "Ignoring stale timer");
        }
    }

    fn on_candidate_event(&mut self, event: SurfaceEvent) {
        let Some(request) = self.request else {
            return;
        };
        let state = self.pipeline_state();
        trace!(index = request.index, %state, ?event, "Candidate event");

        if let SurfaceEvent::Error(message) = &event {
            warn!(index = request.index, %message, "Candidate surface error");
            self.abort_candidate(AbortReason::SurfaceError);
            return;
        }

        match (state, event) {
            (
                PipelineState::Priming,
                SurfaceEvent::LoadedData | SurfaceEvent::CanPlay | SurfaceEvent::CanPlayThrough,
            ) => self.on_primed(),
            (PipelineState::Priming, SurfaceEvent::Playing) => {
                if self.current_index.is_some() && self.capabilities.autoplay_without_gesture {
                    self.enter_pre_seek_wait();
                }
            }
            (
                PipelineState::PreSeekWait,
                SurfaceEvent::Pause
                | SurfaceEvent::LoadedData
                | SurfaceEvent::CanPlay
                | SurfaceEvent::CanPlayThrough,
            ) => self.try_begin_seek(),
            (PipelineState::Seeking { seeked: false }, SurfaceEvent::Seeked) => {
                if self.candidate_ready_state() >= ReadyState::HaveEnoughData {
                    self.enter_sync_wait();
                } else {
                    debug!(index = request.index, "Seeked, waiting for data");
                    self.set_candidate_state(PipelineState::Seeking { seeked: true });
                }
            }
            (
                PipelineState::Seeking { seeked: true },
                SurfaceEvent::CanPlay | SurfaceEvent::CanPlayThrough,
            ) => {
                if self.candidate_ready_state() >= ReadyState::HaveEnoughData {
                    self.enter_sync_wait();
                }
            }
            _ => {}
        }
    }

    fn on_live_event(&mut self, event: SurfaceEvent) {
        let position = self.position().unwrap_or(0.0);
        self.emit(EngineEvent::MediaEvent {
            media_id: self.media_id,
            kind: event.kind(),
            position,
            timestamp: time::now(),
        });

        match event {
            SurfaceEvent::Seeked => {
                self.reset_stall_tracking();
                // Both targets were taken from the old live position
                let restart = self.request.is_some()
                    && matches!(
                        self.pipeline_state(),
                        PipelineState::Seeking { .. } | PipelineState::SyncWait
                    );
                if restart {
                    info!(position, "Live surface seeked during synchronization");
                    self.restart_request();
                }
            }
            SurfaceEvent::Ended if !self.local.looping => {
                debug!(position, "Playback ended");
                self.playing = false;
            }
            SurfaceEvent::Error(message) => {
                warn!(media_id = %self.media_id, %message, "Committed surface error");
            }
            _ => {}
        }
    }

    /// Candidate has usable data
    fn on_primed(&mut self) {
        if self.current_index.is_none() {
            // Nothing to synchronize against
            self.commit(None);
            return;
        }

        if !self.capabilities.autoplay_without_gesture {
            self.begin_seek();
            return;
        }

        let playing = self
            .request
            .and_then(|r| self.pool.surface(r.index))
            .is_some_and(|s| !s.is_paused());
        if playing {
            self.enter_pre_seek_wait();
        }
    }

    /// Pause the autoplaying candidate and wait until it is settled
    fn enter_pre_seek_wait(&mut self) {
        let Some(request) = self.request else {
            return;
        };
        if let Some(surface) = self.pool.surface_mut(request.index) {
            surface.pause();
        }
        self.set_candidate_state(PipelineState::PreSeekWait);
        debug!(index = request.index, "Candidate primed, pausing before seek");
        self.try_begin_seek();
    }

    fn try_begin_seek(&mut self) {
        let Some(surface) = self.request.and_then(|r| self.pool.surface(r.index)) else {
            return;
        };
        if surface.is_paused() && surface.ready_state() >= ReadyState::HaveFutureData {
            self.begin_seek();
        }
    }

    /// Seek the candidate ahead of the live playhead
    ///
    /// Non-forced requests target `live + sync_window` while the live surface
    /// is playing, giving the candidate time to buffer before the playhead
    /// arrives. Forced requests target the live position itself.
    fn begin_seek(&mut self) {
        let Some(request) = self.request else {
            return;
        };
        let (live_time, live_playing) = match self.current_surface() {
            Some(live) => (live.current_time(), self.playing && !live.is_paused()),
            None => (0.0, false),
        };

        let mut target = live_time;
        if live_playing && !request.force {
            target += self.config.sync_window_secs;
        }

        let Some(surface) = self.pool.surface_mut(request.index) else {
            return;
        };
        if let Some(duration) = surface.duration() {
            target = target.min(duration);
        }
        surface.seek(target);
        self.set_candidate_state(PipelineState::Seeking { seeked: false });

        debug!(
            index = request.index,
            live_time,
            target,
            forced = request.force,
            "Seeking candidate"
        );
    }

    /// Candidate has buffered at its seek target
    fn enter_sync_wait(&mut self) {
        let Some(request) = self.request else {
            return;
        };
        self.set_candidate_state(PipelineState::SyncWait);

        if request.force {
            self.commit(None);
            return;
        }

        if self.try_commit_aligned() {
            return;
        }

        let id = self
            .timers
            .schedule_interval(self.config.sync_poll_interval());
        if let Some(req) = self.request.as_mut() {
            req.sync_timer = Some(id);
        }
        debug!(index = request.index, "Waiting for live playhead");
    }

    fn candidate_ready_state(&self) -> ReadyState {
        self.request
            .and_then(|r| self.pool.surface(r.index))
            .map(|s| s.ready_state())
            .unwrap_or(ReadyState::HaveNothing)
    }

    fn set_candidate_state(&mut self, state: PipelineState) {
        if let Some(slot) = self.request.and_then(|r| self.pool.get_mut(r.index)) {
            slot.state = state;
        }
    }
}
