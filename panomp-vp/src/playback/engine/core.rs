//! Core engine - construction, host API and commit/abort
//!
//! **Responsibilities:**
//! - Engine struct definition and initialization
//! - Host controls (load, play, pause, seek, audio, quality selection, stop)
//! - Promotion of a synchronized candidate (commit) and candidate teardown
//!   (abort)
//! - Event emission and status snapshots

use super::{EngineStatus, PipelineState};
use crate::config::{Capabilities, EngineConfig};
use crate::error::{Error, Result};
use crate::playback::ladder::QualityLadder;
use crate::playback::pool::{PlaybackSlot, SlotPool};
use crate::playback::surface::{PlaybackSurface, SurfaceFactory, SurfaceId};
use crate::playback::timer::{TimerId, TimerService};
use panomp_common::audio::{EffectiveAudio, GlobalAudio};
use panomp_common::events::{AbortReason, EngineEvent, EventBus};
use panomp_common::time;
use panomp_common::{QualityDescriptor, QualityMode};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// The one in-flight quality request
#[derive(Debug, Clone, Copy)]
pub(super) struct ActiveRequest {
    pub(super) index: usize,
    pub(super) surface: SurfaceId,
    /// Skip the buffering head start and commit without synchronizing
    pub(super) force: bool,
    /// Issued by a manual selection
    pub(super) manual: bool,
    pub(super) timeout_timer: TimerId,
    pub(super) sync_timer: Option<TimerId>,
}

/// Engine-local surface settings, applied to the committed surface
#[derive(Debug, Clone, Copy)]
pub(super) struct LocalSettings {
    pub(super) volume: f64,
    pub(super) muted: bool,
    pub(super) looping: bool,
    pub(super) rate: f64,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
            looping: false,
            rate: 1.0,
        }
    }
}

/// Adaptive playback engine for one media item
///
/// Owns one slot per rendition. At most one slot is current (visible and
/// audible) and at most one is the candidate being brought into sync.
/// Drive it by forwarding surface events to [`Engine::handle_surface_event`]
/// and timer firings to [`Engine::on_timer`].
pub struct Engine<F: SurfaceFactory, T: TimerService> {
    pub(super) media_id: Uuid,
    pub(super) ladder: QualityLadder,
    pub(super) config: EngineConfig,
    pub(super) capabilities: Capabilities,
    pub(super) pool: SlotPool<F>,
    pub(super) timers: T,
    pub(super) bus: EventBus,
    pub(super) audio: watch::Receiver<GlobalAudio>,
    pub(super) local: LocalSettings,

    /// Committed rendition
    pub(super) current_index: Option<usize>,

    /// In-flight request, if any
    pub(super) request: Option<ActiveRequest>,

    /// Unset until the first commit
    pub(super) quality_mode: Option<QualityMode>,

    /// Host wants playback running
    pub(super) playing: bool,

    /// Auto-quality loop timer
    pub(super) decision_timer: Option<TimerId>,

    pub(super) shut_down: bool,
}

impl<F: SurfaceFactory, T: TimerService> Engine<F, T> {
    /// Create an engine over `ladder`
    ///
    /// Emits `QualitiesLoaded`. Nothing is loaded until [`Engine::load`].
    pub fn new(
        ladder: QualityLadder,
        config: EngineConfig,
        capabilities: Capabilities,
        factory: F,
        timers: T,
        bus: EventBus,
        audio: watch::Receiver<GlobalAudio>,
    ) -> Result<Self> {
        config.validate()?;
        if config.initial_quality >= ladder.count() {
            return Err(Error::InvalidConfiguration(format!(
                "initial_quality {} outside ladder of {} renditions",
                config.initial_quality,
                ladder.count()
            )));
        }

        let pool = SlotPool::new(factory, ladder.count());
        let engine = Self {
            media_id: Uuid::new_v4(),
            ladder,
            config,
            capabilities,
            pool,
            timers,
            bus,
            audio,
            local: LocalSettings::default(),
            current_index: None,
            request: None,
            quality_mode: None,
            playing: false,
            decision_timer: None,
            shut_down: false,
        };

        info!(
            media_id = %engine.media_id,
            renditions = engine.ladder.count(),
            "Adaptive playback engine created"
        );
        engine.emit(EngineEvent::QualitiesLoaded {
            media_id: engine.media_id,
            qualities: engine.ladder.to_vec(),
            timestamp: time::now(),
        });

        Ok(engine)
    }

    /// Request the configured initial rendition
    pub fn load(&mut self) -> Result<()> {
        let index = self.config.initial_quality;
        info!(media_id = %self.media_id, index, "Loading initial quality");
        self.request_quality(index, false)
    }

    // ========================================
    // Transport
    // ========================================

    /// Start playback on the committed surface
    ///
    /// Before the first commit this only records intent; the first surface
    /// starts playing as it commits.
    pub fn play(&mut self) {
        self.playing = true;
        self.reset_stall_tracking();
        if let Some(surface) = self.current_surface_mut() {
            surface.play();
        }
        if self.quality_mode == Some(QualityMode::Auto) && self.decision_timer.is_none() {
            self.start_decision_loop();
        }
        debug!(media_id = %self.media_id, "Play");
    }

    pub fn pause(&mut self) {
        self.playing = false;
        if let Some(surface) = self.current_surface_mut() {
            surface.pause();
        }
        debug!(media_id = %self.media_id, "Pause");
    }

    /// Seek the committed surface
    ///
    /// A candidate that has already seeked restarts once the live seek
    /// completes.
    pub fn seek(&mut self, time: f64) {
        let time = time.max(0.0);
        self.reset_stall_tracking();
        if let Some(surface) = self.current_surface_mut() {
            surface.seek(time);
        }
        debug!(media_id = %self.media_id, time, "Seek");
    }

    // ========================================
    // Audio and surface settings
    // ========================================

    pub fn set_volume(&mut self, volume: f64) {
        self.local.volume = volume.clamp(0.0, 1.0);
        self.refresh_audio();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.local.muted = muted;
        self.refresh_audio();
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.local.looping = looping;
        if let Some(surface) = self.current_surface_mut() {
            surface.set_loop(looping);
        }
    }

    /// Set the playback rate; ignored on platforms without rate support
    pub fn set_playback_rate(&mut self, rate: f64) {
        if !self.capabilities.playback_rate {
            debug!("Playback rate not supported, ignoring");
            return;
        }
        if !(rate.is_finite() && rate > 0.0) {
            warn!(rate, "Ignoring invalid playback rate");
            return;
        }
        self.local.rate = rate;
        if let Some(surface) = self.current_surface_mut() {
            surface.set_playback_rate(rate);
        }
    }

    /// Re-apply effective audio after the global audio state changed
    ///
    /// Candidates stay silent; only the committed surface is updated.
    pub fn refresh_audio(&mut self) {
        let audio = self.effective_audio();
        if let Some(surface) = self.current_surface_mut() {
            surface.set_volume(audio.volume);
            surface.set_muted(audio.muted);
        }
    }

    // ========================================
    // Quality selection
    // ========================================

    /// Start bringing the rendition at `index` into sync
    ///
    /// `force` commits as soon as the candidate has buffered at the live
    /// position, without the look-ahead or the alignment wait.
    pub fn request_quality(&mut self, index: usize, force: bool) -> Result<()> {
        self.start_request(index, force, false)
    }

    /// Manually select a rendition
    ///
    /// Switches to MANUAL mode. Out-of-range indices fail without touching
    /// engine state.
    pub fn set_quality(&mut self, index: usize) -> Result<()> {
        if self.shut_down {
            return Err(Error::EngineStopped);
        }
        self.ladder.check_index(index)?;
        self.set_quality_mode(QualityMode::Manual);
        self.start_request(index, false, true)
    }

    /// Manually select the rendition described by `descriptor`
    pub fn set_quality_by_descriptor(&mut self, descriptor: &QualityDescriptor) -> Result<()> {
        let index = self
            .ladder
            .index_of(descriptor)
            .ok_or_else(|| Error::UnknownQuality(descriptor.id.clone()))?;
        self.set_quality(index)
    }

    /// Switch between AUTO and MANUAL
    ///
    /// Setting the mode already in effect does nothing. AUTO starts the
    /// decision loop; MANUAL stops it.
    pub fn set_quality_mode(&mut self, mode: QualityMode) {
        if self.quality_mode == Some(mode) {
            return;
        }
        self.quality_mode = Some(mode);

        match mode {
            QualityMode::Auto => self.start_decision_loop(),
            QualityMode::Manual => self.stop_decision_loop(),
        }

        info!(media_id = %self.media_id, %mode, "Quality mode changed");
        self.emit(EngineEvent::QualityModeChanged {
            media_id: self.media_id,
            mode,
            timestamp: time::now(),
        });
    }

    // ========================================
    // Lifecycle
    // ========================================

    /// Abort any candidate, stop the decision loop and pause playback
    ///
    /// The committed surface stays alive; `play()` resumes.
    pub fn stop(&mut self) {
        self.abort_candidate(AbortReason::Stopped);
        self.stop_decision_loop();
        self.playing = false;
        if let Some(surface) = self.current_surface_mut() {
            surface.pause();
        }
        debug!(media_id = %self.media_id, "Engine stopped");
    }

    /// Tear down every surface and timer
    ///
    /// Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.stop();
        self.pool.destroy_all();
        if let Some(index) = self.current_index.take() {
            if let Some(slot) = self.pool.get_mut(index) {
                slot.state = PipelineState::Idle;
            }
        }
        self.shut_down = true;
        info!(media_id = %self.media_id, "Engine shut down");
    }

    // ========================================
    // Accessors
    // ========================================

    pub fn media_id(&self) -> Uuid {
        self.media_id
    }

    pub fn ladder(&self) -> &QualityLadder {
        &self.ladder
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Candidate index, if a request is in flight
    pub fn request_index(&self) -> Option<usize> {
        self.request.map(|r| r.index)
    }

    /// Stage of the in-flight request (`Idle` without one)
    pub fn pipeline_state(&self) -> PipelineState {
        self.request
            .and_then(|r| self.pool.get(r.index))
            .map(|slot| slot.state)
            .unwrap_or(PipelineState::Idle)
    }

    pub fn quality_mode(&self) -> Option<QualityMode> {
        self.quality_mode
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn slot(&self, index: usize) -> Option<&PlaybackSlot<F::Surface>> {
        self.pool.get(index)
    }

    pub fn pool(&self) -> &SlotPool<F> {
        &self.pool
    }

    /// Surface factory (e.g. to reach a simulated world)
    pub fn factory_mut(&mut self) -> &mut F {
        self.pool.factory_mut()
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Playhead of the committed surface
    pub fn position(&self) -> Option<f64> {
        self.current_surface().map(|s| s.current_time())
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            current_index: self.current_index,
            request_index: self.request_index(),
            pipeline_state: self.pipeline_state(),
            quality_mode: self.quality_mode,
            playing: self.playing,
            position: self.position(),
            live_surfaces: self.pool.live_count(),
        }
    }

    // ========================================
    // Internals shared by the pipeline and decision loop
    // ========================================

    pub(super) fn emit(&self, event: EngineEvent) {
        if let Err(err) = self.bus.emit(event) {
            trace!(event = ?err.0, "No subscribers for engine event");
        }
    }

    pub(super) fn effective_audio(&self) -> EffectiveAudio {
        self.audio
            .borrow()
            .effective(self.local.volume, self.local.muted)
    }

    pub(super) fn current_surface(&self) -> Option<&F::Surface> {
        self.current_index.and_then(|i| self.pool.surface(i))
    }

    pub(super) fn current_surface_mut(&mut self) -> Option<&mut F::Surface> {
        let index = self.current_index?;
        self.pool.surface_mut(index)
    }

    pub(super) fn current_surface_id(&self) -> Option<SurfaceId> {
        self.current_index
            .and_then(|i| self.pool.get(i))
            .and_then(|slot| slot.surface_id())
    }

    pub(super) fn reset_stall_tracking(&mut self) {
        if let Some(slot) = self.current_index.and_then(|i| self.pool.get_mut(i)) {
            slot.last_time_stamp = None;
            slot.counters.down_count = 0;
        }
    }

    pub(super) fn start_decision_loop(&mut self) {
        if self.decision_timer.is_some() || self.shut_down {
            return;
        }
        let id = self
            .timers
            .schedule_interval(self.config.decision_interval());
        self.decision_timer = Some(id);
        debug!(media_id = %self.media_id, "Decision loop started");
    }

    pub(super) fn stop_decision_loop(&mut self) {
        if let Some(id) = self.decision_timer.take() {
            self.timers.cancel(id);
            debug!(media_id = %self.media_id, "Decision loop stopped");
        }
    }

    fn cancel_request_timers(&mut self, request: &ActiveRequest) {
        self.timers.cancel(request.timeout_timer);
        if let Some(id) = request.sync_timer {
            self.timers.cancel(id);
        }
    }

    /// Promote the candidate to current
    ///
    /// The candidate starts playing (if the engine is playing) and takes
    /// over the engine's audio before the outgoing surface is destroyed.
    /// `drift` is the live-minus-candidate offset for synchronized commits.
    pub(super) fn commit(&mut self, drift: Option<f64>) {
        let Some(request) = self.request.take() else {
            return;
        };
        self.cancel_request_timers(&request);

        let audio = self.effective_audio();
        let playing = self.playing;
        let local = self.local;
        let apply_rate = self.capabilities.playback_rate;

        let Some(surface) = self.pool.surface_mut(request.index) else {
            warn!(index = request.index, "Candidate surface vanished before commit");
            return;
        };
        if playing {
            surface.play();
        }
        surface.set_volume(audio.volume);
        surface.set_muted(audio.muted);
        surface.set_loop(local.looping);
        if apply_rate {
            surface.set_playback_rate(local.rate);
        }
        let position = surface.current_time();

        let previous = self.current_index.replace(request.index);

        if let Some(slot) = self.pool.get_mut(request.index) {
            slot.state = PipelineState::Committed;
            slot.counters.current_count += 1;
            slot.counters.down_count = 0;
            slot.last_time_stamp = None;
            if request.manual {
                slot.counters.abort_count = 0;
                slot.counters.leave_count = 0;
            }
        }

        if let Some(old) = previous.filter(|&old| old != request.index) {
            if let Some(slot) = self.pool.get_mut(old) {
                slot.state = PipelineState::Idle;
            }
            self.pool.destroy_slot(old);
        }

        info!(
            media_id = %self.media_id,
            index = request.index,
            from = ?previous,
            position,
            drift = ?drift,
            forced = request.force,
            "Quality committed"
        );
        self.emit(EngineEvent::QualityCommitted {
            media_id: self.media_id,
            index: request.index,
            position,
            drift,
            timestamp: time::now(),
        });

        if self.quality_mode.is_none() {
            self.set_quality_mode(self.config.default_quality_mode);
        }
    }

    /// Tear down the candidate and count the abort against its rendition
    ///
    /// Without a committed surface a failed candidate also fails the load.
    pub(super) fn abort_candidate(&mut self, reason: AbortReason) {
        let Some(request) = self.request.take() else {
            return;
        };
        self.cancel_request_timers(&request);

        if let Some(slot) = self.pool.get_mut(request.index) {
            slot.state = PipelineState::Aborted;
            slot.counters.abort_count += 1;
        }
        self.pool.destroy_slot(request.index);

        match reason {
            AbortReason::SurfaceError | AbortReason::Timeout => warn!(
                media_id = %self.media_id,
                index = request.index,
                %reason,
                "Quality request aborted"
            ),
            AbortReason::Superseded | AbortReason::Stopped => info!(
                media_id = %self.media_id,
                index = request.index,
                %reason,
                "Quality request aborted"
            ),
        }
        self.emit(EngineEvent::QualityAborted {
            media_id: self.media_id,
            index: request.index,
            reason,
            timestamp: time::now(),
        });

        let load_failed = matches!(reason, AbortReason::SurfaceError | AbortReason::Timeout);
        if self.current_index.is_none() && load_failed {
            self.emit(EngineEvent::LoadFailed {
                media_id: self.media_id,
                index: request.index,
                message: format!("candidate aborted: {}", reason),
                timestamp: time::now(),
            });
        }
    }

    /// Drop the candidate without counting an abort and request it again
    pub(super) fn restart_request(&mut self) {
        let Some(request) = self.request.take() else {
            return;
        };
        self.cancel_request_timers(&request);
        if let Some(slot) = self.pool.get_mut(request.index) {
            slot.state = PipelineState::Idle;
        }
        self.pool.destroy_slot(request.index);

        info!(
            media_id = %self.media_id,
            index = request.index,
            "Restarting quality request"
        );
        if let Err(e) = self.start_request(request.index, request.force, request.manual) {
            warn!(index = request.index, error = %e, "Failed to restart quality request");
        }
    }

    /// Common request path for automatic and manual selections
    pub(super) fn start_request(&mut self, index: usize, force: bool, manual: bool) -> Result<()> {
        if self.shut_down {
            return Err(Error::EngineStopped);
        }
        self.ladder.check_index(index)?;

        if let Some(active) = self.request {
            if active.index == index {
                if force && !active.force {
                    debug!(index, "Escalating in-flight request to forced");
                    self.request = Some(ActiveRequest {
                        force: true,
                        ..active
                    });
                    self.restart_request();
                    return Ok(());
                }
                debug!(index, "Request already in flight");
                if manual {
                    if let Some(req) = self.request.as_mut() {
                        req.manual = true;
                    }
                }
                return Ok(());
            }
            self.abort_candidate(AbortReason::Superseded);
        }

        if self.current_index == Some(index) {
            debug!(index, "Requested quality already current");
            return Ok(());
        }

        let quality = self
            .ladder
            .get(index)
            .cloned()
            .ok_or(Error::QualityOutOfBounds {
                index,
                count: self.ladder.count(),
            })?;

        let surface_id = match self.pool.create_slot_surface(index, &quality) {
            Ok(id) => id,
            Err(e) => return Err(self.fail_creation(index, e)),
        };

        let has_current = self.current_index.is_some();
        let audio = self.effective_audio();
        let local = self.local;
        let autoplay = self.capabilities.autoplay_without_gesture;
        let apply_rate = self.capabilities.playback_rate;

        if let Some(slot) = self.pool.get_mut(index) {
            slot.state = PipelineState::Priming;
            slot.counters.request_count += 1;
        }
        if let Some(surface) = self.pool.surface_mut(index) {
            if has_current {
                surface.set_muted(true);
                surface.set_volume(0.0);
            } else {
                surface.set_volume(audio.volume);
                surface.set_muted(audio.muted);
            }
            surface.set_loop(local.looping);
            if apply_rate {
                surface.set_playback_rate(local.rate);
            }
            surface.load(&quality);
            if has_current && autoplay {
                surface.play();
            }
        }

        let timeout_timer = self.timers.schedule_once(self.config.request_timeout());

        self.request = Some(ActiveRequest {
            index,
            surface: surface_id,
            force,
            manual,
            timeout_timer,
            sync_timer: None,
        });

        info!(
            media_id = %self.media_id,
            index,
            surface = %surface_id,
            forced = force,
            "Quality requested"
        );
        self.emit(EngineEvent::QualityRequested {
            media_id: self.media_id,
            index,
            forced: force,
            timestamp: time::now(),
        });

        Ok(())
    }

    /// Account for a surface the factory could not create
    fn fail_creation(&mut self, index: usize, error: Error) -> Error {
        warn!(media_id = %self.media_id, index, error = %error, "Surface creation failed");
        if let Some(slot) = self.pool.get_mut(index) {
            slot.state = PipelineState::Aborted;
            slot.counters.abort_count += 1;
        }
        self.emit(EngineEvent::QualityAborted {
            media_id: self.media_id,
            index,
            reason: AbortReason::SurfaceError,
            timestamp: time::now(),
        });

        if self.current_index.is_some() {
            return error;
        }

        let message = error.to_string();
        self.emit(EngineEvent::LoadFailed {
            media_id: self.media_id,
            index,
            message: message.clone(),
            timestamp: time::now(),
        });
        Error::LoadFailed { index, message }
    }
}

impl<F: SurfaceFactory, T: TimerService> Drop for Engine<F, T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
