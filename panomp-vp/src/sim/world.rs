//! Simulated media world
//!
//! A virtual clock plus a set of simulated surfaces. Each surface models a
//! progressive download as one contiguous buffered range that starts where
//! the surface was loaded or last seeked outside its buffer, and derives its
//! ready state and lifecycle events from that range. Events are queued and
//! delivered by whoever steps the world, never re-entrantly.

use crate::error::{Error, Result};
use crate::playback::ranges::TimeRanges;
use crate::playback::surface::{PlaybackSurface, ReadyState, SurfaceEvent, SurfaceFactory, SurfaceId};
use panomp_common::QualityDescriptor;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// Buffered media ahead of the playhead for `HaveEnoughData`
const ENOUGH_AHEAD_SECS: f64 = 2.0;

/// Buffered media ahead of the playhead for `HaveFutureData`
const FUTURE_AHEAD_SECS: f64 = 0.5;

/// Network/decoder behaviour of one rendition
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenditionProfile {
    /// Seconds from `load()` until metadata is available
    pub load_latency: f64,

    /// Seconds of media downloaded per wall-clock second
    pub download_rate: f64,

    /// Seconds from `seek()` until `Seeked`
    pub seek_latency: f64,

    /// Surface errors this many seconds after `load()`
    pub fail_after: Option<f64>,

    /// The factory refuses to create surfaces for this rendition
    pub fail_create: bool,

    /// Wall-clock windows `[start, end)` during which playback and download
    /// freeze
    pub stalls: Vec<(f64, f64)>,
}

impl Default for RenditionProfile {
    fn default() -> Self {
        Self {
            load_latency: 0.1,
            download_rate: 4.0,
            seek_latency: 0.05,
            fail_after: None,
            fail_create: false,
            stalls: Vec::new(),
        }
    }
}

impl RenditionProfile {
    fn stalled_at(&self, now: f64) -> bool {
        self.stalls.iter().any(|&(start, end)| now >= start && now < end)
    }
}

/// Observable state of one simulated surface
#[derive(Debug, Clone)]
pub struct SimSurfaceState {
    pub index: usize,
    pub loaded_at: Option<f64>,
    pub has_metadata: bool,
    pub failed: bool,
    pub buffered_start: f64,
    pub buffered_end: f64,
    pub position: f64,
    pub paused: bool,
    /// Playing was reported since the last play() or rebuffer
    pub playing_reported: bool,
    pub loaded_data_reported: bool,
    pub ready: ReadyState,
    /// Pending seek target and completion time
    pub seeking: Option<(f64, f64)>,
    pub volume: f64,
    pub muted: bool,
    pub looping: bool,
    pub rate: f64,
    pub stall_reported: bool,
    pub played: TimeRanges,
}

impl SimSurfaceState {
    fn new(index: usize) -> Self {
        Self {
            index,
            loaded_at: None,
            has_metadata: false,
            failed: false,
            buffered_start: 0.0,
            buffered_end: 0.0,
            position: 0.0,
            paused: true,
            playing_reported: false,
            loaded_data_reported: false,
            ready: ReadyState::HaveNothing,
            seeking: None,
            volume: 1.0,
            muted: false,
            looping: false,
            rate: 1.0,
            stall_reported: false,
            played: TimeRanges::new(),
        }
    }

    fn buffered_ahead(&self) -> f64 {
        if self.position >= self.buffered_start && self.position <= self.buffered_end {
            self.buffered_end - self.position
        } else {
            0.0
        }
    }

    fn compute_ready(&self, duration: f64) -> ReadyState {
        if !self.has_metadata || self.failed {
            return ReadyState::HaveNothing;
        }
        if self.seeking.is_some() {
            return ReadyState::HaveMetadata;
        }
        let ahead = self.buffered_ahead();
        let in_range = self.position >= self.buffered_start && self.position <= self.buffered_end;
        let at_end = in_range && self.buffered_end >= duration;
        if ahead >= ENOUGH_AHEAD_SECS || at_end {
            ReadyState::HaveEnoughData
        } else if ahead >= FUTURE_AHEAD_SECS {
            ReadyState::HaveFutureData
        } else if ahead > 0.0 {
            ReadyState::HaveCurrentData
        } else {
            ReadyState::HaveMetadata
        }
    }
}

#[derive(Debug)]
struct WorldState {
    now_ms: u64,
    media_duration: f64,
    profiles: Vec<RenditionProfile>,
    surfaces: BTreeMap<SurfaceId, SimSurfaceState>,
    events: Vec<(SurfaceId, SurfaceEvent)>,
    created: u64,
    max_live: usize,
}

impl WorldState {
    fn now(&self) -> f64 {
        self.now_ms as f64 / 1000.0
    }

    fn profile(&self, index: usize) -> RenditionProfile {
        self.profiles.get(index).cloned().unwrap_or_default()
    }

    fn push(&mut self, id: SurfaceId, event: SurfaceEvent) {
        trace!(surface = %id, ?event, t = self.now(), "Sim event");
        self.events.push((id, event));
    }

    /// Advance one surface by `dt` seconds ending at `now`
    fn step_surface(&mut self, id: SurfaceId, dt: f64, now: f64) {
        let duration = self.media_duration;
        let profile = self.profile(id.index);
        let mut out = Vec::new();

        let Some(s) = self.surfaces.get_mut(&id) else {
            return;
        };
        let Some(loaded_at) = s.loaded_at else {
            return;
        };
        if s.failed {
            return;
        }

        if let Some(fail_after) = profile.fail_after {
            if now >= loaded_at + fail_after {
                s.failed = true;
                s.ready = ReadyState::HaveNothing;
                out.push(SurfaceEvent::Error("simulated network failure".to_string()));
                self.events.extend(out.into_iter().map(|e| (id, e)));
                return;
            }
        }

        if !s.has_metadata && now >= loaded_at + profile.load_latency {
            s.has_metadata = true;
            s.ready = ReadyState::HaveMetadata;
            out.push(SurfaceEvent::LoadedMetadata);
        }

        let stalled = profile.stalled_at(now);
        if stalled && !s.paused && !s.stall_reported {
            s.stall_reported = true;
            out.push(SurfaceEvent::Stalled);
        }
        if !stalled {
            s.stall_reported = false;
        }

        if s.has_metadata && !stalled {
            s.buffered_end = (s.buffered_end + profile.download_rate * dt).min(duration);
        }

        if let Some((_, complete_at)) = s.seeking {
            if now >= complete_at {
                s.seeking = None;
                out.push(SurfaceEvent::Seeked);
            }
        }

        let advancing = !s.paused
            && s.playing_reported
            && s.seeking.is_none()
            && !stalled
            && s.ready >= ReadyState::HaveFutureData;
        if advancing {
            let from = s.position;
            let limit = s.buffered_end.min(duration);
            s.position = (s.position + dt * s.rate).min(limit);
            s.played.add(from, s.position);

            if s.position >= duration {
                if s.looping {
                    s.position = 0.0;
                    if s.buffered_start > 0.0 {
                        s.buffered_start = 0.0;
                        s.buffered_end = 0.0;
                    }
                } else {
                    s.paused = true;
                    s.playing_reported = false;
                    out.push(SurfaceEvent::Pause);
                    out.push(SurfaceEvent::Ended);
                }
            }
        }

        let previous = s.ready;
        let ready = s.compute_ready(duration);
        s.ready = ready;

        if ready >= ReadyState::HaveCurrentData && !s.loaded_data_reported {
            s.loaded_data_reported = true;
            out.push(SurfaceEvent::LoadedData);
        }
        if previous < ReadyState::HaveFutureData && ready >= ReadyState::HaveFutureData {
            out.push(SurfaceEvent::CanPlay);
        }
        if previous < ReadyState::HaveEnoughData && ready >= ReadyState::HaveEnoughData {
            out.push(SurfaceEvent::CanPlayThrough);
        }

        if !s.paused {
            if ready >= ReadyState::HaveFutureData && !s.playing_reported {
                s.playing_reported = true;
                out.push(SurfaceEvent::Playing);
            } else if ready < ReadyState::HaveFutureData && s.playing_reported && s.seeking.is_none() {
                // Rebuffering
                s.playing_reported = false;
            }
        }

        self.events.extend(out.into_iter().map(|e| (id, e)));
    }
}

/// Shared handle to the simulated world
#[derive(Debug, Clone)]
pub struct SimWorld {
    inner: Arc<Mutex<WorldState>>,
}

impl SimWorld {
    /// World playing media of `media_duration` seconds with one profile per
    /// ladder index (missing entries use the default profile)
    pub fn new(media_duration: f64, profiles: Vec<RenditionProfile>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WorldState {
                now_ms: 0,
                media_duration,
                profiles,
                surfaces: BTreeMap::new(),
                events: Vec::new(),
                created: 0,
                max_live: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Factory creating surfaces in this world
    pub fn factory(&self) -> SimFactory {
        SimFactory {
            world: self.clone(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.lock().now_ms
    }

    pub fn now(&self) -> f64 {
        self.lock().now()
    }

    /// Move the clock to `ms`, stepping every live surface
    pub fn advance_to(&self, ms: u64) {
        let mut world = self.lock();
        if ms <= world.now_ms {
            return;
        }
        let dt = (ms - world.now_ms) as f64 / 1000.0;
        world.now_ms = ms;
        let now = world.now();
        let ids: Vec<SurfaceId> = world.surfaces.keys().copied().collect();
        for id in ids {
            world.step_surface(id, dt, now);
        }
    }

    /// Take every queued event in emission order
    pub fn drain_events(&self) -> Vec<(SurfaceId, SurfaceEvent)> {
        std::mem::take(&mut self.lock().events)
    }

    /// Snapshot of a live surface
    pub fn surface_state(&self, id: SurfaceId) -> Option<SimSurfaceState> {
        self.lock().surfaces.get(&id).cloned()
    }

    /// Ids of live surfaces
    pub fn live_surfaces(&self) -> Vec<SurfaceId> {
        self.lock().surfaces.keys().copied().collect()
    }

    /// Surfaces created so far
    pub fn created_count(&self) -> u64 {
        self.lock().created
    }

    /// Most surfaces alive at the same time
    pub fn max_live(&self) -> usize {
        self.lock().max_live
    }

    fn with_surface<R>(&self, id: SurfaceId, f: impl FnOnce(&mut WorldState, SurfaceId) -> R) -> Option<R> {
        let mut world = self.lock();
        if !world.surfaces.contains_key(&id) {
            return None;
        }
        Some(f(&mut world, id))
    }

    fn read<R>(&self, id: SurfaceId, f: impl FnOnce(&SimSurfaceState) -> R) -> Option<R> {
        self.lock().surfaces.get(&id).map(f)
    }
}

/// [`SurfaceFactory`] for a [`SimWorld`]
#[derive(Debug, Clone)]
pub struct SimFactory {
    world: SimWorld,
}

impl SimFactory {
    pub fn world(&self) -> &SimWorld {
        &self.world
    }
}

impl SurfaceFactory for SimFactory {
    type Surface = SimSurface;

    fn create(&mut self, id: SurfaceId, _quality: &QualityDescriptor) -> Result<SimSurface> {
        let mut world = self.world.lock();
        if world.profile(id.index).fail_create {
            return Err(Error::SurfaceCreation {
                index: id.index,
                message: "simulated decoder unavailable".to_string(),
            });
        }
        world.surfaces.insert(id, SimSurfaceState::new(id.index));
        world.created += 1;
        world.max_live = world.max_live.max(world.surfaces.len());
        debug!(surface = %id, t = world.now(), "Sim surface created");
        Ok(SimSurface {
            id,
            world: self.world.clone(),
        })
    }
}

/// One simulated playback surface
#[derive(Debug)]
pub struct SimSurface {
    id: SurfaceId,
    world: SimWorld,
}

impl SimSurface {
    pub fn id(&self) -> SurfaceId {
        self.id
    }
}

impl PlaybackSurface for SimSurface {
    fn load(&mut self, _quality: &QualityDescriptor) {
        self.world.with_surface(self.id, |w, id| {
            let now = w.now();
            if let Some(s) = w.surfaces.get_mut(&id) {
                s.loaded_at = Some(now);
            }
            w.push(id, SurfaceEvent::LoadStart);
        });
    }

    fn play(&mut self) {
        self.world.with_surface(self.id, |w, id| {
            if let Some(s) = w.surfaces.get_mut(&id) {
                if s.paused {
                    s.paused = false;
                    s.playing_reported = false;
                }
            }
        });
    }

    fn pause(&mut self) {
        self.world.with_surface(self.id, |w, id| {
            let changed = match w.surfaces.get_mut(&id) {
                Some(s) if !s.paused => {
                    s.paused = true;
                    s.playing_reported = false;
                    true
                }
                _ => false,
            };
            if changed {
                w.push(id, SurfaceEvent::Pause);
            }
        });
    }

    fn seek(&mut self, time: f64) {
        self.world.with_surface(self.id, |w, id| {
            let now = w.now();
            let duration = w.media_duration;
            let latency = w.profile(id.index).seek_latency;
            if let Some(s) = w.surfaces.get_mut(&id) {
                let target = time.clamp(0.0, duration);
                if target < s.buffered_start || target > s.buffered_end {
                    s.buffered_start = target;
                    s.buffered_end = target;
                }
                s.position = target;
                s.seeking = Some((target, now + latency));
                s.ready = s.ready.min(ReadyState::HaveMetadata);
            }
            w.push(id, SurfaceEvent::Seeking);
        });
    }

    fn current_time(&self) -> f64 {
        self.world.read(self.id, |s| s.position).unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        let world = self.world.lock();
        world
            .surfaces
            .get(&self.id)
            .filter(|s| s.has_metadata)
            .map(|_| world.media_duration)
    }

    fn is_paused(&self) -> bool {
        self.world.read(self.id, |s| s.paused).unwrap_or(true)
    }

    fn ready_state(&self) -> ReadyState {
        self.world
            .read(self.id, |s| s.ready)
            .unwrap_or(ReadyState::HaveNothing)
    }

    fn volume(&self) -> f64 {
        self.world.read(self.id, |s| s.volume).unwrap_or(0.0)
    }

    fn set_volume(&mut self, volume: f64) {
        self.world.with_surface(self.id, |w, id| {
            if let Some(s) = w.surfaces.get_mut(&id) {
                s.volume = volume;
            }
        });
    }

    fn set_muted(&mut self, muted: bool) {
        self.world.with_surface(self.id, |w, id| {
            if let Some(s) = w.surfaces.get_mut(&id) {
                s.muted = muted;
            }
        });
    }

    fn set_loop(&mut self, looping: bool) {
        self.world.with_surface(self.id, |w, id| {
            if let Some(s) = w.surfaces.get_mut(&id) {
                s.looping = looping;
            }
        });
    }

    fn playback_rate(&self) -> f64 {
        self.world.read(self.id, |s| s.rate).unwrap_or(1.0)
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.world.with_surface(self.id, |w, id| {
            if let Some(s) = w.surfaces.get_mut(&id) {
                s.rate = rate;
            }
            w.push(id, SurfaceEvent::RateChange);
        });
    }

    fn buffered(&self) -> TimeRanges {
        self.world
            .read(self.id, |s| TimeRanges::from_ranges([(s.buffered_start, s.buffered_end)]))
            .unwrap_or_default()
    }

    fn played(&self) -> TimeRanges {
        self.world.read(self.id, |s| s.played.clone()).unwrap_or_default()
    }

    fn stop(&mut self) {
        let mut world = self.world.lock();
        world.surfaces.remove(&self.id);
        let id = self.id;
        world.events.retain(|(event_id, _)| *event_id != id);
        debug!(surface = %id, t = world.now(), "Sim surface stopped");
    }
}
