//! Test helpers for panomp-vp integration tests
//!
//! - `mock_surface`: scripted surfaces whose state the test controls
//! - [`Harness`]: an engine on mock surfaces and manual timers

#![allow(dead_code)]

pub mod mock_surface;

pub use mock_surface::{Call, MockFactory, MockHandle, Mocks};

use panomp_common::audio::AudioBus;
use panomp_common::events::{EngineEvent, EventBus};
use panomp_vp::playback::timer::ManualTimers;
use panomp_vp::{Capabilities, Engine, EngineConfig, QualityLadder, ReadyState, SurfaceEvent};
use tokio::sync::broadcast;

pub type TestEngine = Engine<MockFactory, ManualTimers>;

pub fn ladder(count: usize) -> QualityLadder {
    QualityLadder::from_urls((0..count).map(|i| format!("https://cdn.test/clip/{i}.mp4"))).unwrap()
}

/// Engine on scripted surfaces with a recorded event stream
pub struct Harness {
    pub engine: TestEngine,
    pub mocks: Mocks,
    pub events: broadcast::Receiver<EngineEvent>,
    pub audio: AudioBus,
}

impl Harness {
    pub fn new(renditions: usize) -> Self {
        Self::with(renditions, EngineConfig::default(), Capabilities::default())
    }

    pub fn with(renditions: usize, config: EngineConfig, capabilities: Capabilities) -> Self {
        Self::with_mocks(renditions, config, capabilities, Mocks::default())
    }

    /// Build over pre-configured mocks (e.g. with failing indices)
    pub fn with_mocks(
        renditions: usize,
        config: EngineConfig,
        capabilities: Capabilities,
        mocks: Mocks,
    ) -> Self {
        let bus = EventBus::new(1024);
        let events = bus.subscribe();
        let audio = AudioBus::default();
        let engine = Engine::new(
            ladder(renditions),
            config,
            capabilities,
            mocks.factory(),
            ManualTimers::new(),
            bus,
            audio.subscribe(),
        )
        .unwrap();
        Self {
            engine,
            mocks,
            events,
            audio,
        }
    }

    /// Everything emitted since the last drain
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn deliver(&mut self, surface: &MockHandle, event: SurfaceEvent) {
        self.engine.handle_surface_event(surface.id, event);
    }

    /// Move the virtual clock forward, firing due timers
    pub fn advance(&mut self, ms: u64) {
        let until = self.engine.timers().now_ms() + ms;
        while let Some(id) = self.engine.timers_mut().pop_due(until) {
            self.engine.on_timer(id);
        }
        self.engine.timers_mut().advance_to(until);
    }

    /// Fire `n` decision loop ticks
    pub fn ticks(&mut self, n: u32) {
        let interval = self.engine.config().decision_interval_ms;
        for _ in 0..n {
            self.advance(interval);
        }
    }

    /// Load and commit the initial rendition, then start playing
    ///
    /// The returned surface is live, playing, at time 0 with 2s buffered.
    pub fn bring_up(&mut self) -> MockHandle {
        self.engine.load().unwrap();
        let index = self.engine.config().initial_quality;
        let live = self.mocks.latest(index);
        live.set_ready(ReadyState::HaveEnoughData);
        live.set_buffered(0.0, 2.0);
        self.deliver(&live, SurfaceEvent::LoadedData);
        self.engine.play();
        assert_eq!(self.engine.current_index(), Some(index));
        self.drain();
        live
    }

    /// Drive a freshly requested candidate to `SyncWait`
    ///
    /// Takes the autoplay path: the candidate is playing after the request,
    /// gets paused on `LoadedData`, seeks on `CanPlay` and finishes buffering
    /// after `Seeked`.
    pub fn drive_to_sync_wait(&mut self, index: usize) -> MockHandle {
        let candidate = self.mocks.latest(index);
        candidate.set_ready(ReadyState::HaveFutureData);
        self.deliver(&candidate, SurfaceEvent::LoadedData);
        self.deliver(&candidate, SurfaceEvent::CanPlay);
        candidate.set_ready(ReadyState::HaveEnoughData);
        self.deliver(&candidate, SurfaceEvent::Seeked);
        candidate
    }
}

pub fn count<P: Fn(&EngineEvent) -> bool>(events: &[EngineEvent], predicate: P) -> usize {
    events.iter().filter(|e| predicate(e)).count()
}
