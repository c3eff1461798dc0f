//! Deterministic simulation harness
//!
//! Steps a [`SimWorld`] and an engine on [`ManualTimers`] in lock-step,
//! 10ms at a time. Each step advances the world, delivers the surface events
//! it produced, then fires every timer due by the end of the step.

use super::scenario::{HostAction, Scenario, ScheduledAction};
use super::world::{SimFactory, SimWorld};
use crate::error::Result;
use crate::playback::engine::Engine;
use crate::playback::timer::ManualTimers;
use crate::runtime::SurfaceEventSink;
use panomp_common::audio::AudioBus;
use panomp_common::events::{EngineEvent, EventBus};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Step length of the virtual clock
pub const STEP_MS: u64 = 10;

/// Event bus depth for simulations
const BUS_CAPACITY: usize = 4096;

/// Engine driven by a simulated world
pub type SimEngine = Engine<SimFactory, ManualTimers>;

/// Engine notification stamped with virtual time
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// Virtual seconds since the start of the run
    pub at: f64,
    pub event: EngineEvent,
}

/// Per-step observation of the engine and world
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub at: f64,
    pub current_index: Option<usize>,
    pub request_index: Option<usize>,
    pub position: Option<f64>,
    pub live_surfaces: usize,
    /// Slots mid-pipeline
    pub in_flight: usize,
}

/// Lock-step world + engine
pub struct Simulation {
    world: SimWorld,
    engine: SimEngine,
    audio: AudioBus,
    events: broadcast::Receiver<EngineEvent>,
    recorded: Vec<RecordedEvent>,
    samples: Vec<Sample>,
    pending_actions: Vec<ScheduledAction>,
}

impl Simulation {
    /// Build from a scenario; `load()` runs immediately if the scenario
    /// autoloads
    pub fn from_scenario(scenario: &Scenario) -> Result<Self> {
        let world = scenario.world();
        let bus = EventBus::new(BUS_CAPACITY);
        let events = bus.subscribe();
        let audio = AudioBus::default();

        let engine = Engine::new(
            scenario.ladder()?,
            scenario.engine.clone(),
            scenario.capabilities,
            world.factory(),
            ManualTimers::new(),
            bus,
            audio.subscribe(),
        )?;

        let mut sim = Self {
            world,
            engine,
            audio,
            events,
            recorded: Vec::new(),
            samples: Vec::new(),
            pending_actions: scenario.timeline(),
        };
        sim.collect_events();

        if scenario.autoload {
            sim.apply(&HostAction::Load);
        }
        Ok(sim)
    }

    pub fn engine(&self) -> &SimEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SimEngine {
        &mut self.engine
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    /// Global audio publisher; call [`Engine::refresh_audio`] after changing it
    pub fn audio(&self) -> &AudioBus {
        &self.audio
    }

    /// Virtual seconds elapsed
    pub fn now(&self) -> f64 {
        self.world.now()
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.recorded
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Apply a host action right now
    pub fn apply(&mut self, action: &HostAction) {
        debug!(t = self.now(), ?action, "Host action");
        let result = match action {
            HostAction::Load => self.engine.load(),
            HostAction::Play => {
                self.engine.play();
                Ok(())
            }
            HostAction::Pause => {
                self.engine.pause();
                Ok(())
            }
            HostAction::Seek { position } => {
                self.engine.seek(*position);
                Ok(())
            }
            HostAction::SetQuality { index } => self.engine.set_quality(*index),
            HostAction::SetQualityMode { mode } => {
                self.engine.set_quality_mode(*mode);
                Ok(())
            }
            HostAction::SetVolume { volume } => {
                self.engine.set_volume(*volume);
                Ok(())
            }
            HostAction::Stop => {
                self.engine.stop();
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(t = self.now(), ?action, error = %e, "Host action failed");
        }
        self.deliver_surface_events();
        self.collect_events();
    }

    /// Advance one step
    pub fn step(&mut self) {
        let until = self.world.now_ms() + STEP_MS;
        self.world.advance_to(until);
        self.deliver_surface_events();

        while let Some(id) = self.engine.timers_mut().pop_due(until) {
            self.engine.on_timer(id);
            self.deliver_surface_events();
        }
        self.engine.timers_mut().advance_to(until);

        let now = self.now();
        while self
            .pending_actions
            .first()
            .is_some_and(|a| a.at <= now + 1e-9)
        {
            let scheduled = self.pending_actions.remove(0);
            self.apply(&scheduled.action);
        }

        self.collect_events();
        self.sample();
    }

    /// Step until `secs` of virtual time have elapsed
    pub fn run_until(&mut self, secs: f64) {
        let target_ms = (secs * 1000.0).round() as u64;
        while self.world.now_ms() < target_ms {
            self.step();
        }
    }

    /// Step for `duration` of virtual time
    pub fn run_for(&mut self, duration: Duration) {
        let target = self.now() + duration.as_secs_f64();
        self.run_until(target);
    }

    /// Run a whole scenario and return what happened
    pub fn run_scenario(scenario: &Scenario) -> Result<Self> {
        let mut sim = Self::from_scenario(scenario)?;
        info!(name = %scenario.name, duration = scenario.duration_secs, "Running scenario");
        // Actions scheduled at t=0 run before the first step
        while sim.pending_actions.first().is_some_and(|a| a.at <= 0.0) {
            let scheduled = sim.pending_actions.remove(0);
            sim.apply(&scheduled.action);
        }
        sim.run_until(scenario.duration_secs);
        Ok(sim)
    }

    /// First recorded event matching `predicate`
    pub fn find_event<P>(&self, predicate: P) -> Option<&RecordedEvent>
    where
        P: Fn(&EngineEvent) -> bool,
    {
        self.recorded.iter().find(|r| predicate(&r.event))
    }

    fn deliver_surface_events(&mut self) {
        // Handling an event can queue more (e.g. pausing a candidate)
        loop {
            let events = self.world.drain_events();
            if events.is_empty() {
                break;
            }
            for (id, event) in events {
                self.engine.handle_surface_event(id, event);
            }
        }
    }

    fn collect_events(&mut self) {
        let at = self.now();
        loop {
            match self.events.try_recv() {
                Ok(event) => self.recorded.push(RecordedEvent { at, event }),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(skipped = n, "Simulation event recorder lagged");
                }
                Err(_) => break,
            }
        }
    }

    fn sample(&mut self) {
        let status = self.engine.status();
        let in_flight = self
            .engine
            .pool()
            .iter()
            .filter(|slot| slot.state().is_in_flight())
            .count();
        self.samples.push(Sample {
            at: self.now(),
            current_index: status.current_index,
            request_index: status.request_index,
            position: status.position,
            live_surfaces: status.live_surfaces,
            in_flight,
        });
    }
}

/// Step a shared world in real time and forward its events to a running
/// engine
///
/// Returns once the engine's input queue is gone.
pub async fn pump(world: SimWorld, sink: SurfaceEventSink, step: Duration) {
    let start = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(step);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        world.advance_to(start.elapsed().as_millis() as u64);
        for (id, event) in world.drain_events() {
            if !sink.send(id, event) {
                debug!("Engine input closed, stopping world pump");
                return;
            }
        }
        if sink.is_closed() {
            return;
        }
    }
}
