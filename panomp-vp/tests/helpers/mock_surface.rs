//! Scripted playback surfaces
//!
//! Tests own the surface state and deliver events by hand, so every pipeline
//! transition can be driven and observed one step at a time.

use panomp_common::QualityDescriptor;
use panomp_vp::playback::TimeRanges;
use panomp_vp::{Error, PlaybackSurface, ReadyState, Result, SurfaceFactory, SurfaceId};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Calls made on a surface, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load(String),
    Play,
    Pause,
    Seek(f64),
    SetVolume(f64),
    SetMuted(bool),
    SetLoop(bool),
    SetRate(f64),
    Stop,
}

#[derive(Debug)]
pub struct MockState {
    pub time: f64,
    pub duration: Option<f64>,
    pub paused: bool,
    pub ready: ReadyState,
    pub volume: f64,
    pub muted: bool,
    pub rate: f64,
    pub buffered: TimeRanges,
    pub stopped: bool,
    pub calls: Vec<Call>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            time: 0.0,
            duration: Some(120.0),
            paused: true,
            ready: ReadyState::HaveNothing,
            volume: 1.0,
            muted: false,
            rate: 1.0,
            buffered: TimeRanges::new(),
            stopped: false,
            calls: Vec::new(),
        }
    }
}

/// Test-side handle to one created surface
#[derive(Debug, Clone)]
pub struct MockHandle {
    pub id: SurfaceId,
    state: Rc<RefCell<MockState>>,
}

impl MockHandle {
    pub fn set_ready(&self, ready: ReadyState) {
        self.state.borrow_mut().ready = ready;
    }

    pub fn set_time(&self, time: f64) {
        self.state.borrow_mut().time = time;
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.borrow_mut().paused = paused;
    }

    pub fn set_buffered(&self, start: f64, end: f64) {
        self.state.borrow_mut().buffered = TimeRanges::from_ranges([(start, end)]);
    }

    pub fn time(&self) -> f64 {
        self.state.borrow().time
    }

    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state.borrow().stopped
    }

    pub fn volume(&self) -> f64 {
        self.state.borrow().volume
    }

    pub fn muted(&self) -> bool {
        self.state.borrow().muted
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn has_call(&self, call: &Call) -> bool {
        self.state.borrow().calls.contains(call)
    }

    /// Last seek target, if any
    pub fn last_seek(&self) -> Option<f64> {
        self.state.borrow().calls.iter().rev().find_map(|c| match c {
            Call::Seek(t) => Some(*t),
            _ => None,
        })
    }
}

#[derive(Debug, Default)]
struct Registry {
    created: Vec<MockHandle>,
    failing: HashSet<usize>,
}

/// Shared view of everything a [`MockFactory`] created
#[derive(Debug, Clone, Default)]
pub struct Mocks {
    registry: Rc<RefCell<Registry>>,
}

impl Mocks {
    pub fn factory(&self) -> MockFactory {
        MockFactory {
            registry: Rc::clone(&self.registry),
        }
    }

    /// Make creation fail for `index`
    pub fn fail_index(&self, index: usize) {
        self.registry.borrow_mut().failing.insert(index);
    }

    /// Most recently created surface for `index`
    pub fn latest(&self, index: usize) -> MockHandle {
        self.registry
            .borrow()
            .created
            .iter()
            .rev()
            .find(|h| h.id.index == index)
            .cloned()
            .unwrap_or_else(|| panic!("no surface created for index {index}"))
    }

    pub fn created_count(&self) -> usize {
        self.registry.borrow().created.len()
    }

    pub fn created_for(&self, index: usize) -> usize {
        self.registry
            .borrow()
            .created
            .iter()
            .filter(|h| h.id.index == index)
            .count()
    }

    /// Surfaces created and not yet stopped
    pub fn live(&self) -> Vec<MockHandle> {
        self.registry
            .borrow()
            .created
            .iter()
            .filter(|h| !h.is_stopped())
            .cloned()
            .collect()
    }
}

pub struct MockFactory {
    registry: Rc<RefCell<Registry>>,
}

impl SurfaceFactory for MockFactory {
    type Surface = MockSurface;

    fn create(&mut self, id: SurfaceId, _quality: &QualityDescriptor) -> Result<MockSurface> {
        let mut registry = self.registry.borrow_mut();
        if registry.failing.contains(&id.index) {
            return Err(Error::SurfaceCreation {
                index: id.index,
                message: "mock creation failure".to_string(),
            });
        }
        let state = Rc::new(RefCell::new(MockState::default()));
        registry.created.push(MockHandle {
            id,
            state: Rc::clone(&state),
        });
        Ok(MockSurface { state })
    }
}

pub struct MockSurface {
    state: Rc<RefCell<MockState>>,
}

impl MockSurface {
    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl PlaybackSurface for MockSurface {
    fn load(&mut self, quality: &QualityDescriptor) {
        self.record(Call::Load(quality.source_url.clone()));
    }

    fn play(&mut self) {
        self.state.borrow_mut().paused = false;
        self.record(Call::Play);
    }

    fn pause(&mut self) {
        self.state.borrow_mut().paused = true;
        self.record(Call::Pause);
    }

    fn seek(&mut self, time: f64) {
        self.state.borrow_mut().time = time;
        self.record(Call::Seek(time));
    }

    fn current_time(&self) -> f64 {
        self.state.borrow().time
    }

    fn duration(&self) -> Option<f64> {
        self.state.borrow().duration
    }

    fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    fn ready_state(&self) -> ReadyState {
        self.state.borrow().ready
    }

    fn volume(&self) -> f64 {
        self.state.borrow().volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.state.borrow_mut().volume = volume;
        self.record(Call::SetVolume(volume));
    }

    fn set_muted(&mut self, muted: bool) {
        self.state.borrow_mut().muted = muted;
        self.record(Call::SetMuted(muted));
    }

    fn set_loop(&mut self, looping: bool) {
        self.record(Call::SetLoop(looping));
    }

    fn playback_rate(&self) -> f64 {
        self.state.borrow().rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.state.borrow_mut().rate = rate;
        self.record(Call::SetRate(rate));
    }

    fn buffered(&self) -> TimeRanges {
        self.state.borrow().buffered.clone()
    }

    fn played(&self) -> TimeRanges {
        TimeRanges::new()
    }

    fn stop(&mut self) {
        self.state.borrow_mut().stopped = true;
        self.record(Call::Stop);
    }
}
