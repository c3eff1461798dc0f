//! Playback surface pool
//!
//! One slot per ladder index. A slot owns at most one live surface plus the
//! per-rendition history the auto-quality loop consults (abort/leave counts).
//! History outlives surfaces: tearing down a surface keeps its slot's
//! counters.

use crate::error::{Error, Result};
use crate::playback::engine::PipelineState;
use crate::playback::ranges::TimeRanges;
use crate::playback::surface::{PlaybackSurface, SurfaceFactory, SurfaceId};
use panomp_common::QualityDescriptor;
use tracing::{debug, warn};

/// Per-rendition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounters {
    /// Requests that targeted this rendition
    pub request_count: u32,
    /// Times this rendition became current
    pub current_count: u32,
    /// Times a request for this rendition was aborted while it was the candidate
    pub abort_count: u32,
    /// Times this rendition was left by a stall-driven downgrade
    pub leave_count: u32,
    /// Consecutive stall ticks observed while current
    pub down_count: u32,
}

/// One pool entry
#[derive(Debug)]
pub struct PlaybackSlot<S> {
    index: usize,
    surface: Option<S>,
    surface_id: Option<SurfaceId>,
    pub(crate) state: PipelineState,
    pub(crate) counters: SlotCounters,
    /// Playhead seen at the previous decision tick (stall detection)
    pub(crate) last_time_stamp: Option<f64>,
}

impl<S: PlaybackSurface> PlaybackSlot<S> {
    fn new(index: usize) -> Self {
        Self {
            index,
            surface: None,
            surface_id: None,
            state: PipelineState::Idle,
            counters: SlotCounters::default(),
            last_time_stamp: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    /// Identity of the live surface, if any
    pub fn surface_id(&self) -> Option<SurfaceId> {
        self.surface_id
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn counters(&self) -> SlotCounters {
        self.counters
    }

    /// Buffered ranges of the live surface (empty without one)
    pub fn buffered(&self) -> TimeRanges {
        self.surface
            .as_ref()
            .map(|s| s.buffered())
            .unwrap_or_default()
    }

    /// Played ranges of the live surface (empty without one)
    pub fn played(&self) -> TimeRanges {
        self.surface.as_ref().map(|s| s.played()).unwrap_or_default()
    }
}

/// Owns every slot and the factory that fills them
pub struct SlotPool<F: SurfaceFactory> {
    factory: F,
    slots: Vec<PlaybackSlot<F::Surface>>,
    next_generation: u64,
}

impl<F: SurfaceFactory> SlotPool<F> {
    /// Pool with one empty slot per rendition
    pub fn new(factory: F, count: usize) -> Self {
        Self {
            factory,
            slots: (0..count).map(PlaybackSlot::new).collect(),
            next_generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlaybackSlot<F::Surface>> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PlaybackSlot<F::Surface>> {
        self.slots.get_mut(index)
    }

    pub fn surface(&self, index: usize) -> Option<&F::Surface> {
        self.slots.get(index).and_then(|s| s.surface.as_ref())
    }

    pub fn surface_mut(&mut self, index: usize) -> Option<&mut F::Surface> {
        self.slots.get_mut(index).and_then(|s| s.surface.as_mut())
    }

    /// Number of slots holding a live surface
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.surface.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaybackSlot<F::Surface>> {
        self.slots.iter()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    /// Allocate a new surface for the rendition at `index`
    ///
    /// Callers destroy any previous surface at the index first; one left
    /// behind is torn down here rather than leaked.
    pub fn create_slot_surface(
        &mut self,
        index: usize,
        quality: &QualityDescriptor,
    ) -> Result<SurfaceId> {
        let count = self.slots.len();
        if index >= count {
            return Err(Error::QualityOutOfBounds { index, count });
        }

        if self.slots[index].surface.is_some() {
            warn!(index, "Slot still held a surface at creation, destroying it");
            self.destroy_slot(index);
        }

        self.next_generation += 1;
        let id = SurfaceId {
            index,
            generation: self.next_generation,
        };

        let surface = self.factory.create(id, quality)?;
        let slot = &mut self.slots[index];
        slot.surface = Some(surface);
        slot.surface_id = Some(id);
        slot.last_time_stamp = None;
        slot.counters.down_count = 0;
        debug!(surface = %id, url = %quality.source_url, "Created playback surface");
        Ok(id)
    }

    /// Stop and release the surface at `index`
    ///
    /// Idempotent. The slot's counters are kept.
    pub fn destroy_slot(&mut self, index: usize) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if let Some(mut surface) = slot.surface.take() {
            surface.stop();
            debug!(
                surface = %slot.surface_id.map(|id| id.to_string()).unwrap_or_default(),
                "Destroyed playback surface"
            );
        }
        slot.surface_id = None;
        slot.last_time_stamp = None;
    }

    /// Tear down every live surface
    pub fn destroy_all(&mut self) {
        for index in 0..self.slots.len() {
            self.destroy_slot(index);
        }
    }
}
