//! Adaptive playback engine and its building blocks

pub mod engine;
pub mod ladder;
pub mod pool;
pub mod ranges;
pub mod surface;
pub mod timer;

pub use engine::Engine;
pub use ladder::QualityLadder;
pub use pool::{PlaybackSlot, SlotCounters, SlotPool};
pub use ranges::TimeRanges;
