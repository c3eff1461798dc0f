//! # Panoramic Media Player - Video Playback Library (panomp-vp)
//!
//! Multi-rendition adaptive playback engine for progressive video.
//!
//! **Purpose:** Run several playback surfaces at different quality levels,
//! speculatively load and time-align a candidate surface while another one
//! plays, and swap the visible surface without interrupting playback. A
//! periodic decision loop upgrades or downgrades quality from buffering health
//! and stall detection.
//!
//! **Architecture:** single-threaded, event-driven engine. Surfaces and timers
//! are external collaborators behind the [`PlaybackSurface`], [`SurfaceFactory`]
//! and [`TimerService`] traits; [`runtime`] drives an engine on tokio and
//! [`sim`] provides a deterministic virtual-time world for tests and the
//! `panomp-sim` binary.

pub mod config;
pub mod error;
pub mod playback;
pub mod runtime;
pub mod sim;

pub use config::{Capabilities, EngineConfig, MediaConfig, PlayerConfig, QualitySource};
pub use error::{Error, Result};
pub use playback::engine::{Engine, EngineStatus, PipelineState};
pub use playback::ladder::QualityLadder;
pub use playback::surface::{PlaybackSurface, ReadyState, SurfaceEvent, SurfaceFactory, SurfaceId};
pub use playback::timer::{TimerId, TimerService};
