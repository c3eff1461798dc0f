//! Playback surface abstraction
//!
//! A playback surface is the external primitive that decodes and presents one
//! rendition (a video element, a native player instance, a simulated surface).
//! The engine never decodes anything itself; it only creates, drives and
//! destroys surfaces and reacts to their lifecycle events.
//!
//! Surfaces cannot call back into the engine directly. Whoever owns the
//! surface's event source delivers events through
//! [`Engine::handle_surface_event`](crate::Engine::handle_surface_event),
//! tagged with the [`SurfaceId`] the surface was created with.

use crate::error::Result;
use crate::playback::ranges::TimeRanges;
use panomp_common::events::MediaEventKind;
use panomp_common::QualityDescriptor;

/// Identity of one surface instance
///
/// `generation` is unique per engine and never reused, so a surface recreated
/// at the same ladder index is distinguishable from its predecessor. Events
/// carrying an old generation are stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId {
    pub index: usize,
    pub generation: u64,
}

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "q{}#{}", self.index, self.generation)
    }
}

/// How much media a surface can present without waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Surface lifecycle events
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    LoadStart,
    LoadedMetadata,
    LoadedData,
    CanPlay,
    CanPlayThrough,
    Playing,
    Pause,
    Seeking,
    Seeked,
    Ended,
    Error(String),
    Stalled,
    RateChange,
    VolumeChange,
}

impl SurfaceEvent {
    /// Kind reported to the host for pass-through
    pub fn kind(&self) -> MediaEventKind {
        match self {
            SurfaceEvent::LoadStart => MediaEventKind::LoadStart,
            SurfaceEvent::LoadedMetadata => MediaEventKind::LoadedMetadata,
            SurfaceEvent::LoadedData => MediaEventKind::LoadedData,
            SurfaceEvent::CanPlay => MediaEventKind::CanPlay,
            SurfaceEvent::CanPlayThrough => MediaEventKind::CanPlayThrough,
            SurfaceEvent::Playing => MediaEventKind::Playing,
            SurfaceEvent::Pause => MediaEventKind::Pause,
            SurfaceEvent::Seeking => MediaEventKind::Seeking,
            SurfaceEvent::Seeked => MediaEventKind::Seeked,
            SurfaceEvent::Ended => MediaEventKind::Ended,
            SurfaceEvent::Error(_) => MediaEventKind::Error,
            SurfaceEvent::Stalled => MediaEventKind::Stalled,
            SurfaceEvent::RateChange => MediaEventKind::RateChange,
            SurfaceEvent::VolumeChange => MediaEventKind::VolumeChange,
        }
    }
}

/// One decode/present instance bound to a rendition
pub trait PlaybackSurface {
    /// Attach to the rendition's source and start loading
    fn load(&mut self, quality: &QualityDescriptor);

    fn play(&mut self);

    fn pause(&mut self);

    /// Seek to `time` seconds; completion is reported with `Seeked`
    fn seek(&mut self, time: f64);

    /// Playhead in seconds
    fn current_time(&self) -> f64;

    /// Media duration in seconds, if known
    fn duration(&self) -> Option<f64>;

    fn is_paused(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    fn volume(&self) -> f64;

    fn set_volume(&mut self, volume: f64);

    fn set_muted(&mut self, muted: bool);

    fn set_loop(&mut self, looping: bool);

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&mut self, rate: f64);

    fn buffered(&self) -> TimeRanges;

    fn played(&self) -> TimeRanges;

    /// Stop playback and release decode/network resources
    ///
    /// No events are delivered for the surface afterwards.
    fn stop(&mut self);
}

/// Creates surfaces on behalf of the engine
pub trait SurfaceFactory {
    type Surface: PlaybackSurface;

    /// Allocate a surface that will report its events under `id`
    fn create(&mut self, id: SurfaceId, quality: &QualityDescriptor) -> Result<Self::Surface>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_ordering() {
        assert!(ReadyState::HaveEnoughData > ReadyState::HaveFutureData);
        assert!(ReadyState::HaveFutureData > ReadyState::HaveCurrentData);
        assert!(ReadyState::HaveMetadata > ReadyState::HaveNothing);
    }

    #[test]
    fn test_surface_id_display() {
        let id = SurfaceId {
            index: 2,
            generation: 7,
        };
        assert_eq!(id.to_string(), "q2#7");
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(
            SurfaceEvent::Error("decode".into()).kind(),
            MediaEventKind::Error
        );
        assert_eq!(SurfaceEvent::Seeked.kind(), MediaEventKind::Seeked);
    }
}
