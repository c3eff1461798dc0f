//! Media lifecycle event kinds passed through to the host

use serde::{Deserialize, Serialize};

/// Standard media lifecycle event of the committed surface
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaEventKind {
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
    Error,
    Stalled,
    RateChange,
    VolumeChange,
}

impl std::fmt::Display for MediaEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaEventKind::LoadStart => "loadstart",
            MediaEventKind::LoadedMetadata => "loadedmetadata",
            MediaEventKind::LoadedData => "loadeddata",
            MediaEventKind::CanPlay => "canplay",
            MediaEventKind::CanPlayThrough => "canplaythrough",
            MediaEventKind::Playing => "playing",
            MediaEventKind::Pause => "pause",
            MediaEventKind::Seeking => "seeking",
            MediaEventKind::Seeked => "seeked",
            MediaEventKind::Ended => "ended",
            MediaEventKind::Error => "error",
            MediaEventKind::Stalled => "stalled",
            MediaEventKind::RateChange => "ratechange",
            MediaEventKind::VolumeChange => "volumechange",
        };
        write!(f, "{}", name)
    }
}
