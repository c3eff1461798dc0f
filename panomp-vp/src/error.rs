//! Error types for panomp-vp
//!
//! Configuration errors fail synchronously and leave engine state untouched.
//! Pipeline aborts are not errors; they are reported as `QualityAborted`
//! notifications.

use thiserror::Error;

/// Main error type for panomp-vp
#[derive(Error, Debug)]
pub enum Error {
    /// Quality ladder or engine configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Manual selection outside the ladder
    #[error("Quality index {index} out of bounds (ladder has {count} renditions)")]
    QualityOutOfBounds { index: usize, count: usize },

    /// Descriptor not part of the ladder
    #[error("Unknown quality: {0}")]
    UnknownQuality(String),

    /// Surface factory could not create a surface
    #[error("Failed to create surface for quality {index}: {message}")]
    SurfaceCreation { index: usize, message: String },

    /// Initial rendition could not be brought up
    #[error("Load failed for quality {index}: {message}")]
    LoadFailed { index: usize, message: String },

    /// Runtime engine task is gone
    #[error("Engine stopped")]
    EngineStopped,

    /// Shared panomp error
    #[error(transparent)]
    Common(#[from] panomp_common::Error),
}

/// Convenience Result type using panomp-vp Error
pub type Result<T> = std::result::Result<T, Error>;
