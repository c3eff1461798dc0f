//! # Panoramic Media Player Common Library
//!
//! Shared code for the panomp player crates including:
//! - Quality descriptors and quality mode
//! - Host notification types (EngineEvent enum) and the EventBus
//! - Engine-wide audio settings bus
//! - Configuration loading and config file resolution
//! - Timestamp helpers

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod quality;
pub mod time;

pub use error::{Error, Result};
pub use quality::{QualityDescriptor, QualityMode};
