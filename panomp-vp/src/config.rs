//! Configuration for the adaptive playback engine
//!
//! Every engine setting has a built-in default, so an empty `[engine]` table
//! (or no file at all) yields a working engine. Settings are read once when the
//! engine is constructed.

use crate::error::{Error, Result};
use panomp_common::config::LoggingConfig;
use panomp_common::{QualityDescriptor, QualityMode};
use serde::Deserialize;
use std::time::Duration;

/// Engine timing and policy settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Look-ahead a candidate is seeked beyond the live playhead (seconds)
    pub sync_window_secs: f64,

    /// Width of the alignment window `[candidate, candidate + ε)` (seconds)
    pub sync_tolerance_secs: f64,

    /// Alignment polling interval
    pub sync_poll_interval_ms: u64,

    /// A request not committed within this window is aborted
    pub request_timeout_ms: u64,

    /// Auto-quality decision loop period
    pub decision_interval_ms: u64,

    /// Consecutive non-advancing ticks that trigger a forced downgrade
    pub stall_ticks: u32,

    /// Mode adopted at the first commit
    pub default_quality_mode: QualityMode,

    /// Rendition requested by `load()`
    pub initial_quality: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_window_secs: 6.0,
            sync_tolerance_secs: 0.05,
            sync_poll_interval_ms: 10,
            request_timeout_ms: 20_000,
            decision_interval_ms: 500,
            stall_ticks: 3,
            default_quality_mode: QualityMode::Auto,
            initial_quality: 0,
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.sync_window_secs.is_finite() && self.sync_window_secs > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "sync_window_secs must be positive, got {}",
                self.sync_window_secs
            )));
        }
        if !(self.sync_tolerance_secs.is_finite() && self.sync_tolerance_secs > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "sync_tolerance_secs must be positive, got {}",
                self.sync_tolerance_secs
            )));
        }
        if self.sync_tolerance_secs >= self.sync_window_secs {
            return Err(Error::InvalidConfiguration(
                "sync_tolerance_secs must be smaller than sync_window_secs".to_string(),
            ));
        }
        if self.sync_poll_interval_ms == 0
            || self.request_timeout_ms == 0
            || self.decision_interval_ms == 0
        {
            return Err(Error::InvalidConfiguration(
                "timer intervals must be non-zero".to_string(),
            ));
        }
        if self.stall_ticks == 0 {
            return Err(Error::InvalidConfiguration(
                "stall_ticks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn decision_interval(&self) -> Duration {
        Duration::from_millis(self.decision_interval_ms)
    }
}

/// Quality configuration source
///
/// Either bare URLs (lowest quality first) or fully described renditions.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QualitySource {
    Descriptors { descriptors: Vec<QualityDescriptor> },
    Urls { urls: Vec<String> },
}

impl QualitySource {
    /// Expand into descriptors, lowest first
    pub fn into_descriptors(self) -> Vec<QualityDescriptor> {
        match self {
            QualitySource::Descriptors { descriptors } => descriptors,
            QualitySource::Urls { urls } => urls
                .into_iter()
                .enumerate()
                .map(|(i, url)| QualityDescriptor::from_url(i, url))
                .collect(),
        }
    }
}

impl Default for QualitySource {
    fn default() -> Self {
        QualitySource::Urls { urls: Vec::new() }
    }
}

/// Media item configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaConfig {
    #[serde(default)]
    pub qualities: QualitySource,
}

/// Device capability snapshot
///
/// Constructed by the host (from whatever probing it does) and handed to the
/// engine at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Playback may start without a user gesture
    ///
    /// Enables the play-then-pause priming of candidate surfaces.
    pub autoplay_without_gesture: bool,

    /// Surfaces honour playback rate changes
    pub playback_rate: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            autoplay_without_gesture: true,
            playback_rate: true,
        }
    }
}

/// Complete player configuration as read from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub capabilities: Capabilities,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PlayerConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PlayerConfig = panomp_common::config::parse_toml(content)?;
        config.engine.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sync_window_secs, 6.0);
        assert_eq!(config.sync_tolerance_secs, 0.05);
        assert_eq!(config.sync_poll_interval(), Duration::from_millis(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(20));
        assert_eq!(config.decision_interval(), Duration::from_millis(500));
        assert_eq!(config.stall_ticks, 3);
        assert_eq!(config.default_quality_mode, QualityMode::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = EngineConfig {
            stall_ticks: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfiguration(_))));

        let config = EngineConfig {
            sync_tolerance_secs: 7.0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            decision_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_player_config_from_urls() {
        let config = PlayerConfig::from_toml(
            r#"
            [engine]
            sync_window_secs = 4.0
            default_quality_mode = "manual"

            [media.qualities]
            urls = ["240p.mp4", "480p.mp4", "1080p.mp4"]
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.sync_window_secs, 4.0);
        assert_eq!(config.engine.request_timeout_ms, 20_000);
        assert_eq!(config.engine.default_quality_mode, QualityMode::Manual);

        let qualities = config.media.qualities.into_descriptors();
        assert_eq!(qualities.len(), 3);
        assert_eq!(qualities[2].id, "q2");
        assert_eq!(qualities[2].mime_type, "video/mp4");
        assert!(config.capabilities.autoplay_without_gesture);
    }

    #[test]
    fn test_player_config_from_descriptors() {
        let config = PlayerConfig::from_toml(
            r#"
            [capabilities]
            autoplay_without_gesture = false

            [[media.qualities.descriptors]]
            id = "sd"
            source_url = "sd.webm"
            mime_type = "video/webm"
            bitrate = 800000
            width = 854
            height = 480

            [[media.qualities.descriptors]]
            id = "hd"
            url = "hd.webm"
            "#,
        )
        .unwrap();

        assert!(!config.capabilities.autoplay_without_gesture);
        assert!(config.capabilities.playback_rate);
        let qualities = config.media.qualities.into_descriptors();
        assert_eq!(qualities[0].height, 480);
        assert_eq!(qualities[1].source_url, "hd.webm");
    }

    #[test]
    fn test_player_config_rejects_invalid_engine() {
        let result = PlayerConfig::from_toml("[engine]\nsync_window_secs = -1.0\n");
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }
}
