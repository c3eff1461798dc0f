//! Scenario files
//!
//! A scenario describes a ladder, how each rendition behaves on the
//! simulated network, and a timeline of host actions. Scenarios are TOML:
//!
//! ```toml
//! name = "ladder_stall"
//! duration_secs = 14.0
//!
//! [[renditions]]
//! url = "480p.mp4"
//! download_rate = 4.0
//! stalls = [[10.0, 12.0]]
//!
//! [[actions]]
//! at = 0.0
//! action = "play"
//! ```

use super::world::{RenditionProfile, SimWorld};
use crate::config::{Capabilities, EngineConfig};
use crate::error::{Error, Result};
use crate::playback::ladder::QualityLadder;
use panomp_common::QualityMode;
use serde::Deserialize;
use std::path::Path;

/// One rung of the scenario ladder
#[derive(Debug, Clone, Deserialize)]
pub struct RenditionSpec {
    pub url: String,

    #[serde(flatten)]
    pub profile: RenditionProfile,
}

/// Host action fired at a point on the timeline
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HostAction {
    Load,
    Play,
    Pause,
    Seek { position: f64 },
    SetQuality { index: usize },
    SetQualityMode { mode: QualityMode },
    SetVolume { volume: f64 },
    Stop,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledAction {
    /// Seconds from the start of the run
    pub at: f64,

    #[serde(flatten)]
    pub action: HostAction,
}

fn default_duration() -> f64 {
    10.0
}

fn default_media_duration() -> f64 {
    120.0
}

fn default_true() -> bool {
    true
}

/// Complete simulation scenario
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,

    /// Simulated run length
    #[serde(default = "default_duration")]
    pub duration_secs: f64,

    /// Length of the simulated media
    #[serde(default = "default_media_duration")]
    pub media_duration_secs: f64,

    /// Call `load()` at t=0 before any scheduled action
    #[serde(default = "default_true")]
    pub autoload: bool,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub capabilities: Capabilities,

    pub renditions: Vec<RenditionSpec>,

    #[serde(default)]
    pub actions: Vec<ScheduledAction>,
}

impl Scenario {
    /// Parse and validate a TOML scenario
    pub fn from_toml(content: &str) -> Result<Self> {
        let scenario: Scenario = panomp_common::config::parse_toml(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let scenario: Scenario = panomp_common::config::load_toml(path)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        if self.renditions.is_empty() {
            return Err(Error::InvalidConfiguration(
                "scenario has no renditions".to_string(),
            ));
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "duration_secs must be positive, got {}",
                self.duration_secs
            )));
        }
        if !(self.media_duration_secs.is_finite() && self.media_duration_secs > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "media_duration_secs must be positive, got {}",
                self.media_duration_secs
            )));
        }
        self.engine.validate()
    }

    pub fn ladder(&self) -> Result<QualityLadder> {
        QualityLadder::from_urls(self.renditions.iter().map(|r| r.url.clone()))
    }

    /// Fresh world with this scenario's rendition profiles
    pub fn world(&self) -> SimWorld {
        SimWorld::new(
            self.media_duration_secs,
            self.renditions.iter().map(|r| r.profile.clone()).collect(),
        )
    }

    /// Actions sorted by time, stable for equal times
    pub fn timeline(&self) -> Vec<ScheduledAction> {
        let mut actions = self.actions.clone();
        actions.sort_by(|a, b| a.at.total_cmp(&b.at));
        actions
    }
}
