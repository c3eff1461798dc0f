//! Engine-wide audio settings bus
//!
//! The host publishes global volume/enabled/mute state once; every engine reads
//! it to compute the effective audio of whichever surfaces it has live.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Global audio state shared by all engines of a host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalAudio {
    /// Master volume (0.0-1.0)
    pub volume: f64,
    /// Audio output allowed at all
    pub enabled: bool,
    /// Master mute
    pub muted: bool,
}

impl Default for GlobalAudio {
    fn default() -> Self {
        Self {
            volume: 1.0,
            enabled: true,
            muted: false,
        }
    }
}

/// Per-surface audio derived from local and global state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveAudio {
    pub volume: f64,
    pub muted: bool,
}

impl GlobalAudio {
    /// Combine an engine's local settings with the global state
    ///
    /// Volume is `local × global`. A globally disabled output forces volume 0
    /// and mutes the surface.
    pub fn effective(&self, local_volume: f64, local_muted: bool) -> EffectiveAudio {
        if !self.enabled {
            return EffectiveAudio {
                volume: 0.0,
                muted: true,
            };
        }
        EffectiveAudio {
            volume: (local_volume * self.volume).clamp(0.0, 1.0),
            muted: local_muted || self.muted,
        }
    }
}

/// Publisher side of the audio settings bus
#[derive(Debug)]
pub struct AudioBus {
    tx: watch::Sender<GlobalAudio>,
}

impl AudioBus {
    /// Create a bus holding `initial` state
    pub fn new(initial: GlobalAudio) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// New reader for an engine
    pub fn subscribe(&self) -> watch::Receiver<GlobalAudio> {
        self.tx.subscribe()
    }

    /// Current published state
    pub fn get(&self) -> GlobalAudio {
        *self.tx.borrow()
    }

    /// Set master volume (clamped to 0.0-1.0)
    pub fn set_volume(&self, volume: f64) {
        self.tx.send_modify(|a| a.volume = volume.clamp(0.0, 1.0));
    }

    /// Enable or disable audio output globally
    pub fn set_enabled(&self, enabled: bool) {
        self.tx.send_modify(|a| a.enabled = enabled);
    }

    /// Set master mute
    pub fn set_muted(&self, muted: bool) {
        self.tx.send_modify(|a| a.muted = muted);
    }
}

impl Default for AudioBus {
    fn default() -> Self {
        Self::new(GlobalAudio::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_volume_multiplies() {
        let global = GlobalAudio {
            volume: 0.5,
            enabled: true,
            muted: false,
        };
        let audio = global.effective(0.8, false);
        assert!((audio.volume - 0.4).abs() < 1e-9);
        assert!(!audio.muted);
    }

    #[test]
    fn test_disabled_forces_silence() {
        let global = GlobalAudio {
            volume: 1.0,
            enabled: false,
            muted: false,
        };
        let audio = global.effective(1.0, false);
        assert_eq!(audio.volume, 0.0);
        assert!(audio.muted);
    }

    #[test]
    fn test_mute_is_either_side() {
        let global = GlobalAudio {
            muted: true,
            ..GlobalAudio::default()
        };
        assert!(global.effective(1.0, false).muted);
        assert!(GlobalAudio::default().effective(1.0, true).muted);
    }

    #[test]
    fn test_bus_publishes_changes() {
        let bus = AudioBus::default();
        let mut rx = bus.subscribe();

        bus.set_volume(1.7);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().volume, 1.0);

        bus.set_enabled(false);
        assert!(!bus.get().enabled);
        assert!(!rx.borrow_and_update().enabled);
    }
}
