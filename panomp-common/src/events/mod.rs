//! Event types for the panomp event system
//!
//! Provides the host notification enum and the EventBus that carries it.

mod media_types;
mod quality_types;

pub use media_types::MediaEventKind;
pub use quality_types::AbortReason;

use crate::quality::{QualityDescriptor, QualityMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Notifications emitted by the adaptive playback engine
///
/// Every variant names the logical media item it belongs to so a host driving
/// several engines can share one bus. Events serialize with a `type` tag for
/// JSON transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Quality ladder built and engine ready to load
    QualitiesLoaded {
        media_id: Uuid,
        /// Renditions, lowest first
        qualities: Vec<QualityDescriptor>,
        timestamp: DateTime<Utc>,
    },

    /// A rendition switch was started
    QualityRequested {
        media_id: Uuid,
        /// Ladder index of the candidate
        index: usize,
        /// Forced requests skip the buffering head start and the sync wait
        forced: bool,
        timestamp: DateTime<Utc>,
    },

    /// The candidate was promoted to current
    QualityCommitted {
        media_id: Uuid,
        /// Ladder index now playing
        index: usize,
        /// Playhead of the new surface at the swap (seconds)
        position: f64,
        /// Live minus candidate offset at the swap, for synchronized commits only
        drift: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// The candidate was torn down before committing
    QualityAborted {
        media_id: Uuid,
        index: usize,
        reason: AbortReason,
        timestamp: DateTime<Utc>,
    },

    /// Quality mode switched between auto and manual
    QualityModeChanged {
        media_id: Uuid,
        mode: QualityMode,
        timestamp: DateTime<Utc>,
    },

    /// Lifecycle event of the committed surface
    ///
    /// Candidate surfaces never produce this event.
    MediaEvent {
        media_id: Uuid,
        kind: MediaEventKind,
        /// Playhead of the committed surface (seconds)
        position: f64,
        timestamp: DateTime<Utc>,
    },

    /// No surface could be brought up for the initial rendition
    LoadFailed {
        media_id: Uuid,
        index: usize,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Media item this event belongs to
    pub fn media_id(&self) -> Uuid {
        match self {
            EngineEvent::QualitiesLoaded { media_id, .. }
            | EngineEvent::QualityRequested { media_id, .. }
            | EngineEvent::QualityCommitted { media_id, .. }
            | EngineEvent::QualityAborted { media_id, .. }
            | EngineEvent::QualityModeChanged { media_id, .. }
            | EngineEvent::MediaEvent { media_id, .. }
            | EngineEvent::LoadFailed { media_id, .. } => *media_id,
        }
    }

    /// Event type name as used in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::QualitiesLoaded { .. } => "QualitiesLoaded",
            EngineEvent::QualityRequested { .. } => "QualityRequested",
            EngineEvent::QualityCommitted { .. } => "QualityCommitted",
            EngineEvent::QualityAborted { .. } => "QualityAborted",
            EngineEvent::QualityModeChanged { .. } => "QualityModeChanged",
            EngineEvent::MediaEvent { .. } => "MediaEvent",
            EngineEvent::LoadFailed { .. } => "LoadFailed",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for engine notifications
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// Publishing is synchronous, so the engine can emit from inside surface
/// callbacks without an async context.
///
/// # Examples
///
/// ```
/// use panomp_common::events::{EngineEvent, EventBus};
/// use panomp_common::QualityMode;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// let delivered = event_bus.emit(EngineEvent::QualityModeChanged {
///     media_id: uuid::Uuid::new_v4(),
///     mode: QualityMode::Manual,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(delivered.unwrap(), 1);
/// assert!(matches!(rx.try_recv(), Ok(EngineEvent::QualityModeChanged { .. })));
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(index: usize) -> EngineEvent {
        EngineEvent::QualityCommitted {
            media_id: Uuid::nil(),
            index,
            position: 12.5,
            drift: Some(0.01),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        let err = bus.emit(committed(1)).unwrap_err();
        assert!(matches!(err.0, EngineEvent::QualityCommitted { index: 1, .. }));
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        assert_eq!(bus.emit(committed(2)).unwrap(), 1);

        match rx.recv().await.unwrap() {
            EngineEvent::QualityCommitted { index, drift, .. } => {
                assert_eq!(index, 2);
                assert_eq!(drift, Some(0.01));
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(committed(1)).unwrap();
        assert_eq!(json["type"], "QualityCommitted");
        assert_eq!(json["index"], 1);

        let aborted = EngineEvent::QualityAborted {
            media_id: Uuid::nil(),
            index: 2,
            reason: AbortReason::Timeout,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&aborted).unwrap();
        assert_eq!(json["reason"], "timeout");

        let back: EngineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "QualityAborted");
    }

    #[test]
    fn test_media_id_accessor() {
        let id = Uuid::new_v4();
        let event = EngineEvent::MediaEvent {
            media_id: id,
            kind: MediaEventKind::Playing,
            position: 0.0,
            timestamp: Utc::now(),
        };
        assert_eq!(event.media_id(), id);
        assert_eq!(MediaEventKind::CanPlayThrough.to_string(), "canplaythrough");
    }
}
