//! Tokio runtime driver
//!
//! Runs an [`Engine`] inside a single task. Surface events, timer firings,
//! host commands and global audio changes are serialized through that task,
//! so the engine itself stays single-threaded.
//!
//! ```text
//! surfaces ──SurfaceEventSink──┐
//! TokioTimers ─────────────────┼─► driver task ─► Engine ─► EventBus
//! EngineHandle ──commands──────┤
//! AudioBus ──watch─────────────┘
//! ```

use crate::config::{Capabilities, EngineConfig};
use crate::error::{Error, Result};
use crate::playback::engine::{Engine, EngineStatus};
use crate::playback::ladder::QualityLadder;
use crate::playback::surface::{SurfaceEvent, SurfaceFactory, SurfaceId};
use crate::playback::timer::{TimerId, TimerService};
use panomp_common::audio::GlobalAudio;
use panomp_common::events::{EngineEvent, EventBus};
use panomp_common::{QualityDescriptor, QualityMode};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Command channel depth
const COMMAND_CAPACITY: usize = 64;

/// Inputs that originate below the engine
#[derive(Debug)]
pub enum EngineInput {
    Surface(SurfaceId, SurfaceEvent),
    Timer(TimerId),
}

/// Where surface implementations deliver their events
#[derive(Debug, Clone)]
pub struct SurfaceEventSink {
    tx: mpsc::UnboundedSender<EngineInput>,
}

impl SurfaceEventSink {
    /// Queue an event; returns false once the driver is gone
    pub fn send(&self, id: SurfaceId, event: SurfaceEvent) -> bool {
        self.tx.send(EngineInput::Surface(id, event)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// [`TimerService`] backed by tokio tasks
///
/// Each armed timer is a task that posts [`EngineInput::Timer`] into the
/// driver's input queue. Cancelling aborts the task; a firing already queued
/// is dropped by the engine as stale.
#[derive(Debug)]
pub struct TokioTimers {
    tx: mpsc::UnboundedSender<EngineInput>,
    next_id: u64,
    tasks: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioTimers {
    pub fn new(tx: mpsc::UnboundedSender<EngineInput>) -> Self {
        Self {
            tx,
            next_id: 0,
            tasks: HashMap::new(),
        }
    }

    /// Timers still armed
    pub fn active(&self) -> usize {
        self.tasks.values().filter(|h| !h.is_finished()).count()
    }

    fn allocate(&mut self) -> TimerId {
        self.tasks.retain(|_, handle| !handle.is_finished());
        self.next_id += 1;
        TimerId(self.next_id)
    }
}

impl TimerService for TokioTimers {
    fn schedule_once(&mut self, delay: Duration) -> TimerId {
        let id = self.allocate();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(EngineInput::Timer(id));
        });
        self.tasks.insert(id, handle);
        id
    }

    fn schedule_interval(&mut self, period: Duration) -> TimerId {
        let id = self.allocate();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(EngineInput::Timer(id)).is_err() {
                    break;
                }
            }
        });
        self.tasks.insert(id, handle);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.tasks.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}

/// Host commands processed by the driver task
#[derive(Debug)]
pub enum EngineCommand {
    Load(oneshot::Sender<Result<()>>),
    Play,
    Pause,
    Seek(f64),
    SetQuality {
        index: usize,
        reply: oneshot::Sender<Result<()>>,
    },
    SetQualityByDescriptor {
        descriptor: QualityDescriptor,
        reply: oneshot::Sender<Result<()>>,
    },
    SetQualityMode(QualityMode),
    SetVolume(f64),
    SetMuted(bool),
    SetLoop(bool),
    SetPlaybackRate(f64),
    Status(oneshot::Sender<EngineStatus>),
    /// Abort any candidate and pause; the engine stays usable
    Stop,
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable control handle for a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    media_id: Uuid,
    commands: mpsc::Sender<EngineCommand>,
    bus: EventBus,
}

impl EngineHandle {
    pub fn media_id(&self) -> Uuid {
        self.media_id
    }

    /// Subscribe to engine notifications
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    pub async fn load(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Load(reply)).await?;
        rx.await.map_err(|_| Error::EngineStopped)?
    }

    pub async fn play(&self) -> Result<()> {
        self.send(EngineCommand::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(EngineCommand::Pause).await
    }

    pub async fn seek(&self, position: f64) -> Result<()> {
        self.send(EngineCommand::Seek(position)).await
    }

    /// Manually select a rendition
    pub async fn set_quality(&self, index: usize) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetQuality { index, reply }).await?;
        rx.await.map_err(|_| Error::EngineStopped)?
    }

    /// Manually select the rendition matching `descriptor`
    pub async fn set_quality_by_descriptor(&self, descriptor: QualityDescriptor) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetQualityByDescriptor { descriptor, reply })
            .await?;
        rx.await.map_err(|_| Error::EngineStopped)?
    }

    pub async fn set_quality_mode(&self, mode: QualityMode) -> Result<()> {
        self.send(EngineCommand::SetQualityMode(mode)).await
    }

    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        self.send(EngineCommand::SetVolume(volume)).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        self.send(EngineCommand::SetMuted(muted)).await
    }

    pub async fn set_loop(&self, looping: bool) -> Result<()> {
        self.send(EngineCommand::SetLoop(looping)).await
    }

    pub async fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.send(EngineCommand::SetPlaybackRate(rate)).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(EngineCommand::Stop).await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Status(reply)).await?;
        rx.await.map_err(|_| Error::EngineStopped)
    }

    /// Shut the engine down and wait for the driver to acknowledge
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Shutdown(reply)).await?;
        rx.await.map_err(|_| Error::EngineStopped)
    }

    async fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::EngineStopped)
    }
}

/// Build an engine and run it on a new task
///
/// `build_factory` receives the sink its surfaces must deliver events to.
/// The returned join handle completes after shutdown, or once every
/// [`EngineHandle`] is dropped.
pub fn spawn<F, B>(
    ladder: QualityLadder,
    config: EngineConfig,
    capabilities: Capabilities,
    bus: EventBus,
    audio: watch::Receiver<GlobalAudio>,
    build_factory: B,
) -> Result<(EngineHandle, JoinHandle<()>)>
where
    F: SurfaceFactory + Send + 'static,
    F::Surface: Send + 'static,
    B: FnOnce(SurfaceEventSink) -> F,
{
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

    let factory = build_factory(SurfaceEventSink {
        tx: input_tx.clone(),
    });
    let timers = TokioTimers::new(input_tx);
    let engine = Engine::new(
        ladder,
        config,
        capabilities,
        factory,
        timers,
        bus.clone(),
        audio.clone(),
    )?;

    let handle = EngineHandle {
        media_id: engine.media_id(),
        commands: command_tx,
        bus,
    };
    debug!(
        media_id = %handle.media_id,
        subscribers = handle.bus.subscriber_count(),
        capacity = handle.bus.capacity(),
        "Spawning engine driver"
    );

    let task = tokio::spawn(drive(engine, input_rx, command_rx, audio));
    Ok((handle, task))
}

async fn drive<F>(
    mut engine: Engine<F, TokioTimers>,
    mut inputs: mpsc::UnboundedReceiver<EngineInput>,
    mut commands: mpsc::Receiver<EngineCommand>,
    mut audio: watch::Receiver<GlobalAudio>,
) where
    F: SurfaceFactory,
{
    let media_id = engine.media_id();
    let mut audio_open = true;
    info!(%media_id, "Engine driver started");

    loop {
        tokio::select! {
            Some(input) = inputs.recv() => match input {
                EngineInput::Surface(id, event) => engine.handle_surface_event(id, event),
                EngineInput::Timer(id) => engine.on_timer(id),
            },
            command = commands.recv() => match command {
                Some(command) => {
                    if !apply_command(&mut engine, command) {
                        break;
                    }
                }
                None => {
                    debug!(%media_id, "All engine handles dropped");
                    break;
                }
            },
            changed = audio.changed(), if audio_open => {
                if changed.is_ok() {
                    engine.refresh_audio();
                } else {
                    audio_open = false;
                }
            }
        }
    }

    engine.shutdown();
    info!(%media_id, "Engine driver stopped");
}

/// Apply one command; false ends the driver loop
fn apply_command<F: SurfaceFactory>(
    engine: &mut Engine<F, TokioTimers>,
    command: EngineCommand,
) -> bool {
    match command {
        EngineCommand::Load(reply) => {
            let _ = reply.send(engine.load());
        }
        EngineCommand::Play => engine.play(),
        EngineCommand::Pause => engine.pause(),
        EngineCommand::Seek(position) => engine.seek(position),
        EngineCommand::SetQuality { index, reply } => {
            let result = engine.set_quality(index);
            if let Err(e) = &result {
                warn!(index, error = %e, "Manual quality selection rejected");
            }
            let _ = reply.send(result);
        }
        EngineCommand::SetQualityByDescriptor { descriptor, reply } => {
            let result = engine.set_quality_by_descriptor(&descriptor);
            if let Err(e) = &result {
                warn!(id = %descriptor.id, error = %e, "Manual quality selection rejected");
            }
            let _ = reply.send(result);
        }
        EngineCommand::SetQualityMode(mode) => engine.set_quality_mode(mode),
        EngineCommand::SetVolume(volume) => engine.set_volume(volume),
        EngineCommand::SetMuted(muted) => engine.set_muted(muted),
        EngineCommand::SetLoop(looping) => engine.set_loop(looping),
        EngineCommand::SetPlaybackRate(rate) => engine.set_playback_rate(rate),
        EngineCommand::Status(reply) => {
            let _ = reply.send(engine.status());
        }
        EngineCommand::Stop => engine.stop(),
        EngineCommand::Shutdown(reply) => {
            engine.shutdown();
            let _ = reply.send(());
            return false;
        }
    }
    true
}
