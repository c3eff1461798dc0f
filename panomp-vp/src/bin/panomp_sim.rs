//! panomp-sim - run the adaptive playback engine against a simulated network
//!
//! Loads a scenario (ladder, per-rendition network behaviour, host action
//! timeline), runs it either in virtual time (deterministic, instant) or in
//! real time on the tokio driver, and prints every engine notification as a
//! JSON line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use panomp_common::audio::AudioBus;
use panomp_common::config::{load_or_default, ConfigResolver};
use panomp_common::events::{EngineEvent, EventBus};
use panomp_common::time;
use panomp_vp::runtime::{self, EngineHandle};
use panomp_vp::sim::{pump, HostAction, Scenario, Simulation, STEP_MS};
use panomp_vp::PlayerConfig;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BUILTIN_SCENARIO: &str = include_str!("../../scenarios/ladder_stall.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Lock-step virtual clock, finishes immediately
    Virtual,
    /// Tokio driver on the wall clock
    Realtime,
}

/// Command-line arguments for panomp-sim
#[derive(Parser, Debug)]
#[command(name = "panomp-sim")]
#[command(about = "Adaptive playback engine simulator")]
#[command(version)]
struct Args {
    /// Scenario TOML (built-in ladder/stall scenario if omitted)
    #[arg(env = "PANOMP_SCENARIO")]
    scenario: Option<PathBuf>,

    /// Clock to run the scenario on
    #[arg(short, long, value_enum, default_value = "virtual")]
    mode: Mode,

    /// Player configuration file (logging level)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overriding the configuration file
    #[arg(long)]
    log_level: Option<String>,

    /// Only print the summary
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config: PlayerConfig = load_or_default(&ConfigResolver::new(), args.config.as_deref())
        .context("Failed to load player configuration")?;

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("panomp_vp={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)
            .with_context(|| format!("Failed to load scenario {}", path.display()))?,
        None => Scenario::from_toml(BUILTIN_SCENARIO).context("Built-in scenario is invalid")?,
    };
    info!(
        name = %scenario.name,
        renditions = scenario.renditions.len(),
        mode = ?args.mode,
        "Starting simulation"
    );

    let events = match args.mode {
        Mode::Virtual => run_virtual(&scenario, args.quiet)?,
        Mode::Realtime => run_realtime(&scenario, args.quiet).await?,
    };

    print_summary(&events);
    Ok(())
}

fn run_virtual(scenario: &Scenario, quiet: bool) -> Result<Vec<(f64, EngineEvent)>> {
    let sim = Simulation::run_scenario(scenario).context("Failed to run scenario")?;
    let events: Vec<(f64, EngineEvent)> = sim
        .events()
        .iter()
        .map(|r| (r.at, r.event.clone()))
        .collect();
    if !quiet {
        for (at, event) in &events {
            print_event(*at, event);
        }
    }
    Ok(events)
}

async fn run_realtime(scenario: &Scenario, quiet: bool) -> Result<Vec<(f64, EngineEvent)>> {
    let world = scenario.world();
    let bus = EventBus::new(1024);
    let mut rx = bus.subscribe();
    let audio = AudioBus::default();

    let pump_world = world.clone();
    let (handle, driver) = runtime::spawn(
        scenario.ladder()?,
        scenario.engine.clone(),
        scenario.capabilities,
        bus,
        audio.subscribe(),
        |sink| {
            tokio::spawn(pump(pump_world, sink, time::millis_to_duration(STEP_MS)));
            world.factory()
        },
    )
    .context("Failed to start engine")?;

    let start = tokio::time::Instant::now();
    let recorder = tokio::spawn(async move {
        let mut events = Vec::new();
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let at = start.elapsed().as_secs_f64();
                    if !quiet {
                        print_event(at, &event);
                    }
                    events.push((at, event));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        events
    });

    if scenario.autoload {
        if let Err(e) = handle.load().await {
            warn!(error = %e, "Initial load failed");
        }
    }
    for scheduled in scenario.timeline() {
        tokio::time::sleep_until(start + time::secs_to_duration(scheduled.at)).await;
        apply(&handle, &scheduled.action).await?;
    }
    tokio::time::sleep_until(start + time::secs_to_duration(scenario.duration_secs)).await;

    let status = handle.status().await?;
    info!(?status, "Final engine status");
    handle.shutdown().await?;
    driver.await.context("Engine driver panicked")?;
    drop(handle);

    let events = recorder.await.context("Event recorder panicked")?;
    Ok(events)
}

async fn apply(handle: &EngineHandle, action: &HostAction) -> Result<()> {
    let result = match action {
        HostAction::Load => handle.load().await,
        HostAction::Play => handle.play().await,
        HostAction::Pause => handle.pause().await,
        HostAction::Seek { position } => handle.seek(*position).await,
        HostAction::SetQuality { index } => handle.set_quality(*index).await,
        HostAction::SetQualityMode { mode } => handle.set_quality_mode(*mode).await,
        HostAction::SetVolume { volume } => handle.set_volume(*volume).await,
        HostAction::Stop => handle.stop().await,
    };
    match result {
        Err(panomp_vp::Error::EngineStopped) => {
            Err(panomp_vp::Error::EngineStopped).context("Engine stopped during scenario")
        }
        Err(e) => {
            warn!(?action, error = %e, "Host action failed");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

fn print_event(at: f64, event: &EngineEvent) {
    println!("{}", json!({ "at": (at * 1000.0).round() / 1000.0, "event": event }));
}

fn print_summary(events: &[(f64, EngineEvent)]) {
    let mut commits = Vec::new();
    let mut aborts = 0usize;
    for (at, event) in events {
        match event {
            EngineEvent::QualityCommitted { index, drift, .. } => commits.push((*at, *index, *drift)),
            EngineEvent::QualityAborted { .. } => aborts += 1,
            _ => {}
        }
    }
    info!(commits = commits.len(), aborts, "Simulation finished");
    for (at, index, drift) in commits {
        info!(at, index, drift = ?drift, "Commit");
    }
}
