//! Simulated surfaces and a deterministic harness
//!
//! Used by the integration tests and the `panomp-sim` binary. The world
//! models progressive download, seek latency, readiness thresholds, network
//! failures and playback stalls per rendition.

mod harness;
mod scenario;
mod world;

pub use harness::{pump, RecordedEvent, Sample, SimEngine, Simulation, STEP_MS};
pub use scenario::{HostAction, RenditionSpec, Scenario, ScheduledAction};
pub use world::{RenditionProfile, SimFactory, SimSurface, SimSurfaceState, SimWorld};
