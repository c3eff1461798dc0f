//! Auto-quality decision loop tests
//!
//! The live mock surface only moves when the test moves it, so a run of
//! ticks without `set_time` looks like a stall.

mod helpers;

use helpers::{count, Harness, MockHandle};
use panomp_common::events::EngineEvent;
use panomp_common::QualityMode;
use panomp_vp::{Capabilities, EngineConfig, ReadyState, SurfaceEvent};

fn starting_at(index: usize) -> Harness {
    let config = EngineConfig {
        initial_quality: index,
        ..EngineConfig::default()
    };
    Harness::with(3, config, Capabilities::default())
}

/// Bring a forced candidate straight to commit
fn commit_forced(h: &mut Harness, index: usize) -> MockHandle {
    let candidate = h.mocks.latest(index);
    candidate.set_ready(ReadyState::HaveFutureData);
    h.deliver(&candidate, SurfaceEvent::LoadedData);
    candidate.set_ready(ReadyState::HaveEnoughData);
    h.deliver(&candidate, SurfaceEvent::Seeked);
    assert_eq!(h.engine.current_index(), Some(index));
    candidate
}

/// Synchronize a candidate and let the live playhead reach it
fn commit_synced(h: &mut Harness, live: &MockHandle, index: usize) -> MockHandle {
    let candidate = h.drive_to_sync_wait(index);
    live.set_time(candidate.time());
    h.advance(10);
    assert_eq!(h.engine.current_index(), Some(index));
    candidate
}

fn requested(events: &[EngineEvent], index: usize, forced: bool) -> usize {
    count(events, |e| {
        matches!(e, EngineEvent::QualityRequested { index: i, forced: f, .. } if *i == index && *f == forced)
    })
}

#[test]
fn test_upgrade_once_buffer_covers_sync_window() {
    let mut h = Harness::new(3);
    let live = h.bring_up();
    live.set_buffered(0.0, 8.0);

    h.ticks(1);

    assert_eq!(h.engine.request_index(), Some(1));
    let events = h.drain();
    assert_eq!(requested(&events, 1, false), 1);
}

#[test]
fn test_no_upgrade_with_short_buffer() {
    let mut h = Harness::new(3);
    let live = h.bring_up();
    live.set_buffered(0.0, 5.9);

    for step in 1..=6 {
        live.set_time(step as f64 * 0.5);
        live.set_buffered(0.0, step as f64 * 0.5 + 5.9);
        h.ticks(1);
    }

    assert_eq!(h.engine.request_index(), None);
    assert!(h.drain().is_empty());
}

#[test]
fn test_no_upgrade_from_highest() {
    let mut h = starting_at(2);
    let live = h.bring_up();
    live.set_buffered(0.0, 30.0);

    h.ticks(3);

    assert_eq!(h.engine.request_index(), None);
}

#[test]
fn test_stall_forces_downgrade() {
    let mut h = starting_at(1);
    h.bring_up();

    // First tick records the playhead, the next three see no progress
    h.ticks(3);
    assert_eq!(h.engine.request_index(), None);
    assert_eq!(h.engine.slot(1).unwrap().counters().down_count, 2);

    h.ticks(1);
    assert_eq!(h.engine.request_index(), Some(0));
    let counters = h.engine.slot(1).unwrap().counters();
    assert_eq!(counters.leave_count, 1);
    assert_eq!(counters.down_count, 0);

    let events = h.drain();
    assert_eq!(requested(&events, 0, true), 1);

    commit_forced(&mut h, 0);
    let events = h.drain();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::QualityCommitted { index: 0, drift: None, .. })));
}

#[test]
fn test_progress_resets_stall_count() {
    let mut h = starting_at(1);
    let live = h.bring_up();

    h.ticks(3);
    assert_eq!(h.engine.slot(1).unwrap().counters().down_count, 2);

    live.set_time(0.5);
    h.ticks(1);
    assert_eq!(h.engine.slot(1).unwrap().counters().down_count, 0);

    h.ticks(2);
    assert_eq!(h.engine.request_index(), None);
}

#[test]
fn test_seek_resets_stall_count() {
    let mut h = starting_at(1);
    h.bring_up();

    h.ticks(3);
    h.engine.seek(30.0);
    assert_eq!(h.engine.slot(1).unwrap().counters().down_count, 0);

    h.ticks(3);
    assert_eq!(h.engine.request_index(), None);
}

#[test]
fn test_paused_engine_does_not_count_stalls() {
    let mut h = starting_at(1);
    h.bring_up();
    h.engine.pause();

    h.ticks(10);

    assert_eq!(h.engine.request_index(), None);
    assert_eq!(h.engine.slot(1).unwrap().counters().down_count, 0);
}

#[test]
fn test_stall_on_lowest_only_warns() {
    let mut h = Harness::new(3);
    h.bring_up();

    h.ticks(4);

    assert_eq!(h.engine.request_index(), None);
    assert_eq!(h.engine.slot(0).unwrap().counters().down_count, 0);
    assert_eq!(h.engine.slot(0).unwrap().counters().leave_count, 0);
    assert!(h.drain().is_empty());
}

#[test]
fn test_aborted_rendition_not_retried() {
    let mut h = Harness::new(3);
    let live = h.bring_up();
    live.set_buffered(0.0, 8.0);

    h.ticks(1);
    let candidate = h.mocks.latest(1);
    h.deliver(&candidate, SurfaceEvent::Error("network".to_string()));
    assert_eq!(h.engine.slot(1).unwrap().counters().abort_count, 1);
    h.drain();

    for step in 1..=4 {
        live.set_time(step as f64 * 0.5);
        live.set_buffered(0.0, 20.0);
        h.ticks(1);
    }

    assert_eq!(h.engine.request_index(), None);
    assert_eq!(h.mocks.created_for(1), 1);
    let events = h.drain();
    assert_eq!(count(&events, |e| matches!(e, EngineEvent::QualityRequested { .. })), 0);
}

#[test]
fn test_stall_ticks_count_while_request_in_flight() {
    let mut h = starting_at(1);
    let live = h.bring_up();
    live.set_buffered(0.0, 8.0);

    h.ticks(1);
    assert_eq!(h.engine.request_index(), Some(2));

    h.ticks(3);
    // Counted, but the action waits for the request
    assert_eq!(h.engine.slot(1).unwrap().counters().down_count, 3);
    assert_eq!(h.engine.request_index(), Some(2));

    let candidate = h.mocks.latest(2);
    h.deliver(&candidate, SurfaceEvent::Error("decode".to_string()));
    h.drain();

    h.ticks(1);
    assert_eq!(h.engine.request_index(), Some(0));
    assert_eq!(h.engine.slot(1).unwrap().counters().leave_count, 1);
    let events = h.drain();
    assert_eq!(requested(&events, 0, true), 1);
}

#[test]
fn test_second_leave_suppresses_upgrade() {
    let mut h = starting_at(1);
    h.bring_up();

    // Stall off rung 1 once
    h.ticks(4);
    let live = commit_forced(&mut h, 0);
    assert_eq!(h.engine.slot(1).unwrap().counters().leave_count, 1);

    // One leave still allows going back up
    live.set_buffered(0.0, 10.0);
    h.ticks(1);
    assert_eq!(h.engine.request_index(), Some(1));
    commit_synced(&mut h, &live, 1);

    // Stall off rung 1 again
    h.ticks(4);
    assert_eq!(h.engine.request_index(), Some(0));
    let live = commit_forced(&mut h, 0);
    assert_eq!(h.engine.slot(1).unwrap().counters().leave_count, 2);
    h.drain();

    for _ in 0..4 {
        let t = live.time() + 0.5;
        live.set_time(t);
        live.set_buffered(0.0, t + 10.0);
        h.ticks(1);
    }

    assert_eq!(h.engine.request_index(), None);
    let events = h.drain();
    assert_eq!(count(&events, |e| matches!(e, EngineEvent::QualityRequested { .. })), 0);
}

#[test]
fn test_manual_mode_disables_loop() {
    let mut h = Harness::new(3);
    let live = h.bring_up();
    live.set_buffered(0.0, 30.0);
    h.engine.set_quality_mode(QualityMode::Manual);
    h.drain();

    h.ticks(5);

    assert_eq!(h.engine.request_index(), None);
    assert!(h.drain().is_empty());

    h.engine.set_quality_mode(QualityMode::Auto);
    h.ticks(1);
    assert_eq!(h.engine.request_index(), Some(1));
}
