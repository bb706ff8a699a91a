//! Trigger-wait behavior of the acquisition engine.
//!
//! The trigger wait has no timeout on purpose (an external trigger may never
//! fire); the only way out is the trigger itself or a stop request. Both exits
//! are exercised here with the engine on its own thread.

use beamlock::acquisition::{AcquisitionEngine, EngineReport, SessionConfig};
use beamlock::config::AcquisitionConfig;
use beamlock::core::{AcquisitionMode, TriggerMode};
use beamlock::hardware::mock::MockAcquisition;
use beamlock::sync::{Slot, StopReason, StopSignal};
use std::time::Duration;

fn triggered_session() -> SessionConfig {
    SessionConfig::from_settings(&AcquisitionConfig {
        mode: AcquisitionMode::Block,
        block_size: 4,
        block_count: 1,
        chunk_size: 4,
        trigger: TriggerMode::External,
        ..AcquisitionConfig::default()
    })
    .expect("valid session")
}

#[test]
fn test_engine_waits_for_trigger_then_acquires() {
    let device = MockAcquisition::ramp(4).hold_trigger();
    let probe = device.probe();
    let stop = StopSignal::new();
    let report_slot: Slot<EngineReport> = Slot::new();

    let handle = AcquisitionEngine::new(device, triggered_session(), stop)
        .spawn(report_slot.clone())
        .expect("engine thread spawns");

    // No report while the trigger is held.
    assert!(report_slot.take_timeout(Duration::from_millis(100)).is_none());

    probe.fire_trigger();
    let report = report_slot
        .take_timeout(Duration::from_secs(5))
        .expect("report after trigger fires");
    handle.join().expect("engine thread exits");

    report.outcome.expect("triggered acquisition succeeds");
    assert_eq!(report.blocks.len(), 1);
    assert_eq!(report.blocks[0].samples, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_stop_cancels_an_armed_trigger_wait() {
    let device = MockAcquisition::ramp(4).hold_trigger();
    let probe = device.probe();
    let stop = StopSignal::new();
    let report_slot: Slot<EngineReport> = Slot::new();

    let handle = AcquisitionEngine::new(device, triggered_session(), stop.clone())
        .spawn(report_slot.clone())
        .expect("engine thread spawns");

    std::thread::sleep(Duration::from_millis(50));
    stop.request(StopReason::Operator);

    let report = report_slot
        .take_timeout(Duration::from_secs(5))
        .expect("report after stop");
    handle.join().expect("engine thread exits");

    report.outcome.expect("a stopped wait is not an error");
    assert!(report.blocks.is_empty());
    // The handle was still released exactly once.
    assert_eq!(probe.close_calls(), 1);
}
