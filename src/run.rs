//! The lifecycle coordinator: topology, start/stop barriers, result handoff,
//! and persistence.
//!
//! ```text
//! Idle -> ActuatorHoming -> TrackingStarting -> (barrier) -> AcquisitionStarting
//!      -> Running -> Stopping -> Draining -> Persisted
//! ```
//!
//! The coordinator owns nothing but the plumbing: it wires the three OS-thread
//! workers together, enforces the ordering guarantees (acquisition never
//! starts before tracking is live; stopping orders tracking-exit, then
//! acquisition-close, then actuator teardown, then drain), and guarantees that
//! Draining and Persisted run exactly once on every path: timer expiry,
//! operator stop, or a fatal worker error. Every barrier wait also watches the
//! stop signal, so a stop issued before a downstream readiness event still
//! reaches persistence instead of hanging on an event that will never fire.

use crate::acquisition::{AcquisitionEngine, EngineReport, SessionConfig};
use crate::config::Settings;
use crate::error::Result;
use crate::hardware::{AcquisitionDevice, FrameSource, SteeringMirror};
use crate::steering::{spawn_mirror_worker, Mailbox, SteeringGains};
use crate::storage;
use crate::sync::{Latch, Slot, StopReason, StopSignal, STOP_POLL};
use crate::tracking::{TrackingLoop, TrackingParams};
use crate::vision::Template;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

/// Coordinator lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// Nothing started.
    Idle,
    /// Mirror worker starting and homing.
    ActuatorHoming,
    /// Tracking loop starting; waiting for "now live".
    TrackingStarting,
    /// Beam locked; acquisition engine starting.
    AcquisitionStarting,
    /// Both loops running independently.
    Running,
    /// Stop observed; winding workers down in order.
    Stopping,
    /// Taking the result buffer, exactly once.
    Draining,
    /// Every drained block written to durable storage.
    Persisted,
}

/// What one run produced.
#[derive(Debug)]
pub struct RunReport {
    /// Every completed result block, in order.
    pub blocks: Vec<crate::core::ResultBlock>,
    /// Files written, one per block.
    pub persisted: Vec<PathBuf>,
    /// Why the run stopped, if a stop was requested.
    pub stop_reason: Option<StopReason>,
    /// Worker failure descriptions, empty on a clean run.
    pub failures: Vec<String>,
}

/// Execute one run over the given hardware collaborators.
///
/// Session parameters are validated before any hardware I/O. A fatal error in
/// any worker still drains and persists whatever blocks completed;
/// already-captured data is never silently lost.
pub fn execute<C, D, M>(
    settings: &Settings,
    camera: C,
    device: D,
    mirror: M,
    stop: StopSignal,
) -> Result<RunReport>
where
    C: FrameSource + 'static,
    D: AcquisitionDevice + 'static,
    M: SteeringMirror + 'static,
{
    let mut phase = RunPhase::Idle;
    let session = SessionConfig::from_settings(&settings.acquisition)?;
    settings.validate()?;

    let run_stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let mailbox = Mailbox::new();
    let mirror_ready = Latch::new();
    let live = Latch::new();
    let report_slot: Slot<EngineReport> = Slot::new();
    let mut failures = Vec::new();

    set_phase(&mut phase, RunPhase::ActuatorHoming);
    let mirror_handle =
        spawn_mirror_worker(mirror, mailbox.clone(), mirror_ready.clone(), stop.clone())?;

    let mut tracking_handle: Option<JoinHandle<Result<()>>> = None;
    let mut engine_handle: Option<JoinHandle<()>> = None;

    if mirror_ready.wait_or_stop(&stop) {
        set_phase(&mut phase, RunPhase::TrackingStarting);
        let tracking = TrackingLoop::new(
            camera,
            TrackingParams {
                template: Template::disc(settings.tracking.template_radius),
                reference: settings.reference_point(),
                gains: SteeringGains {
                    x: settings.steering.gain_x,
                    y: settings.steering.gain_y,
                },
                search_margin: settings.tracking.search_margin,
                exposure_ms: settings.camera.exposure_ms,
                gain_db: settings.camera.gain_db,
                grab_timeout: settings.grab_timeout(),
                time_limit: settings.run.time_limit,
            },
            mailbox.clone(),
            live.clone(),
            stop.clone(),
        );
        tracking_handle = Some(tracking.spawn()?);

        // The barrier: acquiring without a locked beam is a meaningless
        // measurement. A stop issued before the beam locks skips straight to
        // the teardown path.
        if live.wait_or_stop(&stop) {
            set_phase(&mut phase, RunPhase::AcquisitionStarting);
            let engine = AcquisitionEngine::new(device, session, stop.clone());
            engine_handle = Some(engine.spawn(report_slot.clone())?);
            set_phase(&mut phase, RunPhase::Running);
        } else {
            warn!("stop requested before tracking went live; skipping acquisition");
        }
    } else {
        warn!("stop requested before mirror was ready; skipping tracking and acquisition");
    }

    if phase == RunPhase::Running {
        // Both loops proceed independently; only the stop signal ends the run.
        let reason = stop.wait(STOP_POLL);
        info!("stop observed: {reason:?}");
    }

    // Stopping strictly orders tracking-exit -> acquisition-close -> actuator
    // teardown -> drain.
    set_phase(&mut phase, RunPhase::Stopping);
    if let Some(handle) = tracking_handle {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => failures.push(format!("tracking: {err}")),
            Err(_) => failures.push("tracking: worker panicked".into()),
        }
    }

    let engine_report = match engine_handle {
        Some(handle) => {
            // The engine's waits are stop-aware, so its report arrives after
            // at most one chunk read.
            let report = report_slot.take_timeout(wind_down_budget(settings.read_timeout()));
            if handle.join().is_err() {
                failures.push("acquisition: worker panicked".into());
            }
            report
        }
        None => None,
    };

    // The tracking loop has stopped issuing commands; tear the mirror down.
    mailbox.close();
    match mirror_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => failures.push(format!("mirror: {err}")),
        Err(_) => failures.push("mirror: worker panicked".into()),
    }

    set_phase(&mut phase, RunPhase::Draining);
    let blocks = match engine_report {
        Some(report) => {
            if let Err(err) = report.outcome {
                failures.push(format!("acquisition: {err}"));
            }
            report.blocks
        }
        None => Vec::new(),
    };
    info!("drained {} result block(s)", blocks.len());

    let persisted = storage::persist_blocks(
        &blocks,
        &settings.run.data_dir,
        &run_stamp,
        settings.run.persist_attempts,
    )?;
    set_phase(&mut phase, RunPhase::Persisted);

    for failure in &failures {
        error!("run finished with failure: {failure}");
    }
    Ok(RunReport {
        blocks,
        persisted,
        stop_reason: stop.reason(),
        failures,
    })
}

fn set_phase(phase: &mut RunPhase, next: RunPhase) {
    debug!("run phase {:?} -> {:?}", phase, next);
    *phase = next;
}

/// How long to wait for the engine's report after a stop.
///
/// One read timeout plus slack covers "finish the current chunk and close";
/// the cap keeps a wedged device from blocking persistence forever.
fn wind_down_budget(read_timeout: Duration) -> Duration {
    (read_timeout + Duration::from_secs(5)).min(Duration::from_secs(30))
}
