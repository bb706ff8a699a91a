//! Steering law, cumulative steering state, and the mirror worker.
//!
//! The law itself is a stateless integrating proportional controller:
//! `delta = -(match - reference) * gain` per axis, no damping term. The
//! tracking loop owns the integration (one [`SteeringState`] update per
//! processed frame) and posts the resulting absolute command to the mirror
//! worker's mailbox.
//!
//! The mailbox is a single-slot overwrite channel: only the latest command
//! matters to the mirror, so posting never blocks and never queues. The worker
//! thread is the sole owner of the mirror handle. At startup it homes to
//! (0, 0) and raises its readiness latch; at teardown, after the tracking loop
//! has stopped issuing commands and the mailbox is closed, it re-homes to
//! (0, 0) as its last act.

use crate::core::PixelPoint;
use crate::error::{Error, Result};
use crate::hardware::SteeringMirror;
use crate::sync::{Latch, Slot, StopReason, StopSignal, STOP_POLL};
use log::{debug, error, info};
use std::thread::{self, JoinHandle};

/// Per-axis steering gains, normalized mirror units per pixel of error.
#[derive(Clone, Copy, Debug)]
pub struct SteeringGains {
    /// Horizontal gain.
    pub x: f64,
    /// Vertical gain.
    pub y: f64,
}

/// Cumulative mirror command. Owned exclusively by the tracking loop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SteeringState {
    /// Horizontal command, normalized units.
    pub x: f64,
    /// Vertical command, normalized units.
    pub y: f64,
}

impl SteeringState {
    /// Integrate one incremental offset.
    pub fn apply(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }
}

/// One absolute mirror position, normalized dimensionless units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MirrorCommand {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl MirrorCommand {
    /// The home position.
    pub fn home() -> Self {
        Self { x: 0.0, y: 0.0 }
    }
}

/// The mirror worker's mailbox.
pub type Mailbox = Slot<MirrorCommand>;

/// The incremental offset steering the beam back toward the reference.
///
/// Deterministic and odd-symmetric around the reference point.
pub fn steer(match_center: PixelPoint, reference: PixelPoint, gains: SteeringGains) -> (f64, f64) {
    (
        -(match_center.x - reference.x) * gains.x,
        -(match_center.y - reference.y) * gains.y,
    )
}

/// Spawn the mirror worker thread.
///
/// The worker connects, homes to (0, 0), raises `ready`, then applies each
/// mailbox command until the mailbox is closed. A rejected command is fatal:
/// the worker requests an orderly stop and exits with the reason.
pub fn spawn_mirror_worker<M: SteeringMirror + 'static>(
    mirror: M,
    mailbox: Mailbox,
    ready: Latch,
    stop: StopSignal,
) -> std::io::Result<JoinHandle<Result<()>>> {
    thread::Builder::new()
        .name("mirror-worker".into())
        .spawn(move || {
            let outcome = serve(mirror, &mailbox, &ready);
            if let Err(err) = &outcome {
                error!("mirror worker stopped: {err}");
                stop.request(StopReason::Fault);
            }
            outcome
        })
}

fn serve<M: SteeringMirror>(mut mirror: M, mailbox: &Mailbox, ready: &Latch) -> Result<()> {
    mirror.connect()?;
    mirror.set_position(0.0, 0.0)?;
    info!("mirror homed, ready for commands");
    ready.set();

    let mut applied = 0u64;
    loop {
        // Stale commands were already overwritten in the slot; whatever
        // arrives here is the latest.
        if let Some(cmd) = mailbox.take_timeout(STOP_POLL) {
            mirror
                .set_position(cmd.x, cmd.y)
                .map_err(|e| Error::Actuator(format!("set_position({}, {}): {e}", cmd.x, cmd.y)))?;
            applied += 1;
        } else if mailbox.is_closed() {
            break;
        }
    }

    mirror.set_position(0.0, 0.0)?;
    debug!("mirror worker exiting after {applied} commands, re-homed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockMirror;
    use std::time::Duration;

    #[test]
    fn test_steer_direction_opposes_error() {
        let gains = SteeringGains { x: 0.1, y: 0.1 };
        let reference = PixelPoint::new(50.0, 50.0);
        let (dx, dy) = steer(PixelPoint::new(60.0, 40.0), reference, gains);
        assert!((dx - -1.0).abs() < 1e-12);
        assert!((dy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_steer_odd_symmetric() {
        let gains = SteeringGains { x: 3.968e-5, y: 5.2e-5 };
        let reference = PixelPoint::new(180.0, 135.0);
        let m = PixelPoint::new(201.5, 98.25);
        let mirrored = PixelPoint::new(
            reference.x + (reference.x - m.x),
            reference.y + (reference.y - m.y),
        );
        let (dx, dy) = steer(m, reference, gains);
        let (mx, my) = steer(mirrored, reference, gains);
        assert!((dx + mx).abs() < 1e-15);
        assert!((dy + my).abs() < 1e-15);
    }

    #[test]
    fn test_mailbox_overwrite_keeps_only_latest() {
        let mailbox = Mailbox::new();
        for n in 1..=5 {
            mailbox.put(MirrorCommand {
                x: n as f64,
                y: 0.0,
            });
        }
        let seen = mailbox.take_timeout(Duration::from_millis(1));
        assert_eq!(seen, Some(MirrorCommand { x: 5.0, y: 0.0 }));
        assert_eq!(mailbox.take_timeout(Duration::from_millis(1)), None);
    }

    #[test]
    fn test_worker_homes_on_start_and_exit() {
        let mirror = MockMirror::new();
        let probe = mirror.probe();
        let mailbox = Mailbox::new();
        let ready = Latch::new();
        let stop = StopSignal::new();

        let handle =
            spawn_mirror_worker(mirror, mailbox.clone(), ready.clone(), stop).expect("spawn");
        assert!(ready.wait_timeout(Duration::from_secs(1)));

        mailbox.put(MirrorCommand { x: 0.3, y: -0.1 });
        std::thread::sleep(Duration::from_millis(100));
        mailbox.close();
        handle.join().expect("join").expect("worker outcome");

        let positions = probe.positions();
        assert_eq!(positions.first(), Some(&(0.0, 0.0)));
        assert_eq!(positions.last(), Some(&(0.0, 0.0)));
        assert!(positions.contains(&(0.3, -0.1)));
    }

    #[test]
    fn test_worker_requests_stop_on_rejected_command() {
        let mirror = MockMirror::new().reject_commands();
        let probe_stop = StopSignal::new();
        let mailbox = Mailbox::new();
        let ready = Latch::new();

        let handle = spawn_mirror_worker(mirror, mailbox.clone(), ready, probe_stop.clone())
            .expect("spawn");
        let outcome = handle.join().expect("join");
        assert!(outcome.is_err());
        assert_eq!(probe_stop.reason(), Some(StopReason::Fault));
    }
}
