//! The vision-driven tracking loop.
//!
//! Runs at camera frame rate on its own OS thread, the sole owner of the
//! camera handle. Each iteration retrieves the single freshest frame (older
//! buffered frames are discarded by the latest-only grab strategy), matches
//! the target template, applies the steering law, integrates the steering
//! state, and posts the absolute command to the mirror mailbox.
//!
//! The first successful iteration raises the "now live" latch; acquisition
//! must not start before the beam is locked. The loop terminates when the
//! elapsed run time exceeds the configured limit (requesting a timeout stop so
//! the rest of the run winds down too) or when a stop is requested elsewhere;
//! either way the in-flight iteration completes before exit, so the steering
//! state is never left half-updated. On exit the loop commands the mirror home
//! before releasing the camera handle.

use crate::core::PixelPoint;
use crate::error::{Error, Result};
use crate::hardware::FrameSource;
use crate::steering::{steer, Mailbox, MirrorCommand, SteeringGains, SteeringState};
use crate::sync::{Latch, StopReason, StopSignal};
use crate::vision::{match_template, Template};
use log::{debug, error, info, warn};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Everything the tracking loop needs besides its hardware handle.
pub struct TrackingLoop<C: FrameSource> {
    camera: C,
    template: Template,
    reference: PixelPoint,
    gains: SteeringGains,
    search_margin: f64,
    exposure_ms: f64,
    gain_db: f64,
    grab_timeout: Duration,
    time_limit: Duration,
    mailbox: Mailbox,
    live: Latch,
    stop: StopSignal,
}

/// Parameters for constructing a [`TrackingLoop`].
pub struct TrackingParams {
    /// The disc template sized to the target silhouette.
    pub template: Template,
    /// The fixed reference point the beam should stay on.
    pub reference: PixelPoint,
    /// Steering law gains.
    pub gains: SteeringGains,
    /// Fraction trimmed from each frame edge for the search region.
    pub search_margin: f64,
    /// Camera exposure, milliseconds.
    pub exposure_ms: f64,
    /// Camera gain, dB.
    pub gain_db: f64,
    /// Bounded wait per frame grab.
    pub grab_timeout: Duration,
    /// Wall-clock run limit.
    pub time_limit: Duration,
}

impl<C: FrameSource + 'static> TrackingLoop<C> {
    /// Assemble a loop around its camera handle and run plumbing.
    pub fn new(
        camera: C,
        params: TrackingParams,
        mailbox: Mailbox,
        live: Latch,
        stop: StopSignal,
    ) -> Self {
        Self {
            camera,
            template: params.template,
            reference: params.reference,
            gains: params.gains,
            search_margin: params.search_margin,
            exposure_ms: params.exposure_ms,
            gain_db: params.gain_db,
            grab_timeout: params.grab_timeout,
            time_limit: params.time_limit,
            mailbox,
            live,
            stop,
        }
    }

    /// Spawn the loop on its own thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<Result<()>>> {
        thread::Builder::new().name("tracking".into()).spawn(move || self.run())
    }

    /// Run until the time limit or a stop request, then release the camera.
    pub fn run(mut self) -> Result<()> {
        let outcome = self.track();
        self.release_camera();
        if let Err(err) = &outcome {
            error!("tracking loop stopped: {err}");
            self.stop.request(StopReason::Fault);
        }
        outcome
    }

    fn track(&mut self) -> Result<()> {
        self.camera.open()?;
        self.camera.set_exposure_ms(self.exposure_ms)?;
        self.camera.set_gain_db(self.gain_db)?;
        self.camera.start_latest_only()?;

        let started = Instant::now();
        let mut state = SteeringState::default();
        let mut frames = 0u64;

        loop {
            if self.stop.is_requested() {
                info!("tracking loop: stop requested");
                break;
            }
            if started.elapsed() >= self.time_limit {
                info!("tracking loop: time limit {:?} reached", self.time_limit);
                self.stop.request(StopReason::Timeout);
                break;
            }

            let frame = match self.camera.retrieve_latest(self.grab_timeout) {
                Ok(frame) => frame,
                Err(Error::GrabTimeout(_)) => {
                    // Recoverable: the target may simply not be in view yet.
                    warn!("frame grab timed out, retrying");
                    continue;
                }
                Err(err) => return Err(err),
            };

            let found = match_template(&frame, &self.template, self.search_margin)?;
            let (dx, dy) = steer(found.center, self.reference, self.gains);
            state.apply(dx, dy);
            self.mailbox.put(MirrorCommand {
                x: state.x,
                y: state.y,
            });
            frames += 1;
            // Idempotent after the first successful iteration.
            self.live.set();
            debug!(
                "frame {}: match ({:.1}, {:.1}) score {:.3} -> mirror ({:.6}, {:.6})",
                frame.index, found.center.x, found.center.y, found.score, state.x, state.y
            );
        }

        info!(
            "tracking done: {} frame(s) in {:.2}s",
            frames,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Command home, then stop and close the camera. Best effort: teardown
    /// failures are logged, not propagated over the loop's own outcome.
    fn release_camera(&mut self) {
        self.mailbox.put(MirrorCommand::home());
        if let Err(err) = self.camera.stop() {
            warn!("camera stop failed: {err}");
        }
        if let Err(err) = self.camera.close() {
            warn!("camera close failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockCamera;

    fn params(time_limit: Duration) -> TrackingParams {
        TrackingParams {
            template: Template::disc(6),
            reference: PixelPoint::new(32.0, 24.0),
            gains: SteeringGains {
                x: 3.968e-5,
                y: 3.968e-5,
            },
            search_margin: 0.0,
            exposure_ms: 1.5,
            gain_db: 18.0,
            grab_timeout: Duration::from_millis(5),
            time_limit,
        }
    }

    #[test]
    fn test_goes_live_and_stops_on_time_limit() {
        let camera = MockCamera::new(64, 48, 6);
        let probe = camera.probe();
        let mailbox = Mailbox::new();
        let live = Latch::new();
        let stop = StopSignal::new();

        let tracking = TrackingLoop::new(
            camera,
            params(Duration::from_millis(200)),
            mailbox.clone(),
            live.clone(),
            stop.clone(),
        );
        let handle = tracking.spawn().expect("spawn");

        assert!(live.wait_timeout(Duration::from_secs(2)));
        handle.join().expect("join").expect("tracking outcome");
        assert_eq!(stop.reason(), Some(StopReason::Timeout));
        assert!(probe.frames_served() > 0);
        assert_eq!(probe.exposure_ms(), 1.5);
        // Last posted command is the home position from teardown.
        assert_eq!(
            mailbox.take_timeout(Duration::from_millis(1)),
            Some(MirrorCommand::home())
        );
    }

    #[test]
    fn test_never_goes_live_without_frames() {
        let camera = MockCamera::new(64, 48, 6).never_ready();
        let mailbox = Mailbox::new();
        let live = Latch::new();
        let stop = StopSignal::new();

        let tracking = TrackingLoop::new(
            camera,
            params(Duration::from_millis(100)),
            mailbox,
            live.clone(),
            stop.clone(),
        );
        tracking.run().expect("outcome");
        assert!(!live.is_set());
        assert_eq!(stop.reason(), Some(StopReason::Timeout));
    }

    #[test]
    fn test_exits_promptly_on_external_stop() {
        let camera = MockCamera::new(64, 48, 6);
        let mailbox = Mailbox::new();
        let live = Latch::new();
        let stop = StopSignal::new();
        stop.request(StopReason::Operator);

        let tracking = TrackingLoop::new(
            camera,
            params(Duration::from_secs(30)),
            mailbox,
            live,
            stop.clone(),
        );
        tracking.run().expect("outcome");
        assert_eq!(stop.reason(), Some(StopReason::Operator));
    }
}
