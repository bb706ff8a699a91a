//! Mock hardware collaborators generating synthetic data.
//!
//! Every mock hands out cloneable probes (`Arc`-shared state) so tests can
//! inspect call counts and recorded commands after a component has consumed
//! the device by value.

use crate::core::{ChannelDescriptor, ChannelKind, Frame};
use crate::error::{Error, Result};
use crate::hardware::{AcquisitionDevice, FrameSource, SteeringMirror};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Acquisition
// ============================================================================

struct AcqInner {
    primary: Vec<i32>,
    primary_scale: f64,
    with_validity: bool,
    invalid_at: Option<usize>,
    stall_reads: bool,
    hold_trigger: bool,
    cursor: usize,
    extracted: HashMap<ChannelKind, Vec<i32>>,
    opened: bool,
    started: bool,
    open_capacity: Option<usize>,
    advance_calls: usize,
    stop_calls: usize,
    close_calls: usize,
}

/// Scriptable acquisition device.
///
/// Serves a fixed primary sample sequence chunk by chunk, with an optional
/// validity channel, an optional injected loss, and optional read stalls.
#[derive(Clone)]
pub struct MockAcquisition {
    inner: Arc<Mutex<AcqInner>>,
}

impl MockAcquisition {
    /// A device serving `samples` on the primary channel, validity all-true.
    pub fn with_primary(samples: Vec<i32>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AcqInner {
                primary: samples,
                primary_scale: 1.0,
                with_validity: true,
                invalid_at: None,
                stall_reads: false,
                hold_trigger: false,
                cursor: 0,
                extracted: HashMap::new(),
                opened: false,
                started: false,
                open_capacity: None,
                advance_calls: 0,
                stop_calls: 0,
                close_calls: 0,
            })),
        }
    }

    /// A device serving the ramp `1..=count`.
    pub fn ramp(count: usize) -> Self {
        Self::with_primary((1..=count as i32).collect())
    }

    /// Set the primary channel scale factor.
    pub fn primary_scale(self, scale: f64) -> Self {
        self.inner.lock().primary_scale = scale;
        self
    }

    /// Disable the validity channel.
    pub fn without_validity(self) -> Self {
        self.inner.lock().with_validity = false;
        self
    }

    /// Report the sample at global index `index` as lost.
    pub fn invalid_sample_at(self, index: usize) -> Self {
        self.inner.lock().invalid_at = Some(index);
        self
    }

    /// Make every read time out.
    pub fn stall_reads(self) -> Self {
        self.inner.lock().stall_reads = true;
        self
    }

    /// Report zero available samples until [`Self::fire_trigger`] is called.
    pub fn hold_trigger(self) -> Self {
        self.inner.lock().hold_trigger = true;
        self
    }

    /// Release a held trigger.
    pub fn fire_trigger(&self) {
        self.inner.lock().hold_trigger = false;
    }

    /// A probe sharing this device's state, for post-run inspection.
    pub fn probe(&self) -> Self {
        self.clone()
    }

    /// How often `advance_block` was invoked.
    pub fn advance_calls(&self) -> usize {
        self.inner.lock().advance_calls
    }

    /// How often `stop` was invoked.
    pub fn stop_calls(&self) -> usize {
        self.inner.lock().stop_calls
    }

    /// How often `close` was invoked.
    pub fn close_calls(&self) -> usize {
        self.inner.lock().close_calls
    }

    /// Ring buffer capacity requested at open, if opened.
    pub fn opened_capacity(&self) -> Option<usize> {
        self.inner.lock().open_capacity
    }
}

impl AcquisitionDevice for MockAcquisition {
    fn open(&mut self, capacity: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.opened = true;
        inner.open_capacity = Some(capacity);
        Ok(())
    }

    fn active_channels(&self) -> Result<Vec<ChannelDescriptor>> {
        let inner = self.inner.lock();
        if !inner.opened {
            return Err(Error::Acquisition("no data acquisition opened".into()));
        }
        let mut channels = vec![ChannelDescriptor {
            kind: ChannelKind::Primary,
            scale_factor: inner.primary_scale,
            unit: "m/s".to_string(),
        }];
        if inner.with_validity {
            channels.push(ChannelDescriptor {
                kind: ChannelKind::Validity,
                scale_factor: 1.0,
                unit: "bool".to_string(),
            });
        }
        Ok(channels)
    }

    fn start(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.opened {
            return Err(Error::Acquisition("no data acquisition opened".into()));
        }
        inner.started = true;
        Ok(())
    }

    fn read(&mut self, requested: usize, timeout: Duration) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.started {
            return Err(Error::Acquisition("acquisition not started".into()));
        }
        if inner.stall_reads {
            return Err(Error::AcquisitionTimeout(timeout));
        }
        let start = inner.cursor;
        let chunk: Vec<i32> = (0..requested)
            .map(|i| inner.primary.get(start + i).copied().unwrap_or(0))
            .collect();
        let validity: Vec<i32> = (0..requested)
            .map(|i| match inner.invalid_at {
                Some(bad) if bad == start + i => 0,
                _ => 1,
            })
            .collect();
        inner.extracted.insert(ChannelKind::Primary, chunk);
        if inner.with_validity {
            inner.extracted.insert(ChannelKind::Validity, validity);
        }
        inner.cursor += requested;
        Ok(())
    }

    fn extracted_count(&self, kind: ChannelKind) -> Result<usize> {
        Ok(self.inner.lock().extracted.get(&kind).map_or(0, Vec::len))
    }

    fn get_samples(&mut self, kind: ChannelKind, count: usize) -> Result<Vec<i32>> {
        let inner = self.inner.lock();
        let samples = inner
            .extracted
            .get(&kind)
            .ok_or_else(|| Error::Acquisition(format!("no extracted data for {kind:?}")))?;
        Ok(samples.iter().take(count).copied().collect())
    }

    fn available(&self) -> Result<usize> {
        let inner = self.inner.lock();
        if !inner.started || inner.hold_trigger {
            return Ok(0);
        }
        Ok(inner.primary.len().saturating_sub(inner.cursor).max(1))
    }

    fn advance_block(&mut self) -> Result<()> {
        self.inner.lock().advance_calls += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.started = false;
        inner.stop_calls += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.opened = false;
        inner.close_calls += 1;
        Ok(())
    }
}

// ============================================================================
// Camera
// ============================================================================

struct CamInner {
    width: usize,
    height: usize,
    disc_radius: usize,
    drift_amplitude: f64,
    never_ready: bool,
    opened: bool,
    grabbing: bool,
    exposure_ms: f64,
    gain_db: f64,
    frame_index: u64,
    rng: StdRng,
}

/// Camera serving synthetic frames of a bright disc drifting around the
/// sensor center.
#[derive(Clone)]
pub struct MockCamera {
    inner: Arc<Mutex<CamInner>>,
}

impl MockCamera {
    /// A camera with the given resolution and target disc radius.
    pub fn new(width: usize, height: usize, disc_radius: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CamInner {
                width,
                height,
                disc_radius,
                drift_amplitude: disc_radius as f64 / 2.0,
                never_ready: false,
                opened: false,
                grabbing: false,
                exposure_ms: 0.0,
                gain_db: 0.0,
                frame_index: 0,
                rng: StdRng::seed_from_u64(0x1dc0ffee),
            })),
        }
    }

    /// Set how far the target drifts from the sensor center, pixels.
    pub fn drift_amplitude(self, pixels: f64) -> Self {
        self.inner.lock().drift_amplitude = pixels;
        self
    }

    /// Make every grab time out, simulating a target that never appears.
    pub fn never_ready(self) -> Self {
        self.inner.lock().never_ready = true;
        self
    }

    /// A probe sharing this camera's state.
    pub fn probe(&self) -> Self {
        self.clone()
    }

    /// How many frames have been served so far.
    pub fn frames_served(&self) -> u64 {
        self.inner.lock().frame_index
    }

    /// The last configured exposure, milliseconds.
    pub fn exposure_ms(&self) -> f64 {
        self.inner.lock().exposure_ms
    }
}

impl FrameSource for MockCamera {
    fn open(&mut self) -> Result<()> {
        self.inner.lock().opened = true;
        Ok(())
    }

    fn set_exposure_ms(&mut self, ms: f64) -> Result<()> {
        self.inner.lock().exposure_ms = ms;
        Ok(())
    }

    fn set_gain_db(&mut self, db: f64) -> Result<()> {
        self.inner.lock().gain_db = db;
        Ok(())
    }

    fn start_latest_only(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.opened {
            return Err(Error::Camera("camera not open".into()));
        }
        inner.grabbing = true;
        Ok(())
    }

    fn retrieve_latest(&mut self, timeout: Duration) -> Result<Frame> {
        let mut inner = self.inner.lock();
        if !inner.grabbing {
            return Err(Error::Camera("camera is not grabbing".into()));
        }
        if inner.never_ready {
            drop(inner);
            std::thread::sleep(timeout);
            return Err(Error::GrabTimeout(timeout));
        }
        let index = inner.frame_index;
        inner.frame_index += 1;

        let (width, height, radius) = (inner.width, inner.height, inner.disc_radius as f64);
        let phase = index as f64 * 0.05;
        let cx = width as f64 / 2.0 + inner.drift_amplitude * phase.sin();
        let cy = height as f64 / 2.0 + inner.drift_amplitude * phase.cos();

        let mut pixels = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                let noise: u8 = inner.rng.gen_range(0..8);
                pixels[y * width + x] = if dx * dx + dy * dy <= radius * radius {
                    230 + noise / 4
                } else {
                    noise
                };
            }
        }
        Ok(Frame {
            index,
            width,
            height,
            pixels,
        })
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.lock().grabbing = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.grabbing = false;
        inner.opened = false;
        Ok(())
    }
}

// ============================================================================
// Mirror
// ============================================================================

struct MirrorInner {
    connected: bool,
    reject_commands: bool,
    positions: Vec<(f64, f64)>,
}

/// Mirror recording every commanded position.
#[derive(Clone)]
pub struct MockMirror {
    inner: Arc<Mutex<MirrorInner>>,
}

impl Default for MockMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMirror {
    /// A mirror that accepts every command.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MirrorInner {
                connected: false,
                reject_commands: false,
                positions: Vec::new(),
            })),
        }
    }

    /// Reject every positioning command with an actuator error.
    pub fn reject_commands(self) -> Self {
        self.inner.lock().reject_commands = true;
        self
    }

    /// A probe sharing this mirror's state.
    pub fn probe(&self) -> Self {
        self.clone()
    }

    /// Every commanded position, in order.
    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.inner.lock().positions.clone()
    }
}

impl SteeringMirror for MockMirror {
    fn connect(&mut self) -> Result<()> {
        self.inner.lock().connected = true;
        Ok(())
    }

    fn set_position(&mut self, x: f64, y: f64) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.connected {
            return Err(Error::Actuator("mirror not connected".into()));
        }
        if inner.reject_commands {
            return Err(Error::Actuator("command rejected".into()));
        }
        inner.positions.push((x, y));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_serves_chunks_in_order() {
        let mut device = MockAcquisition::ramp(6);
        device.open(6).unwrap();
        device.start().unwrap();
        device.read(4, Duration::from_millis(10)).unwrap();
        assert_eq!(device.extracted_count(ChannelKind::Primary).unwrap(), 4);
        assert_eq!(
            device.get_samples(ChannelKind::Primary, 4).unwrap(),
            vec![1, 2, 3, 4]
        );
        device.read(2, Duration::from_millis(10)).unwrap();
        assert_eq!(
            device.get_samples(ChannelKind::Primary, 2).unwrap(),
            vec![5, 6]
        );
    }

    #[test]
    fn test_acquisition_flags_injected_loss() {
        let mut device = MockAcquisition::ramp(4).invalid_sample_at(2);
        device.open(4).unwrap();
        device.start().unwrap();
        device.read(4, Duration::from_millis(10)).unwrap();
        assert_eq!(
            device.get_samples(ChannelKind::Validity, 4).unwrap(),
            vec![1, 1, 0, 1]
        );
    }

    #[test]
    fn test_camera_renders_target_near_center() {
        let mut camera = MockCamera::new(64, 48, 6).drift_amplitude(0.0);
        camera.open().unwrap();
        camera.start_latest_only().unwrap();
        let frame = camera.retrieve_latest(Duration::from_millis(5)).unwrap();
        assert!(frame.get(32, 24) > 200);
        assert!(frame.get(2, 2) < 32);
    }

    #[test]
    fn test_mirror_requires_connect() {
        let mut mirror = MockMirror::new();
        assert!(mirror.set_position(0.0, 0.0).is_err());
        mirror.connect().unwrap();
        mirror.set_position(0.1, -0.2).unwrap();
        assert_eq!(mirror.probe().positions(), vec![(0.1, -0.2)]);
    }
}
