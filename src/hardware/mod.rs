//! Collaborator traits for the three hardware handles.
//!
//! Each handle has exactly one owner: the camera lives in the tracking loop,
//! the mirror in its worker thread, the acquisition handle in the engine. The
//! traits are synchronous because each owner is a dedicated OS thread; a stall
//! in one collaborator (an acquisition blocked on a trigger, say) cannot stall
//! frame capture.
//!
//! Vendor transports are out of scope; [`mock`] provides in-tree
//! implementations for tests and the demo binary.

pub mod mock;

use crate::core::{ChannelDescriptor, ChannelKind, Frame};
use crate::error::Result;
use std::time::Duration;

/// The data acquisition collaborator (a Polytec-style vibrometer front end).
///
/// Lifecycle: `open` sizes the device ring buffer, `start` begins filling it,
/// `read` moves one chunk into the extraction buffers, `get_samples` copies a
/// channel's extracted samples out, `advance_block` steps to the next logical
/// block, `stop`/`close` release the handle.
pub trait AcquisitionDevice: Send {
    /// Acquire a handle with a ring buffer of `capacity` base samples.
    fn open(&mut self, capacity: usize) -> Result<()>;

    /// The active channel set with scale factors and units, frozen for the
    /// session at open time.
    fn active_channels(&self) -> Result<Vec<ChannelDescriptor>>;

    /// Start acquiring into the ring buffer.
    fn start(&mut self) -> Result<()>;

    /// Move `requested` base samples into the extraction buffers, waiting at
    /// most `timeout`. Fails with [`crate::Error::AcquisitionTimeout`] when the
    /// samples do not arrive in time.
    fn read(&mut self, requested: usize, timeout: Duration) -> Result<()>;

    /// Sample count extracted for `kind` by the last `read`.
    fn extracted_count(&self, kind: ChannelKind) -> Result<usize>;

    /// Copy `count` extracted raw samples for `kind`.
    fn get_samples(&mut self, kind: ChannelKind, count: usize) -> Result<Vec<i32>>;

    /// Base samples currently available in the ring buffer (trigger wait).
    fn available(&self) -> Result<usize>;

    /// Advance to the next logical block (block mode only).
    fn advance_block(&mut self) -> Result<()>;

    /// Stop acquiring.
    fn stop(&mut self) -> Result<()>;

    /// Release the handle.
    fn close(&mut self) -> Result<()>;
}

/// The camera collaborator.
pub trait FrameSource: Send {
    /// Open the device.
    fn open(&mut self) -> Result<()>;

    /// Set exposure time in milliseconds.
    fn set_exposure_ms(&mut self, ms: f64) -> Result<()>;

    /// Set analog gain in dB.
    fn set_gain_db(&mut self, db: f64) -> Result<()>;

    /// Start continuous grabbing with a latest-image-only strategy: older
    /// unconsumed frames are discarded so retrieval never falls behind.
    fn start_latest_only(&mut self) -> Result<()>;

    /// Retrieve the freshest frame, waiting at most `timeout`. Fails with
    /// [`crate::Error::GrabTimeout`] when no frame arrives in time.
    fn retrieve_latest(&mut self, timeout: Duration) -> Result<Frame>;

    /// Stop grabbing.
    fn stop(&mut self) -> Result<()>;

    /// Release the device.
    fn close(&mut self) -> Result<()>;
}

/// The steering mirror collaborator (an optoMDC-style 2-axis MEMS mirror).
pub trait SteeringMirror: Send {
    /// Connect and configure both axes for X/Y control.
    fn connect(&mut self) -> Result<()>;

    /// Command the mirror to `(x, y)` in normalized, dimensionless units.
    fn set_position(&mut self, x: f64, y: f64) -> Result<()>;
}
