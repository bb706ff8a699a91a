//! Core data types shared across the tracking and acquisition pipelines.
//!
//! # Data Flow
//!
//! ```text
//! FrameSource --[Frame]--> TrackingLoop --[MirrorCommand]--> mirror worker
//! AcquisitionDevice --[raw i32 chunks]--> AcquisitionEngine --[ResultBlock]--> storage
//! ```
//!
//! Frames are ephemeral: one is consumed per tracking iteration and never
//! persisted. Result blocks are the only data that outlives the run.

use serde::{Deserialize, Serialize};

/// One camera frame: a row-major grayscale sample grid plus its capture order.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Capture order index assigned by the frame source.
    pub index: u64,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Row-major 8-bit samples, `width * height` long.
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Sample value at `(x, y)`. Callers must stay in bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * self.width + x]
    }
}

/// A sub-pixel point in frame coordinates.
///
/// Used both for the fixed reference point (where the beam lands when the
/// mirror is homed) and for template match centers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelPoint {
    /// Horizontal coordinate, pixels.
    pub x: f64,
    /// Vertical coordinate, pixels.
    pub y: f64,
}

impl PixelPoint {
    /// Construct a point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The fixed enumerated set of channel kinds a session can carry.
///
/// Resolved once when the session opens; availability is a capability of the
/// device, not a dynamic lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// The measured quantity itself (velocity for an LDV).
    Primary,
    /// Boolean per-sample trustworthiness flag; false on loss or overrun.
    Validity,
    /// Any additional data channel (displacement, RSSI, ...).
    Secondary,
}

impl ChannelKind {
    /// Whether samples of this kind contribute to the persisted output.
    pub fn is_data(self) -> bool {
        !matches!(self, ChannelKind::Validity)
    }
}

/// Scale factor and unit for one active channel, frozen at session open.
#[derive(Clone, Debug)]
pub struct ChannelDescriptor {
    /// Which channel this describes.
    pub kind: ChannelKind,
    /// Multiplier converting raw device counts to `unit`.
    pub scale_factor: f64,
    /// Physical unit of the scaled samples (SI notation).
    pub unit: String,
}

/// Ordered scaled samples for one completed logical block.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultBlock {
    /// Zero-based block index within the run.
    pub index: usize,
    /// Scaled samples in acquisition order.
    pub samples: Vec<f64>,
}

impl ResultBlock {
    /// An empty block with the given index.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            samples: Vec::new(),
        }
    }

    /// Number of scaled samples in this block.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the block holds no samples yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Acquisition session mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// Continuous stream, delivered as one pseudo-block of the requested count.
    Streaming,
    /// Gated block mode: `block_count` blocks of `block_size` base samples.
    Block,
}

/// Trigger gating each block in block mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// No trigger; blocks start as soon as data flows.
    None,
    /// Analog level trigger.
    Analog,
    /// External digital trigger.
    External,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_indexing() {
        let frame = Frame {
            index: 0,
            width: 3,
            height: 2,
            pixels: vec![0, 1, 2, 3, 4, 5],
        };
        assert_eq!(frame.get(2, 0), 2);
        assert_eq!(frame.get(0, 1), 3);
    }

    #[test]
    fn test_channel_kind_data() {
        assert!(ChannelKind::Primary.is_data());
        assert!(ChannelKind::Secondary.is_data());
        assert!(!ChannelKind::Validity.is_data());
    }
}
