//! Session parameters and the per-session channel set.

use crate::config::AcquisitionConfig;
use crate::core::{AcquisitionMode, ChannelDescriptor, ChannelKind, TriggerMode};
use crate::error::{Error, Result};
use std::time::Duration;

/// Validated, immutable parameters for one acquisition session.
///
/// Streaming mode is normalized to a single pseudo-block covering the whole
/// requested sample count, so the engine runs one block loop for both modes.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Streaming or gated block mode.
    pub mode: AcquisitionMode,
    /// Base samples per logical block.
    pub block_size: usize,
    /// Logical block count (1 for streaming).
    pub block_count: usize,
    /// Base samples requested per read call.
    pub chunk_size: usize,
    /// Bounded wait for one chunk read.
    pub read_timeout: Duration,
    /// Trigger gating each block in block mode.
    pub trigger: TriggerMode,
}

impl SessionConfig {
    /// Validate raw settings into a session. Surfaced before any hardware I/O.
    pub fn from_settings(settings: &AcquisitionConfig) -> Result<Self> {
        if settings.chunk_size == 0 {
            return Err(Error::Configuration("chunk_size must be non-zero".into()));
        }
        let (block_size, block_count) = match settings.mode {
            AcquisitionMode::Streaming => {
                if settings.sample_count == 0 {
                    return Err(Error::Configuration(
                        "sample_count is mandatory for streaming".into(),
                    ));
                }
                (settings.sample_count, 1)
            }
            AcquisitionMode::Block => {
                if settings.block_count == 0 {
                    return Err(Error::Configuration(
                        "endless block mode (block_count=0) is not supported".into(),
                    ));
                }
                if settings.block_size == 0 {
                    return Err(Error::Configuration("block_size must be non-zero".into()));
                }
                (settings.block_size, settings.block_count)
            }
        };
        Ok(Self {
            mode: settings.mode,
            block_size,
            block_count,
            chunk_size: settings.chunk_size,
            read_timeout: Duration::from_millis(settings.read_timeout_ms),
            trigger: settings.trigger,
        })
    }

    /// Ring buffer capacity to open the device with.
    ///
    /// Streaming must buffer the whole requested count in case real-time
    /// draining is not guaranteed; block mode drains incrementally, so a small
    /// multiple of the chunk size suffices.
    pub fn buffer_capacity(&self) -> usize {
        match self.mode {
            AcquisitionMode::Streaming => self.block_size,
            AcquisitionMode::Block => 10 * self.chunk_size,
        }
    }

    /// Total base samples over all blocks.
    pub fn total_samples(&self) -> usize {
        self.block_size * self.block_count
    }
}

/// One active acquisition channel with its per-chunk extraction buffer.
///
/// The buffer is overwritten (not appended) on every chunk read, and is never
/// read while a read is in flight.
#[derive(Clone, Debug)]
pub struct Channel {
    /// Which channel this is.
    pub kind: ChannelKind,
    /// Multiplier converting raw counts to `unit`.
    pub scale_factor: f64,
    /// Physical unit of the scaled samples.
    pub unit: String,
    /// Raw samples extracted by the last chunk read.
    pub samples: Vec<i32>,
}

impl Channel {
    /// A channel with an empty buffer, frozen from its descriptor.
    pub fn from_descriptor(descriptor: ChannelDescriptor) -> Self {
        Self {
            kind: descriptor.kind,
            scale_factor: descriptor.scale_factor,
            unit: descriptor.unit,
            samples: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_settings() -> AcquisitionConfig {
        AcquisitionConfig {
            mode: AcquisitionMode::Block,
            block_size: 100,
            block_count: 3,
            chunk_size: 30,
            ..AcquisitionConfig::default()
        }
    }

    #[test]
    fn test_streaming_normalizes_to_pseudo_block() {
        let mut settings = AcquisitionConfig::default();
        settings.sample_count = 4096;
        let session = SessionConfig::from_settings(&settings).unwrap();
        assert_eq!(session.block_count, 1);
        assert_eq!(session.block_size, 4096);
        assert_eq!(session.buffer_capacity(), 4096);
    }

    #[test]
    fn test_block_capacity_is_chunk_multiple() {
        let session = SessionConfig::from_settings(&block_settings()).unwrap();
        assert_eq!(session.buffer_capacity(), 300);
        assert_eq!(session.total_samples(), 300);
    }

    #[test]
    fn test_rejects_unbounded_block_count() {
        let mut settings = block_settings();
        settings.block_count = 0;
        assert!(matches!(
            SessionConfig::from_settings(&settings),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_zero_streaming_count() {
        let mut settings = AcquisitionConfig::default();
        settings.sample_count = 0;
        assert!(SessionConfig::from_settings(&settings).is_err());
    }
}
