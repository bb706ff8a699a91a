//! The acquisition engine: a small protocol state machine over the device.
//!
//! ```text
//! Closed -> Open -> Running -> (streaming:  ReadingChunk*)
//!                              (block mode: WaitingTrigger -> ReadingChunk* -> BlockDone -> ...)
//!        -> Finished -> Stopped -> Closed
//! ```
//!
//! Each logical block is filled by one or more chunk reads. After every read
//! the validity channel is checked first; only then is the chunk scaled and
//! appended, so a lost transport unit never leaves a partial chunk in the
//! block. Completed blocks are pushed to the result buffer at `BlockDone`; a
//! block interrupted by a stop or an error is discarded with a log line,
//! completed blocks are always handed off.
//!
//! The device handle is stopped and closed exactly once on every exit path,
//! including error paths.

use crate::core::{AcquisitionMode, ChannelKind, ResultBlock, TriggerMode};
use crate::error::{Error, Result};
use crate::hardware::AcquisitionDevice;
use crate::acquisition::session::{Channel, SessionConfig};
use crate::sync::{Slot, StopSignal};
use log::{debug, info, warn};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the trigger wait sleeps between polls of the ring buffer.
const TRIGGER_POLL: Duration = Duration::from_millis(10);

/// Engine protocol state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No device handle held.
    Closed,
    /// Handle acquired, ring buffer allocated.
    Open,
    /// Device filling the ring buffer.
    Running,
    /// Blocked until the external trigger produces at least one sample.
    WaitingTrigger,
    /// One chunk read in flight.
    ReadingChunk,
    /// A logical block completed.
    BlockDone,
    /// All requested blocks acquired.
    Finished,
    /// Acquisition stopped, handle still held.
    Stopped,
}

/// What the engine thread hands back: the accumulated result buffer plus the
/// reason it stopped. Failure crosses the thread boundary as data, never as a
/// panic.
#[derive(Debug)]
pub struct EngineReport {
    /// Every completed block, in order.
    pub blocks: Vec<ResultBlock>,
    /// `Ok` when all requested blocks completed, the fatal error otherwise.
    pub outcome: Result<()>,
}

/// Chunked-read acquisition engine. Sole owner of the device handle.
pub struct AcquisitionEngine<D: AcquisitionDevice> {
    device: D,
    session: SessionConfig,
    channels: Vec<Channel>,
    state: EngineState,
    blocks: Vec<ResultBlock>,
    stop: StopSignal,
}

impl<D: AcquisitionDevice + 'static> AcquisitionEngine<D> {
    /// An engine in the `Closed` state.
    pub fn new(device: D, session: SessionConfig, stop: StopSignal) -> Self {
        Self {
            device,
            session,
            channels: Vec::new(),
            state: EngineState::Closed,
            blocks: Vec::new(),
            stop,
        }
    }

    /// Spawn the engine on its own thread; the report arrives in `report`
    /// (clear-then-put) when the engine exits.
    pub fn spawn(self, report: Slot<EngineReport>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("acq-engine".into())
            .spawn(move || report.put(self.run()))
    }

    /// Run the session to completion, stop, or failure.
    pub fn run(mut self) -> EngineReport {
        let outcome = self.acquire();
        self.release();
        if let Err(err) = &outcome {
            warn!("acquisition engine stopped: {err}");
        }
        EngineReport {
            blocks: std::mem::take(&mut self.blocks),
            outcome,
        }
    }

    /// Current protocol state (exposed for tests).
    pub fn state(&self) -> EngineState {
        self.state
    }

    fn transition(&mut self, next: EngineState) {
        debug!("engine state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn acquire(&mut self) -> Result<()> {
        let capacity = self.session.buffer_capacity();
        self.device.open(capacity)?;
        self.transition(EngineState::Open);

        // The channel set is fixed for the whole session; scale factors and
        // units are frozen here.
        self.channels = self
            .device
            .active_channels()?
            .into_iter()
            .map(Channel::from_descriptor)
            .collect();
        if !self.channels.iter().any(|c| c.kind.is_data()) {
            return Err(Error::Configuration("no active data channels".into()));
        }
        info!(
            "session open: {:?}, {} block(s) of {} base samples, chunk {}, {} channel(s)",
            self.session.mode,
            self.session.block_count,
            self.session.block_size,
            self.session.chunk_size,
            self.channels.len()
        );

        self.device.start()?;
        self.transition(EngineState::Running);

        for block_index in 0..self.session.block_count {
            if self.stop.is_requested() {
                info!("stop requested, {} of {} blocks acquired", block_index, self.session.block_count);
                return Ok(());
            }
            if self.session.mode == AcquisitionMode::Block && self.session.trigger != TriggerMode::None
            {
                if !self.wait_for_trigger()? {
                    return Ok(());
                }
            }
            if !self.acquire_block(block_index)? {
                return Ok(());
            }
            // Never advance past the final block.
            if self.session.mode == AcquisitionMode::Block
                && block_index + 1 < self.session.block_count
            {
                self.device.advance_block()?;
            }
        }

        self.transition(EngineState::Finished);
        info!("acquisition complete: {} block(s)", self.blocks.len());
        Ok(())
    }

    /// Block until the trigger produces at least one sample or a stop is
    /// requested. Returns whether the trigger fired.
    ///
    /// There is no timeout by design: an external trigger may never fire, and
    /// cancellation is composed in explicitly via the stop signal.
    fn wait_for_trigger(&mut self) -> Result<bool> {
        self.transition(EngineState::WaitingTrigger);
        info!("waiting for {:?} trigger...", self.session.trigger);
        loop {
            if self.stop.is_requested() {
                return Ok(false);
            }
            if self.device.available()? > 0 {
                return Ok(true);
            }
            thread::sleep(TRIGGER_POLL);
        }
    }

    /// Fill one logical block chunk by chunk. Returns whether the block
    /// completed (false means a stop interrupted it).
    fn acquire_block(&mut self, block_index: usize) -> Result<bool> {
        let mut block = ResultBlock::new(block_index);
        let mut written = 0usize;
        while written < self.session.block_size {
            if self.stop.is_requested() {
                // The in-flight chunk already completed; drop the partial block.
                info!(
                    "stop requested mid-block, discarding partial block {} ({} of {} base samples)",
                    block_index, written, self.session.block_size
                );
                return Ok(false);
            }
            let requested = self.session.chunk_size.min(self.session.block_size - written);
            self.read_chunk(requested, &mut block)?;
            written += requested;
        }
        self.transition(EngineState::BlockDone);
        debug!("block {} done: {} scaled samples", block_index, block.len());
        self.blocks.push(block);
        Ok(true)
    }

    /// One chunk read: extract every active channel, check validity, then
    /// scale and append.
    fn read_chunk(&mut self, requested: usize, block: &mut ResultBlock) -> Result<()> {
        self.transition(EngineState::ReadingChunk);
        self.device.read(requested, self.session.read_timeout)?;

        // Copy exactly the reported extracted count per channel, overwriting
        // each channel's buffer.
        for channel in &mut self.channels {
            let count = self.device.extracted_count(channel.kind)?;
            channel.samples = self.device.get_samples(channel.kind, count)?;
        }

        // Validity first: a single false sample invalidates cross-channel
        // alignment for the whole chunk, so nothing of it may be appended.
        if let Some(validity) = self.channels.iter().find(|c| c.kind == ChannelKind::Validity)
        {
            if validity.samples.iter().any(|&sample| sample == 0) {
                return Err(Error::DataLoss);
            }
        }

        let positions = self
            .channels
            .iter()
            .filter(|c| c.kind.is_data())
            .map(|c| c.samples.len())
            .max()
            .unwrap_or(0);
        for position in 0..positions {
            for channel in self.channels.iter().filter(|c| c.kind.is_data()) {
                if let Some(&raw) = channel.samples.get(position) {
                    block.samples.push(f64::from(raw) * channel.scale_factor);
                }
            }
        }
        Ok(())
    }

    /// Stop and close the device exactly once, tolerating device errors.
    fn release(&mut self) {
        if self.state == EngineState::Closed {
            return;
        }
        if self.state != EngineState::Open {
            self.transition(EngineState::Stopped);
            if let Err(err) = self.device.stop() {
                warn!("device stop failed: {err}");
            }
        }
        if let Err(err) = self.device.close() {
            warn!("device close failed: {err}");
        }
        self.transition(EngineState::Closed);
    }
}
