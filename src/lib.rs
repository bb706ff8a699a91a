//! Core library for the beamlock bench controller.
//!
//! Beamlock keeps a laser locked on a moving target by closing a loop from a
//! camera, through template matching, to a fast steering mirror, while a
//! vibrometer front end acquires scaled velocity samples in chunks. The
//! library holds the hardware traits, the three worker loops, and the run
//! coordinator that wires them together; the binary supplies a mock bench.

pub mod acquisition;
pub mod config;
pub mod core;
pub mod error;
pub mod hardware;
pub mod run;
pub mod steering;
pub mod storage;
pub mod sync;
pub mod tracking;
pub mod vision;

pub use config::Settings;
pub use error::{Error, Result};
pub use run::{execute, RunReport};
pub use sync::{StopReason, StopSignal};
