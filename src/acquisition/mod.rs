//! The acquisition session: configuration, channel set, and the chunked
//! read engine.

pub mod engine;
pub mod session;

pub use engine::{AcquisitionEngine, EngineReport, EngineState};
pub use session::{Channel, SessionConfig};
