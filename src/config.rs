//! Run configuration loaded via Figment.
//!
//! Configuration is layered from:
//! 1. Built-in defaults (the crate runs with no file present)
//! 2. A TOML file (`beamlock.toml` by default)
//! 3. Environment variables prefixed with `BEAMLOCK_` (`__` separates levels)
//!
//! # Example
//!
//! ```text
//! BEAMLOCK_RUN__TIME_LIMIT=30s
//! BEAMLOCK_ACQUISITION__SAMPLE_COUNT=262144
//! BEAMLOCK_STEERING__GAIN_X=5e-5
//! ```
//!
//! Semantic validation happens in [`Settings::validate`] and in
//! [`crate::acquisition::SessionConfig::from_settings`], always before any
//! hardware I/O.

use crate::core::{AcquisitionMode, TriggerMode};
use crate::error::{Error, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Run lifecycle settings.
    pub run: RunConfig,
    /// Camera collaborator settings.
    pub camera: CameraConfig,
    /// Template matching settings.
    pub tracking: TrackingConfig,
    /// Steering law gains.
    pub steering: SteeringConfig,
    /// Acquisition session settings.
    pub acquisition: AcquisitionConfig,
}

/// Run lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Wall-clock limit after which tracking requests a stop.
    #[serde(with = "humantime_serde")]
    pub time_limit: Duration,
    /// Write attempts per result block before the run fails.
    pub persist_attempts: u32,
    /// Directory for persisted result blocks.
    pub data_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(10),
            persist_attempts: 3,
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Camera collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Sensor width in pixels.
    pub width: usize,
    /// Sensor height in pixels.
    pub height: usize,
    /// Exposure time in milliseconds.
    pub exposure_ms: f64,
    /// Analog gain in dB.
    pub gain_db: f64,
    /// Bounded wait for one frame grab, milliseconds.
    pub grab_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 360,
            height: 270,
            exposure_ms: 1.5,
            gain_db: 18.0,
            grab_timeout_ms: 5,
        }
    }
}

/// Template matching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Radius of the disc template, pixels, sized to the target silhouette.
    pub template_radius: usize,
    /// Fraction of each frame edge excluded from the search region.
    pub search_margin: f64,
    /// Reference point override; defaults to the frame center when absent.
    pub reference_x: Option<f64>,
    /// See `reference_x`.
    pub reference_y: Option<f64>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            template_radius: 60,
            search_margin: 0.0,
            reference_x: None,
            reference_y: None,
        }
    }
}

/// Steering law gains, normalized mirror units per pixel of error.
///
/// Empirically tuned; stability is a calibration concern, not a correctness
/// one. Tune conservatively to avoid oscillation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Horizontal gain.
    pub gain_x: f64,
    /// Vertical gain.
    pub gain_y: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        // 0.01 / 126 / 10 * 5, carried over from bench calibration.
        Self {
            gain_x: 3.968e-5,
            gain_y: 3.968e-5,
        }
    }
}

/// Acquisition session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Streaming or gated block mode.
    pub mode: AcquisitionMode,
    /// Base samples to acquire in streaming mode.
    pub sample_count: usize,
    /// Base samples per block in block mode.
    pub block_size: usize,
    /// Number of blocks in block mode. Zero (unbounded) is rejected.
    pub block_count: usize,
    /// Base samples requested per read call.
    pub chunk_size: usize,
    /// Bounded wait for one chunk read, milliseconds.
    pub read_timeout_ms: u64,
    /// Trigger gating each block in block mode.
    pub trigger: TriggerMode,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            mode: AcquisitionMode::Streaming,
            sample_count: 1 << 17,
            block_size: 10_000,
            block_count: 3,
            chunk_size: 250,
            read_timeout_ms: 2_000,
            trigger: TriggerMode::None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            camera: CameraConfig::default(),
            tracking: TrackingConfig::default(),
            steering: SteeringConfig::default(),
            acquisition: AcquisitionConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional TOML file, and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        figment = match path {
            Some(path) => figment.merge(Toml::file_exact(path)),
            None => figment.merge(Toml::file("beamlock.toml")),
        };
        let settings: Settings = figment
            .merge(Env::prefixed("BEAMLOCK_").split("__"))
            .extract()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that parse but are logically invalid.
    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(Error::Configuration(
                "camera resolution must be non-zero".into(),
            ));
        }
        if self.camera.exposure_ms <= 0.0 {
            return Err(Error::Configuration(
                "camera exposure must be positive".into(),
            ));
        }
        if self.tracking.template_radius == 0 {
            return Err(Error::Configuration(
                "template radius must be non-zero".into(),
            ));
        }
        if !(0.0..0.5).contains(&self.tracking.search_margin) {
            return Err(Error::Configuration(format!(
                "search margin {} outside [0, 0.5)",
                self.tracking.search_margin
            )));
        }
        if self.run.persist_attempts == 0 {
            return Err(Error::Configuration(
                "persist_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Bounded wait for one frame grab.
    pub fn grab_timeout(&self) -> Duration {
        Duration::from_millis(self.camera.grab_timeout_ms)
    }

    /// Bounded wait for one chunk read.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.acquisition.read_timeout_ms)
    }

    /// The reference point: configured override, else the frame center.
    pub fn reference_point(&self) -> crate::core::PixelPoint {
        crate::core::PixelPoint::new(
            self.tracking
                .reference_x
                .unwrap_or(self.camera.width as f64 / 2.0),
            self.tracking
                .reference_y
                .unwrap_or(self.camera.height as f64 / 2.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.acquisition.sample_count, 131_072);
        assert_eq!(settings.run.time_limit, Duration::from_secs(10));
    }

    #[test]
    fn test_reference_defaults_to_frame_center() {
        let settings = Settings::default();
        let reference = settings.reference_point();
        assert_eq!(reference.x, settings.camera.width as f64 / 2.0);
        assert_eq!(reference.y, settings.camera.height as f64 / 2.0);
    }

    #[test]
    fn test_rejects_bad_margin() {
        let mut settings = Settings::default();
        settings.tracking.search_margin = 0.5;
        assert!(matches!(
            settings.validate(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_zero_exposure() {
        let mut settings = Settings::default();
        settings.camera.exposure_ms = 0.0;
        assert!(settings.validate().is_err());
    }
}
