//! Runtime configuration for the pixel delivery core (spec §6, component
//! C9's configuration half). The CLI/env surface lives in the binary crate;
//! this crate owns the validated domain type everything else consumes.

use std::path::PathBuf;
use std::time::Duration;

use core_correction::{ChannelOrder, CorrectionConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("width and height must both be non-zero")]
    ZeroDimension,
    #[error("max_fps must be >= 0")]
    NegativeMaxFps,
    #[error("invalid channel order: {0}")]
    ChannelOrder(#[from] core_correction::CorrectionError),
}

/// Raw, unvalidated values as they arrive from flags/env (spec §6). Every
/// field mirrors a CLI flag / environment variable of the same purpose.
#[derive(Debug, Clone)]
pub struct RawConfig {
    pub host: String,
    pub port: u16,
    pub width: usize,
    pub height: usize,
    pub model: String,
    pub max_fps: f64,
    pub frame_timeout_ms: u64,
    pub batch_limit: usize,
    pub duration_sec: u64,
    pub gamma: Option<f32>,
    pub channel_order: String,
    pub channel_gains: (f32, f32, f32),
    pub mapping_csv: Option<PathBuf>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4049,
            width: 90,
            height: 50,
            model: "Light_Wall".to_string(),
            max_fps: 20.0,
            frame_timeout_ms: 100,
            batch_limit: 200,
            duration_sec: 0,
            gamma: None,
            channel_order: "RGB".to_string(),
            channel_gains: (1.0, 1.0, 1.0),
            mapping_csv: None,
        }
    }
}

/// Validated, immutable configuration shared by every runtime component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub width: usize,
    pub height: usize,
    pub model: String,
    /// 0 disables pacing (spec §6).
    pub max_fps: f64,
    pub frame_timeout: Duration,
    pub batch_limit: usize,
    /// `None` means unlimited, matching spec §9 ambiguity (b): "`duration_sec`
    /// of 0 means unlimited."
    pub duration: Option<Duration>,
    pub correction: CorrectionConfig,
    pub mapping_csv: Option<PathBuf>,
}

impl AppConfig {
    pub fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.width == 0 || raw.height == 0 {
            return Err(ConfigError::ZeroDimension);
        }
        if raw.max_fps < 0.0 {
            return Err(ConfigError::NegativeMaxFps);
        }
        let order: ChannelOrder = raw.channel_order.parse()?;
        let correction = CorrectionConfig::new(
            raw.gamma,
            [raw.channel_gains.0, raw.channel_gains.1, raw.channel_gains.2],
            order,
        );

        Ok(Self {
            host: raw.host,
            port: raw.port,
            width: raw.width,
            height: raw.height,
            model: raw.model,
            max_fps: raw.max_fps,
            frame_timeout: Duration::from_millis(raw.frame_timeout_ms),
            batch_limit: raw.batch_limit,
            duration: if raw.duration_sec == 0 {
                None
            } else {
                Some(Duration::from_secs(raw.duration_sec))
            },
            correction,
            mapping_csv: raw.mapping_csv,
        })
    }

    pub fn frame_size_bytes(&self) -> usize {
        self.width * self.height * 3
    }

    pub fn total_leds(&self) -> usize {
        self.width * self.height
    }

    /// FPP shared-memory path for this model (spec §6).
    pub fn overlay_path(&self) -> PathBuf {
        PathBuf::from(format!(
            "/dev/shm/FPP-Model-Data-{}",
            self.model.replace(' ', "_")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_successfully() {
        let cfg = AppConfig::validate(RawConfig::default()).unwrap();
        assert_eq!(cfg.frame_size_bytes(), 90 * 50 * 3);
        assert_eq!(cfg.duration, None);
        assert!(cfg.correction.is_identity());
    }

    #[test]
    fn zero_duration_means_unlimited() {
        let raw = RawConfig {
            duration_sec: 0,
            ..RawConfig::default()
        };
        let cfg = AppConfig::validate(raw).unwrap();
        assert!(cfg.duration.is_none());
    }

    #[test]
    fn nonzero_duration_is_bounded() {
        let raw = RawConfig {
            duration_sec: 30,
            ..RawConfig::default()
        };
        let cfg = AppConfig::validate(raw).unwrap();
        assert_eq!(cfg.duration, Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let raw = RawConfig {
            width: 0,
            ..RawConfig::default()
        };
        assert!(matches!(
            AppConfig::validate(raw),
            Err(ConfigError::ZeroDimension)
        ));
    }

    #[test]
    fn overlay_path_replaces_spaces() {
        let raw = RawConfig {
            model: "Light Wall".to_string(),
            ..RawConfig::default()
        };
        let cfg = AppConfig::validate(raw).unwrap();
        assert_eq!(
            cfg.overlay_path(),
            PathBuf::from("/dev/shm/FPP-Model-Data-Light_Wall")
        );
    }

    #[test]
    fn bad_channel_order_is_rejected() {
        let raw = RawConfig {
            channel_order: "XYZ".to_string(),
            ..RawConfig::default()
        };
        assert!(AppConfig::validate(raw).is_err());
    }
}
