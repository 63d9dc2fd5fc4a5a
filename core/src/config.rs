//! Estimator configuration and its file formats.
//!
//! Configuration is fixed at startup. [`EstimatorConfig::validate`] must pass before any
//! cycle runs; [`crate::estimator::Estimator::new`] calls it for you.
//!
//! Configurations can be stored as JSON, YAML or TOML; the format is chosen from the file
//! extension:
//!
//! ```rust,no_run
//! use posefilter::config::EstimatorConfig;
//!
//! let cfg = EstimatorConfig { seed: Some(7), ..EstimatorConfig::default() };
//! cfg.to_file("estimator.toml").unwrap();
//! let loaded = EstimatorConfig::from_file("estimator.toml").unwrap();
//! assert_eq!(cfg, loaded);
//! ```

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::{FilterError, Result};

pub const DEFAULT_NUM_PARTICLES: usize = 100;
pub const DEFAULT_PROCESS_NOISE_STD: f64 = 0.5;
pub const DEFAULT_MEASUREMENT_NOISE_STD: f64 = 0.5;
pub const DEFAULT_RATE_HZ: f64 = 20.0;

/// How the spread parameter of the reseeding normal distribution is derived from the
/// variance of the accepted particles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReseedSpread {
    /// The variance itself is used as the standard deviation of the reseeding distribution.
    /// This is how the estimator has been tuned.
    #[default]
    Variance,
    /// The square root of the variance is used as the standard deviation.
    StandardDeviation,
}

impl ReseedSpread {
    pub fn std_dev(&self, variance: f64) -> f64 {
        match self {
            ReseedSpread::Variance => variance,
            ReseedSpread::StandardDeviation => variance.sqrt(),
        }
    }
}

/// Parameters of a single particle filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of particles P, constant for the life of the filter
    pub num_particles: usize,
    /// Process noise standard deviation σ_R
    pub process_noise_std: f64,
    /// Measurement noise standard deviation σ_Q
    pub measurement_noise_std: f64,
    /// Lower bound of the uniform initial spawn range
    pub spawn_low: f64,
    /// Upper bound (exclusive) of the uniform initial spawn range
    pub spawn_high: f64,
    pub reseed_spread: ReseedSpread,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: DEFAULT_NUM_PARTICLES,
            process_noise_std: DEFAULT_PROCESS_NOISE_STD,
            measurement_noise_std: DEFAULT_MEASUREMENT_NOISE_STD,
            spawn_low: -1.0,
            spawn_high: 1.0,
            reseed_spread: ReseedSpread::default(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(FilterError::InvalidConfiguration(
                "num_particles must be greater than zero".to_string(),
            ));
        }
        if !(self.process_noise_std > 0.0 && self.process_noise_std.is_finite()) {
            return Err(FilterError::InvalidConfiguration(format!(
                "process_noise_std must be positive and finite, got {}",
                self.process_noise_std
            )));
        }
        if !(self.measurement_noise_std > 0.0 && self.measurement_noise_std.is_finite()) {
            return Err(FilterError::InvalidConfiguration(format!(
                "measurement_noise_std must be positive and finite, got {}",
                self.measurement_noise_std
            )));
        }
        if !(self.spawn_low < self.spawn_high
            && self.spawn_low.is_finite()
            && self.spawn_high.is_finite())
        {
            return Err(FilterError::InvalidConfiguration(format!(
                "spawn range [{}, {}) is empty or not finite",
                self.spawn_low, self.spawn_high
            )));
        }
        Ok(())
    }
}

/// Which state dimensions are filtered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Only the x component.
    #[default]
    Scalar,
    /// Independent filters for x, y and yaw.
    Planar,
}

/// Where the motion model takes its heading from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingSource {
    /// Yaw reported by odometry.
    #[default]
    Odometry,
    /// Yaw of the external pose reading.
    Pose,
}

/// Top-level estimator configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Cycle rate of the fixed-rate loop (Hz)
    pub rate_hz: f64,
    /// Seed for the shared random engine; `None` seeds from OS entropy
    pub seed: Option<u64>,
    pub mode: TrackingMode,
    pub heading_source: HeadingSource,
    pub filter: FilterConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            rate_hz: DEFAULT_RATE_HZ,
            seed: None,
            mode: TrackingMode::default(),
            heading_source: HeadingSource::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        if !(self.rate_hz > 0.0 && self.rate_hz.is_finite()) {
            return Err(FilterError::InvalidConfiguration(format!(
                "rate_hz must be positive and finite, got {}",
                self.rate_hz
            )));
        }
        Ok(())
    }

    /// Cycle period in seconds.
    pub fn period(&self) -> f64 {
        1.0 / self.rate_hz
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }

    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }

    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }

    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }

    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }

    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }

    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension_of(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }

    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension_of(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_tuned_values() {
        let cfg = EstimatorConfig::default();
        assert_eq!(cfg.filter.num_particles, 100);
        assert_eq!(cfg.filter.process_noise_std, 0.5);
        assert_eq!(cfg.filter.measurement_noise_std, 0.5);
        assert_eq!(cfg.filter.spawn_low, -1.0);
        assert_eq!(cfg.filter.spawn_high, 1.0);
        assert_eq!(cfg.rate_hz, 20.0);
        assert_eq!(cfg.period(), 0.05);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_values() {
        let bad = [
            FilterConfig {
                num_particles: 0,
                ..FilterConfig::default()
            },
            FilterConfig {
                process_noise_std: 0.0,
                ..FilterConfig::default()
            },
            FilterConfig {
                process_noise_std: -0.5,
                ..FilterConfig::default()
            },
            FilterConfig {
                measurement_noise_std: 0.0,
                ..FilterConfig::default()
            },
            FilterConfig {
                measurement_noise_std: f64::NAN,
                ..FilterConfig::default()
            },
            FilterConfig {
                spawn_low: 1.0,
                spawn_high: -1.0,
                ..FilterConfig::default()
            },
        ];
        for cfg in bad {
            assert!(
                matches!(cfg.validate(), Err(FilterError::InvalidConfiguration(_))),
                "{cfg:?} should be rejected"
            );
        }

        let cfg = EstimatorConfig {
            rate_hz: 0.0,
            ..EstimatorConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(FilterError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn reseed_spread_modes() {
        assert_eq!(ReseedSpread::Variance.std_dev(0.25), 0.25);
        assert_eq!(ReseedSpread::StandardDeviation.std_dev(0.25), 0.5);
    }

    #[test]
    fn file_round_trip_all_formats() {
        let dir = tempdir().unwrap();
        let cfg = EstimatorConfig {
            filter: FilterConfig {
                num_particles: 250,
                reseed_spread: ReseedSpread::StandardDeviation,
                ..FilterConfig::default()
            },
            seed: Some(99),
            mode: TrackingMode::Planar,
            heading_source: HeadingSource::Pose,
            ..EstimatorConfig::default()
        };
        for name in ["cfg.json", "cfg.yaml", "cfg.yml", "cfg.toml"] {
            let path = dir.path().join(name);
            cfg.to_file(&path).unwrap();
            let loaded = EstimatorConfig::from_file(&path).unwrap();
            assert_eq!(cfg, loaded, "round trip through {name}");
        }
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "rate_hz = 10.0\n[filter]\nnum_particles = 12\n").unwrap();
        let cfg = EstimatorConfig::from_file(&path).unwrap();
        assert_eq!(cfg.rate_hz, 10.0);
        assert_eq!(cfg.filter.num_particles, 12);
        assert_eq!(cfg.filter.measurement_noise_std, 0.5);
        assert_eq!(cfg.mode, TrackingMode::Scalar);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.ini");
        let err = EstimatorConfig::default().to_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(EstimatorConfig::from_file(&path).is_err());
    }
}
