//! # Configuration Management
//!
//! Loads model parameters, the observing site and display settings from
//! `astro-config.toml`. Every section has defaults, so a partial file only
//! overrides what it names.
//!
//! A missing or unreadable file is not an error for the application: the
//! loaders fall back to [`Config::default`] and log why.

use crate::display::DisplayScaling;
use crate::models::expansion::ExpansionParams;
use crate::models::habitable::HabitableConfig;
use crate::models::tidal::TidalConfig;
use crate::models::ModelError;
use crate::sky::Observer;
use crate::spectral::SpectralBand;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "astro-config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config format: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid display percentiles {low}/{high}")]
    Display { low: f64, high: f64 },

    #[error("invalid spectral band {min_nm}..{max_nm} nm")]
    Band { min_nm: f64, max_nm: f64 },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Application configuration loaded from astro-config.toml
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Observing site for alt/az
    pub observer: Observer,
    /// Wavelength range mapped onto spectrum pixels
    pub spectral: SpectralBand,
    /// Percentile clipping for image display
    pub display: DisplayScaling,
    pub habitable: HabitableConfig,
    pub tidal: TidalConfig,
    pub expansion: ExpansionParams,
}

impl Config {
    /// Load configuration from astro-config.toml.
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified path.
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_load_from_path(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                info!(
                    "No config file at {}, using default configuration",
                    path.display()
                );
                Self::default()
            }
            Err(e) => {
                warn!("{e}");
                warn!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Strict variant of [`Config::load_from_path`]: read, parse and validate.
    pub fn try_load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as pretty TOML.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to_path(DEFAULT_CONFIG_PATH)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.display.is_valid() {
            return Err(ConfigError::Display {
                low: self.display.low_percentile,
                high: self.display.high_percentile,
            });
        }
        let band = &self.spectral;
        if !(band.min_nm.is_finite() && band.max_nm.is_finite() && band.min_nm < band.max_nm) {
            return Err(ConfigError::Band {
                min_nm: band.min_nm,
                max_nm: band.max_nm,
            });
        }
        self.habitable.validate()?;
        self.tidal.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::habitable::SpectralClass;
    use crate::models::tidal::OrbitPeriod;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.display.low_percentile, 5.0);
        assert_eq!(config.display.high_percentile, 99.5);
        assert_eq!(config.spectral.min_nm, 400.0);
        assert_eq!(config.spectral.max_nm, 700.0);
        assert_eq!(config.habitable.luminosity_floor_lsun, 0.01);
        let g = config.habitable.classes.get(SpectralClass::G);
        assert_eq!((g.luminosity_lsun, g.growth_rate), (1.0, 0.10));
        assert_eq!(config.tidal.orbit, OrbitPeriod::Sidereal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.tidal.orbit = OrbitPeriod::Custom(27.0);
        config.observer.latitude_deg = -33.9;
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        assert_eq!(config, Config::default());
        assert!(matches!(
            Config::try_load_from_path("/nonexistent/path"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn partial_file_overrides_named_keys_only() {
        let file = write_config(
            r#"
[display]
low_percentile = 1.0
high_percentile = 99.0

[habitable.classes.G]
luminosity_lsun = 1.2
growth_rate = 0.08
inner_base_au = 0.95
outer_base_au = 1.67
max_age_ga = 10.0
"#,
        );
        let config = Config::try_load_from_path(file.path()).unwrap();
        assert_eq!(config.display.low_percentile, 1.0);
        assert_eq!(config.habitable.classes.g.luminosity_lsun, 1.2);
        assert_eq!(config.habitable.classes.k, Config::default().habitable.classes.k);
        assert_eq!(config.tidal, TidalConfig::default());
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let file = write_config("display = [not toml");
        assert!(matches!(
            Config::try_load_from_path(file.path()),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(Config::load_from_path(file.path()), Config::default());
    }

    #[test]
    fn inverted_zone_rejected_on_load() {
        let file = write_config(
            r#"
[habitable.classes.M]
luminosity_lsun = 0.05
growth_rate = 0.02
inner_base_au = 1.75
outer_base_au = 0.90
max_age_ga = 50.0
"#,
        );
        assert!(matches!(
            Config::try_load_from_path(file.path()),
            Err(ConfigError::Model(ModelError::InvalidParameter { .. }))
        ));
        assert_eq!(Config::load_from_path(file.path()), Config::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("astro-config.toml");
        let mut config = Config::default();
        config.expansion.h0_km_s_mpc = 67.4;
        config.save_to_path(&path).unwrap();
        assert_eq!(Config::try_load_from_path(&path).unwrap(), config);
    }
}
