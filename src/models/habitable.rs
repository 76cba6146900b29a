//! # Habitable Zone
//!
//! A main-sequence star brightens exponentially with age,
//! `L(t) = max(L0 · e^(g·t), floor)`, and the habitable zone scales with
//! `sqrt(L)`:
//!
//! ```text
//! inner = sqrt(L) · inner_base      outer = sqrt(L) · outer_base
//! ```
//!
//! A planet at orbital radius `r` is habitable while `inner ≤ r ≤ outer`.
//! Per-class parameters live in a [`ClassTable`] keyed by the closed
//! [`SpectralClass`] enum, so a missing class is a compile error rather than
//! a lookup failure.

use super::{require_non_negative, require_positive, ModelError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectralClass {
    M,
    K,
    G,
    F,
    A,
}

impl SpectralClass {
    /// Coolest to hottest.
    pub const ALL: [SpectralClass; 5] = [Self::M, Self::K, Self::G, Self::F, Self::A];

    pub fn letter(self) -> char {
        match self {
            Self::M => 'M',
            Self::K => 'K',
            Self::G => 'G',
            Self::F => 'F',
            Self::A => 'A',
        }
    }
}

impl fmt::Display for SpectralClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for SpectralClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M" => Ok(Self::M),
            "K" => Ok(Self::K),
            "G" => Ok(Self::G),
            "F" => Ok(Self::F),
            "A" => Ok(Self::A),
            other => Err(format!("unknown spectral class '{other}' (expected M, K, G, F or A)")),
        }
    }
}

/// Evolution parameters of one spectral class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassParameters {
    /// Luminosity at t = 0, solar units.
    pub luminosity_lsun: f64,
    /// Exponential brightening rate per Ga.
    pub growth_rate: f64,
    pub inner_base_au: f64,
    pub outer_base_au: f64,
    /// End of the evolution grid, Ga.
    pub max_age_ga: f64,
}

impl ClassParameters {
    const fn new(l0: f64, growth: f64, inner: f64, outer: f64, max_age: f64) -> Self {
        Self {
            luminosity_lsun: l0,
            growth_rate: growth,
            inner_base_au: inner,
            outer_base_au: outer,
            max_age_ga: max_age,
        }
    }

    fn validate(&self) -> Result<(), ModelError> {
        require_positive("luminosity_lsun", self.luminosity_lsun)?;
        if !self.growth_rate.is_finite() {
            return Err(ModelError::invalid(
                "growth_rate",
                self.growth_rate,
                "must be finite",
            ));
        }
        let inner = require_positive("inner_base_au", self.inner_base_au)?;
        let outer = require_positive("outer_base_au", self.outer_base_au)?;
        if outer <= inner {
            return Err(ModelError::invalid(
                "outer_base_au",
                outer,
                "must exceed inner_base_au",
            ));
        }
        require_non_negative("max_age_ga", self.max_age_ga)?;
        Ok(())
    }
}

/// One [`ClassParameters`] per spectral class. Serialized as a TOML table
/// with the class letters as keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassTable {
    #[serde(rename = "M")]
    pub m: ClassParameters,
    #[serde(rename = "K")]
    pub k: ClassParameters,
    #[serde(rename = "G")]
    pub g: ClassParameters,
    #[serde(rename = "F")]
    pub f: ClassParameters,
    #[serde(rename = "A")]
    pub a: ClassParameters,
}

impl Default for ClassTable {
    fn default() -> Self {
        Self {
            m: ClassParameters::new(0.05, 0.02, 0.90, 1.75, 50.0),
            k: ClassParameters::new(0.35, 0.05, 0.93, 1.71, 20.0),
            g: ClassParameters::new(1.0, 0.10, 0.95, 1.67, 10.0),
            f: ClassParameters::new(2.5, 0.20, 0.98, 1.62, 4.0),
            a: ClassParameters::new(15.0, 0.40, 1.00, 1.58, 1.0),
        }
    }
}

impl ClassTable {
    pub fn get(&self, class: SpectralClass) -> &ClassParameters {
        match class {
            SpectralClass::M => &self.m,
            SpectralClass::K => &self.k,
            SpectralClass::G => &self.g,
            SpectralClass::F => &self.f,
            SpectralClass::A => &self.a,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HabitableConfig {
    /// Lower bound on luminosity, solar units.
    pub luminosity_floor_lsun: f64,
    /// Grid step of [`HabitableConfig::evolution`], Ga.
    pub step_ga: f64,
    /// Default planet orbit, AU.
    pub orbit_au: f64,
    pub classes: ClassTable,
}

impl Default for HabitableConfig {
    fn default() -> Self {
        Self {
            luminosity_floor_lsun: 0.01,
            step_ga: 0.1,
            orbit_au: 1.0,
            classes: ClassTable::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HZModelState {
    pub spectral_class: SpectralClass,
    pub time_ga: f64,
    pub luminosity_lsun: f64,
    pub inner_au: f64,
    pub outer_au: f64,
    pub orbit_au: f64,
    pub habitable: bool,
}

impl HabitableConfig {
    /// Checks every class. `outer > inner` in every state follows from
    /// `outer_base > inner_base` here, so evaluation never clamps.
    pub fn validate(&self) -> Result<(), ModelError> {
        require_positive("luminosity_floor_lsun", self.luminosity_floor_lsun)?;
        require_positive("step_ga", self.step_ga)?;
        require_positive("orbit_au", self.orbit_au)?;
        for class in SpectralClass::ALL {
            self.classes.get(class).validate()?;
        }
        Ok(())
    }

    /// `max(L0 · e^(g·t), floor)` in solar units.
    pub fn luminosity(&self, class: SpectralClass, time_ga: f64) -> Result<f64, ModelError> {
        let time_ga = require_non_negative("time_ga", time_ga)?;
        let params = self.classes.get(class);
        let grown = params.luminosity_lsun * (params.growth_rate * time_ga).exp();
        Ok(grown.max(self.luminosity_floor_lsun))
    }

    pub fn evaluate(
        &self,
        class: SpectralClass,
        time_ga: f64,
        orbit_au: f64,
    ) -> Result<HZModelState, ModelError> {
        let orbit_au = require_positive("orbit_au", orbit_au)?;
        let luminosity = self.luminosity(class, time_ga)?;
        let params = self.classes.get(class);
        let root = luminosity.sqrt();
        let inner_au = root * params.inner_base_au;
        let outer_au = root * params.outer_base_au;

        Ok(HZModelState {
            spectral_class: class,
            time_ga,
            luminosity_lsun: luminosity,
            inner_au,
            outer_au,
            orbit_au,
            habitable: (inner_au..=outer_au).contains(&orbit_au),
        })
    }

    /// States at `0, step, 2·step, …` up to the class's maximum age.
    pub fn evolution(
        &self,
        class: SpectralClass,
        orbit_au: f64,
    ) -> Result<Vec<HZModelState>, ModelError> {
        let step = require_positive("step_ga", self.step_ga)?;
        let max_age = self.classes.get(class).max_age_ga;
        // Tolerate max_age being an inexact multiple of step.
        let samples = (max_age / step + 1e-9).floor() as usize + 1;
        (0..samples)
            .map(|i| self.evaluate(class, i as f64 * step, orbit_au))
            .collect()
    }

    /// Time spent habitable, Ga: count of habitable grid samples × step
    /// (a left Riemann sum, so resolution is one step).
    pub fn habitable_duration(&self, class: SpectralClass, orbit_au: f64) -> Result<f64, ModelError> {
        let habitable = self
            .evolution(class, orbit_au)?
            .iter()
            .filter(|state| state.habitable)
            .count();
        Ok(habitable as f64 * self.step_ga)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn g_type_at_zero_age() {
        let config = HabitableConfig::default();
        let state = config.evaluate(SpectralClass::G, 0.0, 1.0).unwrap();
        assert_eq!(state.luminosity_lsun, 1.0);
        assert!((state.inner_au - 0.95).abs() < 1e-12);
        assert!((state.outer_au - 1.67).abs() < 1e-12);
        assert!(state.habitable, "Earth orbit should be habitable at t = 0");
    }

    #[test]
    fn luminosity_floor_applies() {
        let mut config = HabitableConfig::default();
        config.classes.m.luminosity_lsun = 0.001;
        let l = config.luminosity(SpectralClass::M, 0.0).unwrap();
        assert_eq!(l, 0.01);
    }

    #[test]
    fn zone_moves_outward_with_age() {
        let config = HabitableConfig::default();
        let states = config.evolution(SpectralClass::F, 1.0).unwrap();
        assert_eq!(states.len(), 41);
        assert!(states
            .windows(2)
            .all(|w| w[1].inner_au > w[0].inner_au && w[1].outer_au > w[0].outer_au));
        assert!(states.iter().all(|s| s.outer_au > s.inner_au));
    }

    #[test]
    fn g_type_duration_at_one_au() {
        // inner crosses 1 AU near t = 1.03 Ga, so samples 0.0..=1.0 qualify.
        let config = HabitableConfig::default();
        let duration = config.habitable_duration(SpectralClass::G, 1.0).unwrap();
        assert!((duration - 1.1).abs() < 1e-9, "duration {duration}");
    }

    #[test]
    fn negative_time_rejected() {
        let config = HabitableConfig::default();
        assert!(config.evaluate(SpectralClass::K, -1.0, 1.0).is_err());
        assert!(config.evaluate(SpectralClass::K, 1.0, 0.0).is_err());
    }

    #[test]
    fn validation_catches_inverted_bounds() {
        let mut config = HabitableConfig::default();
        assert!(config.validate().is_ok());
        config.classes.a.outer_base_au = 0.5;
        match config.validate() {
            Err(ModelError::InvalidParameter { name, .. }) => assert_eq!(name, "outer_base_au"),
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[test]
    fn class_parsing() {
        assert_eq!("g".parse::<SpectralClass>(), Ok(SpectralClass::G));
        assert_eq!(" A ".parse::<SpectralClass>(), Ok(SpectralClass::A));
        assert!("O".parse::<SpectralClass>().is_err());
        assert_eq!(SpectralClass::K.to_string(), "K");
    }
}
