//! # Tidal Model
//!
//! Earth–Moon distance oscillates about a reference with the chosen orbital
//! period, and tidal forcing follows the inverse cube of that distance:
//!
//! ```text
//! d(day) = reference + amplitude · cos(2π · day / period)
//! F(d)   = G · M_earth · M_moon / d³
//! tide   = base · F(d) / F(reference) · (1 + spring_neap · cos(2 · phase))
//! ```
//!
//! `phase` is the lunar phase angle, so the spring–neap envelope peaks at new
//! and full moon. The phase origin is a moon age in days, which can be taken
//! from the ephemeris in [`crate::lunar`] to anchor the model at a date.

use super::{require_non_negative, require_positive, ModelError};
use crate::lunar::{moon_age_days, SYNODIC_MONTH_DAYS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;

/// Gravitational constant, m³ kg⁻¹ s⁻².
pub const GRAVITATIONAL_CONSTANT: f64 = 6.6743e-11;
pub const EARTH_MASS_KG: f64 = 5.9722e24;
pub const MOON_MASS_KG: f64 = 7.342e22;

/// Principal lunar semidiurnal tide period, hours.
pub const SEMIDIURNAL_PERIOD_HOURS: f64 = 24.84;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrbitPeriod {
    /// 27.321661 days, relative to the stars.
    Sidereal,
    /// 29.530589 days, new moon to new moon.
    Synodic,
    /// Period in days.
    Custom(f64),
}

impl OrbitPeriod {
    pub fn days(self) -> f64 {
        match self {
            Self::Sidereal => 27.321_661,
            Self::Synodic => 29.530_589,
            Self::Custom(days) => days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseLabel {
    New,
    FirstQuarter,
    Full,
    LastQuarter,
}

impl PhaseLabel {
    /// Quartile of the synodic month that `age_days` falls in: New covers
    /// ages `[0, P/4)`, First Quarter `[P/4, P/2)`, and so on.
    pub fn from_age(age_days: f64) -> Self {
        let fraction = age_days.rem_euclid(SYNODIC_MONTH_DAYS) / SYNODIC_MONTH_DAYS;
        // rem_euclid can round up to exactly P, which wraps to New.
        match ((fraction * 4.0).floor() as u8) & 3 {
            0 => Self::New,
            1 => Self::FirstQuarter,
            2 => Self::Full,
            _ => Self::LastQuarter,
        }
    }
}

impl fmt::Display for PhaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::New => "New Moon",
            Self::FirstQuarter => "First Quarter",
            Self::Full => "Full Moon",
            Self::LastQuarter => "Last Quarter",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TidalConfig {
    /// Mean Earth–Moon distance. The cosine term starts at its maximum, so
    /// day 0 is apogee (`reference_km + amplitude_km`).
    pub reference_km: f64,
    /// Half the perigee–apogee swing.
    pub amplitude_km: f64,
    pub orbit: OrbitPeriod,
    /// Tide amplitude at the reference distance, metres.
    pub base_amplitude_m: f64,
    /// Relative strength of the spring–neap envelope, 0–1.
    pub spring_neap: f64,
    /// Phase offset of the diurnal curve, degrees.
    pub moon_angle_deg: f64,
}

impl Default for TidalConfig {
    fn default() -> Self {
        Self {
            reference_km: 384_400.0,
            amplitude_km: 21_000.0,
            orbit: OrbitPeriod::Sidereal,
            base_amplitude_m: 0.54,
            spring_neap: 0.2,
            moon_angle_deg: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TidalModelState {
    pub day_offset: f64,
    pub distance_km: f64,
    /// Newtons.
    pub tidal_force: f64,
    /// Metres.
    pub amplitude: f64,
    pub moon_age_days: f64,
    pub phase_label: PhaseLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiurnalSample {
    pub hour: f64,
    /// Metres relative to mean sea level.
    pub height: f64,
}

/// `G · M_earth · M_moon / d³` with `d` converted to metres.
pub fn tidal_force(distance_km: f64) -> Result<f64, ModelError> {
    let metres = require_positive("distance_km", distance_km)? * 1_000.0;
    Ok(GRAVITATIONAL_CONSTANT * EARTH_MASS_KG * MOON_MASS_KG / metres.powi(3))
}

/// Moon age at `instant`, usable as the `epoch_age` of [`TidalConfig::evaluate`].
pub fn epoch_age(instant: DateTime<Utc>) -> f64 {
    moon_age_days(instant)
}

impl TidalConfig {
    /// Rejects settings that would let the distance reach zero or the
    /// envelope turn negative.
    pub fn validate(&self) -> Result<(), ModelError> {
        let reference = require_positive("reference_km", self.reference_km)?;
        let amplitude = require_non_negative("amplitude_km", self.amplitude_km)?;
        if amplitude >= reference {
            return Err(ModelError::invalid(
                "amplitude_km",
                amplitude,
                "must be smaller than reference_km",
            ));
        }
        require_positive("period_days", self.orbit.days())?;
        require_non_negative("base_amplitude_m", self.base_amplitude_m)?;
        let spring_neap = require_non_negative("spring_neap", self.spring_neap)?;
        if spring_neap > 1.0 {
            return Err(ModelError::invalid(
                "spring_neap",
                spring_neap,
                "must not exceed 1",
            ));
        }
        if !self.moon_angle_deg.is_finite() {
            return Err(ModelError::invalid(
                "moon_angle_deg",
                self.moon_angle_deg,
                "must be finite",
            ));
        }
        Ok(())
    }

    pub fn distance_km(&self, day: f64) -> f64 {
        self.reference_km + self.amplitude_km * (TAU * day / self.orbit.days()).cos()
    }

    /// State `day` days after an epoch at which the moon was `epoch_age`
    /// days old.
    pub fn evaluate(&self, day: f64, epoch_age: f64) -> Result<TidalModelState, ModelError> {
        self.validate()?;
        if !day.is_finite() || !epoch_age.is_finite() {
            return Err(ModelError::invalid("day", day, "must be finite"));
        }

        let distance_km = self.distance_km(day);
        let force = tidal_force(distance_km)?;
        let reference_force = tidal_force(self.reference_km)?;

        let age = (day + epoch_age).rem_euclid(SYNODIC_MONTH_DAYS);
        let phase_angle = TAU * age / SYNODIC_MONTH_DAYS;
        let envelope = 1.0 + self.spring_neap * (2.0 * phase_angle).cos();

        Ok(TidalModelState {
            day_offset: day,
            distance_km,
            tidal_force: force,
            amplitude: self.base_amplitude_m * force / reference_force * envelope,
            moon_age_days: age,
            phase_label: PhaseLabel::from_age(age),
        })
    }

    /// Daily states for `days` consecutive days starting at 0.
    pub fn series(&self, days: usize, epoch_age: f64) -> Result<Vec<TidalModelState>, ModelError> {
        (0..days)
            .map(|day| self.evaluate(day as f64, epoch_age))
            .collect()
    }

    /// Semidiurnal height curve for a tide of `amplitude` metres at
    /// `latitude_deg`.
    pub fn diurnal(&self, amplitude: f64, latitude_deg: f64, hours: &[f64]) -> Vec<DiurnalSample> {
        let omega = TAU / SEMIDIURNAL_PERIOD_HOURS;
        let offset = self.moon_angle_deg.to_radians();
        let damping = latitude_deg.to_radians().cos();
        hours
            .iter()
            .map(|&hour| DiurnalSample {
                hour,
                height: amplitude * (omega * hour - offset).cos() * damping,
            })
            .collect()
    }
}
