//! Moon phase & low-precision lunar ephemeris (Schaefer 1985/1994)
//!
//! Accuracy: ±1 day for phase and age; a few degrees for λ, β; ~6 % for Δ.
//! References: Sky & Telescope BASIC "MOONFX.BAS" (Apr 1994) and the
//! original phase routine (Mar 1985).
//!
//! Used to anchor the tidal model's phase origin at a calendar instant.

use crate::sky::julian_date;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::f64::consts::TAU;

/// Mean synodic month in days.
pub const SYNODIC_MONTH_DAYS: f64 = 29.530_588_2;

/// Julian date of the reference new moon (1900 January 0.5 + 0.09 d).
const NEW_MOON_EPOCH_JD: f64 = 2_415_020.59;

/// Mean Earth equatorial radius, km.
const EARTH_RADIUS_KM: f64 = 6_378.137;

/// Fractional part in [0, 1).
fn frac(v: f64) -> f64 {
    v - v.floor()
}

/// Everything the Schaefer routine yields for one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LunarEphemeris {
    /// Phase index 0–7 (0 = new, 4 = full).
    pub phase_index: u8,
    /// Days since new moon.
    pub age_days: f64,
    /// Illuminated fraction (0–1), triangle-wave approximation.
    pub illuminated_fraction: f64,
    /// Geocentric distance in Earth radii.
    pub distance_earth_radii: f64,
    pub ecliptic_longitude_deg: f64,
    pub ecliptic_latitude_deg: f64,
}

impl LunarEphemeris {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self::from_julian_date(julian_date(instant))
    }

    pub fn from_julian_date(jd: f64) -> Self {
        // ---------- phase: fraction of the current synodic month ----------
        let phase = frac((jd - NEW_MOON_EPOCH_JD) / SYNODIC_MONTH_DAYS);
        let age_days = phase * SYNODIC_MONTH_DAYS;
        let phase_index = ((phase * 8.0) + 0.5).floor() as u8 & 7;
        let half = SYNODIC_MONTH_DAYS / 2.0;
        let illuminated_fraction = (1.0 - (age_days - half).abs() / half).clamp(0.0, 1.0);

        // ---------- 1994 additions: anomalistic, draconic, sidereal months ----------
        let elongation = 2.0 * phase * TAU;
        let anomaly = frac((jd - 2_451_562.2) / 27.554_549_88) * TAU;
        let node = frac((jd - 2_451_565.2) / 27.212_220_817) * TAU;
        let sidereal = frac((jd - 2_451_555.8) / 27.321_582_241);

        let distance_earth_radii =
            60.4 - 3.3 * anomaly.cos() - 0.6 * (elongation - anomaly).cos() - 0.5 * elongation.cos();
        let ecliptic_latitude_deg = 5.1 * node.sin();
        let ecliptic_longitude_deg = (360.0 * sidereal
            + 6.3 * anomaly.sin()
            + 1.3 * (elongation - anomaly).sin()
            + 0.7 * elongation.sin())
        .rem_euclid(360.0);

        Self {
            phase_index,
            age_days,
            illuminated_fraction,
            distance_earth_radii,
            ecliptic_longitude_deg,
            ecliptic_latitude_deg,
        }
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_earth_radii * EARTH_RADIUS_KM
    }
}

/// Moon age in days at an instant.
pub fn moon_age_days(instant: DateTime<Utc>) -> f64 {
    LunarEphemeris::at(instant).age_days
}
