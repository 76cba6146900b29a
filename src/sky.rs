//! # Observer Sky Position
//!
//! Altitude and azimuth of a target for an observer at an instant. Low
//! precision: GMST from the IAU 1982 polynomial, no precession, nutation,
//! aberration or refraction. Good to a fraction of a degree, which is all a
//! "where is it in my sky" readout needs.
//!
//! Azimuth runs from north through east; altitude is positive above the
//! horizon.

use crate::astrometry::KeywordProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use thiserror::Error;

/// Julian date of the Unix epoch.
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Julian date of J2000.0.
const J2000_JD: f64 = 2_451_545.0;

/// Geographic observer location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Observer {
    pub latitude_deg: f64,
    /// East positive.
    pub longitude_deg: f64,
    pub elevation_m: f64,
}

impl Default for Observer {
    /// Royal Observatory, Greenwich.
    fn default() -> Self {
        Self {
            latitude_deg: 51.4769,
            longitude_deg: -0.0005,
            elevation_m: 46.0,
        }
    }
}

/// Equatorial target position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetCoord {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SkyPosition {
    /// [-90, 90]
    pub altitude_deg: f64,
    /// [0, 360)
    pub azimuth_deg: f64,
}

impl SkyPosition {
    pub fn is_above_horizon(&self) -> bool {
        self.altitude_deg > 0.0
    }

    pub fn cardinal_direction(&self) -> &'static str {
        const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
        let sector = ((self.azimuth_deg + 22.5) / 45.0).floor() as usize % 8;
        POINTS[sector]
    }
}

/// The header names no usable target position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no target position: {reason}")]
pub struct NoTarget {
    pub reason: String,
}

/// Julian date (UT) of an instant.
pub fn julian_date(instant: DateTime<Utc>) -> f64 {
    let seconds = instant.timestamp() as f64 + instant.timestamp_subsec_nanos() as f64 * 1e-9;
    seconds / 86_400.0 + UNIX_EPOCH_JD
}

/// Greenwich mean sidereal time in degrees, [0, 360).
pub fn gmst_degrees(jd: f64) -> f64 {
    let d = jd - J2000_JD;
    let t = d / 36_525.0;
    let gmst = 280.460_618_37 + 360.985_647_366_29 * d + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;
    gmst.rem_euclid(360.0)
}

/// Local sidereal time in degrees for an east-positive longitude.
pub fn local_sidereal_degrees(jd: f64, longitude_deg: f64) -> f64 {
    (gmst_degrees(jd) + longitude_deg).rem_euclid(360.0)
}

/// Horizon position of a target seen by `observer` at `instant`.
pub fn observer_alt_az(
    target: TargetCoord,
    observer: &Observer,
    instant: DateTime<Utc>,
) -> SkyPosition {
    let lst = local_sidereal_degrees(julian_date(instant), observer.longitude_deg);
    let hour_angle = (lst - target.ra_deg).to_radians();

    let (sin_ha, cos_ha) = hour_angle.sin_cos();
    let (sin_dec, cos_dec) = target.dec_deg.to_radians().sin_cos();
    let (sin_lat, cos_lat) = observer.latitude_deg.to_radians().sin_cos();

    let x = -cos_ha * cos_dec * sin_lat + sin_dec * cos_lat;
    let y = -sin_ha * cos_dec;
    let z = cos_ha * cos_dec * cos_lat + sin_dec * sin_lat;

    let r = x.hypot(y);
    let azimuth = if r == 0.0 { 0.0 } else { y.atan2(x).rem_euclid(TAU) };
    let altitude = z.atan2(r);

    let azimuth_deg = azimuth.to_degrees();
    SkyPosition {
        altitude_deg: altitude.to_degrees(),
        azimuth_deg: if azimuth_deg >= 360.0 { 0.0 } else { azimuth_deg },
    }
}

/// Target position from `RA`/`DEC`, falling back to `OBJCTRA`/`OBJCTDEC`.
///
/// Numeric values are degrees. String values may be sexagesimal
/// (`"10:45:03.6"`, `"-59 41 04"`); sexagesimal right ascension is in hours.
pub fn target_from_header<K: KeywordProvider + ?Sized>(header: &K) -> Result<TargetCoord, NoTarget> {
    let ra = coordinate(header, &["RA", "OBJCTRA"], true)?;
    let dec = coordinate(header, &["DEC", "OBJCTDEC"], false)?;
    if !(-90.0..=90.0).contains(&dec) {
        return Err(NoTarget {
            reason: format!("declination {dec} out of range"),
        });
    }
    Ok(TargetCoord {
        ra_deg: ra.rem_euclid(360.0),
        dec_deg: dec,
    })
}

/// Horizon position of the target named in a header.
pub fn observer_alt_az_from_header<K: KeywordProvider + ?Sized>(
    header: &K,
    observer: &Observer,
    instant: DateTime<Utc>,
) -> Result<SkyPosition, NoTarget> {
    let target = target_from_header(header)?;
    Ok(observer_alt_az(target, observer, instant))
}

fn coordinate<K: KeywordProvider + ?Sized>(
    header: &K,
    keys: &[&str],
    hours: bool,
) -> Result<f64, NoTarget> {
    for key in keys {
        if let Some(value) = header.get_float(key) {
            return Ok(value);
        }
        if let Some(text) = header.get_string(key) {
            let parsed = if text.contains([':', ' ']) {
                parse_sexagesimal(&text).map(|v| if hours { v * 15.0 } else { v })
            } else {
                text.parse::<f64>().ok()
            };
            return parsed.ok_or_else(|| NoTarget {
                reason: format!("cannot parse {key} = '{text}'"),
            });
        }
    }
    Err(NoTarget {
        reason: format!("missing {}", keys.join(" / ")),
    })
}

/// `"dd:mm:ss.s"` or `"dd mm ss.s"`, sign on the leading field.
pub fn parse_sexagesimal(text: &str) -> Option<f64> {
    let text = text.trim();
    let negative = text.starts_with('-');
    let fields: Vec<f64> = text
        .trim_start_matches(['-', '+'])
        .split([':', ' '])
        .filter(|f| !f.is_empty())
        .map(|f| f.parse::<f64>().ok())
        .collect::<Option<_>>()?;
    if fields.is_empty() || fields.len() > 3 {
        return None;
    }
    let magnitude = fields
        .iter()
        .zip([1.0, 60.0, 3600.0])
        .map(|(v, div)| v / div)
        .sum::<f64>();
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::{Card, Header, Value};
    use chrono::TimeZone;

    fn j2000() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn julian_date_of_j2000() {
        assert!((julian_date(j2000()) - J2000_JD).abs() < 1e-9);
    }

    #[test]
    fn gmst_at_j2000() {
        assert!((gmst_degrees(J2000_JD) - 280.460_618_37).abs() < 1e-9);
        // One sidereal day later GMST returns to the same angle.
        let sidereal_day = 360.0 / 360.985_647_366_29;
        assert!((gmst_degrees(J2000_JD + sidereal_day) - 280.460_618_37).abs() < 1e-4);
    }

    #[test]
    fn target_on_meridian_at_observer_latitude_is_at_zenith() {
        let observer = Observer::default();
        let instant = j2000();
        let lst = local_sidereal_degrees(julian_date(instant), observer.longitude_deg);
        let target = TargetCoord {
            ra_deg: lst,
            dec_deg: observer.latitude_deg,
        };
        let pos = observer_alt_az(target, &observer, instant);
        assert!((pos.altitude_deg - 90.0).abs() < 1e-6);
    }

    #[test]
    fn meridian_transit_south_of_zenith() {
        let observer = Observer {
            latitude_deg: 40.0,
            longitude_deg: -75.0,
            elevation_m: 0.0,
        };
        let instant = Utc.with_ymd_and_hms(2024, 3, 20, 3, 0, 0).unwrap();
        let lst = local_sidereal_degrees(julian_date(instant), observer.longitude_deg);
        let target = TargetCoord {
            ra_deg: lst,
            dec_deg: 10.0,
        };
        let pos = observer_alt_az(target, &observer, instant);
        assert!((pos.altitude_deg - 60.0).abs() < 1e-6);
        assert!((pos.azimuth_deg - 180.0).abs() < 1e-6);
        assert_eq!(pos.cardinal_direction(), "S");
    }

    #[test]
    fn celestial_pole_sits_at_observer_latitude() {
        let observer = Observer::default();
        for hour in [0, 6, 13, 21] {
            let instant = Utc.with_ymd_and_hms(2023, 7, 1, hour, 0, 0).unwrap();
            let pos = observer_alt_az(
                TargetCoord {
                    ra_deg: 37.95,
                    dec_deg: 90.0,
                },
                &observer,
                instant,
            );
            assert!((pos.altitude_deg - observer.latitude_deg).abs() < 1e-6);
            assert!(pos.azimuth_deg < 1e-6 || pos.azimuth_deg > 360.0 - 1e-6);
        }
    }

    #[test]
    fn rising_target_is_in_the_east() {
        let observer = Observer::default();
        let instant = j2000();
        let lst = local_sidereal_degrees(julian_date(instant), observer.longitude_deg);
        // Six hours before transit, on the celestial equator.
        let pos = observer_alt_az(
            TargetCoord {
                ra_deg: (lst + 90.0).rem_euclid(360.0),
                dec_deg: 0.0,
            },
            &observer,
            instant,
        );
        assert!(pos.altitude_deg.abs() < 1e-6);
        assert!((pos.azimuth_deg - 90.0).abs() < 1e-6);
    }

    #[test]
    fn sexagesimal_parsing() {
        assert_eq!(parse_sexagesimal("10:30:00"), Some(10.5));
        assert_eq!(parse_sexagesimal("-05 30 00"), Some(-5.5));
        assert_eq!(parse_sexagesimal("-00:30:00"), Some(-0.5));
        assert_eq!(parse_sexagesimal("+12"), Some(12.0));
        assert_eq!(parse_sexagesimal("12:xx"), None);
        assert_eq!(parse_sexagesimal("1:2:3:4"), None);
    }

    #[test]
    fn header_target_numeric_and_sexagesimal() {
        let numeric = Header::from_cards(vec![
            Card::new("RA", Value::Real(83.82)),
            Card::new("DEC", Value::Real(-5.39)),
        ]);
        let t = target_from_header(&numeric).unwrap();
        assert_eq!(t.ra_deg, 83.82);
        assert_eq!(t.dec_deg, -5.39);

        let strings = Header::from_cards(vec![
            Card::new("OBJCTRA", Value::Text("05 35 17.3".into())),
            Card::new("OBJCTDEC", Value::Text("-05 23 28".into())),
        ]);
        let t = target_from_header(&strings).unwrap();
        assert!((t.ra_deg - 83.822_083).abs() < 1e-5);
        assert!((t.dec_deg + 5.391_111).abs() < 1e-5);
    }

    #[test]
    fn missing_coordinate_is_no_target() {
        let header = Header::from_cards(vec![Card::new("RA", Value::Real(10.0))]);
        let err =
            observer_alt_az_from_header(&header, &Observer::default(), j2000()).unwrap_err();
        assert!(err.reason.contains("DEC"));

        let garbage = Header::from_cards(vec![
            Card::new("RA", Value::Text("north-ish".into())),
            Card::new("DEC", Value::Real(1.0)),
        ]);
        assert!(target_from_header(&garbage).is_err());
    }
}
