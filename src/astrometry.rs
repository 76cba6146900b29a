//! # Celestial Coordinate Resolution
//!
//! Builds a pixel ↔ sky mapping from the WCS keywords of a unit header.
//! Only the zenithal projection family is supported:
//!
//! | Code | Projection            | θ from native radius R (deg)     |
//! |------|-----------------------|----------------------------------|
//! | TAN  | gnomonic              | atan(180 / πR)                   |
//! | SIN  | orthographic          | acos(πR / 180)                   |
//! | ARC  | zenithal equidistant  | 90 − R                           |
//! | STG  | stereographic         | 90 − 2·atan(πR / 360)            |
//! | ZEA  | zenithal equal-area   | 90 − 2·asin(πR / 360)            |
//!
//! The linear part comes from `CDi_j`, or `PCi_j` with `CDELTi`, or the
//! older `CDELTi` with `CROTA2`. Distortion suffixes (`-SIP`) are ignored.
//!
//! A header with no usable astrometry is an expected case, reported as
//! [`NoAstrometry`] rather than a failure of the unit.

use crate::fits::Header;
use log::debug;
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;

const DETERMINANT_THRESHOLD: f64 = 1e-15;

/// Read access to header keywords, independent of the header representation.
pub trait KeywordProvider {
    fn get_string(&self, key: &str) -> Option<String>;
    fn get_float(&self, key: &str) -> Option<f64>;
    fn get_int(&self, key: &str) -> Option<i64>;

    fn has(&self, key: &str) -> bool {
        self.get_float(key).is_some() || self.get_string(key).is_some()
    }

    fn require_float(&self, key: &str) -> Result<f64, NoAstrometry> {
        self.get_float(key)
            .ok_or_else(|| NoAstrometry::new(format!("missing or non-numeric {key}")))
    }

    fn require_string(&self, key: &str) -> Result<String, NoAstrometry> {
        self.get_string(key)
            .ok_or_else(|| NoAstrometry::new(format!("missing {key}")))
    }
}

impl KeywordProvider for Header {
    fn get_string(&self, key: &str) -> Option<String> {
        self.get_str(key).map(|s| s.trim().to_string())
    }

    fn get_float(&self, key: &str) -> Option<f64> {
        self.get_f64(key)
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.get_i64(key)
    }
}

/// The header does not describe a usable sky mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no astrometric solution: {reason}")]
pub struct NoAstrometry {
    pub reason: String,
}

impl NoAstrometry {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionCode {
    Tan,
    Sin,
    Arc,
    Stg,
    Zea,
}

impl ProjectionCode {
    fn parse(code: &str) -> Option<Self> {
        match code {
            "TAN" => Some(Self::Tan),
            "SIN" => Some(Self::Sin),
            "ARC" => Some(Self::Arc),
            "STG" => Some(Self::Stg),
            "ZEA" => Some(Self::Zea),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tan => "TAN",
            Self::Sin => "SIN",
            Self::Arc => "ARC",
            Self::Stg => "STG",
            Self::Zea => "ZEA",
        }
    }

    /// Native latitude (deg) for a native radius `r` (deg).
    fn theta(self, r: f64) -> Option<f64> {
        let theta = match self {
            Self::Tan => (180.0 / PI).atan2(r).to_degrees(),
            Self::Sin => {
                let s = r * PI / 180.0;
                if s > 1.0 {
                    return None;
                }
                s.acos().to_degrees()
            }
            Self::Arc => 90.0 - r,
            Self::Stg => 90.0 - 2.0 * (r * PI / 360.0).atan().to_degrees(),
            Self::Zea => {
                let s = r * PI / 360.0;
                if s > 1.0 {
                    return None;
                }
                90.0 - 2.0 * s.asin().to_degrees()
            }
        };
        Some(theta)
    }

    /// Native radius (deg) for a native latitude `theta` (deg).
    fn radius(self, theta: f64) -> Option<f64> {
        let t = theta.to_radians();
        let r = match self {
            Self::Tan => {
                if theta <= 0.0 {
                    return None;
                }
                (180.0 / PI) * t.cos() / t.sin()
            }
            Self::Sin => {
                if theta < 0.0 {
                    return None;
                }
                (180.0 / PI) * t.cos()
            }
            Self::Arc => 90.0 - theta,
            Self::Stg => {
                if theta <= -90.0 {
                    return None;
                }
                (360.0 / PI) * ((90.0 - theta).to_radians() / 2.0).tan()
            }
            Self::Zea => (360.0 / PI) * ((90.0 - theta).to_radians() / 2.0).sin(),
        };
        Some(r)
    }
}

/// Sky frame named by the axis types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CelestialFrame {
    Equatorial,
    Galactic,
    Ecliptic,
}

impl CelestialFrame {
    fn axis_names(self) -> (&'static str, &'static str) {
        match self {
            Self::Equatorial => ("RA", "DEC"),
            Self::Galactic => ("GLON", "GLAT"),
            Self::Ecliptic => ("ELON", "ELAT"),
        }
    }
}

enum AxisRole {
    Longitude(CelestialFrame),
    Latitude(CelestialFrame),
}

/// Split `RA---TAN` into its axis role and projection code.
fn parse_ctype(ctype: &str) -> Result<(AxisRole, String), NoAstrometry> {
    let axis = ctype.get(..4).unwrap_or(ctype).trim_end_matches('-');
    let code = ctype.get(5..8).unwrap_or("").to_string();
    let role = match axis {
        "RA" => AxisRole::Longitude(CelestialFrame::Equatorial),
        "DEC" => AxisRole::Latitude(CelestialFrame::Equatorial),
        "GLON" => AxisRole::Longitude(CelestialFrame::Galactic),
        "GLAT" => AxisRole::Latitude(CelestialFrame::Galactic),
        "ELON" => AxisRole::Longitude(CelestialFrame::Ecliptic),
        "ELAT" => AxisRole::Latitude(CelestialFrame::Ecliptic),
        _ => return Err(NoAstrometry::new(format!("non-celestial axis type '{ctype}'"))),
    };
    Ok((role, code))
}

/// A resolved zenithal projection for pixel axes 1 and 2.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub code: ProjectionCode,
    pub frame: CelestialFrame,
    /// Reference pixel (1-based) on axes 1 and 2.
    pub crpix: [f64; 2],
    /// Reference sky position (longitude, latitude) in degrees.
    pub crval: [f64; 2],
    /// Pixel offsets to intermediate world coordinates, degrees per pixel.
    pub matrix: [[f64; 2]; 2],
    inverse: [[f64; 2]; 2],
    /// Axis 1 carries latitude.
    swapped: bool,
}

/// Resolve the sky projection described by a header.
pub fn resolve<K: KeywordProvider + ?Sized>(header: &K) -> Result<Projection, NoAstrometry> {
    let ctype1 = header.require_string("CTYPE1")?;
    let ctype2 = header.require_string("CTYPE2")?;
    let (role1, code1) = parse_ctype(&ctype1)?;
    let (role2, code2) = parse_ctype(&ctype2)?;

    let (frame, swapped) = match (role1, role2) {
        (AxisRole::Longitude(a), AxisRole::Latitude(b)) if a == b => (a, false),
        (AxisRole::Latitude(a), AxisRole::Longitude(b)) if a == b => (a, true),
        _ => {
            return Err(NoAstrometry::new(format!(
                "CTYPE1 '{ctype1}' and CTYPE2 '{ctype2}' do not form a celestial pair"
            )))
        }
    };
    if code1 != code2 {
        return Err(NoAstrometry::new(format!(
            "mismatched projection codes '{code1}' and '{code2}'"
        )));
    }
    let code = ProjectionCode::parse(&code1)
        .ok_or_else(|| NoAstrometry::new(format!("unsupported projection '{code1}'")))?;
    if ctype1.len() > 8 {
        debug!("ignoring distortion suffix in {ctype1}");
    }

    let crpix = [header.require_float("CRPIX1")?, header.require_float("CRPIX2")?];
    let crval_axes = [header.require_float("CRVAL1")?, header.require_float("CRVAL2")?];
    let crval = if swapped {
        [crval_axes[1], crval_axes[0]]
    } else {
        crval_axes
    };

    let matrix = linear_part(header)?;
    let det = matrix[0][0] * matrix[1][1] - matrix[0][1] * matrix[1][0];
    if !det.is_finite() || det.abs() < DETERMINANT_THRESHOLD {
        return Err(NoAstrometry::new(format!(
            "singular linear transform (determinant {det:e})"
        )));
    }
    let inverse = [
        [matrix[1][1] / det, -matrix[0][1] / det],
        [-matrix[1][0] / det, matrix[0][0] / det],
    ];

    Ok(Projection {
        code,
        frame,
        crpix,
        crval,
        matrix,
        inverse,
        swapped,
    })
}

fn linear_part<K: KeywordProvider + ?Sized>(header: &K) -> Result<[[f64; 2]; 2], NoAstrometry> {
    let element = |prefix: &str, i: usize, j: usize| header.get_float(&format!("{prefix}{i}_{j}"));

    let has_cd = (1..=2).any(|i| (1..=2).any(|j| element("CD", i, j).is_some()));
    if has_cd {
        let mut m = [[0.0; 2]; 2];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = element("CD", i + 1, j + 1).unwrap_or(0.0);
            }
        }
        return Ok(m);
    }

    let cdelt = [header.require_float("CDELT1")?, header.require_float("CDELT2")?];
    let has_pc = (1..=2).any(|i| (1..=2).any(|j| element("PC", i, j).is_some()));
    if has_pc {
        let mut m = [[0.0; 2]; 2];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                let identity = if i == j { 1.0 } else { 0.0 };
                *v = cdelt[i] * element("PC", i + 1, j + 1).unwrap_or(identity);
            }
        }
        return Ok(m);
    }

    let rho = header.get_float("CROTA2").unwrap_or(0.0).to_radians();
    Ok([
        [cdelt[0] * rho.cos(), -cdelt[1] * rho.sin()],
        [cdelt[0] * rho.sin(), cdelt[1] * rho.cos()],
    ])
}

fn normalize_degrees(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

impl Projection {
    /// Sky position (longitude, latitude) in degrees for a 1-based pixel.
    ///
    /// `None` when the pixel falls outside the projection's domain.
    pub fn pixel_to_world(&self, px: f64, py: f64) -> Option<(f64, f64)> {
        let d = [px - self.crpix[0], py - self.crpix[1]];
        let q = [
            self.matrix[0][0] * d[0] + self.matrix[0][1] * d[1],
            self.matrix[1][0] * d[0] + self.matrix[1][1] * d[1],
        ];
        let (x, y) = if self.swapped { (q[1], q[0]) } else { (q[0], q[1]) };

        let r = x.hypot(y);
        let phi = if r == 0.0 { 0.0 } else { x.atan2(-y) };
        let theta = self.code.theta(r)?.to_radians();

        let (lon_p, lat_p) = (self.crval[0].to_radians(), self.crval[1].to_radians());
        let dphi = phi - PI;

        let sin_lat = theta.sin() * lat_p.sin() + theta.cos() * lat_p.cos() * dphi.cos();
        let lat = sin_lat.clamp(-1.0, 1.0).asin();
        let lon = lon_p
            + (-theta.cos() * dphi.sin())
                .atan2(theta.sin() * lat_p.cos() - theta.cos() * lat_p.sin() * dphi.cos());

        Some((normalize_degrees(lon.to_degrees()), lat.to_degrees()))
    }

    /// 1-based pixel for a sky position in degrees.
    ///
    /// `None` when the position cannot be projected (e.g. the far
    /// hemisphere of a TAN or SIN projection).
    pub fn world_to_pixel(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let (a, d) = (lon.to_radians(), lat.to_radians());
        let (lon_p, lat_p) = (self.crval[0].to_radians(), self.crval[1].to_radians());
        let dlon = a - lon_p;

        let sin_theta = d.sin() * lat_p.sin() + d.cos() * lat_p.cos() * dlon.cos();
        let theta = sin_theta.clamp(-1.0, 1.0).asin().to_degrees();
        let phi = PI
            + (-d.cos() * dlon.sin())
                .atan2(d.sin() * lat_p.cos() - d.cos() * lat_p.sin() * dlon.cos());

        let r = self.code.radius(theta)?;
        let x = r * phi.sin();
        let y = -r * phi.cos();
        let q = if self.swapped { [y, x] } else { [x, y] };

        let px = self.inverse[0][0] * q[0] + self.inverse[0][1] * q[1] + self.crpix[0];
        let py = self.inverse[1][0] * q[0] + self.inverse[1][1] * q[1] + self.crpix[1];
        Some((px, py))
    }

    /// Mean pixel scale in arcseconds.
    pub fn pixel_scale_arcsec(&self) -> f64 {
        let det = self.matrix[0][0] * self.matrix[1][1] - self.matrix[0][1] * self.matrix[1][0];
        det.abs().sqrt() * 3600.0
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lon_name, lat_name) = self.frame.axis_names();
        write!(
            f,
            "{} projection: {}={:.6} {}={:.6} deg at pixel ({:.2}, {:.2}), {:.3} arcsec/pixel",
            self.code.as_str(),
            lon_name,
            self.crval[0],
            lat_name,
            self.crval[1],
            self.crpix[0],
            self.crpix[1],
            self.pixel_scale_arcsec()
        )
    }
}
