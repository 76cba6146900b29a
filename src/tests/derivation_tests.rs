//! Derivations run on units pulled out of complete files. Each derivation
//! stands alone: a header without astrometry still yields a spectrum.

use super::fixtures::*;
use astro_explorer_lib::astrometry;
use astro_explorer_lib::display::DisplayScaling;
use astro_explorer_lib::fits::{self, UnitKind};
use astro_explorer_lib::sky::{self, Observer};
use astro_explorer_lib::spectral::{self, SpectralBand};
use chrono::{TimeZone, Utc};

/// 5×3 image whose middle row peaks at column 3.
fn spectrum_file(extra: Vec<fits::Card>) -> Vec<u8> {
    #[rustfmt::skip]
    let pixels = [
        1, 1, 1, 1, 1,
        2, 4, 8, 9, 3,
        1, 1, 1, 1, 1,
    ];
    let (cards, data) = image_i16(5, 3, &pixels, false, extra);
    FitsBuilder::new().unit(&cards, &data).build()
}

#[test]
fn spectrum_derived_without_astrometry() {
    let container = fits::load(&spectrum_file(vec![])).unwrap();
    let unit = fits::select(&container, UnitKind::Image).unwrap();

    let no_wcs = astrometry::resolve(&unit.header).unwrap_err();
    assert!(no_wcs.reason.contains("CTYPE1"), "reason: {}", no_wcs.reason);

    let band = SpectralBand::default();
    let samples = spectral::extract_row_spectrum(unit.image().unwrap(), None, &band).unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].wavelengths_nm, vec![400.0, 475.0, 550.0, 625.0, 700.0]);

    let derived = spectral::derive_temperature(&samples[0]).unwrap();
    assert_eq!(derived.peak_wavelength_nm, 625.0);
    assert!(samples[0].wavelengths_nm.contains(&derived.peak_wavelength_nm));
    assert!((derived.temperature_k - 2.898e6 / 625.0).abs() < 1e-9);
}

#[test]
fn explicit_row_and_out_of_range_row() {
    let container = fits::load(&spectrum_file(vec![])).unwrap();
    let image = fits::select(&container, UnitKind::Image).unwrap().image().unwrap();
    let band = SpectralBand::default();

    let top = spectral::extract_row_spectrum(image, Some(0), &band).unwrap();
    let derived = spectral::derive_temperature(&top[0]).unwrap();
    // Flat row: the first maximum wins.
    assert_eq!(derived.peak_wavelength_nm, 400.0);

    assert!(matches!(
        spectral::extract_row_spectrum(image, Some(3), &band),
        Err(spectral::DerivationError::RowOutOfRange { row: 3, height: 3 })
    ));
}

#[test]
fn projection_and_target_from_header() {
    let mut extra = tan_wcs(83.8221, -5.3911, (3.0, 2.0));
    extra.push(text("OBJCTRA", "05 35 17.3"));
    extra.push(text("OBJCTDEC", "-05 23 28"));
    let container = fits::load(&spectrum_file(extra)).unwrap();
    let unit = fits::select(&container, UnitKind::Image).unwrap();

    let projection = astrometry::resolve(&unit.header).unwrap();
    let (ra, dec) = projection.pixel_to_world(3.0, 2.0).unwrap();
    assert!((ra - 83.8221).abs() < 1e-9);
    assert!((dec + 5.3911).abs() < 1e-9);
    assert!((projection.pixel_scale_arcsec() - 1.0).abs() < 1e-6);

    // Orion from Greenwich at local midnight in January is high in the south.
    let instant = Utc.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap();
    let position =
        sky::observer_alt_az_from_header(&unit.header, &Observer::default(), instant).unwrap();
    assert!(position.is_above_horizon());
    assert!((-90.0..=90.0).contains(&position.altitude_deg));
    assert!((0.0..360.0).contains(&position.azimuth_deg));
    assert!(
        (150.0..230.0).contains(&position.azimuth_deg),
        "azimuth {}",
        position.azimuth_deg
    );
}

#[test]
fn missing_target_is_a_value_not_a_failure() {
    let container = fits::load(&spectrum_file(vec![real("RA", 10.0)])).unwrap();
    let unit = fits::select(&container, UnitKind::Image).unwrap();
    let instant = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let err = sky::observer_alt_az_from_header(&unit.header, &Observer::default(), instant)
        .unwrap_err();
    assert!(err.reason.contains("DEC"), "reason: {}", err.reason);
}

#[test]
fn display_limits_from_loaded_image() {
    let pixels: Vec<i16> = (0..100).collect();
    let (cards, data) = image_i16(10, 10, &pixels, false, vec![]);
    let bytes = FitsBuilder::new().unit(&cards, &data).build();
    let container = fits::load(&bytes).unwrap();
    let image = fits::select(&container, UnitKind::Image).unwrap().image().unwrap();

    let limits = DisplayScaling::default().limits(image).unwrap();
    assert!((limits.low - 4.95).abs() < 1e-9);
    assert!((limits.high - 98.505).abs() < 1e-9);
    assert_eq!(limits.normalize(0.0), 0.0);
    assert_eq!(limits.normalize(99.0), 1.0);
}

#[test]
fn non_finite_pixels_are_zeroed_before_peak_search() {
    let band = SpectralBand::default();
    let hot = spectral::SpectralSample::new(band.linspace(4), vec![f64::INFINITY, 1.0, 3.0, 2.0]).unwrap();
    // Bias-subtracted row: every finite value is negative, so a blank pixel
    // zeroed by the caller holds the maximum.
    let bias = spectral::SpectralSample::new(band.linspace(4), vec![-5.0, -4.0, f64::NAN, -6.0]).unwrap();

    let temperatures = crate::sample_temperatures(vec![hot, bias]).unwrap();
    assert_eq!(temperatures[0].peak_wavelength_nm, 600.0);
    assert_eq!(temperatures[1].peak_wavelength_nm, 600.0);
    assert!((temperatures[1].temperature_k - 2.898e6 / 600.0).abs() < 1e-9);
}

#[test]
fn bv_column_maps_to_effective_temperature() {
    let temperatures = crate::bv_temperatures(&[0.65, -1.0, 1.5]);
    let sun = temperatures[0].unwrap();
    assert!((5600.0..6000.0).contains(&sun), "solar B-V gave {sun} K");
    assert_eq!(temperatures[1], None);
    assert!(temperatures[2].unwrap() < sun);
}
