//! Configuration-driven model runs, the way the binary drives them.

use astro_explorer_lib::config::Config;
use astro_explorer_lib::models::expansion;
use astro_explorer_lib::models::habitable::SpectralClass;
use astro_explorer_lib::models::tidal::{self, PhaseLabel};
use chrono::{TimeZone, Utc};
use std::io::Write;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn default_g_star_keeps_earth_habitable_at_start() {
    let config = Config::default();
    let states = config
        .habitable
        .evolution(SpectralClass::G, config.habitable.orbit_au)
        .unwrap();
    assert_eq!(states.len(), 101);
    assert!(states[0].habitable);
    assert!(!states.last().unwrap().habitable, "G star should outgrow 1 AU");
    assert!(states.iter().all(|s| s.outer_au > s.inner_au && s.luminosity_lsun > 0.0));
}

#[test]
fn every_class_evaluates_with_defaults() {
    let config = Config::default();
    for class in SpectralClass::ALL {
        let duration = config.habitable.habitable_duration(class, 1.0).unwrap();
        assert!(duration >= 0.0, "{class}: {duration}");
    }
}

#[test]
fn configured_tidal_model_drives_series() {
    let file = config_file(
        r#"
[tidal]
orbit = "Synodic"
spring_neap = 0.0
"#,
    );
    let config = Config::load_from_path(file.path());
    assert_eq!(config.tidal.base_amplitude_m, 0.54);

    let series = config.tidal.series(30, 0.0).unwrap();
    assert_eq!(series.len(), 30);
    // Apogee at day 0, perigee half a synodic month later.
    let nearest = series
        .iter()
        .max_by(|a, b| a.amplitude.total_cmp(&b.amplitude))
        .unwrap();
    assert!((14.0..=16.0).contains(&nearest.day_offset));
    assert_eq!(series[0].phase_label, PhaseLabel::New);
    assert!(series.iter().all(|s| s.distance_km > 0.0 && s.tidal_force >= 0.0));
}

#[test]
fn tide_epoch_from_calendar_date() {
    let config = Config::default();
    let new_moon = Utc.with_ymd_and_hms(2024, 4, 8, 18, 21, 0).unwrap();
    let series = config.tidal.series(12, tidal::epoch_age(new_moon)).unwrap();
    assert_eq!(series.len(), 12);
    assert_eq!(series[2].phase_label, PhaseLabel::New);
    assert_eq!(series[10].phase_label, PhaseLabel::FirstQuarter);

    let diurnal = config.tidal.diurnal(series[0].amplitude, 45.0, &[0.0, 12.42]);
    assert!(diurnal[0].height > 0.0 && diurnal[1].height < 0.0);
}

#[test]
fn configured_expansion_timeline() {
    let file = config_file(
        r#"
[expansion]
h0_km_s_mpc = 100.0
lattice_per_axis = 3
lattice_spacing = 2.0
dimensions = 2
"#,
    );
    let config = Config::try_load_from_path(file.path()).unwrap();
    let params = config.expansion;
    let cloud =
        expansion::lattice_cloud(params.lattice_per_axis, params.lattice_spacing, params.dimensions)
            .unwrap();
    assert_eq!(cloud.len(), 9);

    let states = expansion::timeline(&cloud, params.h0_km_s_mpc, 10.0, 4).unwrap();
    assert_eq!(states.len(), 5);
    assert!((states[4].scale_factor - 2.0).abs() < 1e-12);
    let corner = states[4].positions[0];
    assert!((corner.x + 4.0).abs() < 1e-12 && (corner.y + 4.0).abs() < 1e-12);
    assert!(states.windows(2).all(|w| w[1].scale_factor >= w[0].scale_factor));
}

#[test]
fn invalid_model_parameters_fall_back_to_defaults() {
    let file = config_file(
        r#"
[tidal]
orbit = { Custom = -3.0 }
"#,
    );
    assert!(Config::try_load_from_path(file.path()).is_err());
    assert_eq!(Config::load_from_path(file.path()), Config::default());
}
