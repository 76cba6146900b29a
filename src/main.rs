//! # Astro Explorer Entry Point
//!
//! Reads observation files from disk, hands the bytes to the core library and
//! prints what it derives. Model commands run from configuration alone.
//! Every command can emit JSON instead of text with `--json`.

// Test modules
#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use astro_explorer_lib::astrometry::{self, Projection};
use astro_explorer_lib::config::{Config, DEFAULT_CONFIG_PATH};
use astro_explorer_lib::display::ClipLimits;
use astro_explorer_lib::fits::{self, Container, Unit, UnitKind, UnitSummary};
use astro_explorer_lib::models::expansion::{self, ExpansionModelState, RecessionSample};
use astro_explorer_lib::models::habitable::{HZModelState, SpectralClass};
use astro_explorer_lib::models::tidal::{self, DiurnalSample, TidalModelState};
use astro_explorer_lib::sky::{self, SkyPosition};
use astro_explorer_lib::spectral::{self, DerivationError, DerivedTemperature, SpectralSample};
use astro_explorer_lib::tabular::{self, ColumnStats};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::{debug, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "astro-explorer")]
#[command(about = "Inspect FITS observations and run simplified astrophysical models")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List units and run every derivation on the selected image
    Info { file: PathBuf },
    /// Print the header cards of one unit
    Header {
        file: PathBuf,
        /// Unit index (0 = primary)
        #[arg(long, default_value = "0")]
        unit: usize,
    },
    /// Resolve the sky projection of the selected image
    Wcs {
        file: PathBuf,
        /// Convert a 1-based pixel position to sky coordinates
        #[arg(long, num_args = 2, value_names = ["X", "Y"])]
        pixel: Option<Vec<f64>>,
    },
    /// Altitude and azimuth of the observation target
    Altaz {
        file: PathBuf,
        /// Instant as RFC 3339 (default: now)
        #[arg(long, value_parser = parse_instant)]
        at: Option<DateTime<Utc>>,
    },
    /// Row spectrum and Wien temperature of the selected image
    Spectrum {
        file: PathBuf,
        /// Pixel row (default: middle row)
        #[arg(long)]
        row: Option<usize>,
    },
    /// Pair two numeric columns of the selected table
    Table {
        file: PathBuf,
        x: String,
        y: String,
        /// Treat X as a B-V colour index and report effective temperatures
        #[arg(long)]
        bv: bool,
    },
    /// Habitable-zone evolution for a spectral class
    Hz {
        /// M, K, G, F or A
        #[arg(default_value = "G")]
        class: SpectralClass,
        /// Planet orbit in AU (default from config)
        #[arg(long)]
        orbit: Option<f64>,
    },
    /// Daily tidal amplitude and a diurnal curve
    Tide {
        #[arg(long, default_value = "30")]
        days: usize,
        /// Anchor day 0 at this instant, RFC 3339 (default: now)
        #[arg(long, value_parser = parse_instant)]
        epoch: Option<DateTime<Utc>>,
    },
    /// Expand a lattice point cloud over time
    Expand {
        #[arg(long, default_value = "10.0")]
        t_end: f64,
        #[arg(long, default_value = "5")]
        steps: usize,
    },
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 instant: {e}"))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::load_from_path(&cli.config);
    debug!("Using configuration: {config:?}");

    match cli.command {
        Commands::Info { ref file } => info(&cli, &config, file),
        Commands::Header { ref file, unit } => header(&cli, file, unit),
        Commands::Wcs { ref file, ref pixel } => wcs(&cli, file, pixel.as_deref()),
        Commands::Altaz { ref file, at } => altaz(&cli, &config, file, at.unwrap_or_else(Utc::now)),
        Commands::Spectrum { ref file, row } => spectrum(&cli, &config, file, row),
        Commands::Table {
            ref file,
            ref x,
            ref y,
            bv,
        } => table(&cli, file, x, y, bv),
        Commands::Hz { class, orbit } => hz(&cli, &config, class, orbit),
        Commands::Tide { days, epoch } => tide(&cli, &config, days, epoch.unwrap_or_else(Utc::now)),
        Commands::Expand { t_end, steps } => expand(&cli, &config, t_end, steps),
    }
}

fn open(path: &Path) -> Result<Container> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    fits::load(&bytes).with_context(|| format!("parsing {}", path.display()))
}

fn selected(container: &Container, kind: UnitKind) -> Result<&Unit> {
    Ok(fits::select(container, kind)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct InfoReport {
    units: Vec<UnitSummary>,
    image: Option<ImageReport>,
}

#[derive(Serialize)]
struct ImageReport {
    unit: usize,
    shape: Vec<usize>,
    clip: Option<ClipLimits>,
    projection: Result<String, String>,
    sky_position: Result<SkyPosition, String>,
    temperatures: Result<Vec<DerivedTemperature>, String>,
}

fn image_report(config: &Config, unit: &Unit) -> Option<ImageReport> {
    let image = unit.image()?;
    // Each derivation stands alone: one failing must not hide the others.
    let projection = astrometry::resolve(&unit.header)
        .map(|p| p.to_string())
        .map_err(|e| e.to_string());
    let sky_position = sky::observer_alt_az_from_header(&unit.header, &config.observer, Utc::now())
        .map_err(|e| e.to_string());
    let temperatures = spectral::extract_row_spectrum(image, None, &config.spectral)
        .and_then(sample_temperatures)
        .map_err(|e| e.to_string());

    Some(ImageReport {
        unit: unit.index,
        shape: image.shape().to_vec(),
        clip: config.display.limits(image),
        projection,
        sky_position,
        temperatures,
    })
}

fn info(cli: &Cli, config: &Config, file: &Path) -> Result<()> {
    let container = open(file)?;
    let image = match fits::select(&container, UnitKind::Image) {
        Ok(unit) => image_report(config, unit),
        Err(e) => {
            warn!("{e}");
            None
        }
    };
    let report = InfoReport {
        units: container.summary(),
        image,
    };
    if cli.json {
        return print_json(&report);
    }

    println!("Filename: {}", file.display());
    println!("No. Name                Type     Cards   Dimensions      Format");
    for summary in &report.units {
        println!("{summary}");
    }
    if let Some(image) = &report.image {
        println!();
        println!("Image unit {}: shape {:?}", image.unit, image.shape);
        if let Some(clip) = image.clip {
            println!("Display limits: {:.4} .. {:.4}", clip.low, clip.high);
        }
        match &image.projection {
            Ok(p) => println!("{p}"),
            Err(e) => println!("WCS: {e}"),
        }
        match &image.sky_position {
            Ok(pos) => println!(
                "Alt/Az: {:.2}° / {:.2}° ({})",
                pos.altitude_deg,
                pos.azimuth_deg,
                pos.cardinal_direction()
            ),
            Err(e) => println!("Alt/Az: {e}"),
        }
        match &image.temperatures {
            Ok(temps) => {
                for (channel, t) in temps.iter().enumerate() {
                    println!(
                        "Channel {channel}: peak {:.1} nm, T ≈ {:.0} K",
                        t.peak_wavelength_nm, t.temperature_k
                    );
                }
            }
            Err(e) => println!("Spectrum: {e}"),
        }
    }
    Ok(())
}

fn header(cli: &Cli, file: &Path, index: usize) -> Result<()> {
    let container = open(file)?;
    let unit = container.get(index).with_context(|| {
        format!("unit {index} out of range (container has {})", container.len())
    })?;
    if cli.json {
        return print_json(&unit.header.cards());
    }
    println!("{}", unit.header);
    Ok(())
}

#[derive(Serialize)]
struct WcsReport {
    summary: String,
    pixel_scale_arcsec: f64,
    world: Option<(f64, f64)>,
}

fn wcs(cli: &Cli, file: &Path, pixel: Option<&[f64]>) -> Result<()> {
    let container = open(file)?;
    let unit = selected(&container, UnitKind::Image)?;
    let projection: Projection = astrometry::resolve(&unit.header)?;
    let world = match pixel {
        Some([x, y]) => projection.pixel_to_world(*x, *y),
        _ => None,
    };
    let report = WcsReport {
        summary: projection.to_string(),
        pixel_scale_arcsec: projection.pixel_scale_arcsec(),
        world,
    };
    if cli.json {
        return print_json(&report);
    }
    println!("{}", report.summary);
    if let (Some([x, y]), Some((lon, lat))) = (pixel, report.world) {
        println!("Pixel ({x}, {y}) -> ({lon:.6}°, {lat:.6}°)");
    }
    Ok(())
}

fn altaz(cli: &Cli, config: &Config, file: &Path, at: DateTime<Utc>) -> Result<()> {
    let container = open(file)?;
    let unit = selected(&container, UnitKind::Image)?;
    let position = sky::observer_alt_az_from_header(&unit.header, &config.observer, at)?;
    if cli.json {
        return print_json(&position);
    }
    println!(
        "At {} from ({:.4}°, {:.4}°):",
        at.to_rfc3339(),
        config.observer.latitude_deg,
        config.observer.longitude_deg
    );
    println!(
        "Altitude {:.2}°, azimuth {:.2}° ({}){}",
        position.altitude_deg,
        position.azimuth_deg,
        position.cardinal_direction(),
        if position.is_above_horizon() {
            ""
        } else {
            ", below horizon"
        }
    );
    Ok(())
}

/// Wien temperature of each channel. Non-finite intensities become zero
/// first, so NaN and infinite pixels never decide the peak.
fn sample_temperatures(
    samples: Vec<SpectralSample>,
) -> Result<Vec<DerivedTemperature>, DerivationError> {
    samples
        .into_iter()
        .map(|mut sample| {
            sample.intensities = spectral::sanitize_non_finite(&sample.intensities);
            spectral::derive_temperature(&sample)
        })
        .collect()
}

fn spectrum(cli: &Cli, config: &Config, file: &Path, row: Option<usize>) -> Result<()> {
    let container = open(file)?;
    let unit = selected(&container, UnitKind::Image)?;
    let image = unit.image().context("selected unit has no image")?;
    let samples = spectral::extract_row_spectrum(image, row, &config.spectral)?;
    let temperatures = sample_temperatures(samples)?;
    if cli.json {
        return print_json(&temperatures);
    }
    for (channel, t) in temperatures.iter().enumerate() {
        println!(
            "Channel {channel}: peak {:.1} nm, Wien temperature {:.0} K",
            t.peak_wavelength_nm, t.temperature_k
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct TableReport {
    x: Vec<f64>,
    y: Vec<f64>,
    x_stats: Option<ColumnStats>,
    y_stats: Option<ColumnStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperatures_k: Option<Vec<Option<f64>>>,
}

/// Effective temperature per B-V value; `None` where the index is outside
/// the fit's domain.
fn bv_temperatures(values: &[f64]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|&bv| spectral::color_index_temperature(bv).ok())
        .collect()
}

fn table(cli: &Cli, file: &Path, x: &str, y: &str, bv: bool) -> Result<()> {
    let container = open(file)?;
    let unit = selected(&container, UnitKind::Table)?;
    let table = unit.table().context("selected unit has no table")?;
    let (xs, ys) = tabular::pair_columns(table, x, y)?;
    let report = TableReport {
        x_stats: ColumnStats::from_values(&xs),
        y_stats: ColumnStats::from_values(&ys),
        temperatures_k: bv.then(|| bv_temperatures(&xs)),
        x: xs,
        y: ys,
    };
    if cli.json {
        return print_json(&report);
    }
    println!("{} of {} rows have both {x} and {y}", report.x.len(), table.rows);
    for (name, stats) in [(x, report.x_stats), (y, report.y_stats)] {
        if let Some(s) = stats {
            println!(
                "{name:>12}: min {:.4}  max {:.4}  mean {:.4}  std {:.4}",
                s.min, s.max, s.mean, s.std_dev
            );
        }
    }
    if let Some(temperatures) = &report.temperatures_k {
        let valid: Vec<f64> = temperatures.iter().flatten().copied().collect();
        match ColumnStats::from_values(&valid) {
            Some(s) => println!(
                "Teff from {x}: {} stars, min {:.0} K  max {:.0} K  mean {:.0} K",
                valid.len(),
                s.min,
                s.max,
                s.mean
            ),
            None => warn!("no {x} value lies inside the B-V temperature fit"),
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct HzReport {
    states: Vec<HZModelState>,
    habitable_duration_ga: f64,
}

fn hz(cli: &Cli, config: &Config, class: SpectralClass, orbit: Option<f64>) -> Result<()> {
    let orbit = orbit.unwrap_or(config.habitable.orbit_au);
    let report = HzReport {
        states: config.habitable.evolution(class, orbit)?,
        habitable_duration_ga: config.habitable.habitable_duration(class, orbit)?,
    };
    if cli.json {
        return print_json(&report);
    }
    println!("{class}-type star, planet at {orbit} AU");
    println!("  t (Ga)    L (Lsun)   inner (AU)  outer (AU)");
    for s in &report.states {
        println!(
            "{:>8.2} {:>11.4} {:>12.4} {:>11.4}  {}",
            s.time_ga,
            s.luminosity_lsun,
            s.inner_au,
            s.outer_au,
            if s.habitable { "habitable" } else { "" }
        );
    }
    println!("Habitable for about {:.1} Ga", report.habitable_duration_ga);
    Ok(())
}

#[derive(Serialize)]
struct TideReport {
    epoch: DateTime<Utc>,
    days: Vec<TidalModelState>,
    diurnal: Vec<DiurnalSample>,
}

fn tide(cli: &Cli, config: &Config, days: usize, epoch: DateTime<Utc>) -> Result<()> {
    let epoch_age = tidal::epoch_age(epoch);
    let series = config.tidal.series(days, epoch_age)?;
    let diurnal = match series.first() {
        Some(today) => {
            let hours: Vec<f64> = (0..=24).map(f64::from).collect();
            config
                .tidal
                .diurnal(today.amplitude, config.observer.latitude_deg, &hours)
        }
        None => Vec::new(),
    };
    let report = TideReport {
        epoch,
        days: series,
        diurnal,
    };
    if cli.json {
        return print_json(&report);
    }
    println!("Day 0 = {} (moon age {:.1} d)", epoch.to_rfc3339(), epoch_age);
    println!(" day  distance (km)  amplitude (m)  phase");
    for s in &report.days {
        println!(
            "{:>4} {:>14.0} {:>14.3}  {}",
            s.day_offset, s.distance_km, s.amplitude, s.phase_label
        );
    }
    if !report.diurnal.is_empty() {
        println!();
        println!("Day 0 at latitude {:.2}°:", config.observer.latitude_deg);
        for sample in &report.diurnal {
            println!("  {:>5.1} h  {:>+7.3} m", sample.hour, sample.height);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ExpansionReport {
    states: Vec<ExpansionModelState>,
    recession: Vec<RecessionSample>,
}

fn expand(cli: &Cli, config: &Config, t_end: f64, steps: usize) -> Result<()> {
    let params = &config.expansion;
    let cloud = expansion::lattice_cloud(
        params.lattice_per_axis,
        params.lattice_spacing,
        params.dimensions,
    )?;
    let states = expansion::timeline(&cloud, params.h0_km_s_mpc, t_end, steps)?;
    let recession = [10.0, 100.0, 1_000.0]
        .into_iter()
        .map(|d| expansion::recession(params.h0_km_s_mpc, d))
        .collect::<Result<Vec<_>, _>>()?;
    let report = ExpansionReport { states, recession };
    if cli.json {
        return print_json(&report);
    }
    println!(
        "{} points, H0 = {} km/s/Mpc",
        cloud.len(),
        params.h0_km_s_mpc
    );
    for state in &report.states {
        let extent = state
            .positions
            .iter()
            .map(|p| p.norm())
            .fold(0.0, f64::max);
        println!(
            "t = {:>6.2}  scale {:.4}  extent {:.3}",
            state.time, state.scale_factor, extent
        );
    }
    for r in &report.recession {
        println!(
            "d = {:>6} Mpc  v = {:>9.1} km/s  z = {:.4}",
            r.distance_mpc, r.velocity_km_s, r.redshift
        );
    }
    Ok(())
}
