use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use xrf::{Detector, Elements, EscapeSettings, FluorescenceOptions, XrfConfig, XrfSolver};

use crate::cli::{Commands, EscapeArgs, FluorescenceArgs, MuArgs};

pub fn run(command: Commands, data_dir: Option<PathBuf>) -> Result<()> {
    let data_dir = data_dir.context("no data directory: pass --data-dir or set XRF_DATA_DIR")?;
    let elements = load_elements(&data_dir)?;
    match command {
        Commands::Mu(args) => mu(&args, &elements),
        Commands::Escape(args) => escape(&args, &elements),
        Commands::Fluorescence(args) => fluorescence(&args, &elements),
    }
}

fn load_elements(data_dir: &Path) -> Result<Elements> {
    log::info!("loading cross sections from {}", data_dir.display());
    let elements = Elements::load(data_dir)
        .with_context(|| format!("failed to load data from {}", data_dir.display()))?;
    log::info!("{} elements loaded", elements.len());
    Ok(elements)
}

fn mu(args: &MuArgs, elements: &Elements) -> Result<()> {
    let mu = elements.mass_attenuation_coefficients(&args.material, &args.energies)?;
    print_json(&mu.to_map())
}

fn escape(args: &EscapeArgs, elements: &Elements) -> Result<()> {
    let mut detector = Detector::new(&args.material, args.density, args.thickness)?;
    if let Some(max_peaks) = args.max_peaks {
        detector.set_escape_settings(EscapeSettings {
            max_peaks,
            ..Default::default()
        });
    }
    let peaks = detector.escape(args.energy, elements)?;
    print_json(&peaks)
}

fn fluorescence(args: &FluorescenceArgs, elements: &Elements) -> Result<()> {
    let file = File::open(&args.config)
        .with_context(|| format!("cannot open {}", args.config.display()))?;
    let config: XrfConfig = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("invalid configuration in {}", args.config.display()))?;
    let solver = XrfSolver::from_config(config)?;

    let mut options = FluorescenceOptions::default();
    if let Some(order) = args.order {
        options.order = order;
    }
    options.use_mass_fractions = !args.pure_elements;
    options.use_geometric_efficiency = !args.no_geometry;
    log::debug!("fluorescence options: {options:?}");

    let output = solver.multilayer_fluorescence(&args.requests, elements, &options)?;
    print_json(&output)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
