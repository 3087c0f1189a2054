use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use xrf::{ExcitationOrder, FluorescenceRequest};

/// X-ray attenuation, detector escape and multilayer fluorescence.
#[derive(Parser, Debug)]
#[command(name = "xrf")]
#[command(version)]
#[command(about = "X-ray fluorescence physics from EPDL97/EADL97 data files", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding the EPDL97 and EADL97 data files
    #[arg(long, env = "XRF_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mass attenuation coefficients (cm²/g) of a formula
    Mu(MuArgs),

    /// Escape peaks of a detector material
    Escape(EscapeArgs),

    /// Expected fluorescence of a measurement described in a JSON file
    Fluorescence(FluorescenceArgs),
}

#[derive(Args, Debug)]
pub struct MuArgs {
    /// Element or chemical formula
    pub material: String,

    /// Photon energies in keV
    #[arg(required = true, num_args = 1..)]
    pub energies: Vec<f64>,
}

#[derive(Args, Debug)]
pub struct EscapeArgs {
    /// Detector material formula
    #[arg(long, default_value = "Si")]
    pub material: String,

    /// g/cm³
    #[arg(long, default_value_t = 2.33)]
    pub density: f64,

    /// cm
    #[arg(long, default_value_t = 0.05)]
    pub thickness: f64,

    /// Most intense escape peaks reported
    #[arg(long)]
    pub max_peaks: Option<usize>,

    /// Incident photon energy in keV
    pub energy: f64,
}

#[derive(Args, Debug)]
pub struct FluorescenceArgs {
    /// JSON measurement description
    #[arg(short, long)]
    pub config: PathBuf,

    /// Overrides the excitation order (primary, secondary or tertiary)
    #[arg(long)]
    pub order: Option<ExcitationOrder>,

    /// Treat every layer as the pure element
    #[arg(long)]
    pub pure_elements: bool,

    /// Ignore the solid angle of the detector
    #[arg(long)]
    pub no_geometry: bool,

    /// Requests such as "Fe", "Fe K" or "Pb L3 1"
    #[arg(required = true, num_args = 1..)]
    pub requests: Vec<FluorescenceRequest>,
}
