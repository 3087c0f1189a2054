//! Synthetic EPDL97/EADL97 tables for Z = 1..=60.
//!
//! The values follow simple power laws so that tests can recompute them;
//! they are not physical data. Every number is written in shortest
//! round-trip form, so parsed values equal the ones computed here.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tempfile::TempDir;
use xrf::Elements;

pub const MAX_Z: usize = 60;

const SHELLS: [&str; 9] = ["K", "L1", "L2", "L3", "M1", "M2", "M3", "M4", "M5"];
const SHELL_LABELS: [&str; 9] = [
    "K(1s1/2)",
    "L1(2s1/2)",
    "L2(2p1/2)",
    "L3(2p3/2)",
    "M1(3s1/2)",
    "M2(3p1/2)",
    "M3(3p3/2)",
    "M4(3d3/2)",
    "M5(3d5/2)",
];
/// Photoelectric cross section of each subshell just above its edge.
const SHELL_AMPLITUDE: [f64; 9] = [500.0, 600.0, 1000.0, 2000.0, 300.0, 300.0, 300.0, 300.0, 300.0];
const SHELL_SCALE: [f64; 9] = [1.0, 0.12, 0.105, 0.1, 0.015, 0.012, 0.011, 0.0075, 0.007];

/// K..M5 binding energies in keV; zero for shells the element lacks.
pub fn binding_energies(z: usize) -> [f64; 9] {
    let k = 0.0105 * (z * z) as f64;
    let mut binding = [0.0; 9];
    for (i, value) in binding.iter_mut().enumerate() {
        let present = match i {
            0 => true,
            1..=3 => z >= 3,
            _ => z >= 11,
        };
        if present {
            *value = k * SHELL_SCALE[i];
        }
    }
    binding
}

pub fn binding_energy(z: usize, shell: &str) -> f64 {
    SHELLS
        .iter()
        .position(|&s| s == shell)
        .map(|i| binding_energies(z)[i])
        .unwrap_or(0.0)
}

pub fn coherent(z: usize, energy: f64) -> f64 {
    0.4 * (z as f64 / 26.0) * (10.0 / energy).powf(1.8)
}

pub fn compton(_z: usize, energy: f64) -> f64 {
    0.15 * (energy + 1.0) / (energy + 10.0)
}

pub fn pair(z: usize, energy: f64) -> f64 {
    if energy > 1100.0 {
        1.0e-3 * (z as f64 / 26.0) * (energy / 1022.0).ln()
    } else {
        0.0
    }
}

pub fn all_other(z: usize, energy: f64) -> f64 {
    if z > 18 {
        0.05 * (z as f64 / 26.0) * energy.powf(-2.5)
    } else {
        0.0
    }
}

/// Subshell photoelectric cross section; `below_edge` selects the lower
/// of the two rows tabulated at the edge energy.
pub fn shell_photo(z: usize, shell: usize, energy: f64, below_edge: bool) -> f64 {
    let edge = binding_energies(z)[shell];
    if edge <= 0.0 || energy < edge || (energy == edge && below_edge) {
        return 0.0;
    }
    SHELL_AMPLITUDE[shell] * (edge / energy).powf(2.5)
}

/// Shell sum plus "all other" above the highest edge.
pub fn photoelectric(z: usize, energy: f64) -> f64 {
    let shells: f64 = (0..9).map(|s| shell_photo(z, s, energy, false)).sum();
    shells + all_other(z, energy)
}

pub fn total(z: usize, energy: f64) -> f64 {
    photoelectric(z, energy) + coherent(z, energy) + compton(z, energy) + pair(z, energy)
}

/// Log-spaced energies between 1 eV and 2 MeV.
pub fn base_grid() -> Vec<f64> {
    let n = 90;
    let (low, high) = (-3.0_f64, 2000.0_f64.log10());
    (0..n)
        .map(|i| 10f64.powf(low + (high - low) * i as f64 / (n - 1) as f64))
        .collect()
}

/// Rows of one element: energy and the shell whose pre-edge row it is.
fn energy_rows(z: usize) -> Vec<(f64, Option<usize>)> {
    let edges = binding_energies(z);
    let mut rows: Vec<(f64, Option<usize>)> = base_grid()
        .into_iter()
        .filter(|e| edges.iter().all(|&edge| (e - edge).abs() > 1.0e-6 * edge))
        .map(|e| (e, None))
        .collect();
    for (shell, &edge) in edges.iter().enumerate() {
        if edge > 0.0 {
            rows.push((edge, Some(shell)));
            rows.push((edge, None));
        }
    }
    rows.sort_by(|a, b| a.0.total_cmp(&b.0).then(b.1.is_some().cmp(&a.1.is_some())));
    rows
}

/// Distinct tabulated energies of element `z`.
pub fn tabulated_energies(z: usize) -> Vec<f64> {
    let mut energies: Vec<f64> = energy_rows(z).into_iter().map(|(e, _)| e).collect();
    energies.dedup();
    energies
}

pub fn fluorescence_yield_k(z: usize) -> f64 {
    if z >= 6 {
        let z4 = (z as f64).powi(4);
        z4 / (z4 + 9.0e5)
    } else {
        0.0
    }
}

pub fn fluorescence_yield_l(z: usize) -> f64 {
    if z >= 11 {
        let z4 = (z as f64).powi(4);
        z4 / (z4 + 1.2e8)
    } else {
        0.0
    }
}

pub fn fluorescence_yield_m(z: usize) -> f64 {
    if z >= 40 {
        1.0e-3 * (z - 39) as f64 / 21.0
    } else {
        0.0
    }
}

fn has_m(z: usize) -> bool {
    z >= 11
}

/// One scan of a relaxation file: title, labels and a row per element.
struct ShellScan {
    title: &'static str,
    labels: Vec<&'static str>,
    row: fn(usize) -> Vec<f64>,
}

fn m_gate(z: usize, value: f64) -> f64 {
    if has_m(z) { value } else { 0.0 }
}

fn k_scans() -> [Vec<ShellScan>; 3] {
    [
        vec![ShellScan {
            title: "K Shell Constants",
            labels: vec!["omegaK"],
            row: |z| vec![fluorescence_yield_k(z)],
        }],
        vec![ShellScan {
            title: "K Shell Radiative Rates",
            labels: vec!["KL2", "KL3", "KM2", "KM3", "TOTAL"],
            row: |z| {
                let rates = [0.33, 0.62, m_gate(z, 0.017), m_gate(z, 0.033)];
                let mut row = rates.to_vec();
                row.push(rates.iter().sum());
                row
            },
        }],
        vec![ShellScan {
            title: "K Shell Nonradiative Rates",
            labels: vec!["K-L1L1", "K-L1L2", "K-L1L3", "K-L2L3", "K-L3L3", "K-L3M5"],
            row: |z| vec![0.08, 0.12, 0.2, 0.3, 0.2, m_gate(z, 0.1)],
        }],
    ]
}

fn l_scans() -> [Vec<ShellScan>; 3] {
    [
        vec![
            ShellScan {
                title: "L1 Shell Constants",
                labels: vec!["omegaL1", "f12", "f13"],
                row: |z| vec![0.5 * fluorescence_yield_l(z), 0.1, 0.3],
            },
            ShellScan {
                title: "L2 Shell Constants",
                labels: vec!["omegaL2", "f23"],
                row: |z| vec![0.9 * fluorescence_yield_l(z), 0.15],
            },
            ShellScan {
                title: "L3 Shell Constants",
                labels: vec!["omegaL3"],
                row: |z| vec![fluorescence_yield_l(z)],
            },
        ],
        vec![
            ShellScan {
                title: "L1 Shell Radiative Rates",
                labels: vec!["L1M2", "L1M3"],
                row: |z| vec![m_gate(z, 0.4), m_gate(z, 0.6)],
            },
            ShellScan {
                title: "L2 Shell Radiative Rates",
                labels: vec!["L2M1", "L2M4"],
                row: |z| vec![m_gate(z, 0.05), m_gate(z, 0.95)],
            },
            ShellScan {
                title: "L3 Shell Radiative Rates",
                labels: vec!["L3M1", "L3M4", "L3M5"],
                row: |z| vec![m_gate(z, 0.04), m_gate(z, 0.1), m_gate(z, 0.86)],
            },
        ],
        vec![
            ShellScan {
                title: "L1 Shell Nonradiative Rates",
                labels: vec!["L1-L2M1", "L1-L3M1", "L1-M4M5"],
                row: |_| vec![0.2, 0.5, 0.3],
            },
            ShellScan {
                title: "L2 Shell Nonradiative Rates",
                labels: vec!["L2-L3M5", "L2-M4M5"],
                row: |_| vec![0.3, 0.7],
            },
            ShellScan {
                title: "L3 Shell Nonradiative Rates",
                labels: vec!["L3-M4M5", "L3-M5M5"],
                row: |_| vec![0.6, 0.4],
            },
        ],
    ]
}

fn m_scans() -> [Vec<ShellScan>; 3] {
    [
        vec![
            ShellScan {
                title: "M1 Shell Constants",
                labels: vec!["omegaM1", "f12"],
                row: |z| vec![fluorescence_yield_m(z), 0.1],
            },
            ShellScan {
                title: "M2 Shell Constants",
                labels: vec!["omegaM2", "f23"],
                row: |z| vec![fluorescence_yield_m(z), 0.1],
            },
            ShellScan {
                title: "M3 Shell Constants",
                labels: vec!["omegaM3", "f34"],
                row: |z| vec![fluorescence_yield_m(z), 0.05],
            },
            ShellScan {
                title: "M4 Shell Constants",
                labels: vec!["omegaM4", "f45"],
                row: |z| vec![fluorescence_yield_m(z), 0.1],
            },
            ShellScan {
                title: "M5 Shell Constants",
                labels: vec!["omegaM5"],
                row: |z| vec![fluorescence_yield_m(z)],
            },
        ],
        vec![
            ShellScan {
                title: "M1 Shell Radiative Rates",
                labels: vec!["M1N3"],
                row: |_| vec![1.0],
            },
            ShellScan {
                title: "M2 Shell Radiative Rates",
                labels: vec!["M2N4"],
                row: |_| vec![1.0],
            },
            ShellScan {
                title: "M3 Shell Radiative Rates",
                labels: vec!["M3N5"],
                row: |_| vec![1.0],
            },
            ShellScan {
                title: "M4 Shell Radiative Rates",
                labels: vec!["M4N6"],
                row: |_| vec![1.0],
            },
            ShellScan {
                title: "M5 Shell Radiative Rates",
                labels: vec!["M5N6", "M5N7"],
                row: |_| vec![0.1, 0.9],
            },
        ],
        vec![
            ShellScan {
                title: "M1 Shell Nonradiative Rates",
                labels: vec!["M1-M2N1", "M1-N1N1"],
                row: |_| vec![0.3, 0.7],
            },
            ShellScan {
                title: "M2 Shell Nonradiative Rates",
                labels: vec!["M2-N1N1"],
                row: |_| vec![1.0],
            },
            ShellScan {
                title: "M3 Shell Nonradiative Rates",
                labels: vec!["M3-N1N1"],
                row: |_| vec![1.0],
            },
            ShellScan {
                title: "M4 Shell Nonradiative Rates",
                labels: vec!["M4-N1N1"],
                row: |_| vec![1.0],
            },
            ShellScan {
                title: "M5 Shell Nonradiative Rates",
                labels: vec!["M5-N1N1"],
                row: |_| vec![1.0],
            },
        ],
    ]
}

fn push_row(text: &mut String, values: impl IntoIterator<Item = f64>) {
    let row: Vec<String> = values.into_iter().map(|v| format!("{v:e}")).collect();
    let _ = writeln!(text, "{}", row.join("  "));
}

fn binding_file() -> String {
    let mut text = String::from("#F EPDL97_BindingEnergies.dat\n\n");
    let _ = writeln!(text, "#S 1 Binding energies in keV");
    let _ = writeln!(text, "#N {}", SHELLS.len() + 1);
    let _ = writeln!(text, "#L Z  {}", SHELL_LABELS.join("  "));
    for z in 1..=MAX_Z {
        push_row(
            &mut text,
            std::iter::once(z as f64).chain(binding_energies(z)),
        );
    }
    text
}

fn cross_section_file() -> String {
    let labels = format!(
        "PhotonEnergy[keV]  Rayleigh(coherent)  Compton(incoherent)  Pair  Photoelectric  \
         TotalCrossSection  {}  AllOther",
        SHELL_LABELS.join("  ")
    );
    let mut text = String::from("#F EPDL97_CrossSections.dat\n");
    for z in 1..=MAX_Z {
        let _ = writeln!(text, "\n#S {z} Z = {z}");
        let _ = writeln!(text, "#N 16");
        let _ = writeln!(text, "#L {labels}");
        for (energy, pre_edge) in energy_rows(z) {
            let shells: Vec<f64> = (0..9)
                .map(|s| shell_photo(z, s, energy, pre_edge == Some(s)))
                .collect();
            let other = all_other(z, energy);
            let photo = shells.iter().sum::<f64>() + other;
            let (coh, incoh, pp) = (coherent(z, energy), compton(z, energy), pair(z, energy));
            let mut row = vec![energy, coh, incoh, pp, photo, photo + coh + incoh + pp];
            row.extend(shells);
            row.push(other);
            push_row(&mut text, row);
        }
    }
    text
}

fn shell_file(main: &str, scans: &[ShellScan]) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "#F EADL97_{main}Shell.dat");
    for (number, scan) in scans.iter().enumerate() {
        let _ = writeln!(text, "\n#S {} {}", number + 1, scan.title);
        let _ = writeln!(text, "#N {}", scan.labels.len() + 1);
        let _ = writeln!(text, "#L Z  {}", scan.labels.join("  "));
        for z in 1..=MAX_Z {
            push_row(
                &mut text,
                std::iter::once(z as f64).chain((scan.row)(z)),
            );
        }
    }
    text
}

/// Writes the eleven data files into `directory`.
pub fn write_data(directory: &Path) -> std::io::Result<()> {
    fs::write(directory.join("EPDL97_BindingEnergies.dat"), binding_file())?;
    fs::write(directory.join("EPDL97_CrossSections.dat"), cross_section_file())?;
    for (main, files) in [("K", k_scans()), ("L", l_scans()), ("M", m_scans())] {
        for (suffix, scans) in ["Constants", "RadiativeRates", "NonradiativeRates"]
            .iter()
            .zip(files)
        {
            fs::write(
                directory.join(format!("EADL97_{main}Shell{suffix}.dat")),
                shell_file(main, &scans),
            )?;
        }
    }
    Ok(())
}

pub fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_data(dir.path()).unwrap();
    dir
}

/// Registry shared by all tests of one binary.
pub fn elements() -> Arc<Elements> {
    static ELEMENTS: OnceLock<Arc<Elements>> = OnceLock::new();
    ELEMENTS
        .get_or_init(|| {
            let dir = data_dir();
            Arc::new(Elements::load(dir.path()).unwrap())
        })
        .clone()
}
