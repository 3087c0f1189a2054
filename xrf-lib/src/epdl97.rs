//! EPDL97 photon interaction data: binding energies and per-shell
//! photoelectric, coherent, Compton and pair cross sections.
//!
//! The tables are read once from a data directory and are immutable
//! afterwards. All energies are in keV and all cross sections in cm²/g.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, XrfError};
use crate::interp::{bracket, loglog};
use crate::shell::SHELL_NAMES;
use crate::specfile::{Scan, SpecFile};

pub const BINDING_ENERGIES_FILE: &str = "EPDL97_BindingEnergies.dat";
pub const CROSS_SECTIONS_FILE: &str = "EPDL97_CrossSections.dat";

/// Photoelectric bucket for every subshell beyond M5.
pub const ALL_OTHER: &str = "all other";

/// Relative deficit of the tabulated photoelectric cross section below the
/// shell sum that is tolerated (and corrected) at load time.
const PHOTO_DEFICIT_TOLERANCE: f64 = 1.0e-3;

/// Physical interaction channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Coherent,
    Compton,
    Pair,
    Photoelectric,
    Total,
}

impl Effect {
    pub const ALL: [Effect; 5] = [
        Effect::Coherent,
        Effect::Compton,
        Effect::Pair,
        Effect::Photoelectric,
        Effect::Total,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Coherent => "coherent",
            Effect::Compton => "compton",
            Effect::Pair => "pair",
            Effect::Photoelectric => "photoelectric",
            Effect::Total => "total",
        }
    }
}

/// Mass attenuation coefficients (cm²/g) evaluated at a list of energies.
///
/// `shells` carries the photoelectric cross section split by subshell for
/// single elements; it is empty for compounds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MassAttenuation {
    pub energy: Vec<f64>,
    pub coherent: Vec<f64>,
    pub compton: Vec<f64>,
    pub pair: Vec<f64>,
    pub photoelectric: Vec<f64>,
    pub total: Vec<f64>,
    pub shells: BTreeMap<String, Vec<f64>>,
}

impl MassAttenuation {
    pub(crate) fn zeros(energies: &[f64]) -> Self {
        let n = energies.len();
        MassAttenuation {
            energy: energies.to_vec(),
            coherent: vec![0.0; n],
            compton: vec![0.0; n],
            pair: vec![0.0; n],
            photoelectric: vec![0.0; n],
            total: vec![0.0; n],
            shells: BTreeMap::new(),
        }
    }

    pub fn effect(&self, effect: Effect) -> &[f64] {
        match effect {
            Effect::Coherent => &self.coherent,
            Effect::Compton => &self.compton,
            Effect::Pair => &self.pair,
            Effect::Photoelectric => &self.photoelectric,
            Effect::Total => &self.total,
        }
    }

    /// Flat `effect name -> values` view, energies included under "energy".
    pub fn to_map(&self) -> BTreeMap<String, Vec<f64>> {
        let mut map = BTreeMap::new();
        map.insert("energy".to_string(), self.energy.clone());
        for effect in Effect::ALL {
            map.insert(effect.as_str().to_string(), self.effect(effect).to_vec());
        }
        for (shell, values) in &self.shells {
            map.insert(shell.clone(), values.clone());
        }
        map
    }
}

/// Cross sections of one element at one energy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CrossSections {
    pub coherent: f64,
    pub compton: f64,
    pub pair: f64,
    pub photoelectric: f64,
    pub total: f64,
    /// K..M5 followed by "all other".
    pub shells: [f64; 10],
}

#[derive(Debug, Clone)]
struct CrossSectionTable {
    energy: Vec<f64>,
    coherent: Vec<f64>,
    compton: Vec<f64>,
    pair: Vec<f64>,
    /// K..M5 followed by "all other".
    shells: [Vec<f64>; 10],
    edges: [f64; 9],
}

/// Column positions of one cross-section scan.
struct Columns {
    energy: usize,
    coherent: usize,
    compton: usize,
    photoelectric: usize,
    total: usize,
    pair: Option<usize>,
    shells: [usize; 10],
}

#[derive(Debug, Clone)]
pub struct CrossSectionDatabase {
    directory: PathBuf,
    binding_energies: Vec<BTreeMap<String, f64>>,
    tables: Vec<CrossSectionTable>,
}

impl CrossSectionDatabase {
    /// Loads the binding energies and cross sections found in `directory`.
    ///
    /// Fails with `DataNotFound` if either file is absent or malformed.
    pub fn load(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(XrfError::data_not_found(directory, "not a directory"));
        }
        let binding = SpecFile::open(directory.join(BINDING_ENERGIES_FILE))?;
        let cross_sections = SpecFile::open(directory.join(CROSS_SECTIONS_FILE))?;
        let db = Self::from_specfiles(directory, &binding, &cross_sections)?;
        log::debug!(
            "loaded EPDL97 data for {} elements from {}",
            db.len(),
            directory.display()
        );
        Ok(db)
    }

    pub(crate) fn from_specfiles(
        directory: &Path,
        binding: &SpecFile,
        cross_sections: &SpecFile,
    ) -> Result<Self> {
        let binding_energies = parse_binding_energies(binding)?;
        let mut tables = Vec::with_capacity(cross_sections.scans().len());
        let first = cross_sections
            .scans()
            .first()
            .ok_or_else(|| XrfError::data_not_found(cross_sections.path(), "no scans"))?;
        let columns = locate_columns(cross_sections.path(), &first.labels)?;

        for (index, scan) in cross_sections.scans().iter().enumerate() {
            if scan.labels != first.labels {
                return Err(XrfError::data_not_found(
                    cross_sections.path(),
                    format!("scan {} labels differ from scan {}", scan.number, first.number),
                ));
            }
            let z = index + 1;
            let edges = binding_energies
                .get(index)
                .map(|map| SHELL_NAMES.map(|shell| map.get(shell).copied().unwrap_or(0.0)))
                .unwrap_or([0.0; 9]);
            tables.push(build_table(cross_sections.path(), z, scan, &columns, edges)?);
        }

        Ok(CrossSectionDatabase {
            directory: directory.to_path_buf(),
            binding_energies,
            tables,
        })
    }

    /// Directory the tables were read from.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of elements with both binding energies and cross sections.
    pub fn len(&self) -> usize {
        self.binding_energies.len().min(self.tables.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_z(&self, z: usize) -> Result<usize> {
        if z == 0 || z > self.len() {
            return Err(XrfError::InvalidElement(format!(
                "atomic number {z} outside 1..={}",
                self.len()
            )));
        }
        Ok(z - 1)
    }

    /// Shell name -> binding energy (keV) for element `z`.
    pub fn binding_energies(&self, z: usize) -> Result<&BTreeMap<String, f64>> {
        let index = self.check_z(z)?;
        Ok(&self.binding_energies[index])
    }

    /// Mass attenuation coefficients of element `z` at each of `energies`.
    ///
    /// Energies may be in any order and may repeat. Tabulated energies
    /// reproduce the tabulated values exactly; energies outside the table are
    /// extrapolated along the log-log slope of the outermost samples.
    pub fn mass_attenuation_coefficients(
        &self,
        z: usize,
        energies: &[f64],
    ) -> Result<MassAttenuation> {
        let index = self.check_z(z)?;
        let table = &self.tables[index];
        let mut result = MassAttenuation::zeros(energies);
        let mut shells: [Vec<f64>; 10] = Default::default();

        for (i, &energy) in energies.iter().enumerate() {
            let cs = table.at(check_energy(energy)?);
            result.coherent[i] = cs.coherent;
            result.compton[i] = cs.compton;
            result.pair[i] = cs.pair;
            result.photoelectric[i] = cs.photoelectric;
            result.total[i] = cs.total;
            for (values, value) in shells.iter_mut().zip(cs.shells) {
                values.push(value);
            }
        }

        for (name, values) in shell_keys().zip(shells) {
            result.shells.insert(name.to_string(), values);
        }
        Ok(result)
    }

    /// Fraction of the photoelectric cross section taken by each subshell.
    ///
    /// Keys are K..M5 and "all other"; at every energy the weights add up to
    /// one. When no explicit subshell can be ionized the whole weight goes to
    /// "all other".
    pub fn photoelectric_weights(
        &self,
        z: usize,
        energies: &[f64],
    ) -> Result<BTreeMap<String, Vec<f64>>> {
        let index = self.check_z(z)?;
        let table = &self.tables[index];
        let mut weights: [Vec<f64>; 10] = Default::default();

        for &energy in energies {
            let row = shell_weights(&table.at(check_energy(energy)?));
            for (values, value) in weights.iter_mut().zip(row) {
                values.push(value);
            }
        }

        Ok(shell_keys()
            .zip(weights)
            .map(|(name, values)| (name.to_string(), values))
            .collect())
    }

    pub(crate) fn cross_sections(&self, z: usize, energy: f64) -> Result<CrossSections> {
        let index = self.check_z(z)?;
        Ok(self.tables[index].at(check_energy(energy)?))
    }
}

fn shell_keys() -> impl Iterator<Item = &'static str> {
    SHELL_NAMES.into_iter().chain(std::iter::once(ALL_OTHER))
}

fn check_energy(energy: f64) -> Result<f64> {
    if !energy.is_finite() || energy <= 0.0 {
        return Err(XrfError::InvalidEnergy(energy));
    }
    Ok(energy)
}

/// Per-shell photoelectric weights at one energy, K..M5 then "all other".
pub(crate) fn shell_weights(cs: &CrossSections) -> [f64; 10] {
    let mut weights = [0.0; 10];
    let any_shell = cs.shells[..9].iter().any(|&v| v > 0.0);
    if cs.photoelectric <= 1.0e-10 || !any_shell {
        weights[9] = 1.0;
        return weights;
    }
    for (weight, value) in weights.iter_mut().zip(cs.shells) {
        *weight = value / cs.photoelectric;
    }
    weights
}

fn binding_energy_key(label: &str) -> String {
    if label.starts_with('K') {
        return "K".to_string();
    }
    let chars: Vec<char> = label.chars().collect();
    let take = if chars.len() > 3 && chars[3] == '(' { 3 } else { 2 };
    chars.iter().take(take).collect::<String>().trim().to_string()
}

fn parse_binding_energies(file: &SpecFile) -> Result<Vec<BTreeMap<String, f64>>> {
    let [scan] = file.scans() else {
        return Err(XrfError::data_not_found(
            file.path(),
            format!("expected one scan, found {}", file.scans().len()),
        ));
    };
    let keys: Vec<Option<String>> = scan
        .labels
        .iter()
        .map(|label| (label != "Z").then(|| binding_energy_key(label)))
        .collect();

    Ok(scan
        .rows
        .iter()
        .map(|row| {
            keys.iter()
                .zip(row)
                .filter_map(|(key, &value)| key.as_ref().map(|k| (k.clone(), value)))
                .collect()
        })
        .collect())
}

fn find_label(labels: &[String], key: &str) -> Option<usize> {
    let key = key.to_uppercase().replace(' ', "");
    labels.iter().position(|label| {
        let label = label.to_uppercase().replace(' ', "");
        if key.len() < 3 {
            label.starts_with(&key)
        } else if key == "COHERENT" {
            label.contains("COHERENT") && !label.contains("INCOHERENT")
        } else {
            label.contains(&key)
        }
    })
}

fn locate_columns(path: &Path, labels: &[String]) -> Result<Columns> {
    let require = |key: &str| {
        find_label(labels, key)
            .ok_or_else(|| XrfError::data_not_found(path, format!("missing '{key}' column")))
    };
    let mut shells = [0usize; 10];
    for (slot, key) in shells.iter_mut().zip(shell_keys()) {
        *slot = require(key)?;
    }
    Ok(Columns {
        energy: require("energy")?,
        coherent: require("coherent")?,
        compton: require("compton")?,
        photoelectric: require("photoelectric")?,
        total: require("total")?,
        pair: find_label(labels, "pair"),
        shells,
    })
}

fn build_table(
    path: &Path,
    z: usize,
    scan: &Scan,
    columns: &Columns,
    edges: [f64; 9],
) -> Result<CrossSectionTable> {
    let n = scan.rows.len();
    if n < 2 {
        return Err(XrfError::data_not_found(
            path,
            format!("Z = {z}: at least two energies are required"),
        ));
    }
    let energy = scan.column(columns.energy);
    if energy.windows(2).any(|w| w[1] < w[0]) || energy[0] <= 0.0 {
        return Err(XrfError::data_not_found(
            path,
            format!("Z = {z}: energies must be positive and non-decreasing"),
        ));
    }
    for (row, &e) in scan.rows.iter().zip(&energy) {
        if let Some(value) = row.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(XrfError::data_not_found(
                path,
                format!("Z = {z}, E = {e} keV: cross section {value} is negative or not finite"),
            ));
        }
    }

    let coherent = scan.column(columns.coherent);
    let compton = scan.column(columns.compton);
    let pair = columns
        .pair
        .map(|c| scan.column(c))
        .unwrap_or_else(|| vec![0.0; n]);
    let mut shells: [Vec<f64>; 10] = Default::default();
    for (values, &column) in shells.iter_mut().zip(&columns.shells) {
        *values = scan.column(column);
    }

    for (i, row) in scan.rows.iter().enumerate() {
        let shell_sum: f64 = shells[..9].iter().map(|values| values[i]).sum();
        let mut photo = row[columns.photoelectric];
        let mut all_other = shells[9][i];

        if photo < shell_sum {
            if shell_sum > 0.0 && (photo - shell_sum).abs() / shell_sum > PHOTO_DEFICIT_TOLERANCE
            {
                return Err(XrfError::data_not_found(
                    path,
                    format!(
                        "Z = {z}, E = {} keV: photoelectric {photo} below shell sum {shell_sum}",
                        energy[i]
                    ),
                ));
            }
            log::warn!(
                "Z = {z}, E = {} keV: photoelectric raised to shell sum {shell_sum}",
                energy[i]
            );
            photo = shell_sum;
        } else {
            photo = row[columns.total] - row[columns.compton] - row[columns.coherent] - pair[i];
        }

        if photo > 0.0 {
            all_other = if all_other > 0.0 && z > 18 {
                (photo - shell_sum).max(0.0)
            } else {
                0.0
            };
        } else {
            all_other = 0.0;
        }
        shells[9][i] = all_other;
    }

    Ok(CrossSectionTable {
        energy,
        coherent,
        compton,
        pair,
        shells,
        edges,
    })
}

impl CrossSectionTable {
    fn at(&self, energy: f64) -> CrossSections {
        let (i0, i1) = bracket(&self.energy, energy);
        let coherent = self.smooth(&self.coherent, energy, i0, i1);
        let compton = self.smooth(&self.compton, energy, i0, i1);
        let pair = self.smooth(&self.pair, energy, i0, i1);

        let mut shells = [0.0; 10];
        for (k, (value, &edge)) in shells.iter_mut().zip(&self.edges).enumerate() {
            *value = self.shell(&self.shells[k], edge, energy, i0, i1);
        }
        shells[9] = self.smooth(&self.shells[9], energy, i0, i1);

        let photoelectric: f64 = shells.iter().sum();
        CrossSections {
            coherent,
            compton,
            pair,
            photoelectric,
            total: photoelectric + coherent + compton + pair,
            shells,
        }
    }

    fn degenerate(&self, i0: usize, i1: usize) -> bool {
        i0 == i1 || self.energy[i1] - self.energy[i0] < 5.0e-10
    }

    /// Coherent, Compton, pair and "all other": log-log, or the power law of
    /// the positive neighbour when the other one vanishes.
    fn smooth(&self, values: &[f64], energy: f64, i0: usize, i1: usize) -> f64 {
        let (x0, x1) = (self.energy[i0], self.energy[i1]);
        let (y0, y1) = (values[i0], values[i1]);
        if energy == x0 {
            return y0;
        }
        if energy == x1 || self.degenerate(i0, i1) {
            return y1;
        }
        if y0 > 0.0 && y1 > 0.0 {
            loglog(energy, x0, x1, y0, y1)
        } else if y1 > 0.0 && energy - x0 > 1.0e-5 {
            ((energy / x0).ln() / (x1 / x0).ln() * y1.ln()).exp()
        } else {
            0.0
        }
    }

    fn shell(&self, values: &[f64], edge: f64, energy: f64, i0: usize, i1: usize) -> f64 {
        if !(edge > 0.0 && energy >= edge) {
            return 0.0;
        }
        let (x0, x1) = (self.energy[i0], self.energy[i1]);
        let (y0, y1) = (values[i0], values[i1]);
        if energy == x0 && y0 > 0.0 {
            return y0;
        }
        if energy == x1 && y1 > 0.0 {
            return y1;
        }
        if self.degenerate(i0, i1) {
            if y0 > 0.0 {
                return y0;
            }
            if y1 > 0.0 {
                return y1;
            }
        } else if y0 > 0.0 {
            // a pair with a vanishing upper sample carries no cross section
            return if y1 > 0.0 {
                loglog(energy, x0, x1, y0, y1)
            } else {
                0.0
            };
        }
        self.extrapolate_from(values, energy, i0)
    }

    /// Log-log extrapolation from the first pair of positive samples at or
    /// above `start`. Used just above an edge whose tabulated energy does not
    /// coincide with the binding energy.
    fn extrapolate_from(&self, values: &[f64], energy: f64, start: usize) -> f64 {
        (start..self.energy.len().saturating_sub(1))
            .find(|&k| {
                values[k] > 0.0 && values[k + 1] > 0.0 && self.energy[k + 1] > self.energy[k]
            })
            .map(|k| {
                loglog(
                    energy,
                    self.energy[k],
                    self.energy[k + 1],
                    values[k],
                    values[k + 1],
                )
            })
            .unwrap_or(0.0)
    }
}
