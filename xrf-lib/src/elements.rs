use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::chemparser::{mass_fractions, validate_formula};
use crate::detector::{EscapePeak, EscapeSettings};
use crate::element::{Element, VacancyDistribution, XrayLine};
use crate::elements_db::ELEMENTS;
use crate::epdl97::{CrossSectionDatabase, MassAttenuation, shell_weights};
use crate::error::{Result, XrfError};
use crate::layer::sin_degrees;
use crate::material::Material;
use crate::shell::Shell;
use crate::specfile::SpecFile;

/// Nesting depth beyond which a material definition is taken as circular.
const MAX_MATERIAL_DEPTH: usize = 16;

/// Main shells with EADL97 relaxation files and their subshells.
const SHELL_FAMILIES: [(&str, &[&str]); 3] = [
    ("K", &["K"]),
    ("L", &["L1", "L2", "L3"]),
    ("M", &["M1", "M2", "M3", "M4", "M5"]),
];

/// Photons of one X-ray line produced per incident photon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExcitationFactor {
    /// Line energy in keV.
    pub energy: f64,
    /// Emitted photons per photoelectric absorption, times the weight.
    pub factor: f64,
    /// `factor` times the photoelectric mass attenuation (cm²/g).
    pub rate: f64,
}

/// The three relaxation files of one main shell.
struct ShellFamilyFiles {
    subshells: &'static [&'static str],
    constants: SpecFile,
    radiative: SpecFile,
    nonradiative: SpecFile,
}

impl ShellFamilyFiles {
    fn open(directory: &Path, main: &str, subshells: &'static [&'static str]) -> Result<Self> {
        let open = |suffix: &str| -> Result<SpecFile> {
            let file = SpecFile::open(directory.join(format!("EADL97_{main}Shell{suffix}.dat")))?;
            if file.scans().len() != subshells.len() {
                return Err(XrfError::data_not_found(
                    file.path(),
                    format!(
                        "expected {} scans, found {}",
                        subshells.len(),
                        file.scans().len()
                    ),
                ));
            }
            Ok(file)
        };
        Ok(ShellFamilyFiles {
            subshells,
            constants: open("Constants")?,
            radiative: open("RadiativeRates")?,
            nonradiative: open("NonradiativeRates")?,
        })
    }
}

fn constant_key(label: &str) -> Option<String> {
    if label.len() > 4 && label.starts_with("omega") {
        Some("omega".to_string())
    } else if label.len() <= 4 && label != "Z" {
        Some(label.to_string())
    } else {
        None
    }
}

fn transition_key(label: &str) -> Option<String> {
    (label != "Z").then(|| label.to_string())
}

/// Values of row `z` of scan `scan`, keyed through `key`.
fn row_map(
    file: &SpecFile,
    scan: usize,
    z: usize,
    key: fn(&str) -> Option<String>,
) -> Option<BTreeMap<String, f64>> {
    let scan = &file.scans()[scan];
    let row = scan.rows.get(z - 1)?;
    Some(
        scan.labels
            .iter()
            .zip(row)
            .filter_map(|(label, &value)| key(label).map(|k| (k, value)))
            .collect(),
    )
}

/// Registry of all elements with both photon and relaxation data.
///
/// Cheap to share: clone the surrounding `Arc` rather than the registry.
#[derive(Clone)]
pub struct Elements {
    database: Arc<CrossSectionDatabase>,
    elements: Vec<Element>,
    symbols: HashMap<String, usize>,
    names: HashMap<String, usize>,
}

impl fmt::Debug for Elements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Elements")
            .field("directory", &self.database.directory())
            .field("elements", &self.elements.len())
            .finish()
    }
}

impl Elements {
    /// Loads cross sections and relaxation data from `directory`.
    pub fn load(directory: impl AsRef<Path>) -> Result<Self> {
        let database = CrossSectionDatabase::load(directory)?;
        Self::from_database(Arc::new(database))
    }

    /// Builds the registry around an already loaded database, reading the
    /// relaxation files from the same directory.
    pub fn from_database(database: Arc<CrossSectionDatabase>) -> Result<Self> {
        let directory = database.directory().to_path_buf();
        let families = SHELL_FAMILIES
            .iter()
            .map(|&(main, subshells)| ShellFamilyFiles::open(&directory, main, subshells))
            .collect::<Result<Vec<_>>>()?;

        let count = database.len().min(ELEMENTS.len());
        let mut elements = Vec::with_capacity(count);
        let mut symbols = HashMap::new();
        let mut names = HashMap::new();

        for z in 1..=count {
            let (symbol, name, mass) = ELEMENTS[z - 1];
            let binding = database.binding_energies(z)?.clone();
            let mut shells = BTreeMap::new();

            for family in &families {
                for (k, &subshell) in family.subshells.iter().enumerate() {
                    let mut shell = Shell::new(subshell)?;
                    if let Some(constants) = row_map(&family.constants, k, z, constant_key) {
                        shell.set_shell_constants(&constants)?;
                    }
                    if binding.get(subshell).is_some_and(|&b| b > 0.0) {
                        if let Some(rates) = row_map(&family.radiative, k, z, transition_key) {
                            shell.set_radiative_transitions(&rates);
                        }
                        if let Some(rates) = row_map(&family.nonradiative, k, z, transition_key) {
                            shell.set_nonradiative_transitions(&rates);
                        }
                    }
                    shells.insert(subshell.to_string(), shell);
                }
            }

            symbols.insert(symbol.to_string(), z - 1);
            names.insert(symbol.to_lowercase(), z - 1);
            names.insert(name.to_lowercase(), z - 1);
            elements.push(Element::new(symbol, name, z, mass, binding, shells));
        }

        log::debug!(
            "element registry ready: {} elements from {}",
            elements.len(),
            directory.display()
        );
        Ok(Elements {
            database,
            elements,
            symbols,
            names,
        })
    }

    pub fn database(&self) -> &Arc<CrossSectionDatabase> {
        &self.database
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Symbols of all registered elements in order of atomic number.
    pub fn element_names(&self) -> Vec<&str> {
        self.elements.iter().map(Element::symbol).collect()
    }

    /// Resolve an element identifier (symbol, name, or atomic number) to Z.
    pub fn resolve_element(&self, element: &str) -> Result<usize> {
        if let Ok(z) = element.parse::<usize>() {
            if (1..=self.elements.len()).contains(&z) {
                return Ok(z);
            }
        }
        if let Some(&index) = self.symbols.get(element) {
            return Ok(index + 1);
        }
        if let Some(&index) = self.names.get(&element.to_lowercase()) {
            return Ok(index + 1);
        }
        Err(XrfError::InvalidElement(element.to_string()))
    }

    pub fn element(&self, element: &str) -> Result<&Element> {
        let z = self.resolve_element(element)?;
        Ok(&self.elements[z - 1])
    }

    pub fn is_element(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn atomic_number(&self, element: &str) -> Result<usize> {
        self.resolve_element(element)
    }

    pub fn atomic_mass(&self, element: &str) -> Result<f64> {
        Ok(self.element(element)?.atomic_mass())
    }

    pub fn binding_energies(&self, element: &str) -> Result<&BTreeMap<String, f64>> {
        Ok(self.element(element)?.binding_energies())
    }

    /// Mass attenuation of an element symbol or a chemical formula.
    ///
    /// For single elements the photoelectric cross section per shell is
    /// included.
    pub fn mass_attenuation_coefficients(
        &self,
        name: &str,
        energies: &[f64],
    ) -> Result<MassAttenuation> {
        if let Some(&index) = self.symbols.get(name) {
            return self
                .database
                .mass_attenuation_coefficients(index + 1, energies);
        }
        let composition = mass_fractions(name)?;
        self.composition_mass_attenuation(&composition, energies)
    }

    /// Mass-fraction weighted attenuation of a composition.
    ///
    /// Keys may be element symbols or formulas; fractions are normalized.
    pub fn composition_mass_attenuation(
        &self,
        composition: &BTreeMap<String, f64>,
        energies: &[f64],
    ) -> Result<MassAttenuation> {
        let composition = self.normalized_composition(composition, &[])?;
        let mut result = MassAttenuation::zeros(energies);
        for (symbol, &fraction) in &composition {
            let z = self.resolve_element(symbol)?;
            let mu = self.database.mass_attenuation_coefficients(z, energies)?;
            for i in 0..energies.len() {
                result.coherent[i] += fraction * mu.coherent[i];
                result.compton[i] += fraction * mu.compton[i];
                result.pair[i] += fraction * mu.pair[i];
                result.photoelectric[i] += fraction * mu.photoelectric[i];
            }
        }
        for i in 0..energies.len() {
            result.total[i] =
                result.coherent[i] + result.compton[i] + result.pair[i] + result.photoelectric[i];
        }
        Ok(result)
    }

    /// Element -> mass fraction for a formula or a user material name.
    ///
    /// Formulas take precedence; materials may refer to formulas, elements
    /// and other materials of `materials`.
    pub fn composition(&self, name: &str, materials: &[Material]) -> Result<BTreeMap<String, f64>> {
        self.resolve_composition(name, materials, 0)
    }

    /// Expands and normalizes a `name -> amount` map whose keys are
    /// elements, formulas or material names.
    pub fn normalized_composition(
        &self,
        composition: &BTreeMap<String, f64>,
        materials: &[Material],
    ) -> Result<BTreeMap<String, f64>> {
        self.expand(composition, materials, 0)
    }

    fn resolve_composition(
        &self,
        name: &str,
        materials: &[Material],
        depth: usize,
    ) -> Result<BTreeMap<String, f64>> {
        if validate_formula(name) {
            return mass_fractions(name);
        }
        if let Some(material) = materials.iter().find(|m| m.name() == name) {
            if material.composition().is_empty() {
                return Err(XrfError::InvalidMaterial(format!(
                    "material '{name}' has no composition"
                )));
            }
            return self.expand(material.composition(), materials, depth + 1);
        }
        Err(XrfError::InvalidFormula(format!(
            "'{name}' is neither a formula nor a defined material"
        )))
    }

    fn expand(
        &self,
        composition: &BTreeMap<String, f64>,
        materials: &[Material],
        depth: usize,
    ) -> Result<BTreeMap<String, f64>> {
        if depth > MAX_MATERIAL_DEPTH {
            return Err(XrfError::InvalidMaterial(
                "circular material definition".to_string(),
            ));
        }
        let mut result: BTreeMap<String, f64> = BTreeMap::new();
        let mut total = 0.0;
        for (name, &amount) in composition {
            if !(amount >= 0.0 && amount.is_finite()) {
                return Err(XrfError::InvalidMaterial(format!(
                    "amount {amount} of '{name}' must be finite and not negative"
                )));
            }
            total += amount;
            if self.is_element(name) {
                *result.entry(name.clone()).or_insert(0.0) += amount;
                continue;
            }
            for (symbol, fraction) in self.resolve_composition(name, materials, depth)? {
                *result.entry(symbol).or_insert(0.0) += amount * fraction;
            }
        }
        if total <= 0.0 {
            return Err(XrfError::InvalidMaterial(
                "composition amounts add up to zero".to_string(),
            ));
        }
        result.retain(|_, fraction| *fraction > 0.0);
        for fraction in result.values_mut() {
            *fraction /= total;
        }
        Ok(result)
    }

    /// Photoelectric weights of K..M5 at `energy`, the initial vacancies of
    /// one absorbed photon.
    pub fn initial_photoelectric_vacancy_distribution(
        &self,
        element: &str,
        energy: f64,
    ) -> Result<VacancyDistribution> {
        let z = self.resolve_element(element)?;
        Ok(self.photoelectric_vacancies(z, energy)?.1)
    }

    fn photoelectric_vacancies(&self, z: usize, energy: f64) -> Result<(f64, VacancyDistribution)> {
        let cs = self.database.cross_sections(z, energy)?;
        let weights = shell_weights(&cs);
        let mut vacancies = [0.0; 9];
        vacancies.copy_from_slice(&weights[..9]);
        Ok((cs.photoelectric, vacancies))
    }

    /// X-ray lines excited in `element` by photons of `energy` keV.
    ///
    /// `factor` counts emitted photons per absorbed photon (cascade
    /// included) times `weight`; `rate` multiplies it by the photoelectric
    /// mass attenuation coefficient.
    pub fn excitation_factors(
        &self,
        element: &str,
        energy: f64,
        weight: f64,
    ) -> Result<BTreeMap<String, ExcitationFactor>> {
        let z = self.resolve_element(element)?;
        let (photoelectric, vacancies) = self.photoelectric_vacancies(z, energy)?;

        Ok(self.elements[z - 1]
            .xray_lines_from_vacancy_distribution(&vacancies, true, true)
            .into_iter()
            .map(|(line, XrayLine { energy, rate })| {
                let factor = rate * weight;
                (
                    line,
                    ExcitationFactor {
                        energy,
                        factor,
                        rate: factor * photoelectric,
                    },
                )
            })
            .collect())
    }

    pub fn emitted_xray_lines(&self, element: &str, energy: f64) -> Result<BTreeMap<String, f64>> {
        Ok(self.element(element)?.emitted_xray_lines(energy))
    }

    /// `("Fe K", binding)` for every excited, fluorescent K/L/M subshell of
    /// `elements`, sorted by binding energy.
    pub fn peak_families<S: AsRef<str>>(
        &self,
        elements: &[S],
        energy: f64,
    ) -> Result<Vec<(String, f64)>> {
        let mut families = Vec::new();
        for name in elements {
            let element = self.element(name.as_ref())?;
            for (shell, binding) in element.fluorescent_families(energy) {
                families.push((format!("{} {shell}", element.symbol()), binding));
            }
        }
        families.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(families)
    }

    /// Escape peaks of photons of `energy` keV absorbed in a detector of
    /// `composition` and `mass_thickness` (g/cm², zero for a thick
    /// detector), keyed "<El>_<line>esc".
    pub fn escape(
        &self,
        composition: &BTreeMap<String, f64>,
        energy: f64,
        mass_thickness: f64,
        settings: &EscapeSettings,
    ) -> Result<BTreeMap<String, EscapePeak>> {
        let composition = self.normalized_composition(composition, &[])?;
        let sin_alpha = sin_degrees(settings.alpha_in);

        let mu_incident = self.composition_mass_attenuation(&composition, &[energy])?.total[0];
        if mu_incident <= 0.0 {
            return Ok(BTreeMap::new());
        }
        let intrinsic = if mass_thickness > 0.0 {
            1.0 - (-mu_incident * mass_thickness / sin_alpha).exp()
        } else {
            1.0
        };

        let mut peaks = Vec::new();
        for (symbol, &fraction) in &composition {
            let factors = self.excitation_factors(symbol, energy, fraction)?;
            if factors.is_empty() {
                continue;
            }
            let line_energies: Vec<f64> = factors.values().map(|f| f.energy).collect();
            let mu_lines = self
                .composition_mass_attenuation(&composition, &line_energies)?
                .total;

            for ((line, factor), mu_line) in factors.iter().zip(mu_lines) {
                let x = sin_alpha * mu_line / mu_incident;
                let self_absorbed = if x > 0.0 { x * (1.0 + 1.0 / x).ln() } else { 0.0 };
                let mut rate = factor.rate * (0.5 / mu_incident) * (1.0 - self_absorbed);
                if rate <= settings.intensity_threshold {
                    continue;
                }
                rate /= intrinsic;
                let escape_energy = energy - factor.energy;
                if escape_energy <= settings.energy_threshold {
                    continue;
                }
                peaks.push((
                    format!("{symbol}_{line}esc"),
                    EscapePeak {
                        energy: escape_energy,
                        rate,
                    },
                ));
            }
        }

        peaks.sort_by(|a, b| b.1.rate.total_cmp(&a.1.rate));
        peaks.truncate(settings.max_peaks);
        log::trace!("{} escape peaks at {energy} keV", peaks.len());
        Ok(peaks.into_iter().collect())
    }
}
