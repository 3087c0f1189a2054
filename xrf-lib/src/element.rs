use std::collections::BTreeMap;

use serde::Serialize;

use crate::shell::{SHELL_NAMES, Shell, line_destination, line_origin, shell_index};

/// Binding energy assumed for origin shells without tabulated data (keV).
const UNKNOWN_ORIGIN_BINDING: f64 = 0.003;

/// Vacancies (or photoelectric weights) per subshell, ordered as [`SHELL_NAMES`].
pub type VacancyDistribution = [f64; 9];

/// Characteristic X-ray line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct XrayLine {
    /// Photon energy in keV.
    pub energy: f64,
    /// Photons emitted per initial vacancy distribution.
    pub rate: f64,
}

/// Atomic data of one element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    symbol: String,
    name: String,
    atomic_number: usize,
    atomic_mass: f64,
    binding_energies: BTreeMap<String, f64>,
    shells: BTreeMap<String, Shell>,
}

impl Element {
    pub(crate) fn new(
        symbol: &str,
        name: &str,
        atomic_number: usize,
        atomic_mass: f64,
        binding_energies: BTreeMap<String, f64>,
        shells: BTreeMap<String, Shell>,
    ) -> Self {
        Element {
            symbol: symbol.to_string(),
            name: name.to_string(),
            atomic_number,
            atomic_mass,
            binding_energies,
            shells,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn atomic_number(&self) -> usize {
        self.atomic_number
    }

    pub fn atomic_mass(&self) -> f64 {
        self.atomic_mass
    }

    pub fn binding_energies(&self) -> &BTreeMap<String, f64> {
        &self.binding_energies
    }

    /// Binding energy of `shell` in keV, 0 when unknown.
    pub fn binding_energy(&self, shell: &str) -> f64 {
        self.binding_energies.get(shell).copied().unwrap_or(0.0)
    }

    pub fn shell(&self, name: &str) -> Option<&Shell> {
        self.shells.get(name)
    }

    pub fn shells(&self) -> &BTreeMap<String, Shell> {
        &self.shells
    }

    /// Shells that a photon of `energy` keV can ionize.
    pub fn excited_shells(&self, energy: f64) -> Vec<&str> {
        self.binding_energies
            .iter()
            .filter(|&(_, &binding)| binding > 0.0 && energy > binding)
            .map(|(shell, _)| shell.as_str())
            .collect()
    }

    /// Energy of an X-ray line such as "KL3" or "L3M5".
    pub fn transition_energy(&self, line: &str) -> f64 {
        let origin = match self.binding_energy(line_origin(line)) {
            b if b > 0.0 => b,
            _ => UNKNOWN_ORIGIN_BINDING,
        };
        self.binding_energy(line_destination(line)) - origin
    }

    /// Line label -> energy for every line a photon of `energy` keV can
    /// produce directly.
    pub fn emitted_xray_lines(&self, energy: f64) -> BTreeMap<String, f64> {
        let mut lines = BTreeMap::new();
        for name in SHELL_NAMES {
            let binding = self.binding_energy(name);
            if binding <= 0.0 || energy <= binding {
                continue;
            }
            let Some(shell) = self.shells.get(name) else {
                continue;
            };
            if shell.fluorescence_yield() <= 0.0 {
                continue;
            }
            for line in shell.fluorescence_ratios().keys() {
                lines.insert(line.clone(), self.transition_energy(line));
            }
        }
        lines
    }

    /// Propagates vacancies from inner to outer subshells through the
    /// radiative, Auger and Coster-Kronig channels.
    pub fn cascade_modified_vacancy_distribution(
        &self,
        distribution: &VacancyDistribution,
    ) -> VacancyDistribution {
        let mut vacancies = *distribution;
        for i in 0..SHELL_NAMES.len() {
            if vacancies[i] <= 0.0 {
                continue;
            }
            let Some(shell) = self.shells.get(SHELL_NAMES[i]) else {
                continue;
            };
            for j in (i + 1)..SHELL_NAMES.len() {
                vacancies[j] += shell.direct_vacancy_transfer_ratio(SHELL_NAMES[j]) * vacancies[i];
            }
        }
        vacancies
    }

    /// X-ray lines emitted when the given vacancies relax.
    ///
    /// With `cascade` the vacancies are first redistributed over the outer
    /// subshells. With `use_fluorescence_yield` rates are photons per
    /// vacancy, otherwise they are the bare branching ratios.
    pub fn xray_lines_from_vacancy_distribution(
        &self,
        distribution: &VacancyDistribution,
        cascade: bool,
        use_fluorescence_yield: bool,
    ) -> BTreeMap<String, XrayLine> {
        let vacancies = if cascade {
            self.cascade_modified_vacancy_distribution(distribution)
        } else {
            *distribution
        };

        let mut lines = BTreeMap::new();
        for (name, &count) in SHELL_NAMES.iter().zip(&vacancies) {
            if count <= 0.0 {
                continue;
            }
            let Some(shell) = self.shells.get(*name) else {
                continue;
            };
            let omega = if use_fluorescence_yield {
                shell.fluorescence_yield()
            } else {
                1.0
            };
            for (line, &ratio) in shell.fluorescence_ratios() {
                let rate = ratio * count * omega;
                if rate > 0.0 {
                    lines.insert(
                        line.clone(),
                        XrayLine {
                            energy: self.transition_energy(line),
                            rate,
                        },
                    );
                }
            }
        }
        lines
    }

    /// Main shell families ("K", "L1", ...) with emission at `energy`.
    pub(crate) fn fluorescent_families(&self, energy: f64) -> Vec<(&str, f64)> {
        self.excited_shells(energy)
            .into_iter()
            .filter(|shell| shell_index(shell).is_some())
            .filter(|shell| {
                self.shells
                    .get(*shell)
                    .is_some_and(|s| s.fluorescence_yield() > 0.0)
            })
            .map(|shell| (shell, self.binding_energy(shell)))
            .collect()
    }
}
