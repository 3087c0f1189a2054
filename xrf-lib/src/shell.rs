//! Atomic subshell relaxation data: fluorescence and Coster-Kronig yields,
//! radiative and non-radiative transition probabilities.

use std::collections::BTreeMap;

use crate::error::{Result, XrfError};

/// Subshells with explicit photoelectric cross sections, outermost last.
pub const SHELL_NAMES: [&str; 9] = ["K", "L1", "L2", "L3", "M1", "M2", "M3", "M4", "M5"];

/// Position of a subshell in [`SHELL_NAMES`].
pub fn shell_index(name: &str) -> Option<usize> {
    SHELL_NAMES.iter().position(|&s| s == name)
}

/// Subshell an X-ray line originates from ("KL3" -> "L3").
pub(crate) fn line_origin(line: &str) -> &str {
    line.get(line.len().saturating_sub(2)..).unwrap_or(line)
}

/// Subshell holding the vacancy an X-ray line fills ("KL3" -> "K", "L3M5" -> "L3").
pub(crate) fn line_destination(line: &str) -> &str {
    let n = if line.len() <= 3 { 1 } else { 2 };
    line.get(..n).unwrap_or(line)
}

/// Splits "L2M1" into ["L2", "M1"]: every shell token is one uppercase letter
/// followed by its digits.
fn shell_tokens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_ascii_uppercase() {
            if let Some(s) = start {
                tokens.push(&text[s..i]);
            }
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }
    tokens
}

fn main_shell(name: &str) -> char {
    name.chars().next().unwrap_or(' ')
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shell {
    name: String,
    fluorescence_yield: f64,
    /// destination subshell -> Coster-Kronig yield f_ij
    coster_kronig_yields: BTreeMap<String, f64>,
    radiative: BTreeMap<String, f64>,
    nonradiative: BTreeMap<String, f64>,
    fluorescence_ratios: BTreeMap<String, f64>,
    auger_ratios: BTreeMap<String, f64>,
    /// destination subshell -> transition -> ratio within that group
    coster_kronig_ratios: BTreeMap<String, BTreeMap<String, f64>>,
}

impl Shell {
    pub fn new(name: &str) -> Result<Self> {
        if shell_index(name).is_none() {
            return Err(XrfError::InvalidShell(name.to_string()));
        }
        Ok(Shell {
            name: name.to_string(),
            fluorescence_yield: 0.0,
            coster_kronig_yields: BTreeMap::new(),
            radiative: BTreeMap::new(),
            nonradiative: BTreeMap::new(),
            fluorescence_ratios: BTreeMap::new(),
            auger_ratios: BTreeMap::new(),
            coster_kronig_ratios: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the fluorescence yield ("omega") and Coster-Kronig yields
    /// ("f12", "f13", ...).
    pub fn set_shell_constants(&mut self, constants: &BTreeMap<String, f64>) -> Result<()> {
        let main = main_shell(&self.name);
        let mut yields = BTreeMap::new();
        let mut omega = 0.0;
        for (key, &value) in constants {
            if value < 0.0 {
                return Err(XrfError::InvalidShell(format!(
                    "{}: negative constant {key} = {value}",
                    self.name
                )));
            }
            if key == "omega" {
                omega = value;
            } else if let Some(digits) = key.strip_prefix('f') {
                let Some(to) = digits.chars().nth(1) else {
                    continue;
                };
                yields.insert(format!("{main}{to}"), value);
            }
        }
        if omega + yields.values().sum::<f64>() > 1.0 + 1.0e-6 {
            return Err(XrfError::InvalidShell(format!(
                "{}: yields add up to more than one",
                self.name
            )));
        }
        self.fluorescence_yield = omega;
        self.coster_kronig_yields = yields;
        Ok(())
    }

    /// Radiative transition rates keyed by line ("KL3"); other keys such as
    /// "TOTAL" are ignored. Ratios are normalized to one.
    pub fn set_radiative_transitions(&mut self, rates: &BTreeMap<String, f64>) {
        self.radiative = rates
            .iter()
            .filter(|(key, _)| key.starts_with(self.name.as_str()) && key.len() > self.name.len())
            .filter(|(key, _)| !key.eq_ignore_ascii_case("total"))
            .map(|(key, &value)| (key.clone(), value.max(0.0)))
            .collect();
        self.fluorescence_ratios = normalized(&self.radiative);
    }

    /// Non-radiative transition rates keyed "L1-L3M1". A transition whose
    /// first vacancy stays in the same main shell is Coster-Kronig, anything
    /// else is Auger.
    pub fn set_nonradiative_transitions(&mut self, rates: &BTreeMap<String, f64>) {
        let main = main_shell(&self.name);
        let prefix = format!("{}-", self.name);
        let mut auger = BTreeMap::new();
        let mut coster_kronig: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        self.nonradiative.clear();

        for (key, &value) in rates {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let tokens = shell_tokens(rest);
            if tokens.len() != 2 {
                continue;
            }
            let value = value.max(0.0);
            self.nonradiative.insert(key.clone(), value);
            if main_shell(tokens[0]) == main {
                coster_kronig
                    .entry(tokens[0].to_string())
                    .or_default()
                    .insert(key.clone(), value);
            } else {
                auger.insert(key.clone(), value);
            }
        }

        self.auger_ratios = normalized(&auger);
        self.coster_kronig_ratios = coster_kronig
            .into_iter()
            .map(|(to, group)| (to, normalized(&group)))
            .collect();
    }

    pub fn fluorescence_yield(&self) -> f64 {
        self.fluorescence_yield
    }

    pub fn coster_kronig_yields(&self) -> &BTreeMap<String, f64> {
        &self.coster_kronig_yields
    }

    pub fn auger_yield(&self) -> f64 {
        (1.0 - self.fluorescence_yield - self.coster_kronig_yields.values().sum::<f64>()).max(0.0)
    }

    pub fn radiative_transitions(&self) -> &BTreeMap<String, f64> {
        &self.radiative
    }

    pub fn nonradiative_transitions(&self) -> &BTreeMap<String, f64> {
        &self.nonradiative
    }

    pub fn fluorescence_ratios(&self) -> &BTreeMap<String, f64> {
        &self.fluorescence_ratios
    }

    pub fn auger_ratios(&self) -> &BTreeMap<String, f64> {
        &self.auger_ratios
    }

    pub fn coster_kronig_ratios(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.coster_kronig_ratios
    }

    /// Number of vacancies created in `destination` per vacancy in this
    /// shell, through a single radiative, Auger or Coster-Kronig step.
    pub fn direct_vacancy_transfer_ratio(&self, destination: &str) -> f64 {
        let radiative: f64 = self
            .fluorescence_ratios
            .iter()
            .filter(|(line, _)| line_origin(line) == destination)
            .map(|(_, ratio)| ratio)
            .sum();

        let auger: f64 = self
            .auger_ratios
            .iter()
            .map(|(key, ratio)| ratio * vacancies_created(key, destination))
            .sum();

        let mut coster_kronig = 0.0;
        for (to, &f) in &self.coster_kronig_yields {
            match self.coster_kronig_ratios.get(to) {
                Some(group) => {
                    coster_kronig += f * group
                        .iter()
                        .map(|(key, ratio)| ratio * vacancies_created(key, destination))
                        .sum::<f64>();
                }
                None if to == destination => coster_kronig += f,
                None => {}
            }
        }

        self.fluorescence_yield * radiative + self.auger_yield() * auger + coster_kronig
    }
}

fn vacancies_created(transition: &str, shell: &str) -> f64 {
    transition
        .split_once('-')
        .map(|(_, rest)| shell_tokens(rest).iter().filter(|&&t| t == shell).count())
        .unwrap_or(0) as f64
}

fn normalized(values: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let total: f64 = values.values().sum();
    if total <= 0.0 {
        return BTreeMap::new();
    }
    values
        .iter()
        .map(|(key, value)| (key.clone(), value / total))
        .collect()
}
