use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::beam::Beam;
use crate::config::{Geometry, XrfConfig};
use crate::detector::Detector;
use crate::elements::Elements;
use crate::error::{Result, XrfError};
use crate::layer::Layer;
use crate::material::Material;
use crate::shell::SHELL_NAMES;
use crate::transmission::TransmissionTable;

/// Highest generation of fluorescence included in a calculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExcitationOrder {
    #[default]
    Primary,
    Secondary,
    Tertiary,
}

impl FromStr for ExcitationOrder {
    type Err = XrfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "0" => Ok(ExcitationOrder::Primary),
            "secondary" | "1" => Ok(ExcitationOrder::Secondary),
            "tertiary" | "2" => Ok(ExcitationOrder::Tertiary),
            _ => Err(XrfError::InvalidConfiguration(format!(
                "unknown excitation order '{s}'"
            ))),
        }
    }
}

/// Switches of a multilayer fluorescence calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluorescenceOptions {
    pub order: ExcitationOrder,
    /// Include the solid angle of the detector.
    pub use_geometric_efficiency: bool,
    /// Scale by the mass fraction of the element in each layer. When off,
    /// every layer is treated as the pure element.
    pub use_mass_fractions: bool,
    /// Secondary sources with an excitation rate below this are skipped;
    /// zero keeps all of them.
    pub secondary_calculation_limit: f64,
    /// Replaces the configured beam for this calculation.
    pub beam: Option<Beam>,
}

impl Default for FluorescenceOptions {
    fn default() -> Self {
        FluorescenceOptions {
            order: ExcitationOrder::Primary,
            use_geometric_efficiency: true,
            use_mass_fractions: true,
            secondary_calculation_limit: 0.0,
            beam: None,
        }
    }
}

impl FluorescenceOptions {
    pub fn with_order(order: ExcitationOrder) -> Self {
        FluorescenceOptions {
            order,
            ..Default::default()
        }
    }
}

/// An element, optionally restricted to a line family and a sample layer.
///
/// Parsed from `"Fe"`, `"Fe K"` or `"Fe K 1"`. Families are `K`, `L`, `M`,
/// a subshell name (`L3`, ...) or the `Ka`/`Kb` groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FluorescenceRequest {
    pub element: String,
    pub family: Option<String>,
    pub layer: Option<usize>,
}

impl FluorescenceRequest {
    pub fn new(element: &str, family: Option<&str>, layer: Option<usize>) -> Result<Self> {
        if let Some(family) = family {
            check_family(family)?;
        }
        Ok(FluorescenceRequest {
            element: element.to_string(),
            family: family.map(str::to_string),
            layer,
        })
    }
}

fn check_family(family: &str) -> Result<()> {
    if matches!(family, "K" | "L" | "M" | "Ka" | "Kb") || SHELL_NAMES.contains(&family) {
        Ok(())
    } else {
        Err(XrfError::InvalidConfiguration(format!(
            "unknown line family '{family}'"
        )))
    }
}

impl FromStr for FluorescenceRequest {
    type Err = XrfError;

    fn from_str(s: &str) -> Result<Self> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        match tokens.as_slice() {
            [element] => Self::new(element, None, None),
            [element, family] => Self::new(element, Some(family), None),
            [element, family, layer] => {
                let layer = layer.parse::<usize>().map_err(|_| {
                    XrfError::InvalidConfiguration(format!("invalid layer index '{layer}'"))
                })?;
                Self::new(element, Some(family), Some(layer))
            }
            _ => Err(XrfError::InvalidConfiguration(format!(
                "expected \"Element [Family [Layer]]\", got '{s}'"
            ))),
        }
    }
}

impl fmt::Display for FluorescenceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.element)?;
        if let Some(family) = &self.family {
            write!(f, " {family}")?;
        }
        if let Some(layer) = self.layer {
            write!(f, " {layer}")?;
        }
        Ok(())
    }
}

/// Detected intensity of one line of one layer, summed over the beam.
///
/// `primary`, `secondary` and `tertiary` are emitted photons per incident
/// photon; `rate` is what reaches the detector after efficiency and escape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineIntensity {
    /// keV
    pub energy: f64,
    pub rate: f64,
    pub primary: f64,
    pub secondary: f64,
    pub tertiary: f64,
    pub efficiency: f64,
    pub mass_fraction: f64,
    pub energy_threshold: f64,
    /// Total mass attenuation of the emitting layer at the line energy.
    pub mu_1_i: f64,
    /// Fraction of the parent line lost to this escape peak.
    pub escape_ratio: f64,
    /// Parent line of an escape peak.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escape_of: Option<String>,
    /// Secondary excitation per source, keyed "<El> <line> <layer>" or
    /// "coherent scattering <layer>".
    pub contributions: BTreeMap<String, f64>,
}

/// `"Fe K"` -> layer index -> line -> intensity.
pub type MultilayerFluorescence = BTreeMap<String, BTreeMap<usize, BTreeMap<String, LineIntensity>>>;

/// A request resolved against the registry and the sample.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedRequest {
    pub key: String,
    pub element: String,
    pub family: String,
    pub threshold: f64,
    /// `None` for every layer.
    pub layers: Option<BTreeSet<usize>>,
}

impl ResolvedRequest {
    pub fn includes_layer(&self, layer: usize) -> bool {
        self.layers.as_ref().is_none_or(|layers| layers.contains(&layer))
    }

    pub fn matches_line(&self, line: &str) -> bool {
        match self.family.as_str() {
            "Ka" => line.starts_with("KL"),
            "Kb" => line.starts_with('K') && !line[1..].starts_with('L'),
            family => line.starts_with(family),
        }
    }
}

/// Forward model of a multilayer XRF measurement.
///
/// Holds the measurement configuration; the element registry is passed to
/// each calculation.
#[derive(Debug, Clone, Default)]
pub struct XrfSolver {
    config: XrfConfig,
}

impl XrfSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: XrfConfig) -> Result<Self> {
        config.validate()?;
        Ok(XrfSolver { config })
    }

    pub fn config(&self) -> &XrfConfig {
        &self.config
    }

    pub fn set_geometry(
        &mut self,
        alpha_in: f64,
        alpha_out: f64,
        scattering_angle: Option<f64>,
    ) -> Result<()> {
        self.config.geometry = Geometry::new(alpha_in, alpha_out, scattering_angle)?;
        Ok(())
    }

    pub fn set_beam(&mut self, beam: Beam) {
        self.config.beam = Some(beam);
    }

    pub fn set_single_energy_beam(&mut self, energy: f64, divergency: f64) -> Result<()> {
        self.config.beam = Some(Beam::new(&[energy], &[], &[], &[divergency])?);
        Ok(())
    }

    pub fn set_beam_filters(&mut self, filters: Vec<Layer>) {
        self.config.beam_filters = filters;
    }

    pub fn set_user_beam_filters(&mut self, filters: Vec<TransmissionTable>) {
        self.config.user_beam_filters = filters;
    }

    pub fn set_sample(&mut self, layers: Vec<Layer>, reference_layer: usize) -> Result<()> {
        if !layers.is_empty() && reference_layer >= layers.len() {
            return Err(XrfError::InvalidConfiguration(format!(
                "reference layer {reference_layer} outside a sample of {} layers",
                layers.len()
            )));
        }
        self.config.sample = layers;
        self.config.reference_layer = reference_layer;
        Ok(())
    }

    /// Single-layer sample of a formula or material name.
    pub fn set_single_layer_sample(
        &mut self,
        material: &str,
        density: f64,
        thickness: f64,
    ) -> Result<()> {
        self.set_sample(vec![Layer::new(material, density, thickness, 1.0)?], 0)
    }

    pub fn set_attenuators(&mut self, attenuators: Vec<Layer>) {
        self.config.attenuators = attenuators;
    }

    pub fn set_user_attenuators(&mut self, attenuators: Vec<TransmissionTable>) {
        self.config.user_attenuators = attenuators;
    }

    pub fn set_detector(&mut self, detector: Option<Detector>) {
        self.config.detector = detector;
    }

    pub fn set_materials(&mut self, materials: Vec<Material>) {
        self.config.materials = materials;
    }

    /// Fraction of the isotropic emission of a sample layer that reaches
    /// the detector: `0.5 * (1 - cos θ)` of the cone subtended by the
    /// detector, 1 without a detector diameter.
    pub fn geometric_efficiency(&self, layer: usize) -> Result<f64> {
        let sample = &self.config.sample;
        if layer >= sample.len() {
            return Err(XrfError::InvalidConfiguration(format!(
                "layer {layer} outside a sample of {} layers",
                sample.len()
            )));
        }
        let Some(detector) = &self.config.detector else {
            return Ok(1.0);
        };
        let diameter = detector.diameter();
        if diameter == 0.0 {
            return Ok(1.0);
        }
        let sin_alpha_out = self.config.geometry.sin_alpha_out();
        let reference = self.config.reference_layer;
        let mut distance = detector.distance();
        if layer > reference {
            distance += sample[reference..layer]
                .iter()
                .map(|l| l.thickness() / sin_alpha_out)
                .sum::<f64>();
        } else if layer < reference {
            distance -= sample[layer..reference]
                .iter()
                .map(|l| l.thickness() / sin_alpha_out)
                .sum::<f64>();
        }
        Ok(0.5 * (1.0 - distance / (distance.powi(2) + (0.5 * diameter).powi(2)).sqrt()))
    }

    /// Lowest binding energy that still excites `family` of `element`.
    ///
    /// K and subshell families use their own edge, L the first nonzero of
    /// L3, L2, L1 and M the first nonzero of M5 down to M1.
    pub fn energy_threshold(&self, element: &str, family: &str, elements: &Elements) -> Result<f64> {
        let binding = elements.binding_energies(element)?;
        let edge = |shell: &str| binding.get(shell).copied().unwrap_or(0.0);
        let first_nonzero = |shells: &[&str]| {
            shells
                .iter()
                .map(|s| edge(s))
                .find(|&e| e > 0.0)
                .unwrap_or(0.0)
        };
        Ok(match family {
            "L" => first_nonzero(&["L3", "L2", "L1"]),
            "M" => first_nonzero(&["M5", "M4", "M3", "M2", "M1"]),
            family if family == "K" || family.len() == 2 => edge(family),
            _ => 0.0,
        })
    }

    /// Element -> mass fraction of a sample or filter layer.
    pub fn layer_composition(&self, layer: &Layer, elements: &Elements) -> Result<BTreeMap<String, f64>> {
        layer.composition(elements, &self.config.materials)
    }

    /// Expands and checks requests, merging those for the same element and
    /// family.
    pub(crate) fn resolve_requests(
        &self,
        requests: &[FluorescenceRequest],
        elements: &Elements,
    ) -> Result<Vec<ResolvedRequest>> {
        let n_layers = self.config.sample.len();
        let mut resolved: Vec<ResolvedRequest> = Vec::new();
        for request in requests {
            let symbol = elements.element(&request.element)?.symbol().to_string();
            if let Some(layer) = request.layer
                && layer >= n_layers
            {
                return Err(XrfError::InvalidConfiguration(format!(
                    "{request}: layer {layer} outside a sample of {n_layers} layers"
                )));
            }
            let families = match &request.family {
                Some(family) => {
                    check_family(family)?;
                    vec![family.clone()]
                }
                None => ["K", "L", "M"]
                    .into_iter()
                    .filter_map(|family| {
                        match self.energy_threshold(&symbol, family, elements) {
                            Ok(threshold) if threshold > 0.0 => Some(Ok(family.to_string())),
                            Ok(_) => None,
                            Err(e) => Some(Err(e)),
                        }
                    })
                    .collect::<Result<Vec<_>>>()?,
            };
            for family in families {
                let key = format!("{symbol} {family}");
                let layers = request.layer.map(|layer| BTreeSet::from([layer]));
                if let Some(existing) = resolved.iter_mut().find(|r| r.key == key) {
                    existing.layers = match (existing.layers.take(), layers) {
                        (Some(mut a), Some(b)) => {
                            a.extend(b);
                            Some(a)
                        }
                        _ => None,
                    };
                    continue;
                }
                // Ka/Kb and subshell families are gated by their main shell
                let main = family.get(..1).ok_or_else(|| {
                    XrfError::InvalidConfiguration(format!("empty line family in '{request}'"))
                })?;
                let threshold = self.energy_threshold(&symbol, main, elements)?;
                resolved.push(ResolvedRequest {
                    key,
                    element: symbol.clone(),
                    family,
                    threshold,
                    layers,
                });
            }
        }
        Ok(resolved)
    }
}
