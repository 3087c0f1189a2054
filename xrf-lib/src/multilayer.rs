//! Multilayer fluorescence: primary excitation by the beam, secondary
//! excitation by the lines and coherent scatter of every layer, and an
//! approximate tertiary correction.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;

use crate::beam::Ray;
use crate::elements::{Elements, ExcitationFactor};
use crate::error::{Result, XrfError};
use crate::math::{de_boer_l0, de_boer_x};
use crate::xrf::{
    ExcitationOrder, FluorescenceOptions, FluorescenceRequest, LineIntensity,
    MultilayerFluorescence, ResolvedRequest, XrfSolver,
};

/// Layers whose incident beam is this much weaker than the emitting
/// layer's do not contribute secondary excitation.
const LAYER_WEIGHT_CUTOFF: f64 = 1.0e-4;
/// Minimum exit transmission of the emitting layer for inter-layer terms.
const EXIT_TRANSMISSION_CUTOFF: f64 = 1.0e-3;
const SOURCE_RATE_CUTOFF: f64 = 1.0e-30;
/// Tertiary correction is skipped below these.
const TERTIARY_MASS_FRACTION: f64 = 5.0e-3;
const TERTIARY_ENHANCEMENT: f64 = 1.01;

/// Line emitted in a layer that excites others.
#[derive(Debug, Clone)]
struct SourceLine {
    name: String,
    energy: f64,
    /// Per incident photon, including mass fraction and the beam reaching
    /// the layer.
    rate: f64,
    /// Total attenuation of the emitting layer at `energy`.
    mu: f64,
}

#[derive(Debug, Clone, Default)]
struct LineAccumulator {
    energy: f64,
    primary: f64,
    secondary: f64,
    rate: f64,
    efficiency: f64,
    mass_fraction: f64,
    energy_threshold: f64,
    mu_1_i: f64,
    contributions: BTreeMap<String, f64>,
}

impl LineAccumulator {
    fn merge(&mut self, other: LineAccumulator) {
        self.energy = other.energy;
        self.efficiency = other.efficiency;
        self.mass_fraction = other.mass_fraction;
        self.energy_threshold = other.energy_threshold;
        self.mu_1_i = other.mu_1_i;
        self.primary += other.primary;
        self.secondary += other.secondary;
        self.rate += other.rate;
        for (source, value) in other.contributions {
            *self.contributions.entry(source).or_insert(0.0) += value;
        }
    }
}

/// Request index, layer, line.
type RayResult = BTreeMap<(usize, usize, String), LineAccumulator>;

/// Inputs shared by all rays of one calculation.
struct Setup<'a> {
    solver: &'a XrfSolver,
    elements: &'a Elements,
    options: &'a FluorescenceOptions,
    requests: Vec<ResolvedRequest>,
    compositions: Vec<BTreeMap<String, f64>>,
    mass_thickness: Vec<f64>,
    geometric_efficiency: Vec<f64>,
    minimum_energy: f64,
    sin_in: f64,
    sin_out: f64,
}

/// Total attenuation of the sample layers, memoized per ray.
struct MuCache<'a> {
    elements: &'a Elements,
    compositions: &'a [BTreeMap<String, f64>],
    values: HashMap<(usize, u64), f64>,
}

impl<'a> MuCache<'a> {
    fn new(elements: &'a Elements, compositions: &'a [BTreeMap<String, f64>]) -> Self {
        MuCache {
            elements,
            compositions,
            values: HashMap::new(),
        }
    }

    fn total(&mut self, layer: usize, energy: f64) -> Result<f64> {
        let key = (layer, energy.to_bits());
        if let Some(&mu) = self.values.get(&key) {
            return Ok(mu);
        }
        let mu = self
            .elements
            .composition_mass_attenuation(&self.compositions[layer], &[energy])?
            .total[0];
        self.values.insert(key, mu);
        Ok(mu)
    }
}

/// Excitation factors per element and energy, memoized per ray.
#[derive(Default)]
struct FactorCache {
    values: HashMap<(String, u64), BTreeMap<String, ExcitationFactor>>,
}

impl FactorCache {
    fn get(
        &mut self,
        elements: &Elements,
        element: &str,
        energy: f64,
    ) -> Result<&BTreeMap<String, ExcitationFactor>> {
        let key = (element.to_string(), energy.to_bits());
        if !self.values.contains_key(&key) {
            let factors = elements.excitation_factors(element, energy, 1.0)?;
            self.values.insert(key.clone(), factors);
        }
        self.values
            .get(&key)
            .ok_or_else(|| XrfError::Numerical(format!("{element}: excitation factors missing")))
    }
}

impl XrfSolver {
    /// Expected fluorescence of the requested element families.
    ///
    /// Rays are computed in parallel and summed from the highest energy
    /// down, so repeated calls give identical results.
    pub fn multilayer_fluorescence(
        &self,
        requests: &[FluorescenceRequest],
        elements: &Elements,
        options: &FluorescenceOptions,
    ) -> Result<MultilayerFluorescence> {
        let config = self.config();
        config.validate()?;
        if config.sample.is_empty() {
            return Err(XrfError::InvalidConfiguration(
                "sample has no layers".to_string(),
            ));
        }
        let beam = options
            .beam
            .as_ref()
            .or(config.beam.as_ref())
            .ok_or_else(|| XrfError::InvalidConfiguration("no beam defined".to_string()))?;

        let setup = self.setup(requests, elements, options)?;
        let rays = self.filtered_rays(beam.rays(), elements)?;
        log::debug!(
            "multilayer fluorescence: {} rays, {} layers, {} requests, {:?}",
            rays.len(),
            setup.compositions.len(),
            setup.requests.len(),
            options.order
        );

        let per_ray: Vec<RayResult> = rays
            .par_iter()
            .map(|ray| setup.ray_fluorescence(ray))
            .collect::<Result<_>>()?;

        let mut merged = RayResult::new();
        for result in per_ray.into_iter().rev() {
            for (key, line) in result {
                merged.entry(key).or_default().merge(line);
            }
        }

        let mut output = setup.assemble(merged)?;
        if options.order >= ExcitationOrder::Tertiary {
            apply_tertiary(&mut output);
        }
        Ok(output)
    }

    fn setup<'a>(
        &'a self,
        requests: &[FluorescenceRequest],
        elements: &'a Elements,
        options: &'a FluorescenceOptions,
    ) -> Result<Setup<'a>> {
        let config = self.config();
        let requests = self.resolve_requests(requests, elements)?;
        let compositions = config
            .sample
            .iter()
            .map(|layer| self.layer_composition(layer, elements))
            .collect::<Result<Vec<_>>>()?;
        let geometric_efficiency = (0..config.sample.len())
            .map(|i| {
                if options.use_geometric_efficiency {
                    self.geometric_efficiency(i)
                } else {
                    Ok(1.0)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        let minimum_energy = requests
            .iter()
            .map(|r| r.threshold)
            .fold(f64::INFINITY, f64::min);

        Ok(Setup {
            solver: self,
            elements,
            options,
            requests,
            compositions,
            mass_thickness: config.sample.iter().map(|l| l.mass_thickness()).collect(),
            geometric_efficiency,
            minimum_energy,
            sin_in: config.geometry.sin_alpha_in(),
            sin_out: config.geometry.sin_alpha_out(),
        })
    }

    /// Beam rays with weights reduced by the beam filters.
    fn filtered_rays(&self, rays: &[Ray], elements: &Elements) -> Result<Vec<Ray>> {
        let config = self.config();
        let energies: Vec<f64> = rays.iter().map(|r| r.energy).collect();
        let mut rays = rays.to_vec();
        for filter in &config.beam_filters {
            let transmission = filter.transmission(&energies, elements, &config.materials, 90.0)?;
            for (ray, t) in rays.iter_mut().zip(transmission) {
                ray.weight *= t;
            }
        }
        for table in &config.user_beam_filters {
            for (ray, t) in rays.iter_mut().zip(table.transmissions(&energies)) {
                ray.weight *= t;
            }
        }
        Ok(rays)
    }
}

impl Setup<'_> {
    fn n_layers(&self) -> usize {
        self.compositions.len()
    }

    fn ray_fluorescence(&self, ray: &Ray) -> Result<RayResult> {
        let mut result = RayResult::new();
        let energy = ray.energy;
        if energy < self.minimum_energy || ray.weight <= 0.0 {
            return Ok(result);
        }
        log::trace!("ray {energy} keV, weight {}", ray.weight);

        let mut mu = MuCache::new(self.elements, &self.compositions);
        let mut factors = FactorCache::default();
        let mut efficiencies: HashMap<(usize, u64), f64> = HashMap::new();

        // beam fraction reaching the top of each layer
        let mut layer_weight = Vec::with_capacity(self.n_layers());
        let mut mu_incident = Vec::with_capacity(self.n_layers());
        let mut attenuation: f64 = 0.0;
        for i in 0..self.n_layers() {
            layer_weight.push((-attenuation).exp());
            let mu_i = mu.total(i, energy)?;
            mu_incident.push(mu_i);
            attenuation += self.mass_thickness[i] * mu_i / self.sin_in;
        }

        let sources = if self.options.order >= ExcitationOrder::Secondary {
            (0..self.n_layers())
                .map(|j| self.layer_sources(j, ray, layer_weight[j], &mut mu))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        for (index, request) in self.requests.iter().enumerate() {
            if request.threshold > energy {
                continue;
            }
            let primary_factors = self
                .elements
                .excitation_factors(&request.element, energy, ray.weight)?;

            for i in 0..self.n_layers() {
                if !request.includes_layer(i) {
                    continue;
                }
                let mass_fraction = self.compositions[i]
                    .get(&request.element)
                    .copied()
                    .unwrap_or(0.0);
                let mass_factor = if self.options.use_mass_fractions {
                    mass_fraction
                } else {
                    1.0
                };
                if mass_factor == 0.0 {
                    continue;
                }

                let mut lines: BTreeMap<&str, LineAccumulator> = BTreeMap::new();
                for (line, factor) in &primary_factors {
                    if !request.matches_line(line) || factor.factor <= 0.0 {
                        continue;
                    }
                    let efficiency = match efficiencies.get(&(i, factor.energy.to_bits())) {
                        Some(&value) => value,
                        None => {
                            let value = self.detection_efficiency(i, factor.energy, &mut mu)?;
                            efficiencies.insert((i, factor.energy.to_bits()), value);
                            value
                        }
                    };
                    lines.insert(
                        line,
                        LineAccumulator {
                            energy: factor.energy,
                            efficiency,
                            mass_fraction,
                            energy_threshold: request.threshold,
                            mu_1_i: mu.total(i, factor.energy)?,
                            ..Default::default()
                        },
                    );
                }
                if lines.is_empty() {
                    continue;
                }

                let mu_1_lambda = mu_incident[i];
                let d1 = self.mass_thickness[i];
                for (line, acc) in lines.iter_mut() {
                    let t = mu_1_lambda / self.sin_in + acc.mu_1_i / self.sin_out;
                    let depth = (1.0 - (-t * d1).exp()) / t;
                    acc.primary = depth * (mass_factor / self.sin_in)
                        * primary_factors[*line].rate
                        * layer_weight[i];
                }

                if self.options.order >= ExcitationOrder::Secondary {
                    let context = Emitter {
                        layer: i,
                        element: &request.element,
                        threshold: request.threshold,
                        mass_factor,
                        mu_1_lambda,
                    };
                    self.secondary(
                        &context,
                        &mut lines,
                        &sources,
                        &layer_weight,
                        &mu_incident,
                        &mut mu,
                        &mut factors,
                    )?;
                }

                for (line, mut acc) in lines {
                    acc.rate = (acc.primary + acc.secondary) * acc.efficiency;
                    result.insert((index, i, line.to_string()), acc);
                }
            }
        }
        Ok(result)
    }

    /// Lines of layer `j` excited by the ray, plus its coherent scatter.
    fn layer_sources(
        &self,
        j: usize,
        ray: &Ray,
        layer_weight: f64,
        mu: &mut MuCache,
    ) -> Result<Vec<SourceLine>> {
        let composition = &self.compositions[j];
        let symbols: Vec<&str> = composition.keys().map(String::as_str).collect();
        let families = self.elements.peak_families(&symbols, ray.energy)?;
        let limit = self.options.secondary_calculation_limit;

        let mut sources = Vec::new();
        let mut current: Option<(String, BTreeMap<String, ExcitationFactor>)> = None;
        for (family_name, _) in &families {
            let Some((element, family)) = family_name.split_once(' ') else {
                continue;
            };
            if current.as_ref().is_none_or(|(e, _)| e != element) {
                current = Some((
                    element.to_string(),
                    self.elements.excitation_factors(element, ray.energy, 1.0)?,
                ));
            }
            let Some((_, factors)) = &current else {
                continue;
            };
            let fraction = composition.get(element).copied().unwrap_or(0.0);
            for (line, factor) in factors {
                if !line.starts_with(family) || factor.rate * fraction <= 0.0 {
                    continue;
                }
                if limit > 0.0 && factor.rate < limit {
                    continue;
                }
                if factor.energy < self.minimum_energy {
                    continue;
                }
                sources.push(SourceLine {
                    name: format!("{element} {line}"),
                    energy: factor.energy,
                    rate: factor.rate * fraction * ray.weight * layer_weight,
                    mu: mu.total(j, factor.energy)?,
                });
            }
        }

        // coherent scatter re-emitted isotropically at the beam energy
        let coherent = self
            .elements
            .composition_mass_attenuation(composition, &[ray.energy])?
            .coherent[0];
        sources.push(SourceLine {
            name: "coherent scattering".to_string(),
            energy: ray.energy,
            rate: ray.weight * layer_weight * coherent,
            mu: mu.total(j, ray.energy)?,
        });
        Ok(sources)
    }

    /// Upper layers at the exit angle, attenuators, geometry and detector.
    fn detection_efficiency(&self, layer: usize, energy: f64, mu: &mut MuCache) -> Result<f64> {
        let config = self.solver.config();
        let materials = &config.materials;
        let mut efficiency = 1.0;
        let alpha_out = config.geometry.alpha_out;
        for j in 0..layer {
            efficiency *= config.sample[j].transmission_from_mu(mu.total(j, energy)?, alpha_out)?;
        }
        for attenuator in &config.attenuators {
            efficiency *= attenuator.transmission(&[energy], self.elements, materials, 90.0)?[0];
        }
        for table in &config.user_attenuators {
            efficiency *= table.transmission(energy);
        }
        efficiency *= self.geometric_efficiency[layer];
        if let Some(detector) = &config.detector {
            efficiency *= detector.efficiency(&[energy], self.elements, materials)?[0];
        }
        Ok(efficiency)
    }

    #[allow(clippy::too_many_arguments)]
    fn secondary(
        &self,
        emitter: &Emitter,
        lines: &mut BTreeMap<&str, LineAccumulator>,
        sources: &[Vec<SourceLine>],
        layer_weight: &[f64],
        mu_incident: &[f64],
        mu: &mut MuCache,
        factors: &mut FactorCache,
    ) -> Result<()> {
        let i = emitter.layer;
        let (sin_in, sin_out) = (self.sin_in, self.sin_out);
        let d1 = self.mass_thickness[i];
        let scale = emitter.mass_factor * 0.5 / sin_in;
        let mu1_in = emitter.mu_1_lambda / sin_in;

        for (j, layer_sources) in sources.iter().enumerate() {
            if j != i && layer_weight[j] / layer_weight[i] < LAYER_WEIGHT_CUTOFF {
                continue;
            }
            let d2 = self.mass_thickness[j];
            let mu2_in = mu_incident[j] / sin_in;
            for source in layer_sources {
                if emitter.threshold > source.energy {
                    continue;
                }
                let excited = factors.get(self.elements, emitter.element, source.energy)?;
                let contribution_key = format!("{} {j:02}", source.name);
                // intermediate layers and the emitting layer at the source energy
                let (mu_1_j, mu_between) = if j == i {
                    (source.mu, 0.0)
                } else {
                    let (low, high) = if i < j { (i, j) } else { (j, i) };
                    let mut between = 0.0;
                    for b in low + 1..high {
                        between += self.mass_thickness[b] * mu.total(b, source.energy)?;
                    }
                    (mu.total(i, source.energy)?, between)
                };

                for (line, acc) in lines.iter_mut() {
                    let Some(factor) = excited.get(*line) else {
                        continue;
                    };
                    let q = acc.mu_1_i / sin_out;
                    let value = if j == i {
                        // exchanging the paths is singular when the source
                        // is the beam itself at normal incidence
                        let mu1_swapped = if mu1_in == source.mu {
                            emitter.mu_1_lambda / (0.99999 * sin_in)
                        } else {
                            mu1_in
                        };
                        let l0 = de_boer_l0(mu1_in, q, source.mu, 1.0, d1)?
                            + de_boer_l0(q, mu1_swapped, source.mu, 1.0, d1)?;
                        l0 * scale * factor.rate * source.rate
                    } else {
                        if factor.rate < SOURCE_RATE_CUTOFF {
                            continue;
                        }
                        let x = if i < j {
                            let exit = (-acc.mu_1_i * d1 / sin_out).exp();
                            if exit < EXIT_TRANSMISSION_CUTOFF {
                                continue;
                            }
                            exit * de_boer_x(mu2_in, q, d1, d2, mu_1_j, source.mu, mu_between)?
                        } else {
                            let entrance = (-mu_incident[j] * d2 / sin_in).exp();
                            let p = if mu2_in == source.mu {
                                mu_incident[j] / (0.99999 * sin_in)
                            } else {
                                mu2_in
                            };
                            entrance * de_boer_x(-p, -q, d1, d2, mu_1_j, source.mu, mu_between)?
                        };
                        x * source.rate * scale * factor.rate
                    };
                    *acc.contributions.entry(contribution_key.clone()).or_insert(0.0) += value;
                    acc.secondary += value;
                }
            }
        }
        Ok(())
    }

    /// Final per-request maps, with escape peaks split off the parent lines.
    fn assemble(&self, merged: RayResult) -> Result<MultilayerFluorescence> {
        let mut output: MultilayerFluorescence = self
            .requests
            .iter()
            .map(|r| (r.key.clone(), BTreeMap::new()))
            .collect();
        let config = self.solver.config();
        let mut escape_cache = HashMap::new();

        for ((index, layer, line), acc) in merged {
            let key = &self.requests[index].key;
            let layer_lines = output
                .get_mut(key)
                .ok_or_else(|| XrfError::InvalidConfiguration(format!("unknown request {key}")))?
                .entry(layer)
                .or_default();

            let mut parent = LineIntensity {
                energy: acc.energy,
                rate: acc.rate,
                primary: acc.primary,
                secondary: acc.secondary,
                tertiary: 0.0,
                efficiency: acc.efficiency,
                mass_fraction: acc.mass_fraction,
                energy_threshold: acc.energy_threshold,
                mu_1_i: acc.mu_1_i,
                escape_ratio: 0.0,
                escape_of: None,
                contributions: acc.contributions,
            };

            if let Some(detector) = &config.detector {
                let bits = acc.energy.to_bits();
                if !escape_cache.contains_key(&bits) {
                    let peaks =
                        detector.escape_with_materials(acc.energy, self.elements, &config.materials)?;
                    escape_cache.insert(bits, peaks);
                }
                let mut total_escape = 0.0;
                for (name, peak) in &escape_cache[&bits] {
                    total_escape += peak.rate;
                    layer_lines.insert(
                        format!("{line} {name}"),
                        LineIntensity {
                            energy: peak.energy,
                            rate: peak.rate * parent.rate,
                            primary: peak.rate * parent.primary,
                            secondary: peak.rate * parent.secondary,
                            escape_ratio: peak.rate,
                            escape_of: Some(line.clone()),
                            contributions: BTreeMap::new(),
                            ..parent.clone()
                        },
                    );
                }
                parent.rate *= 1.0 - total_escape;
            }
            layer_lines.insert(line, parent);
        }
        Ok(output)
    }
}

/// Emitting element in one layer.
struct Emitter<'a> {
    layer: usize,
    element: &'a str,
    threshold: f64,
    mass_factor: f64,
    mu_1_lambda: f64,
}

fn enhancement(line: &LineIntensity) -> f64 {
    if line.primary > 0.0 {
        (line.primary + line.secondary) / line.primary
    } else {
        1.0
    }
}

/// Scales every line by the secondary enhancement of the lines that
/// excited it.
fn apply_tertiary(output: &mut MultilayerFluorescence) {
    let mut enhancing: BTreeMap<String, f64> = BTreeMap::new();
    for (key, layers) in output.iter() {
        let element = key.split(' ').next().unwrap_or(key);
        for (layer, lines) in layers {
            for (line, intensity) in lines {
                if intensity.escape_of.is_some()
                    || intensity.mass_fraction < TERTIARY_MASS_FRACTION
                {
                    continue;
                }
                let factor = enhancement(intensity);
                if factor >= TERTIARY_ENHANCEMENT {
                    enhancing.insert(format!("{element} {line} {layer:02}"), factor);
                }
            }
        }
    }

    for layers in output.values_mut() {
        for lines in layers.values_mut() {
            let mut parents: HashMap<String, f64> = HashMap::new();
            for (line, intensity) in lines.iter_mut().filter(|(_, l)| l.escape_of.is_none()) {
                intensity.tertiary = 0.0;
                if enhancement(intensity) < TERTIARY_ENHANCEMENT {
                    continue;
                }
                intensity.tertiary = intensity
                    .contributions
                    .iter()
                    .filter_map(|(source, value)| enhancing.get(source).map(|f| value * (f - 1.0)))
                    .sum();
                let emitted = intensity.primary + intensity.secondary;
                parents.insert(line.clone(), intensity.tertiary / emitted);
                intensity.rate *= (intensity.tertiary + emitted) / emitted;
            }
            for intensity in lines.values_mut() {
                let ratio = match &intensity.escape_of {
                    Some(parent) => parents.get(parent).copied(),
                    None => continue,
                };
                intensity.tertiary = 0.0;
                let Some(ratio) = ratio else {
                    continue;
                };
                let emitted = intensity.primary + intensity.secondary;
                intensity.tertiary = emitted * ratio;
                if emitted > 0.0 {
                    intensity.rate *= (intensity.tertiary + emitted) / emitted;
                }
            }
        }
    }
}
