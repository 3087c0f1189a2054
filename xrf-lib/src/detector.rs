use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::elements::Elements;
use crate::error::{Result, XrfError};
use crate::layer::Layer;
use crate::material::Material;

/// Escape peak of an incident energy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EscapePeak {
    /// Recorded energy: incident energy minus the escaping line energy (keV).
    pub energy: f64,
    /// Fraction of the detected photons that end in this peak.
    pub rate: f64,
}

/// Cut-offs of the escape-peak calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscapeSettings {
    /// Escape peaks at or below this energy (keV) are dropped.
    pub energy_threshold: f64,
    /// Escape peaks at or below this fraction are dropped.
    pub intensity_threshold: f64,
    /// Most intense peaks kept per incident energy.
    pub max_peaks: usize,
    /// Incidence angle on the detector surface in degrees.
    pub alpha_in: f64,
}

impl Default for EscapeSettings {
    fn default() -> Self {
        EscapeSettings {
            energy_threshold: 0.010,
            intensity_threshold: 1.0e-7,
            max_peaks: 4,
            alpha_in: 90.0,
        }
    }
}

fn default_distance() -> f64 {
    10.0
}

/// Energy-dispersive detector: an active layer behind optional windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detector {
    active: Layer,
    #[serde(default)]
    windows: Vec<Layer>,
    /// cm, 0 disables the geometric efficiency
    #[serde(default)]
    diameter: f64,
    /// cm from the reference layer surface
    #[serde(default = "default_distance")]
    distance: f64,
    #[serde(default)]
    escape: EscapeSettings,
}

impl Detector {
    /// Detector whose active layer is `material` (formula or material name).
    pub fn new(material: &str, density: f64, thickness: f64) -> Result<Self> {
        Ok(Self::from_layer(Layer::new(material, density, thickness, 1.0)?))
    }

    pub fn from_material(material: Material) -> Result<Self> {
        Ok(Self::from_layer(Layer::from_material(material)?))
    }

    fn from_layer(active: Layer) -> Self {
        Detector {
            active,
            windows: Vec::new(),
            diameter: 0.0,
            distance: default_distance(),
            escape: EscapeSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.active.validate()?;
        for window in &self.windows {
            window.validate()?;
        }
        if !(self.diameter >= 0.0 && self.diameter.is_finite()) {
            return Err(XrfError::InvalidConfiguration(format!(
                "detector diameter must not be negative, got {}",
                self.diameter
            )));
        }
        if !(self.distance > 0.0 && self.distance.is_finite()) {
            return Err(XrfError::InvalidConfiguration(format!(
                "detector distance must be positive, got {}",
                self.distance
            )));
        }
        Ok(())
    }

    pub fn active_layer(&self) -> &Layer {
        &self.active
    }

    pub fn material_name(&self) -> &str {
        self.active.material_name()
    }

    pub fn density(&self) -> f64 {
        self.active.density()
    }

    pub fn thickness(&self) -> f64 {
        self.active.thickness()
    }

    pub fn windows(&self) -> &[Layer] {
        &self.windows
    }

    pub fn set_windows(&mut self, windows: Vec<Layer>) {
        self.windows = windows;
    }

    pub fn diameter(&self) -> f64 {
        self.diameter
    }

    pub fn set_diameter(&mut self, diameter: f64) -> Result<()> {
        if !(diameter >= 0.0 && diameter.is_finite()) {
            return Err(XrfError::InvalidConfiguration(format!(
                "detector diameter must not be negative, got {diameter}"
            )));
        }
        self.diameter = diameter;
        Ok(())
    }

    /// Active area in cm².
    pub fn active_area(&self) -> f64 {
        PI * (0.5 * self.diameter).powi(2)
    }

    pub fn set_active_area(&mut self, area: f64) -> Result<()> {
        if !(area >= 0.0 && area.is_finite()) {
            return Err(XrfError::InvalidConfiguration(format!(
                "detector area must not be negative, got {area}"
            )));
        }
        self.set_diameter(2.0 * (area / PI).sqrt())
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn set_distance(&mut self, distance: f64) -> Result<()> {
        if !(distance > 0.0 && distance.is_finite()) {
            return Err(XrfError::InvalidConfiguration(format!(
                "detector distance must be positive, got {distance}"
            )));
        }
        self.distance = distance;
        Ok(())
    }

    pub fn escape_settings(&self) -> &EscapeSettings {
        &self.escape
    }

    pub fn set_escape_settings(&mut self, settings: EscapeSettings) {
        self.escape = settings;
    }

    /// Element symbol -> mass fraction of the active material.
    pub fn composition(&self, elements: &Elements) -> Result<BTreeMap<String, f64>> {
        self.active.composition(elements, &[])
    }

    /// Fraction of photons absorbed in the active layer at normal incidence,
    /// including the transmission of the windows.
    pub fn efficiency(
        &self,
        energies: &[f64],
        elements: &Elements,
        materials: &[Material],
    ) -> Result<Vec<f64>> {
        let transmission = self.active.transmission(energies, elements, materials, 90.0)?;
        let mut efficiency: Vec<f64> = transmission.iter().map(|t| 1.0 - t).collect();
        for window in &self.windows {
            for (value, t) in efficiency
                .iter_mut()
                .zip(window.transmission(energies, elements, materials, 90.0)?)
            {
                *value *= t;
            }
        }
        Ok(efficiency)
    }

    /// Escape peaks of photons of `energy` keV, keyed "<El>_<line>esc".
    pub fn escape(&self, energy: f64, elements: &Elements) -> Result<BTreeMap<String, EscapePeak>> {
        self.escape_with_materials(energy, elements, &[])
    }

    pub fn escape_with_materials(
        &self,
        energy: f64,
        elements: &Elements,
        materials: &[Material],
    ) -> Result<BTreeMap<String, EscapePeak>> {
        let composition = self.active.composition(elements, materials)?;
        elements.escape(&composition, energy, self.active.mass_thickness(), &self.escape)
    }
}
