use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::elements::Elements;
use crate::epdl97::MassAttenuation;
use crate::error::{Result, XrfError};
use crate::material::Material;

/// What a layer is made of: a formula or material name resolved against the
/// registry and user materials, or an inline material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerMaterial {
    Name(String),
    Material(Material),
}

impl LayerMaterial {
    pub fn name(&self) -> &str {
        match self {
            LayerMaterial::Name(name) => name,
            LayerMaterial::Material(material) => material.name(),
        }
    }
}

fn default_funny_factor() -> f64 {
    1.0
}

/// A flat, laterally infinite slab.
///
/// The funny factor `f` is the covered fraction of the beam footprint: a
/// layer transmits `(1 - f) + f * exp(-mu * rho * t / sin(alpha))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    material: LayerMaterial,
    density: f64,
    thickness: f64,
    #[serde(default = "default_funny_factor")]
    funny_factor: f64,
}

impl Layer {
    /// # Arguments
    /// * `material` - Chemical formula or name of a user material
    /// * `density` - g/cm³
    /// * `thickness` - cm
    /// * `funny_factor` - covered fraction, 1.0 for a plain layer
    pub fn new(material: &str, density: f64, thickness: f64, funny_factor: f64) -> Result<Self> {
        if material.trim().is_empty() {
            return Err(XrfError::InvalidLayer("empty material name".to_string()));
        }
        Self::build(
            LayerMaterial::Name(material.to_string()),
            density,
            thickness,
            funny_factor,
        )
    }

    /// Layer of an inline material at its own density and thickness.
    pub fn from_material(material: Material) -> Result<Self> {
        let (density, thickness) = (material.density(), material.thickness());
        Self::build(LayerMaterial::Material(material), density, thickness, 1.0)
    }

    fn build(
        material: LayerMaterial,
        density: f64,
        thickness: f64,
        funny_factor: f64,
    ) -> Result<Self> {
        let layer = Layer {
            material,
            density,
            thickness,
            funny_factor,
        };
        layer.validate()?;
        Ok(layer)
    }

    /// Checks density, thickness and funny factor; layers read from a
    /// configuration are validated through this as well.
    pub fn validate(&self) -> Result<()> {
        let name = self.material.name();
        if !(self.density > 0.0 && self.density.is_finite()) {
            return Err(XrfError::InvalidLayer(format!(
                "{name}: density must be positive, got {}",
                self.density
            )));
        }
        if !(self.thickness > 0.0 && self.thickness.is_finite()) {
            return Err(XrfError::InvalidLayer(format!(
                "{name}: thickness must be positive, got {}",
                self.thickness
            )));
        }
        if !(0.0..=1.0).contains(&self.funny_factor) {
            return Err(XrfError::InvalidLayer(format!(
                "{name}: funny factor must lie in [0, 1], got {}",
                self.funny_factor
            )));
        }
        Ok(())
    }

    pub fn material(&self) -> &LayerMaterial {
        &self.material
    }

    pub fn material_name(&self) -> &str {
        self.material.name()
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn funny_factor(&self) -> f64 {
        self.funny_factor
    }

    /// Density times thickness, g/cm².
    pub fn mass_thickness(&self) -> f64 {
        self.density * self.thickness
    }

    /// Element symbol -> mass fraction.
    pub fn composition(
        &self,
        elements: &Elements,
        materials: &[Material],
    ) -> Result<BTreeMap<String, f64>> {
        match &self.material {
            LayerMaterial::Name(name) => elements.composition(name, materials),
            LayerMaterial::Material(material) => {
                elements.normalized_composition(&material.composition_or_formula(), materials)
            }
        }
    }

    pub fn mass_attenuation_coefficients(
        &self,
        energies: &[f64],
        elements: &Elements,
        materials: &[Material],
    ) -> Result<MassAttenuation> {
        let composition = self.composition(elements, materials)?;
        elements.composition_mass_attenuation(&composition, energies)
    }

    /// Transmission at `energies` for a path at `angle` degrees to the
    /// surface (90 is normal incidence).
    pub fn transmission(
        &self,
        energies: &[f64],
        elements: &Elements,
        materials: &[Material],
        angle: f64,
    ) -> Result<Vec<f64>> {
        let mu = self.mass_attenuation_coefficients(energies, elements, materials)?;
        mu.total
            .iter()
            .map(|&mu| self.transmission_from_mu(mu, angle))
            .collect()
    }

    /// Transmission for a known total mass attenuation coefficient.
    pub fn transmission_from_mu(&self, mu: f64, angle: f64) -> Result<f64> {
        let mass_thickness = self.mass_thickness();
        if mass_thickness <= 0.0 {
            return Err(XrfError::InvalidLayer(format!(
                "{}: mass thickness must be positive",
                self.material.name()
            )));
        }
        let path = mass_thickness / sin_degrees(angle);
        Ok((1.0 - self.funny_factor) + self.funny_factor * (-mu * path).exp())
    }

    /// Peak families of the layer's elements excited at `energy`.
    pub fn peak_families(
        &self,
        energy: f64,
        elements: &Elements,
        materials: &[Material],
    ) -> Result<Vec<(String, f64)>> {
        let composition = self.composition(elements, materials)?;
        let symbols: Vec<&str> = composition.keys().map(String::as_str).collect();
        elements.peak_families(&symbols, energy)
    }
}

/// `|sin|` of an angle in degrees, exactly one at 90.
pub(crate) fn sin_degrees(angle: f64) -> f64 {
    if angle == 90.0 {
        1.0
    } else {
        angle.to_radians().sin().abs()
    }
}
