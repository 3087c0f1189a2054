use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chemparser::mass_fractions;
use crate::elements::Elements;
use crate::epdl97::MassAttenuation;
use crate::error::{Result, XrfError};

/// A named substance with density, default thickness and composition.
///
/// Composition keys may be element symbols, chemical formulas or the names
/// of other materials; amounts are normalized to mass fractions. A material
/// without explicit composition is read as the formula given by its name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    name: String,
    density: f64,
    #[serde(default)]
    thickness: f64,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    composition: BTreeMap<String, f64>,
    #[serde(skip)]
    elements: Option<Arc<Elements>>,
}

impl Material {
    /// Creates an empty material.
    ///
    /// # Arguments
    /// * `name` - Material name or chemical formula, not empty
    /// * `density` - Density in g/cm³, positive
    /// * `thickness` - Default thickness in cm, not negative
    /// * `comment` - Free text
    pub fn new(name: &str, density: f64, thickness: f64, comment: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(XrfError::InvalidMaterial("empty material name".to_string()));
        }
        if !(density > 0.0 && density.is_finite()) {
            return Err(XrfError::InvalidMaterial(format!(
                "{name}: density must be positive, got {density}"
            )));
        }
        if !(thickness >= 0.0 && thickness.is_finite()) {
            return Err(XrfError::InvalidMaterial(format!(
                "{name}: thickness must not be negative, got {thickness}"
            )));
        }
        Ok(Material {
            name: name.to_string(),
            density,
            thickness,
            comment: comment.to_string(),
            composition: BTreeMap::new(),
            elements: None,
        })
    }

    /// Material whose composition is the mass fractions of `formula`.
    ///
    /// Fails with `InvalidFormula` on malformed input or unknown symbols.
    pub fn from_formula(formula: &str, density: f64, thickness: f64) -> Result<Self> {
        let composition = mass_fractions(formula)?;
        let mut material = Self::new(formula, density, thickness, "")?;
        material.composition = composition;
        Ok(material)
    }

    /// Associates the element registry used for attenuation queries.
    pub fn with_database(mut self, elements: Arc<Elements>) -> Self {
        self.elements = Some(elements);
        self
    }

    pub fn set_database(&mut self, elements: Arc<Elements>) {
        self.elements = Some(elements);
    }

    /// Replaces the composition. Amounts must be positive; they are
    /// normalized to sum one.
    pub fn set_composition(&mut self, composition: BTreeMap<String, f64>) -> Result<()> {
        if composition.is_empty() {
            return Err(XrfError::InvalidMaterial(format!(
                "{}: empty composition",
                self.name
            )));
        }
        if let Some((key, value)) = composition
            .iter()
            .find(|(_, v)| !(**v > 0.0 && v.is_finite()))
        {
            return Err(XrfError::InvalidMaterial(format!(
                "{}: amount of '{key}' must be positive, got {value}",
                self.name
            )));
        }
        let total: f64 = composition.values().sum();
        self.composition = composition
            .into_iter()
            .map(|(key, value)| (key, value / total))
            .collect();
        Ok(())
    }

    /// Same as [`Material::set_composition`] from parallel lists.
    pub fn set_composition_from_lists<S: AsRef<str>>(
        &mut self,
        names: &[S],
        amounts: &[f64],
    ) -> Result<()> {
        if names.len() != amounts.len() {
            return Err(XrfError::LengthMismatch {
                what: "composition names and amounts",
                left: names.len(),
                right: amounts.len(),
            });
        }
        let mut composition = BTreeMap::new();
        for (name, &amount) in names.iter().zip(amounts) {
            *composition.entry(name.as_ref().to_string()).or_insert(0.0) += amount;
        }
        self.set_composition(composition)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Declared composition (normalized), possibly referring to formulas or
    /// other materials.
    pub fn composition(&self) -> &BTreeMap<String, f64> {
        &self.composition
    }

    pub(crate) fn composition_or_formula(&self) -> BTreeMap<String, f64> {
        if self.composition.is_empty() {
            BTreeMap::from([(self.name.clone(), 1.0)])
        } else {
            self.composition.clone()
        }
    }

    fn elements(&self) -> Result<&Elements> {
        self.elements
            .as_deref()
            .ok_or_else(|| XrfError::MissingDatabase(format!("material '{}'", self.name)))
    }

    /// Element symbol -> mass fraction, summing to one.
    pub fn elemental_composition(&self, materials: &[Material]) -> Result<BTreeMap<String, f64>> {
        self.elements()?
            .normalized_composition(&self.composition_or_formula(), materials)
    }

    /// Mass attenuation coefficients (cm²/g) at `energies`.
    ///
    /// Requires an associated registry (`MissingDatabase` otherwise). The
    /// composition may only name elements and formulas; use
    /// [`Material::mass_attenuation_coefficients_with_materials`] when it
    /// refers to other materials.
    pub fn mass_attenuation_coefficients(&self, energies: &[f64]) -> Result<MassAttenuation> {
        self.mass_attenuation_coefficients_with_materials(energies, &[])
    }

    pub fn mass_attenuation_coefficients_with_materials(
        &self,
        energies: &[f64],
        materials: &[Material],
    ) -> Result<MassAttenuation> {
        let composition = self.elemental_composition(materials)?;
        self.elements()?.composition_mass_attenuation(&composition, energies)
    }
}
