use serde::{Deserialize, Serialize};

use crate::beam::Beam;
use crate::detector::Detector;
use crate::error::{Result, XrfError};
use crate::layer::{Layer, sin_degrees};
use crate::material::Material;
use crate::transmission::TransmissionTable;

/// Beam and detector angles in degrees, measured from the sample surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    pub alpha_in: f64,
    pub alpha_out: f64,
    pub scattering_angle: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            alpha_in: 45.0,
            alpha_out: 45.0,
            scattering_angle: 90.0,
        }
    }
}

impl Geometry {
    /// Scattering angle defaults to `alpha_in + alpha_out`.
    pub fn new(alpha_in: f64, alpha_out: f64, scattering_angle: Option<f64>) -> Result<Self> {
        let geometry = Geometry {
            alpha_in,
            alpha_out,
            scattering_angle: scattering_angle.unwrap_or(alpha_in + alpha_out),
        };
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn validate(&self) -> Result<()> {
        for (angle, what) in [(self.alpha_in, "incident"), (self.alpha_out, "exit")] {
            if !angle.is_finite() || sin_degrees(angle) < 1.0e-9 {
                return Err(XrfError::InvalidConfiguration(format!(
                    "{what} angle {angle} is parallel to the sample surface"
                )));
            }
        }
        if !self.scattering_angle.is_finite() {
            return Err(XrfError::InvalidConfiguration(
                "scattering angle must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sin_alpha_in(&self) -> f64 {
        sin_degrees(self.alpha_in)
    }

    pub fn sin_alpha_out(&self) -> f64 {
        sin_degrees(self.alpha_out)
    }
}

/// Complete description of an XRF measurement.
///
/// Layer materials are formulas, elements or the names of `materials`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct XrfConfig {
    pub beam: Option<Beam>,
    /// Attenuating layers between source and sample, normal incidence.
    pub beam_filters: Vec<Layer>,
    pub user_beam_filters: Vec<TransmissionTable>,
    /// Sample layers in beam order.
    pub sample: Vec<Layer>,
    /// Layer whose surface the detector distance refers to.
    pub reference_layer: usize,
    /// Attenuating layers between sample and detector, normal incidence.
    pub attenuators: Vec<Layer>,
    pub user_attenuators: Vec<TransmissionTable>,
    pub materials: Vec<Material>,
    pub detector: Option<Detector>,
    pub geometry: Geometry,
}

impl XrfConfig {
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        for layer in self
            .beam_filters
            .iter()
            .chain(&self.sample)
            .chain(&self.attenuators)
        {
            layer.validate()?;
        }
        if !self.sample.is_empty() && self.reference_layer >= self.sample.len() {
            return Err(XrfError::InvalidConfiguration(format!(
                "reference layer {} outside a sample of {} layers",
                self.reference_layer,
                self.sample.len()
            )));
        }
        if let Some(detector) = &self.detector {
            detector.validate()?;
        }
        Ok(())
    }
}
