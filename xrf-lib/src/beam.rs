use serde::{Deserialize, Serialize};

use crate::error::{Result, XrfError};

/// One monochromatic component of the excitation beam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    /// keV
    pub energy: f64,
    #[serde(default = "default_one")]
    pub weight: f64,
    /// Whether the ray is a characteristic line of the source (as opposed
    /// to bremsstrahlung); carried through but not used by the physics.
    #[serde(default = "default_true")]
    pub characteristic: bool,
    #[serde(default)]
    pub divergency: f64,
}

fn default_one() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Excitation spectrum: rays sorted by energy with weights summing to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Ray>", into = "Vec<Ray>")]
pub struct Beam {
    rays: Vec<Ray>,
}

impl TryFrom<Vec<Ray>> for Beam {
    type Error = XrfError;

    fn try_from(rays: Vec<Ray>) -> Result<Self> {
        Beam::from_rays(rays)
    }
}

impl From<Beam> for Vec<Ray> {
    fn from(beam: Beam) -> Self {
        beam.rays
    }
}

/// Empty means `default`, one value is repeated, otherwise one per ray.
fn broadcast<T: Copy>(values: &[T], n: usize, default: T, what: &'static str) -> Result<Vec<T>> {
    match values.len() {
        0 => Ok(vec![default; n]),
        1 => Ok(vec![values[0]; n]),
        len if len == n => Ok(values.to_vec()),
        len => Err(XrfError::LengthMismatch {
            what,
            left: n,
            right: len,
        }),
    }
}

impl Beam {
    /// # Arguments
    /// * `energies` - Ray energies in keV
    /// * `weights` - Relative intensities: empty for all ones, a single value
    ///   for all rays, or one per energy
    /// * `characteristic` - Same broadcasting rule, default true
    /// * `divergency` - Same broadcasting rule, default 0
    pub fn new(
        energies: &[f64],
        weights: &[f64],
        characteristic: &[bool],
        divergency: &[f64],
    ) -> Result<Self> {
        let n = energies.len();
        let weights = broadcast(weights, n, 1.0, "energies and weights")?;
        let characteristic = broadcast(characteristic, n, true, "energies and characteristic flags")?;
        let divergency = broadcast(divergency, n, 0.0, "energies and divergencies")?;

        let rays = (0..n)
            .map(|i| Ray {
                energy: energies[i],
                weight: weights[i],
                characteristic: characteristic[i],
                divergency: divergency[i],
            })
            .collect();
        Self::from_rays(rays)
    }

    pub fn single_energy(energy: f64) -> Result<Self> {
        Self::new(&[energy], &[], &[], &[])
    }

    /// Validates, normalizes and sorts a list of rays.
    pub fn from_rays(mut rays: Vec<Ray>) -> Result<Self> {
        if rays.is_empty() {
            return Err(XrfError::InvalidConfiguration("empty beam".to_string()));
        }
        for ray in &rays {
            if !ray.energy.is_finite() || ray.energy <= 0.0 {
                return Err(XrfError::InvalidEnergy(ray.energy));
            }
            if !ray.weight.is_finite() || ray.weight < 0.0 {
                return Err(XrfError::InvalidConfiguration(format!(
                    "beam weight at {} keV must not be negative, got {}",
                    ray.energy, ray.weight
                )));
            }
        }
        let total: f64 = rays.iter().map(|r| r.weight).sum();
        if total > 0.0 {
            for ray in &mut rays {
                ray.weight /= total;
            }
        }
        rays.sort_by(|a, b| a.energy.total_cmp(&b.energy));
        Ok(Beam { rays })
    }

    pub fn rays(&self) -> &[Ray] {
        &self.rays
    }

    pub fn energies(&self) -> Vec<f64> {
        self.rays.iter().map(|r| r.energy).collect()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.rays.iter().map(|r| r.weight).collect()
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }
}
