//! Piecewise-linear transmission curves for filters and windows measured or
//! computed outside the attenuation model.

use serde::{Deserialize, Serialize};

use crate::error::{Result, XrfError};
use crate::interp::interp_one;

/// Energy (keV) -> transmission fraction, with a name and a comment.
///
/// Evaluation is zero below the lowest energy, linear between energies and
/// flat at the value of the highest energy above it. The table is only
/// replaced as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransmissionTableRecord", into = "TransmissionTableRecord")]
pub struct TransmissionTable {
    name: String,
    comment: String,
    energies: Vec<f64>,
    transmissions: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct TransmissionTableRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    comment: String,
    energies: Vec<f64>,
    transmissions: Vec<f64>,
}

impl TryFrom<TransmissionTableRecord> for TransmissionTable {
    type Error = XrfError;

    fn try_from(record: TransmissionTableRecord) -> Result<Self> {
        TransmissionTable::from_lists(
            &record.energies,
            &record.transmissions,
            &record.name,
            &record.comment,
        )
    }
}

impl From<TransmissionTable> for TransmissionTableRecord {
    fn from(table: TransmissionTable) -> Self {
        TransmissionTableRecord {
            name: table.name,
            comment: table.comment,
            energies: table.energies,
            transmissions: table.transmissions,
        }
    }
}

impl Default for TransmissionTable {
    fn default() -> Self {
        TransmissionTable {
            name: String::new(),
            comment: String::new(),
            energies: vec![0.0],
            transmissions: vec![1.0],
        }
    }
}

impl TransmissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table built from parallel lists of energies and transmissions.
    pub fn from_lists(
        energies: &[f64],
        transmissions: &[f64],
        name: &str,
        comment: &str,
    ) -> Result<Self> {
        let mut table = Self::new();
        table.set_transmission_table_from_lists(energies, transmissions, name, comment)?;
        Ok(table)
    }

    /// Replaces the table, and the name and comment unless they are empty.
    ///
    /// A named table cannot be renamed here. Nothing changes if the input
    /// is rejected.
    pub fn set_transmission_table_from_lists(
        &mut self,
        energies: &[f64],
        transmissions: &[f64],
        name: &str,
        comment: &str,
    ) -> Result<()> {
        if energies.len() != transmissions.len() {
            return Err(XrfError::LengthMismatch {
                what: "energies and transmissions",
                left: energies.len(),
                right: transmissions.len(),
            });
        }
        let (energies, transmissions) =
            sorted_table(energies.iter().copied().zip(transmissions.iter().copied()))?;
        if !self.name.is_empty() && !name.is_empty() && name != self.name {
            return Err(XrfError::InvalidTransmission(format!(
                "table '{}' cannot be renamed to '{name}'",
                self.name
            )));
        }
        self.energies = energies;
        self.transmissions = transmissions;
        if !name.is_empty() {
            self.name = name.to_string();
        }
        if !comment.is_empty() {
            self.comment = comment.to_string();
        }
        Ok(())
    }

    /// Replaces the table from `(energy, transmission)` pairs, keeping name
    /// and comment.
    pub fn set_transmission_table(
        &mut self,
        table: impl IntoIterator<Item = (f64, f64)>,
    ) -> Result<()> {
        let (energies, transmissions) = sorted_table(table)?;
        self.energies = energies;
        self.transmissions = transmissions;
        Ok(())
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn set_comment(&mut self, comment: &str) {
        self.comment = comment.to_string();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// `(energy, transmission)` pairs in increasing energy order.
    pub fn transmission_table(&self) -> Vec<(f64, f64)> {
        self.energies
            .iter()
            .copied()
            .zip(self.transmissions.iter().copied())
            .collect()
    }

    /// Zero below the lowest energy and for non-finite energies.
    pub fn transmission(&self, energy: f64) -> f64 {
        if !energy.is_finite() || energy < self.energies[0] {
            return 0.0;
        }
        interp_one(energy, &self.energies, &self.transmissions)
    }

    pub fn transmissions(&self, energies: &[f64]) -> Vec<f64> {
        energies.iter().map(|&e| self.transmission(e)).collect()
    }
}

/// Sorted, validated columns; an empty input gives the default table.
fn sorted_table(pairs: impl IntoIterator<Item = (f64, f64)>) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut pairs: Vec<(f64, f64)> = pairs.into_iter().collect();
    if pairs.is_empty() {
        return Ok((vec![0.0], vec![1.0]));
    }
    for &(energy, transmission) in &pairs {
        if !energy.is_finite() || energy < 0.0 {
            return Err(XrfError::InvalidTransmission(format!(
                "energy must be finite and not negative, got {energy}"
            )));
        }
        if !transmission.is_finite() || transmission < 0.0 {
            return Err(XrfError::InvalidTransmission(format!(
                "transmission at {energy} keV must be finite and not negative, got {transmission}"
            )));
        }
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    if let Some(w) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(XrfError::DuplicateEnergy(w[0].0));
    }
    Ok(pairs.into_iter().unzip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let table = TransmissionTable::new();
        assert_eq!(table.name(), "");
        assert_eq!(table.comment(), "");
        assert_eq!(table.transmission_table(), vec![(0.0, 1.0)]);
        assert_eq!(table.transmission(-1.0), 0.0);
        assert_eq!(table.transmission(1.0), 1.0);
    }

    #[rstest]
    #[case(0.09, 0.0)]
    #[case(0.1, 0.1)]
    #[case(0.3, 0.3)]
    #[case(0.5, 0.5)]
    #[case(1.0, 0.5)]
    #[case(100.0, 0.5)]
    fn test_evaluation(#[case] energy: f64, #[case] expected: f64) {
        let values = [0.1, 0.2, 0.3, 0.4, 0.5];
        let table = TransmissionTable::from_lists(&values, &values, "", "c").unwrap();
        assert_eq!(table.transmission(energy), expected);
    }

    #[test]
    fn test_linear_between_keys() {
        let values = [0.1, 0.2, 0.3, 0.4, 0.5];
        let table = TransmissionTable::from_lists(&values, &values, "", "").unwrap();
        let t = table.transmissions(&[0.15, 0.18, 0.41]);
        for (value, expected) in t.iter().zip([0.15, 0.18, 0.41]) {
            assert!((value - expected).abs() < 1e-12, "{value} vs {expected}");
        }
    }

    #[test]
    fn test_unsorted_input() {
        let table =
            TransmissionTable::from_lists(&[2.0, 1.0, 3.0], &[0.5, 0.25, 0.75], "", "").unwrap();
        assert_eq!(
            table.transmission_table(),
            vec![(1.0, 0.25), (2.0, 0.5), (3.0, 0.75)]
        );
    }

    #[test]
    fn test_name_and_comment_kept_when_empty() {
        let mut table = TransmissionTable::new();
        table.set_name("My table");
        table
            .set_transmission_table_from_lists(&[1.0], &[0.5], "", "My comment")
            .unwrap();
        assert_eq!(table.name(), "My table");
        assert_eq!(table.comment(), "My comment");

        table.set_transmission_table([(5.0, 0.9)]).unwrap();
        assert_eq!(table.name(), "My table");
        assert_eq!(table.comment(), "My comment");
        assert_eq!(table.transmission(4.0), 0.0);
        assert_eq!(table.transmission(6.0), 0.9);
    }

    #[test]
    fn test_rejected_input_leaves_table_unchanged() {
        let mut table = TransmissionTable::from_lists(&[1.0, 2.0], &[0.1, 0.2], "a", "b").unwrap();
        let before = table.clone();

        let err = table
            .set_transmission_table_from_lists(&[1.0, 2.0], &[0.1], "x", "y")
            .unwrap_err();
        assert!(matches!(err, XrfError::LengthMismatch { .. }));

        let err = table
            .set_transmission_table_from_lists(&[1.0, 1.0], &[0.1, 0.2], "x", "y")
            .unwrap_err();
        assert!(matches!(err, XrfError::DuplicateEnergy(e) if e == 1.0));

        let err = table.set_transmission_table([(1.0, -0.1)]).unwrap_err();
        assert!(matches!(err, XrfError::InvalidTransmission(_)));

        assert_eq!(table, before);
    }

    #[rstest]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(f64::NEG_INFINITY)]
    fn test_non_finite_energy_is_not_transmitted(#[case] energy: f64) {
        assert_eq!(TransmissionTable::new().transmission(energy), 0.0);
        let table = TransmissionTable::from_lists(&[1.0, 2.0], &[0.4, 0.8], "", "").unwrap();
        let t = table.transmissions(&[energy, 1.5]);
        assert_eq!(t[0], 0.0);
        assert!((t[1] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_named_table_cannot_be_renamed() {
        let mut table = TransmissionTable::from_lists(&[1.0], &[0.5], "kapton", "").unwrap();
        let before = table.clone();
        let err = table
            .set_transmission_table_from_lists(&[2.0], &[0.7], "mylar", "")
            .unwrap_err();
        assert!(matches!(err, XrfError::InvalidTransmission(_)));
        assert_eq!(table, before);

        table
            .set_transmission_table_from_lists(&[2.0], &[0.7], "kapton", "foil")
            .unwrap();
        table.set_transmission_table_from_lists(&[3.0], &[0.9], "", "").unwrap();
        assert_eq!(table.name(), "kapton");
        assert_eq!(table.comment(), "foil");
        assert_eq!(table.transmission(3.0), 0.9);
    }

    #[test]
    fn test_empty_lists_restore_default_table() {
        let mut table = TransmissionTable::from_lists(&[1.0], &[0.5], "", "").unwrap();
        table.set_transmission_table_from_lists(&[], &[], "", "").unwrap();
        assert_eq!(table.transmission_table(), vec![(0.0, 1.0)]);
    }
}
