use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum XrfError {
    #[error("data not found in {path}: {reason}")]
    DataNotFound { path: PathBuf, reason: String },

    #[error("invalid element: {0}")]
    InvalidElement(String),

    #[error("invalid energy: {0} keV")]
    InvalidEnergy(f64),

    #[error("invalid chemical formula: {0}")]
    InvalidFormula(String),

    #[error("length mismatch: {left} {what} vs {right}")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    #[error("duplicate energy in transmission table: {0} keV")]
    DuplicateEnergy(f64),

    #[error("no element database associated with {0}")]
    MissingDatabase(String),

    #[error("invalid material: {0}")]
    InvalidMaterial(String),

    #[error("invalid layer: {0}")]
    InvalidLayer(String),

    #[error("invalid transmission table: {0}")]
    InvalidTransmission(String),

    #[error("invalid shell: {0}")]
    InvalidShell(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("numerical error: {0}")]
    Numerical(String),
}

impl XrfError {
    pub(crate) fn data_not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DataNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, XrfError>;
