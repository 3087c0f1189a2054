pub mod beam;
pub mod chemparser;
pub mod config;
pub mod detector;
pub mod element;
pub mod elements;
pub(crate) mod elements_db;
pub mod epdl97;
pub mod error;
pub mod interp;
pub mod layer;
pub mod material;
pub mod math;
pub mod multilayer;
pub mod shell;
pub(crate) mod specfile;
pub mod transmission;
pub mod xrf;

pub use beam::{Beam, Ray};
pub use config::{Geometry, XrfConfig};
pub use detector::{Detector, EscapePeak, EscapeSettings};
pub use element::{Element, XrayLine};
pub use elements::{Elements, ExcitationFactor};
pub use epdl97::{CrossSectionDatabase, Effect, MassAttenuation};
pub use error::{Result, XrfError};
pub use layer::{Layer, LayerMaterial};
pub use material::Material;
pub use shell::Shell;
pub use transmission::TransmissionTable;
pub use xrf::{
    ExcitationOrder, FluorescenceOptions, FluorescenceRequest, LineIntensity,
    MultilayerFluorescence, XrfSolver,
};
