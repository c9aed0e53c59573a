//! nasdeploy - deploy Docker Compose apps to a TrueNAS appliance.

pub mod facade;
pub mod logging;

pub use facade::{convert_document, validate_document, Operations, Outcome};
