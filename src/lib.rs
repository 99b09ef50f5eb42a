pub mod compression;
pub mod controller;
pub mod error;
pub mod transform;

pub use controller::{CodecKind, Controller, ControllerConfig, Mode, Outcome};
pub use error::{Error, Result};
