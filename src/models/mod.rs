//! Data Models
//!
//! Serialized forms owned by the application layer: settings file and
//! session checkpoints. The diagnosis model itself lives in `netdiag-core`.

pub mod checkpoint;
pub mod settings;

pub use checkpoint::*;
pub use settings::*;
