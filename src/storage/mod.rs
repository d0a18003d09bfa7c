//! Storage Layer
//!
//! Handles all data persistence: session checkpoints (SQLite or memory) and JSON settings.

pub mod checkpoint;
pub mod config;

pub use checkpoint::*;
pub use config::*;
