//! Configuration module.
//!
//! Handles loading and validating service configuration from TOML files.

mod settings;

pub use settings::*;
