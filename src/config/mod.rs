// src/config/mod.rs

//! Scheduler configuration.
//!
//! - [`model`] holds the serde types mirroring the TOML layout.
//! - [`loader`] reads and deserializes files.
//! - [`validate`] turns a `RawConfigFile` into a checked `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_CONFIG_FILE, load_and_validate, load_from_path, parse_str};
pub use model::{
    ConfigFile, NodeConfig, QueueConfig, RawConfigFile, SchedulerSection, TelemetrySection,
};
