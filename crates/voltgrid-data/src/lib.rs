//! Configuration loading for the VoltGrid engine.
//!
//! Reads [`GridConfig`](voltgrid_core::config::GridConfig) from RON, TOML, or
//! JSON, picking the format from the file extension.

pub mod loader;

pub use loader::{ConfigError, Format, load_config, load_config_from_dir};
