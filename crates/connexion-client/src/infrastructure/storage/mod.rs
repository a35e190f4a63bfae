//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the monitor's TOML file from the platform
//! config directory, writes it back, and supplies defaults on first run.

pub mod config;
