//! Configuration management for the IDO SDK
//!
//! Settings come from optional TOML/JSON files (`ido.toml`, `ido.json`,
//! `config.toml`, `config.json`) and `IDO_*` environment variables, with
//! environment values taking precedence.

pub mod env;

pub use env::{EnvironmentConfig, LoggingEnvConfig, ManagerEnvConfig};
