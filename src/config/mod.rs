// src/config/mod.rs

//! Configuration loading and validation for condor-launcher.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Check required values (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_and_validate};
pub use model::{
    AmqpSection, CondorSection, ConfigFile, ExchangeSection, IrodsSection, MissingJobPolicy,
    OsgSection, PathListSection, PorklockSection, RawConfigFile, TicketsPathListSection,
    VaultSection,
};
