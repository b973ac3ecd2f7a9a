// src/config/mod.rs

//! Configuration loading and validation for assetwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants such as known references and acyclic pipelines
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ConfigSection, DefaultSection, PipelineConfig, RawConfigFile, ServerSection,
    TaskConfig, TransformKind, WatchConfig,
};
