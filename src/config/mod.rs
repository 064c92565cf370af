//! Configuration module for linkgauge
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The resulting [`Config`] is immutable and passed explicitly to the consumer
//! and the checkers; there is no global configuration state.
//!
//! # Example
//!
//! ```no_run
//! use linkgauge::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("linkgauge.toml")).unwrap();
//! println!("Checking with {} threads", config.checking.threads);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CheckingConfig, ClassificationConfig, Config, ConsoleFormat, FileOutput, FilteringConfig,
    LinkPattern, OutputConfig, SinkKind,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
