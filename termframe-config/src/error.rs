//! Typed error variants for the termframe-config crate.
//!
//! Callers at the crate boundary can match on specific failure modes
//! instead of opaque `anyhow` strings.

use thiserror::Error;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error occurred reading the config file.
    #[error("I/O error reading config '{path}': {source}")]
    Io {
        /// Path of the file that failed to load.
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file contained invalid YAML.
    #[error("YAML parse error in config: {0}")]
    Parse(#[from] serde_yaml_ng::Error),

    /// A field value failed semantic validation.
    ///
    /// The inner string describes which field is invalid and why.
    #[error("Invalid config value: {0}")]
    Validation(String),
}
