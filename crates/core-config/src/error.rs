use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML syntax errors and unknown keys/sections; the message names the
    /// offending key.
    #[error("configuration error: {0}")]
    Parse(String),

    #[error("missing required parameter {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{0}")]
    Conflict(String),

    /// The input dataset could not be inspected; this is an input-data
    /// failure rather than a configuration mistake.
    #[error("cannot inspect input dataset: {0}")]
    InputData(#[from] core_io::IoError),
}
