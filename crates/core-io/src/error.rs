use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("read failure on {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("write failure on {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed MetaImage header {path}: {reason}")]
    HeaderParse { path: PathBuf, reason: String },

    #[error("unsupported element type '{0}'")]
    UnsupportedElementType(String),

    #[error("{path} is truncated: need {needed} bytes, found {found}")]
    Truncated {
        path: PathBuf,
        needed: u64,
        found: u64,
    },

    #[error("dataset shape {found} does not match the configured {expected}")]
    DimsMismatch { expected: String, found: String },

    #[error("asynchronous I/O failed: {0}")]
    AsyncFailure(String),

    #[error("I/O executor is shut down")]
    ExecutorClosed,
}
