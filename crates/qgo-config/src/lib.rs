//! qgo configuration view
//!
//! Exposes the resolved project manifest (`manifest.json`) as a read-only
//! key/value tree:
//! - [`Value`], a tagged union over the JSON value kinds
//! - [`Config`], dotted-path lookup (`a.b.c`) with typed accessors
//! - Manifest-declared environment variables
//!
//! Typed accessors never panic on a mismatch. A missing key is reported as
//! [`LookupError::Absent`] and a mismatched one as [`LookupError::WrongType`],
//! so callers decide which of the two is fatal.
//!
//! # Example
//!
//! ```
//! use qgo_config::Config;
//!
//! let config = Config::from_json_str(r#"{ "name": "app", "build": { "tags": ["a"] } }"#).unwrap();
//! assert_eq!(config.string("name").unwrap(), "app");
//! assert_eq!(config.strings("build.tags").unwrap(), vec!["a".to_string()]);
//! ```

pub mod manifest;
pub mod value;

use std::path::PathBuf;
use thiserror::Error;

/// Default manifest file name
pub const MANIFEST_FILE: &str = "manifest.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read manifest {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Invalid JSON in {file} at line {line}: {error}")]
    Parse {
        file: PathBuf,
        line: usize,
        error: serde_json::Error,
    },

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Lookup failures for a single key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Key '{0}' is not set")]
    Absent(String),

    #[error("Key '{key}' is {found}, expected {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Malformed key path '{0}'")]
    MalformedPath(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

pub use manifest::Config;
pub use value::Value;
