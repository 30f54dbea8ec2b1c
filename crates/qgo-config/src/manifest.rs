//! Manifest view
//!
//! Read-only access to `manifest.json` with dotted-path lookup.

use crate::value::Value;
use crate::{ConfigError, ConfigResult, LookupError};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Prefixes that make a string value refer to another manifest key
const REFERENCE_PREFIXES: [&str; 2] = ["manifest.", "package."];

/// Resolved project configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    data: BTreeMap<String, Value>,
    file: Option<PathBuf>,
}

impl Config {
    /// Configuration with no keys (no manifest present)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a configuration from an already-resolved value tree
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        match value {
            Value::Object(data) => Ok(Self { data, file: None }),
            other => Err(ConfigError::InvalidValue {
                field: "manifest".to_string(),
                reason: format!("expected an object at the top level, found {}", other.type_name()),
            }),
        }
    }

    /// Parse a configuration from JSON text
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        Self::parse(content, Path::new("<inline>"))
    }

    /// Load the manifest at `path`.
    ///
    /// A missing file is not an error: the result is an empty configuration.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    error: e,
                })
            }
        };

        let mut config = Self::parse(&content, path)?;
        config.file = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(content: &str, file: &Path) -> ConfigResult<Self> {
        let json: serde_json::Value =
            serde_json::from_str(content).map_err(|error| ConfigError::Parse {
                file: file.to_path_buf(),
                line: error.line(),
                error,
            })?;
        Self::from_value(Value::from(json))
    }

    /// Whether the configuration was read from a manifest file
    pub fn exists(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the manifest this configuration was read from
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Raw manifest bytes, for collaborators that edit the file in place
    pub fn raw(&self) -> ConfigResult<Vec<u8>> {
        let path = self.file.as_ref().ok_or_else(|| ConfigError::InvalidValue {
            field: "manifest".to_string(),
            reason: "no manifest file was loaded".to_string(),
        })?;
        std::fs::read(path).map_err(|error| ConfigError::Io {
            path: path.clone(),
            error,
        })
    }

    /// Top-level keys and values
    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    /// Look up a key by dotted path.
    ///
    /// A top-level key that literally contains dots takes precedence over
    /// walking nested objects.
    pub fn get(&self, path: &str) -> Result<&Value, LookupError> {
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(LookupError::MalformedPath(path.to_string()));
        }

        if let Some(value) = self.data.get(path) {
            return Ok(value);
        }

        let mut segments = path.split('.');
        let first = segments.next().unwrap_or(path);
        let mut current = self
            .data
            .get(first)
            .ok_or_else(|| LookupError::Absent(path.to_string()))?;

        for segment in segments {
            current = current
                .as_object()
                .and_then(|map| map.get(segment))
                .ok_or_else(|| LookupError::Absent(path.to_string()))?;
        }

        Ok(current)
    }

    /// Whether a key is present (malformed paths are never present)
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    pub fn bool(&self, path: &str) -> Result<bool, LookupError> {
        let value = self.get(path)?;
        value.as_bool().ok_or_else(|| wrong_type(path, "a boolean", value))
    }

    pub fn number(&self, path: &str) -> Result<f64, LookupError> {
        let value = self.get(path)?;
        value.as_f64().ok_or_else(|| wrong_type(path, "a number", value))
    }

    pub fn string(&self, path: &str) -> Result<&str, LookupError> {
        let value = self.get(path)?;
        value.as_str().ok_or_else(|| wrong_type(path, "a string", value))
    }

    pub fn array(&self, path: &str) -> Result<&[Value], LookupError> {
        let value = self.get(path)?;
        value.as_array().ok_or_else(|| wrong_type(path, "an array", value))
    }

    pub fn object(&self, path: &str) -> Result<&BTreeMap<String, Value>, LookupError> {
        let value = self.get(path)?;
        value.as_object().ok_or_else(|| wrong_type(path, "an object", value))
    }

    /// An array whose every element is a string
    pub fn strings(&self, path: &str) -> Result<Vec<String>, LookupError> {
        self.array(path)?
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| wrong_type(path, "an array of strings", item))
            })
            .collect()
    }

    pub fn opt_bool(&self, path: &str) -> Result<Option<bool>, LookupError> {
        optional(self.bool(path))
    }

    pub fn opt_number(&self, path: &str) -> Result<Option<f64>, LookupError> {
        optional(self.number(path))
    }

    pub fn opt_string(&self, path: &str) -> Result<Option<&str>, LookupError> {
        optional(self.string(path))
    }

    pub fn opt_strings(&self, path: &str) -> Result<Option<Vec<String>>, LookupError> {
        optional(self.strings(path))
    }

    pub fn opt_object(&self, path: &str) -> Result<Option<&BTreeMap<String, Value>>, LookupError> {
        optional(self.object(path))
    }

    /// Deserialize the value at `path` into a typed structure
    pub fn deserialize<T: DeserializeOwned>(&self, path: &str) -> ConfigResult<Option<T>> {
        let value = match optional(self.get(path))? {
            Some(value) => value,
            None => return Ok(None),
        };

        serde_json::from_value(value.to_json())
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: path.to_string(),
                reason: e.to_string(),
            })
    }

    /// Resolve a `manifest.<key>` / `package.<key>` reference.
    ///
    /// Returns `None` when `value` is not a reference or the referenced key
    /// holds no scalar.
    pub fn resolve_reference(&self, value: &str) -> Option<String> {
        let prefix = REFERENCE_PREFIXES.iter().find(|p| {
            value
                .get(..p.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(p))
        })?;
        self.get(&value[prefix.len()..])
            .ok()
            .and_then(Value::to_scalar_string)
    }

    /// Manifest-declared environment variables (the `env` object).
    ///
    /// Reference values are resolved against the manifest; unresolved
    /// references are kept verbatim.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let Ok(env) = self.object("env") else {
            return Vec::new();
        };

        env.iter()
            .filter_map(|(key, value)| {
                let rendered = value.to_scalar_string()?;
                let resolved = self.resolve_reference(&rendered).unwrap_or(rendered);
                Some((key.clone(), resolved))
            })
            .collect()
    }

    /// Environment variables as `KEY=VALUE` strings
    pub fn env_var_list(&self) -> Vec<String> {
        self.env_vars()
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }
}

fn wrong_type(path: &str, expected: &'static str, found: &Value) -> LookupError {
    LookupError::WrongType {
        key: path.to_string(),
        expected,
        found: found.type_name(),
    }
}

/// Map `Absent` to `Ok(None)`, keep every other outcome
fn optional<T>(result: Result<T, LookupError>) -> Result<Option<T>, LookupError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(LookupError::Absent(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> Config {
        Config::from_json_str(json).unwrap()
    }

    #[test]
    fn test_get_nested_path() {
        let cfg = config(r#"{ "a": { "b": { "c": 7 } } }"#);
        assert_eq!(cfg.number("a.b.c").unwrap(), 7.0);
    }

    #[test]
    fn test_literal_dotted_key_wins() {
        let cfg = config(r#"{ "build.name": "flat", "build": { "name": "nested" } }"#);
        assert_eq!(cfg.string("build.name").unwrap(), "flat");
    }

    #[test]
    fn test_malformed_path() {
        let cfg = config(r#"{ "a": 1 }"#);
        assert_eq!(
            cfg.get("a..b"),
            Err(LookupError::MalformedPath("a..b".to_string()))
        );
        assert!(matches!(cfg.get(""), Err(LookupError::MalformedPath(_))));
    }

    #[test]
    fn test_walk_through_scalar_is_absent() {
        let cfg = config(r#"{ "a": 1 }"#);
        assert_eq!(cfg.get("a.b"), Err(LookupError::Absent("a.b".to_string())));
    }

    #[test]
    fn test_optional_absent_is_none() {
        let cfg = config("{}");
        assert_eq!(cfg.opt_bool("wasm").unwrap(), None);
    }

    #[test]
    fn test_optional_wrong_type_is_error() {
        let cfg = config(r#"{ "wasm": "yes" }"#);
        assert_eq!(
            cfg.opt_bool("wasm"),
            Err(LookupError::WrongType {
                key: "wasm".to_string(),
                expected: "a boolean",
                found: "a string",
            })
        );
    }

    #[test]
    fn test_strings_rejects_mixed_array() {
        let cfg = config(r#"{ "tags": ["a", 1] }"#);
        assert!(matches!(
            cfg.strings("tags"),
            Err(LookupError::WrongType { .. })
        ));
    }

    #[test]
    fn test_top_level_must_be_object() {
        assert!(Config::from_json_str("[1, 2]").is_err());
    }

    #[test]
    fn test_resolve_reference() {
        let cfg = config(r#"{ "name": "demo", "version": "1.2.3" }"#);
        assert_eq!(cfg.resolve_reference("manifest.version").unwrap(), "1.2.3");
        assert_eq!(cfg.resolve_reference("package.name").unwrap(), "demo");
        assert_eq!(cfg.resolve_reference("manifest.missing"), None);
        assert_eq!(cfg.resolve_reference("plain"), None);
    }
}
