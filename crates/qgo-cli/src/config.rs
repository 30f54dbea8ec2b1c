//! CLI configuration via environment variables
//!
//! Project settings live in `manifest.json`; these variables only tune how
//! the CLI itself behaves.

use qgo_config::MANIFEST_FILE;
use std::env;
use std::path::{Path, PathBuf};

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Manifest location override (QGO_MANIFEST=/path/to/manifest.json)
    pub manifest: Option<PathBuf>,
    /// Log filter directive (QGO_LOG=debug)
    pub log: Option<String>,
    /// Disable colored output (QGO_NO_COLOR=1 or NO_COLOR=1)
    pub no_color: bool,
    /// Treat stderr output as stage failure (QGO_FAIL_ON_STDERR, unset = manifest/default)
    pub fail_on_stderr: Option<bool>,
}

impl Settings {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            manifest: env::var("QGO_MANIFEST").ok().map(PathBuf::from),
            log: env::var("QGO_LOG").ok().filter(|v| !v.trim().is_empty()),
            no_color: env::var("QGO_NO_COLOR").is_ok() || env::var("NO_COLOR").is_ok(),
            fail_on_stderr: env::var("QGO_FAIL_ON_STDERR")
                .ok()
                .and_then(|v| parse_flag(&v)),
        }
    }

    /// Manifest path for a project rooted at `dir`
    pub fn manifest_path(&self, dir: &Path) -> PathBuf {
        match &self.manifest {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => dir.join(path),
            None => dir.join(MANIFEST_FILE),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear() {
        for key in ["QGO_MANIFEST", "QGO_LOG", "QGO_NO_COLOR", "NO_COLOR", "QGO_FAIL_ON_STDERR"] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_settings_defaults() {
        clear();
        let settings = Settings::from_env();
        assert!(settings.manifest.is_none());
        assert!(settings.log.is_none());
        assert!(!settings.no_color);
        assert!(settings.fail_on_stderr.is_none());
        assert_eq!(
            settings.manifest_path(Path::new("/work")),
            PathBuf::from("/work").join(MANIFEST_FILE)
        );
    }

    #[test]
    #[serial]
    fn test_settings_manifest_override() {
        clear();
        env::set_var("QGO_MANIFEST", "config/qgo.json");
        let settings = Settings::from_env();
        assert_eq!(
            settings.manifest_path(Path::new("/work")),
            PathBuf::from("/work/config/qgo.json")
        );
        clear();
    }

    #[test]
    #[serial]
    fn test_settings_no_color() {
        clear();
        env::set_var("NO_COLOR", "1");
        assert!(Settings::from_env().no_color);
        clear();

        env::set_var("QGO_NO_COLOR", "1");
        assert!(Settings::from_env().no_color);
        clear();
    }

    #[test]
    #[serial]
    fn test_settings_fail_on_stderr() {
        clear();
        env::set_var("QGO_FAIL_ON_STDERR", "off");
        assert_eq!(Settings::from_env().fail_on_stderr, Some(false));

        env::set_var("QGO_FAIL_ON_STDERR", "TRUE");
        assert_eq!(Settings::from_env().fail_on_stderr, Some(true));

        env::set_var("QGO_FAIL_ON_STDERR", "maybe");
        assert_eq!(Settings::from_env().fail_on_stderr, None);
        clear();
    }

    #[test]
    #[serial]
    fn test_settings_blank_log_ignored() {
        clear();
        env::set_var("QGO_LOG", "  ");
        assert!(Settings::from_env().log.is_none());
        clear();
    }
}
