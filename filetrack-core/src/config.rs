//! Tracker configuration loaded from TOML

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default name of the per-directory ignore file
pub const DEFAULT_RULE_FILE: &str = ".trackignore";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("Failed to parse config {path:?}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

/// How replaced blocks of text are reported in a diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffView {
    /// Replaced lines become a deleted span followed by an inserted span
    #[default]
    Inline,
    /// Replaced lines are paired into modified entries where possible
    SideBySide,
}

/// Which storage backend file I/O goes through
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Local,
}

/// Configuration for the tracking engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Root directory; rule files are discovered below it
    pub root: PathBuf,
    /// Where backups and the tracking database live (defaults to `<root>/.filetrack`)
    pub data_dir: Option<PathBuf>,
    pub rule_file_name: String,
    pub debounce_ms: u64,
    pub rule_reload_debounce_ms: u64,
    /// Allowlist applied to files discovered under tracked directories
    pub include_patterns: Vec<String>,
    pub case_insensitive: bool,
    pub diff_view: DiffView,
    pub storage: StorageBackend,
    pub retry: RetryPolicy,
    pub shutdown_timeout_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            data_dir: None,
            rule_file_name: DEFAULT_RULE_FILE.to_string(),
            debounce_ms: 500,
            rule_reload_debounce_ms: 100,
            include_patterns: Vec::new(),
            case_insensitive: cfg!(any(windows, target_os = "macos")),
            diff_view: DiffView::Inline,
            storage: StorageBackend::Local,
            retry: RetryPolicy::default(),
            shutdown_timeout_ms: 5000,
        }
    }
}

impl TrackerConfig {
    /// Config rooted at `root` with everything else defaulted
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), ..Self::default() }
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| self.root.join(".filetrack"))
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir().join("backups")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("tracking.json")
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn rule_reload_delay(&self) -> Duration {
        Duration::from_millis(self.rule_reload_debounce_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = TrackerConfig::default();
        assert_eq!(config.rule_file_name, ".trackignore");
        assert_eq!(config.debounce_ms, 500);
        assert!(config.include_patterns.is_empty());
        assert_eq!(config.data_dir(), PathBuf::from("./.filetrack"));
    }

    #[test]
    fn test_config_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("filetrack.toml");
        std::fs::write(
            &path,
            r#"
root = "/srv/docs"
debounce_ms = 250
include_patterns = ["*.md"]
diff_view = "side_by_side"

[retry]
max_attempts = 5
"#,
        )
        .unwrap();

        let config = TrackerConfig::from_file(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/docs"));
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.include_patterns, vec!["*.md".to_string()]);
        assert_eq!(config.diff_view, DiffView::SideBySide);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 50);
        assert_eq!(config.backup_dir(), PathBuf::from("/srv/docs/.filetrack/backups"));
    }

    #[test]
    fn test_config_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "debounce_ms = \"soon\"").unwrap();
        assert!(matches!(TrackerConfig::from_file(&path), Err(ConfigError::Parse { .. })));
    }
}
