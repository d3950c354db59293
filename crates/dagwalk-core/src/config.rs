//! Configuration schema (dagwalk.toml)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Settings that shape a single catalog scan.
///
/// Every field has a default, so an empty `dagwalk.toml` is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Project identifier; also used to accept `ref('<project>', 'model')`
    pub project_name: String,

    /// Externally supplied variables for `var(...)` substitution
    pub vars: BTreeMap<String, serde_json::Value>,

    /// Materialization applied to every model before per-file config
    pub default_materialization: String,

    /// Extra selectors applied to every model (e.g. `tags:daily`)
    pub default_selectors: Vec<String>,

    /// Extensions of templated query definitions
    pub query_extensions: Vec<String>,

    /// Extensions of flat seed data files
    pub seed_extensions: Vec<String>,

    /// Extensions of declarative config/test definitions
    pub config_extensions: Vec<String>,

    /// Directory names whose query files are snapshots
    pub snapshot_dirs: Vec<String>,

    /// Directory names pruned from the walk (dot-directories always are)
    pub ignore_dirs: Vec<String>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            vars: BTreeMap::new(),
            default_materialization: "view".to_string(),
            default_selectors: Vec::new(),
            query_extensions: vec!["sql".to_string()],
            seed_extensions: vec!["csv".to_string()],
            config_extensions: vec!["yml".to_string(), "yaml".to_string()],
            snapshot_dirs: vec!["snapshots".to_string()],
            ignore_dirs: vec![
                "target".to_string(),
                "dbt_packages".to_string(),
                "logs".to_string(),
            ],
            project_root: PathBuf::new(),
        }
    }
}

impl ScanSettings {
    /// Load settings from a TOML file
    ///
    /// The project root defaults to the directory containing the file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.display().to_string(), e.to_string()))?;

        let mut settings = Self::from_toml(&contents)?;

        if let Some(parent) = path.parent() {
            settings.project_root = parent.to_path_buf();
        }

        Ok(settings)
    }

    /// Load settings from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Does `ext` name a query-definition file?
    pub fn is_query_extension(&self, ext: &str) -> bool {
        Self::matches_extension(&self.query_extensions, ext)
    }

    /// Does `ext` name a seed data file?
    pub fn is_seed_extension(&self, ext: &str) -> bool {
        Self::matches_extension(&self.seed_extensions, ext)
    }

    /// Does `ext` name a config-definition file?
    pub fn is_config_extension(&self, ext: &str) -> bool {
        Self::matches_extension(&self.config_extensions, ext)
    }

    /// Should a directory with this name be skipped entirely?
    pub fn is_ignored_dir(&self, name: &str) -> bool {
        name.starts_with('.') || self.ignore_dirs.iter().any(|d| d == name)
    }

    /// Is `path` located below one of the snapshot directories?
    pub fn is_snapshot_path(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.project_root).unwrap_or(path);
        relative.components().any(|c| {
            c.as_os_str()
                .to_str()
                .map(|name| self.snapshot_dirs.iter().any(|d| d == name))
                .unwrap_or(false)
        })
    }

    fn matches_extension(list: &[String], ext: &str) -> bool {
        list.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    IoError(String, String),

    #[error("parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_settings() {
        let settings = ScanSettings::default();
        assert_eq!(settings.default_materialization, "view");
        assert!(settings.is_query_extension("sql"));
        assert!(settings.is_query_extension("SQL"));
        assert!(settings.is_seed_extension("csv"));
        assert!(settings.is_config_extension("yaml"));
        assert!(!settings.is_config_extension("json"));
    }

    #[test]
    fn empty_toml_is_default() {
        let settings = ScanSettings::from_toml("").unwrap();
        assert_eq!(settings, ScanSettings::default());
    }

    #[test]
    fn vars_and_overrides_from_toml() {
        let settings = ScanSettings::from_toml(
            r#"
            project_name = "jaffle_shop"
            default_materialization = "table"
            default_selectors = ["tags:daily"]

            [vars]
            country_code = "us"
            lookback_days = 3
            "#,
        )
        .unwrap();

        assert_eq!(settings.project_name, "jaffle_shop");
        assert_eq!(settings.default_materialization, "table");
        assert_eq!(settings.default_selectors, vec!["tags:daily".to_string()]);
        assert_eq!(settings.vars["country_code"], serde_json::json!("us"));
        assert_eq!(settings.vars["lookback_days"], serde_json::json!(3));
    }

    #[test]
    fn from_file_sets_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dagwalk.toml");
        std::fs::write(&path, "project_name = \"demo\"\n").unwrap();

        let settings = ScanSettings::from_file(&path).unwrap();
        assert_eq!(settings.project_name, "demo");
        assert_eq!(settings.project_root, dir.path());
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = ScanSettings::from_toml("project_name = [").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn snapshot_and_ignored_dirs() {
        let mut settings = ScanSettings::default();
        settings.project_root = PathBuf::from("/proj");

        assert!(settings.is_snapshot_path(Path::new("/proj/snapshots/orders.sql")));
        assert!(!settings.is_snapshot_path(Path::new("/proj/models/orders.sql")));
        assert!(settings.is_ignored_dir("target"));
        assert!(settings.is_ignored_dir(".git"));
        assert!(!settings.is_ignored_dir("models"));
    }
}
