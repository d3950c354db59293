//! Catalog entities and their resolved configuration

use dagwalk_jinja::{SourceRef, MATERIALIZED};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Kind of catalog entity; each kind has its own namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Seed,
    Model,
    Test,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seed => write!(f, "seed"),
            Self::Model => write!(f, "model"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Where a piece of configuration came from, lowest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Scan-wide defaults
    ProjectDefault,
    /// A config-definition file
    PropertiesFile,
    /// A `config(...)` call inside the query file
    Inline,
}

/// Build a `<dimension>:<value>` selector
pub fn selector(dimension: &str, value: impl std::fmt::Display) -> String {
    format!("{}:{}", dimension, value)
}

/// Resolved configuration of one entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityConfig {
    selectors: BTreeSet<String>,
    upstream_names: BTreeSet<String>,
    #[serde(skip)]
    materialization_source: Option<ConfigSource>,
}

impl EntityConfig {
    /// Empty configuration (seeds and tests)
    pub fn new() -> Self {
        Self::default()
    }

    /// Model configuration carrying the default materialization
    pub fn for_model(default_materialization: &str) -> Self {
        let mut config = Self::default();
        config.set_materialization(default_materialization, ConfigSource::ProjectDefault);
        config
    }

    /// All `<dimension>:<value>` selectors
    pub fn selectors(&self) -> &BTreeSet<String> {
        &self.selectors
    }

    /// Entities that must complete before this one
    pub fn upstream_names(&self) -> &BTreeSet<String> {
        &self.upstream_names
    }

    pub fn has_selector(&self, selector: &str) -> bool {
        self.selectors.contains(selector)
    }

    /// Value of the `materialized:*` selector
    pub fn materialization(&self) -> Option<&str> {
        self.selectors
            .iter()
            .find_map(|s| s.strip_prefix(MATERIALIZED)?.strip_prefix(':'))
    }

    /// Which source set the current materialization
    pub fn materialization_source(&self) -> Option<ConfigSource> {
        self.materialization_source
    }

    /// Replace the materialization unless a higher-precedence source set it.
    ///
    /// Returns whether the value was applied. There is never more than one
    /// `materialized:*` selector.
    pub fn set_materialization(&mut self, value: &str, source: ConfigSource) -> bool {
        if self.materialization_source.is_some_and(|current| current > source) {
            return false;
        }

        let prefix = selector(MATERIALIZED, "");
        self.selectors.retain(|s| !s.starts_with(&prefix));
        self.selectors.insert(selector(MATERIALIZED, value));
        self.materialization_source = Some(source);
        true
    }

    /// Union selectors into this config.
    ///
    /// `materialized:*` selectors go through [`Self::set_materialization`];
    /// everything else is added, never replaced.
    pub fn merge_selectors<I, S>(&mut self, selectors: I, source: ConfigSource)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for s in selectors {
            let s = s.into();
            match s.split_once(':') {
                Some((dimension, value)) if dimension == MATERIALIZED => {
                    self.set_materialization(value, source);
                }
                _ => {
                    self.selectors.insert(s);
                }
            }
        }
    }

    pub fn add_upstream(&mut self, name: impl Into<String>) {
        self.upstream_names.insert(name.into());
    }
}

/// A named unit in the catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    name: String,
    kind: EntityKind,
    source_path: PathBuf,
    config: EntityConfig,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    snapshot: bool,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    sources: BTreeSet<SourceRef>,
}

impl Entity {
    fn new(name: impl Into<String>, kind: EntityKind, source_path: impl Into<PathBuf>, config: EntityConfig) -> Self {
        Self {
            name: name.into(),
            kind,
            source_path: source_path.into(),
            config,
            snapshot: false,
            sources: BTreeSet::new(),
        }
    }

    /// A seed; seeds carry an empty config
    pub fn seed(name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self::new(name, EntityKind::Seed, source_path, EntityConfig::new())
    }

    pub fn model(name: impl Into<String>, source_path: impl Into<PathBuf>, config: EntityConfig) -> Self {
        Self::new(name, EntityKind::Model, source_path, config)
    }

    pub fn test(name: impl Into<String>, source_path: impl Into<PathBuf>, config: EntityConfig) -> Self {
        Self::new(name, EntityKind::Test, source_path, config)
    }

    /// Mark a model as a snapshot
    pub fn with_snapshot(mut self, snapshot: bool) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Record the external inputs a model reads from
    pub fn with_sources(mut self, sources: BTreeSet<SourceRef>) -> Self {
        self.sources = sources;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    /// Configuration may be merged into after creation; name and kind may not change.
    pub fn config_mut(&mut self) -> &mut EntityConfig {
        &mut self.config
    }

    pub fn is_snapshot(&self) -> bool {
        self.snapshot
    }

    /// External inputs named by `source()` calls
    pub fn sources(&self) -> &BTreeSet<SourceRef> {
        &self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn model_config_defaults_to_view() {
        let config = EntityConfig::for_model("view");
        assert_eq!(config.selectors(), &set(&["materialized:view"]));
        assert_eq!(config.materialization(), Some("view"));
        assert_eq!(config.materialization_source(), Some(ConfigSource::ProjectDefault));
    }

    #[test]
    fn materialization_is_replaced_not_duplicated() {
        let mut config = EntityConfig::for_model("view");
        assert!(config.set_materialization("table", ConfigSource::PropertiesFile));
        assert_eq!(config.selectors(), &set(&["materialized:table"]));
    }

    #[test]
    fn lower_precedence_cannot_override() {
        let mut config = EntityConfig::for_model("view");
        config.set_materialization("incremental", ConfigSource::Inline);

        assert!(!config.set_materialization("table", ConfigSource::PropertiesFile));
        assert_eq!(config.materialization(), Some("incremental"));

        assert!(config.set_materialization("ephemeral", ConfigSource::Inline));
        assert_eq!(config.materialization(), Some("ephemeral"));
    }

    #[test]
    fn merge_unions_tags() {
        let mut config = EntityConfig::for_model("view");
        config.merge_selectors(["tags:a"], ConfigSource::Inline);
        config.merge_selectors(["tags:a", "tags:b", "schema:marts"], ConfigSource::PropertiesFile);

        assert_eq!(
            config.selectors(),
            &set(&["materialized:view", "schema:marts", "tags:a", "tags:b"])
        );
    }

    #[test]
    fn merge_routes_materialization() {
        let mut config = EntityConfig::for_model("view");
        config.merge_selectors(["materialized:table", "tags:x"], ConfigSource::PropertiesFile);

        assert_eq!(config.selectors(), &set(&["materialized:table", "tags:x"]));
        assert_eq!(config.materialization_source(), Some(ConfigSource::PropertiesFile));
    }

    #[test]
    fn seed_has_empty_config() {
        let seed = Entity::seed("raw_customers", "seeds/raw_customers.csv");
        assert_eq!(seed.kind(), EntityKind::Seed);
        assert!(seed.config().selectors().is_empty());
        assert!(seed.config().upstream_names().is_empty());
        assert!(!seed.is_snapshot());
    }

    #[test]
    fn entity_serialization() {
        let mut config = EntityConfig::for_model("view");
        config.add_upstream("stg_orders");
        let model = Entity::model("orders", "models/orders.sql", config);

        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["kind"], "MODEL");
        assert_eq!(json["config"]["selectors"][0], "materialized:view");
        assert_eq!(json["config"]["upstream_names"][0], "stg_orders");
        assert!(json.get("snapshot").is_none());
        assert!(json.get("sources").is_none());
    }
}
