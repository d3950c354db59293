//! The entity catalog
//!
//! Built by one sequential walk over a project directory. Seeds, models and
//! tests live in three independent name→entity maps; diagnostics recorded
//! during the walk are kept alongside them.

use crate::classifier::{self, ScanError};
use crate::config_file;
use crate::entity::{ConfigSource, Entity, EntityConfig, EntityKind};
use dagwalk_core::{Diagnostic, DiagnosticCode, Location, ScanReport, ScanSettings};
use dagwalk_jinja::{MacroExtractor, TemplateContext, TemplateContextBuilder, Variables};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Every seed, model and test found in one project
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    project_name: String,
    root_path: PathBuf,

    #[serde(skip)]
    settings: ScanSettings,

    #[serde(skip)]
    context: TemplateContext,

    seeds: BTreeMap<String, Entity>,
    models: BTreeMap<String, Entity>,
    tests: BTreeMap<String, Entity>,

    diagnostics: Vec<Diagnostic>,
}

impl Catalog {
    /// Empty catalog with default settings
    pub fn new(project_name: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        let settings = ScanSettings {
            project_name: project_name.into(),
            ..ScanSettings::default()
        };
        Self::from_settings(settings, root_path)
    }

    /// Empty catalog configured from loaded settings
    pub fn from_settings(mut settings: ScanSettings, root_path: impl Into<PathBuf>) -> Self {
        let root_path = root_path.into();
        settings.project_root = root_path.clone();

        let context = TemplateContextBuilder::new()
            .project_name(settings.project_name.clone())
            .vars(settings.vars.clone())
            .build();

        Self {
            project_name: settings.project_name.clone(),
            root_path,
            settings,
            context,
            seeds: BTreeMap::new(),
            models: BTreeMap::new(),
            tests: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn builder(project_name: impl Into<String>, root_path: impl Into<PathBuf>) -> CatalogBuilder {
        CatalogBuilder::new(project_name, root_path)
    }

    /// Walk the project root and rebuild the catalog in place.
    ///
    /// Seeds are registered first, then query files, then config files, so
    /// every config merge sees the models it targets. Only an unreadable
    /// root is an error; everything else becomes a diagnostic.
    pub fn scan(&mut self) -> Result<(), ScanError> {
        self.seeds.clear();
        self.models.clear();
        self.tests.clear();
        self.diagnostics.clear();

        let files = classifier::discover(&self.root_path, &self.settings)?;

        for diagnostic in files.diagnostics {
            self.record(diagnostic);
        }
        for path in &files.seeds {
            self.handle_seed_file(path);
        }
        for path in &files.queries {
            self.handle_query_file(path);
        }
        for path in &files.configs {
            self.handle_config_file(path);
        }

        tracing::info!(
            project = %self.project_name,
            seeds = self.seeds.len(),
            models = self.models.len(),
            tests = self.tests.len(),
            diagnostics = self.diagnostics.len(),
            "scan complete"
        );

        Ok(())
    }

    /// Register a seed named after the file's base name
    pub fn handle_seed_file(&mut self, path: &Path) {
        let Some(name) = entity_name(path) else {
            return;
        };
        tracing::debug!(seed = %name, path = %path.display(), "registering seed");
        self.seeds.insert(name.clone(), Entity::seed(name, path));
    }

    /// Register a model from a query file, with inline config resolved
    pub fn handle_query_file(&mut self, path: &Path) {
        let Some(name) = entity_name(path) else {
            return;
        };
        let Some(contents) = self.read_file(path) else {
            return;
        };

        let is_snapshot = self.settings.is_snapshot_path(path);
        let extraction = MacroExtractor::new(&self.context).extract(&contents, path, is_snapshot);

        let mut config = EntityConfig::for_model(&self.settings.default_materialization);
        config.merge_selectors(self.settings.default_selectors.iter().cloned(), ConfigSource::ProjectDefault);
        if let Some(materialized) = &extraction.materialized {
            config.set_materialization(materialized, ConfigSource::Inline);
        }
        config.merge_selectors(extraction.selectors, ConfigSource::Inline);
        for upstream in extraction.upstream_names {
            if upstream != name {
                config.add_upstream(upstream);
            }
        }

        for diagnostic in extraction.diagnostics {
            self.record(diagnostic.with_entity(name.clone()));
        }

        tracing::debug!(model = %name, path = %path.display(), snapshot = is_snapshot, "registering model");
        let model = Entity::model(name.clone(), path, config)
            .with_snapshot(is_snapshot)
            .with_sources(extraction.sources);
        self.models.insert(name, model);
    }

    /// Merge a config-definition file into the existing models and add its tests
    pub fn handle_config_file(&mut self, path: &Path) {
        let Some(contents) = self.read_file(path) else {
            return;
        };
        config_file::merge(self, path, &contents);
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// External variable bindings used for constant folding
    pub fn variables(&self) -> &Variables {
        &self.context.vars
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn seeds(&self) -> &BTreeMap<String, Entity> {
        &self.seeds
    }

    pub fn models(&self) -> &BTreeMap<String, Entity> {
        &self.models
    }

    pub fn tests(&self) -> &BTreeMap<String, Entity> {
        &self.tests
    }

    pub fn get(&self, kind: EntityKind, name: &str) -> Option<&Entity> {
        match kind {
            EntityKind::Seed => self.seeds.get(name),
            EntityKind::Model => self.models.get(name),
            EntityKind::Test => self.tests.get(name),
        }
    }

    /// Look a name up in every namespace (seeds, then models, then tests)
    pub fn find(&self, name: &str) -> Vec<&Entity> {
        [EntityKind::Seed, EntityKind::Model, EntityKind::Test]
            .into_iter()
            .filter_map(|kind| self.get(kind, name))
            .collect()
    }

    /// Total number of entities
    pub fn len(&self) -> usize {
        self.seeds.len() + self.models.len() + self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Models and tests carrying `selector`, models first
    pub fn entities_with_selector(&self, selector: &str) -> Vec<&Entity> {
        self.models
            .values()
            .chain(self.tests.values())
            .filter(|entity| entity.config().has_selector(selector))
            .collect()
    }

    /// Diagnostics from the last scan, in the order they were recorded
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Summary of the last scan
    pub fn report(&self) -> ScanReport {
        ScanReport::new(
            self.project_name.clone(),
            (self.seeds.len(), self.models.len(), self.tests.len()),
            self.diagnostics.clone(),
        )
    }

    pub(crate) fn context(&self) -> &TemplateContext {
        &self.context
    }

    pub(crate) fn model_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.models.get_mut(name)
    }

    pub(crate) fn insert_test(&mut self, test: Entity) {
        tracing::debug!(test = %test.name(), "registering test");
        self.tests.insert(test.name().to_string(), test);
    }

    /// Log a diagnostic and keep it
    pub(crate) fn record(&mut self, diagnostic: Diagnostic) {
        diagnostic.emit();
        self.diagnostics.push(diagnostic);
    }

    /// File contents; invalid UTF-8 is replaced rather than skipping the file
    fn read_file(&mut self, path: &Path) -> Option<String> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.record(
                    Diagnostic::info(
                        DiagnosticCode::UnreadableFile,
                        format!("Skipping {}: {}", path.display(), e),
                    )
                    .with_location(Location::from_path(path)),
                );
                return None;
            }
        };

        match String::from_utf8(bytes) {
            Ok(contents) => Some(contents),
            Err(e) => {
                self.record(
                    Diagnostic::info(
                        DiagnosticCode::UnreadableFile,
                        format!("{} is not valid UTF-8, invalid bytes replaced", path.display()),
                    )
                    .with_location(Location::from_path(path)),
                );
                Some(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }
}

fn entity_name(path: &Path) -> Option<String> {
    path.file_stem()?.to_str().map(str::to_string)
}

/// Builder for Catalog
pub struct CatalogBuilder {
    settings: ScanSettings,
    root_path: PathBuf,
}

impl CatalogBuilder {
    pub fn new(project_name: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Self {
            settings: ScanSettings {
                project_name: project_name.into(),
                ..ScanSettings::default()
            },
            root_path: root_path.into(),
        }
    }

    /// Start from loaded settings; the project name is kept if already set
    pub fn settings(mut self, settings: ScanSettings) -> Self {
        let project_name = std::mem::take(&mut self.settings.project_name);
        self.settings = settings;
        if self.settings.project_name.is_empty() {
            self.settings.project_name = project_name;
        }
        self
    }

    pub fn var(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.vars.insert(key.into(), value);
        self
    }

    pub fn vars(mut self, vars: Variables) -> Self {
        self.settings.vars.extend(vars);
        self
    }

    pub fn default_materialization(mut self, materialization: impl Into<String>) -> Self {
        self.settings.default_materialization = materialization.into();
        self
    }

    /// Extra selector applied to every model before any per-file config
    pub fn default_selector(mut self, selector: impl Into<String>) -> Self {
        self.settings.default_selectors.push(selector.into());
        self
    }

    pub fn build(self) -> Catalog {
        Catalog::from_settings(self.settings, self.root_path)
    }
}
