//! Config-definition (properties) files
//!
//! Parses YAML documents of the shape
//!
//! ```yaml
//! models:
//!   - name: customers
//!     config: { materialized: table, tags: [nightly] }
//!     columns:
//!       - name: customer_id
//!         tests: [unique, not_null]
//! tests:
//!   - { model: orders, column: status, test: not_null }
//! ```
//!
//! Every declaration is handled on its own: one malformed entry never
//! prevents the others from applying.

use crate::catalog::Catalog;
use crate::entity::{ConfigSource, Entity, EntityConfig};
use dagwalk_core::{Diagnostic, DiagnosticCode, Location};
use dagwalk_jinja::{parse_expression, ConstValue, Expr, MacroKind, RefTarget, TemplateContext, CONFIG_DIMENSIONS, MATERIALIZED};
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;

/// Apply one config-definition file to the catalog.
///
/// Known models get their declared selectors unioned in; declared tests
/// become test entities. Unknown models and malformed entries are recorded
/// as info diagnostics and skipped.
pub(crate) fn merge(catalog: &mut Catalog, path: &Path, contents: &str) {
    let location = Location::from_path(path);

    if is_blank(contents) {
        return;
    }

    let document: Value = match serde_yaml::from_str(contents) {
        Ok(document) => document,
        Err(e) => {
            catalog.record(unrecognized(&location, format!("not a valid config document: {}", e)));
            return;
        }
    };

    match &document {
        Value::Null => return,
        Value::Mapping(_) => {}
        _ => {
            catalog.record(unrecognized(&location, "top-level document is not a mapping"));
            return;
        }
    }

    for item in section(catalog, &document, "models", &location) {
        match serde_yaml::from_value::<ModelDeclaration>(item.clone()) {
            Ok(declaration) => merge_model(catalog, &declaration, path, &location),
            Err(e) => catalog.record(unrecognized(&location, format!("model declaration: {}", e))),
        }
    }

    for item in section(catalog, &document, "tests", &location) {
        match serde_yaml::from_value::<TestDeclaration>(item.clone()) {
            Ok(declaration) => merge_test(catalog, &declaration, path, &location),
            Err(e) => catalog.record(unrecognized(&location, format!("test declaration: {}", e))),
        }
    }
}

fn merge_model(catalog: &mut Catalog, declaration: &ModelDeclaration, path: &Path, location: &Location) {
    let Some(model) = catalog.model_mut(&declaration.name) else {
        catalog.record(unknown_model(&declaration.name, location));
        return;
    };
    let declared = declaration.selectors();
    model
        .config_mut()
        .merge_selectors(declared.selectors, ConfigSource::PropertiesFile);

    for (dimension, cause) in declared.rejected {
        catalog.record(
            Diagnostic::warn(
                DiagnosticCode::ConfigResolutionFailed,
                format!("Could not parse {} from config in {}: {}", dimension, location.file, cause),
            )
            .with_location(location.clone())
            .with_entity(declaration.name.clone()),
        );
    }

    for column in declaration.columns() {
        for item in column.test_items() {
            register_test(catalog, item, None, Some(&column.name), &declaration.name, path, location);
        }
    }
    for item in declaration.test_items() {
        register_test(catalog, item, None, None, &declaration.name, path, location);
    }
}

fn merge_test(catalog: &mut Catalog, declaration: &TestDeclaration, path: &Path, location: &Location) {
    if catalog.model_mut(&declaration.model).is_none() {
        catalog.record(unknown_model(&declaration.model, location));
        return;
    }
    register_test(
        catalog,
        &declaration.test,
        declaration.name.as_deref(),
        declaration.column.as_deref(),
        &declaration.model,
        path,
        location,
    );
}

fn register_test(
    catalog: &mut Catalog,
    item: &Value,
    name: Option<&str>,
    column: Option<&str>,
    model: &str,
    path: &Path,
    location: &Location,
) {
    let Some(spec) = TestSpec::parse(item) else {
        catalog.record(unrecognized(location, format!("test item for model {}", model)));
        return;
    };
    let name = name.map(str::to_string).unwrap_or_else(|| spec.entity_name(column, model));

    let mut config = EntityConfig::new();
    config.add_upstream(model);

    if spec.kind == RELATIONSHIPS {
        if let Some(target) = spec.relationship_target() {
            match referenced_model(target, catalog.context()) {
                Some(upstream) => config.add_upstream(upstream),
                None => catalog.record(
                    Diagnostic::info(
                        DiagnosticCode::ReferenceResolutionFailed,
                        format!("Could not resolve `to: {}` of test {} in {}", target, name, location.file),
                    )
                    .with_location(location.clone())
                    .with_entity(name.clone()),
                ),
            }
        }
    }

    catalog.insert_test(Entity::test(name, path, config));
}

/// Items of a top-level list; a missing or null section is empty
fn section(catalog: &mut Catalog, document: &Value, key: &str, location: &Location) -> Vec<Value> {
    match document.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => items.clone(),
        Some(_) => {
            catalog.record(unrecognized(location, format!("`{}` is not a list", key)));
            Vec::new()
        }
    }
}

fn is_blank(contents: &str) -> bool {
    contents
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#') || line == "---")
}

fn unrecognized(location: &Location, cause: impl std::fmt::Display) -> Diagnostic {
    Diagnostic::info(
        DiagnosticCode::UnrecognizedDeclaration,
        format!("Skipping declaration in {}: {}", location.file, cause),
    )
    .with_location(location.clone())
}

fn unknown_model(name: &str, location: &Location) -> Diagnostic {
    Diagnostic::info(
        DiagnosticCode::UnknownModel,
        format!("Skipping declaration for unknown model {} in {}", name, location.file),
    )
    .with_location(location.clone())
    .with_entity(name)
}

/// Test kind whose `to:` argument names a second upstream model
const RELATIONSHIPS: &str = "relationships";

/// A model declaration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDeclaration {
    pub name: String,

    #[serde(default)]
    pub config: Option<Value>,

    #[serde(default)]
    pub columns: Option<Vec<ColumnDeclaration>>,

    #[serde(default)]
    pub tests: Option<Vec<Value>>,

    #[serde(default)]
    pub data_tests: Option<Vec<Value>>,
}

impl ModelDeclaration {
    /// Model-level test items (`tests` and `data_tests` together)
    pub fn test_items(&self) -> impl Iterator<Item = &Value> {
        self.tests.iter().chain(self.data_tests.iter()).flatten()
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnDeclaration> {
        self.columns.iter().flatten()
    }

    /// `<dimension>:<value>` selectors declared under `config:`
    pub fn selectors(&self) -> DeclaredSelectors {
        let mut declared = DeclaredSelectors::default();
        let Some(config) = &self.config else {
            return declared;
        };

        for dimension in CONFIG_DIMENSIONS {
            let Some(value) = config.get(*dimension) else {
                continue;
            };
            if *dimension == MATERIALIZED {
                // One materialization per model; only a scalar is valid.
                match scalar_string(value) {
                    Some(v) => declared.selectors.push(format!("{}:{}", dimension, v)),
                    None => declared.rejected.push((MATERIALIZED, "expected a single value")),
                }
                continue;
            }
            declared
                .selectors
                .extend(scalar_values(value).into_iter().map(|v| format!("{}:{}", dimension, v)));
        }
        declared
    }
}

/// Selectors from a model's `config:` block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclaredSelectors {
    pub selectors: Vec<String>,
    /// Dimensions whose value was dropped, with the cause
    pub rejected: Vec<(&'static str, &'static str)>,
}

/// A column declaration
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDeclaration {
    pub name: String,

    #[serde(default)]
    pub tests: Option<Vec<Value>>,

    #[serde(default)]
    pub data_tests: Option<Vec<Value>>,
}

impl ColumnDeclaration {
    pub fn test_items(&self) -> impl Iterator<Item = &Value> {
        self.tests.iter().chain(self.data_tests.iter()).flatten()
    }
}

/// A top-level test declaration
#[derive(Debug, Clone, Deserialize)]
pub struct TestDeclaration {
    pub model: String,

    #[serde(default)]
    pub column: Option<String>,

    pub test: Value,

    /// Explicit entity name; derived from kind, column and model otherwise
    #[serde(default)]
    pub name: Option<String>,
}

/// A test item: the kind plus its arguments, if any
#[derive(Debug, Clone, PartialEq)]
pub struct TestSpec<'a> {
    pub kind: String,
    pub args: Option<&'a Value>,
}

impl<'a> TestSpec<'a> {
    /// `not_null` or `{accepted_values: {...}}`
    pub fn parse(item: &'a Value) -> Option<Self> {
        match item {
            Value::String(kind) => Some(Self { kind: kind.clone(), args: None }),
            Value::Mapping(mapping) if mapping.len() == 1 => {
                let (key, args) = mapping.iter().next()?;
                Some(Self { kind: key.as_str()?.to_string(), args: Some(args) })
            }
            _ => None,
        }
    }

    /// Entity name: `<kind>_<column>_<model>` or `<kind>_<model>`
    pub fn entity_name(&self, column: Option<&str>, model: &str) -> String {
        match column {
            Some(column) => format!("{}_{}_{}", self.kind, column, model),
            None => format!("{}_{}", self.kind, model),
        }
    }

    /// Template expression in a `to:` argument (relationship tests)
    pub fn relationship_target(&self) -> Option<&'a str> {
        self.args?.get("to")?.as_str()
    }
}

/// Model name referenced by a `ref('x')` expression string
pub fn referenced_model(expression: &str, context: &TemplateContext) -> Option<String> {
    let Ok(Expr::Call(call)) = parse_expression(expression) else {
        return None;
    };
    if MacroKind::of(&call) != Some(MacroKind::Ref) {
        return None;
    }
    match dagwalk_jinja::functions::ref_function(&call, context).ok()? {
        RefTarget::Local(name) => Some(name),
        RefTarget::CrossProject { .. } => None,
    }
}

/// Scalars of a YAML value as strings; sequences contribute each scalar item
pub fn scalar_values(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_string).collect(),
        other => scalar_string(other).into_iter().collect(),
    }
}

/// Scalars print the same way as folded template values
fn scalar_string(value: &Value) -> Option<String> {
    let constant = match value {
        Value::String(s) => return Some(s.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ConstValue::Int(i),
            None => ConstValue::Float(n.as_f64()?),
        },
        Value::Bool(b) => ConstValue::Bool(*b),
        _ => return None,
    };
    Some(constant.to_string())
}
