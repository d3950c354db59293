//! Macro-call extraction from query templates
//!
//! Walks every template block of a query file, finds `ref()`, `source()` and
//! `config()` calls and turns them into upstream names and selectors. A block
//! or argument that cannot be understood is recorded as a diagnostic and
//! skipped; extraction of the rest of the file carries on.

use crate::ast::{Call, Expr};
use crate::context::TemplateContext;
use crate::fold::{fold, ConstValue};
use crate::functions::{ref_function, source_function, MacroKind, RefTarget, SourceRef};
use crate::lexer::split_template;
use crate::parser::parse_block;
use crate::preprocessor::QueryPreprocessor;
use dagwalk_core::{Diagnostic, DiagnosticCode, Location};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Config dimension holding the materialization strategy
pub const MATERIALIZED: &str = "materialized";

/// Config dimensions turned into `<dimension>:<value>` selectors
pub const CONFIG_DIMENSIONS: &[&str] = &[MATERIALIZED, "schema", "tags"];

/// Everything extracted from one query file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    /// Names from `ref()` calls that resolved to a same-project model
    pub upstream_names: BTreeSet<String>,

    /// External inputs from `source()` calls; never upstream names
    pub sources: BTreeSet<SourceRef>,

    /// Last `config(materialized=...)` value, if any
    pub materialized: Option<String>,

    /// Selectors for every other config dimension
    pub selectors: BTreeSet<String>,

    /// Name declared by a snapshot wrapper
    pub snapshot_name: Option<String>,

    /// Problems found along the way, in file order
    pub diagnostics: Vec<Diagnostic>,
}

/// Extracts macro calls from query templates
pub struct MacroExtractor<'a> {
    context: &'a TemplateContext,
}

impl<'a> MacroExtractor<'a> {
    pub fn new(context: &'a TemplateContext) -> Self {
        Self { context }
    }

    /// Extract calls from the text of one query file
    pub fn extract(&self, source: &str, path: &Path, is_snapshot: bool) -> Extraction {
        let prepared = QueryPreprocessor::preprocess(source, is_snapshot);
        let mut extraction = Extraction {
            snapshot_name: prepared.snapshot_name,
            ..Extraction::default()
        };

        if !prepared.had_jinja {
            return extraction;
        }

        let file = path.display().to_string();
        let split = split_template(&prepared.template);

        for block in &split.blocks {
            let location = Location::with_line(file.clone(), prepared.line_offset + block.line);
            match parse_block(block) {
                Ok(exprs) => {
                    for expr in &exprs {
                        self.visit_expr(expr, &location, &mut extraction);
                    }
                }
                Err(e) => extraction.diagnostics.push(
                    Diagnostic::warn(
                        DiagnosticCode::TemplateSyntaxError,
                        format!("Could not parse template block in {}: {}", file, e),
                    )
                    .with_location(location),
                ),
            }
        }

        if let Some(e) = split.error {
            let location = match e.line() {
                Some(line) => Location::with_line(file.clone(), prepared.line_offset + line),
                None => Location::new(file.clone()),
            };
            extraction.diagnostics.push(
                Diagnostic::warn(
                    DiagnosticCode::TemplateSyntaxError,
                    format!("Could not parse template in {}: {}", file, e),
                )
                .with_location(location),
            );
        }

        extraction
    }

    fn visit_expr(&self, expr: &Expr, location: &Location, extraction: &mut Extraction) {
        expr.walk_calls(&mut |call| self.visit_call(call, location, extraction));
    }

    fn visit_call(&self, call: &Call, location: &Location, extraction: &mut Extraction) {
        match MacroKind::of(call) {
            Some(MacroKind::Ref) => match ref_function(call, self.context) {
                Ok(RefTarget::Local(name)) => {
                    extraction.upstream_names.insert(name);
                }
                Ok(RefTarget::CrossProject { package, name }) => extraction.diagnostics.push(
                    Diagnostic::info(
                        DiagnosticCode::CrossProjectReference,
                        format!(
                            "Skipping reference to {}.{} in {}: only same-project dependencies are tracked",
                            package, name, location.file
                        ),
                    )
                    .with_location(location.clone()),
                ),
                Err(e) => extraction.diagnostics.push(
                    Diagnostic::warn(
                        DiagnosticCode::ReferenceResolutionFailed,
                        format!("Could not resolve ref() in {}: {}", location.file, e),
                    )
                    .with_location(location.clone()),
                ),
            },
            Some(MacroKind::Source) => match source_function(call, self.context) {
                Ok(source) => {
                    extraction.sources.insert(source);
                }
                Err(e) => extraction.diagnostics.push(
                    Diagnostic::info(
                        DiagnosticCode::ReferenceResolutionFailed,
                        format!("Could not resolve source() in {}: {}", location.file, e),
                    )
                    .with_location(location.clone()),
                ),
            },
            Some(MacroKind::Config) => self.visit_config(call, location, extraction),
            // var() only matters as an operand of another call.
            Some(MacroKind::Var) | None => {}
        }
    }

    fn visit_config(&self, call: &Call, location: &Location, extraction: &mut Extraction) {
        for dimension in CONFIG_DIMENSIONS {
            if *dimension == MATERIALIZED {
                if let Some(value) = self.extract_materialized(call, location, &mut extraction.diagnostics) {
                    extraction.materialized = Some(value);
                }
            } else if let Some(selectors) =
                self.extract_config(call, dimension, location, &mut extraction.diagnostics)
            {
                extraction.selectors.extend(selectors);
            }
        }
    }

    /// Selectors for one config dimension of a `config(...)` call.
    ///
    /// Returns `None` when the keyword is absent or its value cannot be
    /// folded; the latter also records a diagnostic naming the dimension,
    /// the file and the cause.
    pub fn extract_config(
        &self,
        call: &Call,
        dimension: &str,
        location: &Location,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<Vec<String>> {
        let value = call.kwarg(dimension)?;

        match fold(value, &self.context.vars) {
            Ok(ConstValue::List(items)) => Some(
                items
                    .iter()
                    .map(|item| format!("{}:{}", dimension, item))
                    .collect(),
            ),
            Ok(scalar) => Some(vec![format!("{}:{}", dimension, scalar)]),
            Err(e) => {
                diagnostics.push(config_failure(dimension, location, e));
                None
            }
        }
    }

    /// The materialization must be a single value.
    fn extract_materialized(
        &self,
        call: &Call,
        location: &Location,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<String> {
        let value = call.kwarg(MATERIALIZED)?;

        match fold(value, &self.context.vars) {
            Ok(ConstValue::List(_)) => {
                diagnostics.push(config_failure(
                    MATERIALIZED,
                    location,
                    "expected a single value, got a list",
                ));
                None
            }
            Ok(scalar) => Some(scalar.to_string()),
            Err(e) => {
                diagnostics.push(config_failure(MATERIALIZED, location, e));
                None
            }
        }
    }
}

fn config_failure(dimension: &str, location: &Location, cause: impl std::fmt::Display) -> Diagnostic {
    Diagnostic::warn(
        DiagnosticCode::ConfigResolutionFailed,
        format!("Could not parse {} from config in {}: {}", dimension, location.file, cause),
    )
    .with_location(location.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TemplateContextBuilder;
    use crate::parser::parse_expression;
    use dagwalk_core::Severity;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context() -> TemplateContext {
        TemplateContextBuilder::new()
            .project_name("jaffle_shop")
            .var("country_code", json!("us"))
            .build()
    }

    fn extract(source: &str) -> Extraction {
        let context = context();
        MacroExtractor::new(&context).extract(source, Path::new("models/customers.sql"), false)
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn config_call(source: &str) -> Call {
        match parse_expression(source).unwrap() {
            Expr::Call(call) => call,
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn refs_become_upstream_names() {
        let extraction = extract(
            "with customers as (select * from {{ ref('stg_customers') }}),\n\
             orders as (select * from {{ ref(\"stg_orders\") }})\n\
             select * from customers join orders using (customer_id)",
        );

        assert_eq!(extraction.upstream_names, set(&["stg_customers", "stg_orders"]));
        assert!(extraction.diagnostics.is_empty());
    }

    #[test]
    fn sources_are_not_upstream_names() {
        let extraction = extract("select * from {{ source('sample_source', 'stg_customers') }}");

        assert!(extraction.upstream_names.is_empty());
        assert_eq!(
            extraction.sources.iter().next(),
            Some(&SourceRef {
                source_name: "sample_source".into(),
                table_name: "stg_customers".into()
            })
        );
    }

    #[test]
    fn variables_fold_inside_refs() {
        let extraction = extract("select * from {{ ref('stg_customers_' ~ var('country_code')) }}");
        assert_eq!(extraction.upstream_names, set(&["stg_customers_us"]));
    }

    #[test]
    fn unresolvable_ref_is_skipped_with_warning() {
        let extraction = extract("{{ ref(var('missing')) }} {{ ref('ok') }}");

        assert_eq!(extraction.upstream_names, set(&["ok"]));
        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].code, DiagnosticCode::ReferenceResolutionFailed);
        assert!(extraction.diagnostics[0].message.contains("variable `missing` is not defined"));
    }

    #[test]
    fn list_valued_ref_is_skipped() {
        let extraction = extract("{{ ref(['a', 'b']) }}");
        assert!(extraction.upstream_names.is_empty());
        assert_eq!(extraction.diagnostics.len(), 1);
    }

    #[test]
    fn cross_project_refs_are_skipped() {
        let extraction = extract("{{ ref('other_pkg', 'orders') }} {{ ref('jaffle_shop', 'payments') }}");

        assert_eq!(extraction.upstream_names, set(&["payments"]));
        assert_eq!(extraction.diagnostics[0].code, DiagnosticCode::CrossProjectReference);
        assert_eq!(extraction.diagnostics[0].severity, Severity::Info);
    }

    #[test]
    fn config_scalars_print_like_the_template_language() {
        let extraction = extract("{{ config(tags=[true, 1.0, 'x' ~ none]) }}");
        assert_eq!(extraction.selectors, set(&["tags:1.0", "tags:True", "tags:xNone"]));
    }

    #[test]
    fn config_selectors() {
        let extraction = extract(
            "{{ config(materialized='table', tags=['nightly', 'finance'], schema='marts') }}\nselect 1",
        );

        assert_eq!(extraction.materialized.as_deref(), Some("table"));
        assert_eq!(
            extraction.selectors,
            set(&["schema:marts", "tags:finance", "tags:nightly"])
        );
    }

    #[test]
    fn later_config_overrides_materialization() {
        let extraction = extract(
            "{{ config(materialized='table') }}\n{{ config(materialized='incremental', tags='x') }}",
        );

        assert_eq!(extraction.materialized.as_deref(), Some("incremental"));
        assert_eq!(extraction.selectors, set(&["tags:x"]));
    }

    #[test]
    fn materialization_list_is_rejected() {
        let extraction = extract("{{ config(materialized=['table', 'view']) }}");

        assert_eq!(extraction.materialized, None);
        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].code, DiagnosticCode::ConfigResolutionFailed);
    }

    #[test]
    fn extract_config_absent_keyword() {
        let context = context();
        let extractor = MacroExtractor::new(&context);
        let mut diagnostics = Vec::new();

        let computed = extractor.extract_config(
            &config_call("config(materialized='table')"),
            "abc",
            &Location::new("models/customers.sql"),
            &mut diagnostics,
        );

        assert_eq!(computed, None);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn extract_config_list() {
        let context = context();
        let extractor = MacroExtractor::new(&context);
        let mut diagnostics = Vec::new();

        let computed = extractor.extract_config(
            &config_call("config(some_conf=[1, 2])"),
            "some_conf",
            &Location::new("models/customers.sql"),
            &mut diagnostics,
        );

        assert_eq!(computed, Some(vec!["some_conf:1".to_string(), "some_conf:2".to_string()]));
    }

    #[test]
    fn extract_config_str() {
        let context = context();
        let extractor = MacroExtractor::new(&context);
        let mut diagnostics = Vec::new();

        let computed = extractor.extract_config(
            &config_call("config(some_conf='abc')"),
            "some_conf",
            &Location::new("models/customers.sql"),
            &mut diagnostics,
        );

        assert_eq!(computed, Some(vec!["some_conf:abc".to_string()]));
    }

    #[test]
    fn extract_config_unfoldable_list_warns() {
        let context = context();
        let extractor = MacroExtractor::new(&context);
        let mut diagnostics = Vec::new();

        let computed = extractor.extract_config(
            &config_call("config(some_conf=[1, some_macro()])"),
            "some_conf",
            &Location::with_line("models/customers.sql", 1),
            &mut diagnostics,
        );

        assert_eq!(computed, None);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warn);
        assert_eq!(
            diagnostics[0].message,
            "Could not parse some_conf from config in models/customers.sql: \
             list element 1 cannot be resolved: call to `some_macro` cannot be resolved to a constant"
        );
    }

    #[test]
    fn config_failure_does_not_stop_other_dimensions() {
        let extraction = extract(
            "{{ config(tags=['a', unknown_name], materialized='table') }}\nselect * from {{ ref('x') }}",
        );

        assert_eq!(extraction.materialized.as_deref(), Some("table"));
        assert!(extraction.selectors.is_empty());
        assert_eq!(extraction.upstream_names, set(&["x"]));
        assert_eq!(extraction.diagnostics.len(), 1);
        assert!(extraction.diagnostics[0].message.starts_with("Could not parse tags from config in models/customers.sql"));
    }

    #[test]
    fn syntax_error_in_one_block_keeps_the_rest() {
        let extraction = extract("{{ ref('a' }}\n{{ ref('b') }}\n{% if ref('c') %}{% endif %}");

        assert_eq!(extraction.upstream_names, set(&["b", "c"]));
        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].code, DiagnosticCode::TemplateSyntaxError);
        assert_eq!(extraction.diagnostics[0].location.as_ref().and_then(|l| l.line), Some(1));
    }

    #[test]
    fn unterminated_block_is_reported() {
        let extraction = extract("{{ ref('a') }}\n{{ ref('b')");

        assert_eq!(extraction.upstream_names, set(&["a"]));
        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].location.as_ref().and_then(|l| l.line), Some(2));
    }

    #[test]
    fn plain_sql_has_nothing_to_extract() {
        let extraction = extract("select 1 as id");
        assert_eq!(extraction, Extraction::default());
    }

    #[test]
    fn nested_calls_are_found() {
        let extraction = extract(
            "{% set relations = [ref('a'), ref('b')] %}\n\
             {{ dbt_utils.union_relations(relations=[ref('c')]) }}\n\
             {{ (ref('d') if var('country_code') == 'us' else ref('e')) | string }}",
        );

        assert_eq!(extraction.upstream_names, set(&["a", "b", "c", "d", "e"]));
    }

    #[test]
    fn snapshot_wrapper_is_reported() {
        let context = context();
        let extraction = MacroExtractor::new(&context).extract(
            "{% snapshot orders_snapshot %}\nselect * from {{ ref('orders') }}\n{% endsnapshot %}",
            Path::new("snapshots/orders_snapshot.sql"),
            true,
        );

        assert_eq!(extraction.snapshot_name.as_deref(), Some("orders_snapshot"));
        assert_eq!(extraction.upstream_names, set(&["orders"]));
    }
}
