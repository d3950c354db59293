//! Static context for template extraction
//!
//! Holds what a template may legally depend on during a scan: the project
//! name and externally supplied variables. Never mutated during a scan.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Externally supplied `var(...)` bindings
pub type Variables = BTreeMap<String, serde_json::Value>;

/// Context for extracting macro calls from templates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateContext {
    /// Project variables (literal values only)
    pub vars: Variables,

    /// Name of the project being scanned; `ref('<project>', 'x')` stays local
    pub project_name: String,
}

impl TemplateContext {
    /// Add a project variable
    pub fn add_var(&mut self, key: impl Into<String>, value: serde_json::Value) -> &mut Self {
        self.vars.insert(key.into(), value);
        self
    }
}

/// Builder for TemplateContext
pub struct TemplateContextBuilder {
    context: TemplateContext,
}

impl TemplateContextBuilder {
    pub fn new() -> Self {
        Self {
            context: TemplateContext::default(),
        }
    }

    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.context.project_name = name.into();
        self
    }

    pub fn var(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.add_var(key, value);
        self
    }

    pub fn vars(mut self, vars: Variables) -> Self {
        self.context.vars.extend(vars);
        self
    }

    pub fn build(self) -> TemplateContext {
        self.context
    }
}

impl Default for TemplateContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
