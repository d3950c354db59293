//! Recognised template macros
//!
//! Interprets calls to `ref()`, `source()`, `var()` and `config()` found in a
//! parsed template, without rendering anything.

use crate::ast::Call;
use crate::context::TemplateContext;
use crate::fold::{fold, ConstValue, ResolutionFailure};
use serde::Serialize;

/// Macros the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    /// `ref('model')` - same-project dependency
    Ref,
    /// `source('source_name', 'table_name')` - external input
    Source,
    /// `var('name')` - only meaningful as an operand
    Var,
    /// `config(key=value, ...)` - inline configuration
    Config,
}

impl MacroKind {
    /// Classify a call by the name it invokes
    pub fn of(call: &Call) -> Option<Self> {
        match call.name()? {
            "ref" => Some(Self::Ref),
            "source" => Some(Self::Source),
            "var" => Some(Self::Var),
            "config" => Some(Self::Config),
            _ => None,
        }
    }
}

/// Where a `ref()` call points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    /// A model in the scanned project
    Local(String),
    /// `ref('package', 'model')` with a package other than this project
    CrossProject { package: String, name: String },
}

/// An external input named by `source()`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceRef {
    pub source_name: String,
    pub table_name: String,
}

/// Why a `ref()` or `source()` call yielded no name
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReferenceError {
    #[error("`{0}()` called without a name argument")]
    MissingArgument(&'static str),

    #[error("argument resolved to {0}, expected a string")]
    NotAString(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionFailure),
}

/// ref() - references another model
///
/// Usage in templates: {{ ref('model_name') }} or {{ ref('package', 'model_name') }}
/// Keyword arguments (`version=`, `v=`) do not affect the target.
pub fn ref_function(call: &Call, context: &TemplateContext) -> Result<RefTarget, ReferenceError> {
    match call.args.as_slice() {
        [] => Err(ReferenceError::MissingArgument("ref")),
        [name] => Ok(RefTarget::Local(fold_name(name, context)?)),
        [package, name, ..] => {
            let package = fold_name(package, context)?;
            let name = fold_name(name, context)?;
            if package == context.project_name {
                Ok(RefTarget::Local(name))
            } else {
                Ok(RefTarget::CrossProject { package, name })
            }
        }
    }
}

/// source() - references an external input table
///
/// Usage in templates: {{ source('source_name', 'table_name') }}
pub fn source_function(call: &Call, context: &TemplateContext) -> Result<SourceRef, ReferenceError> {
    match call.args.as_slice() {
        [source_name, table_name, ..] => Ok(SourceRef {
            source_name: fold_name(source_name, context)?,
            table_name: fold_name(table_name, context)?,
        }),
        _ => Err(ReferenceError::MissingArgument("source")),
    }
}

fn fold_name(expr: &crate::ast::Expr, context: &TemplateContext) -> Result<String, ReferenceError> {
    match fold(expr, &context.vars)? {
        ConstValue::Str(name) => Ok(name),
        ConstValue::List(_) => Err(ReferenceError::NotAString("a list".to_string())),
        other => Err(ReferenceError::NotAString(format!("`{}`", other))),
    }
}
