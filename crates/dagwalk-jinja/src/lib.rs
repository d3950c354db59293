//! Template-expression parsing for query definitions
//!
//! This crate handles:
//! - Splitting query templates into expression and statement blocks
//! - Parsing the expression language into an AST
//! - Constant-folding expressions against external variables
//! - Extracting `ref()`, `source()` and `config()` calls without rendering

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod fold;
pub mod context;
pub mod functions;
pub mod preprocessor;
pub mod extractor;

pub use ast::{Call, Expr, Kwarg};
pub use parser::{parse_expression, ParseError};
pub use fold::{fold, ConstValue, ResolutionFailure};
pub use context::{TemplateContext, TemplateContextBuilder, Variables};
pub use functions::{MacroKind, RefTarget, SourceRef};
pub use preprocessor::{QueryPreprocessor, PreprocessResult};
pub use extractor::{Extraction, MacroExtractor, CONFIG_DIMENSIONS, MATERIALIZED};
