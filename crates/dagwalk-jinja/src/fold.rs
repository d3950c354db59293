//! Constant folding of template expressions
//!
//! Folding never evaluates arbitrary template code. Only literals, lists,
//! tuples, `~` concatenation and `var(...)` lookups against externally
//! supplied variables resolve; anything else is a [`ResolutionFailure`].

use crate::ast::{Call, Expr};
use crate::context::Variables;
use serde::Serialize;

/// A statically known value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConstValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<ConstValue>),
}

impl ConstValue {
    /// Is this a list value?
    pub fn is_list(&self) -> bool {
        matches!(self, ConstValue::List(_))
    }

    /// Convert an externally supplied JSON literal.
    ///
    /// Objects have no constant form and return `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        Some(match value {
            serde_json::Value::Null => ConstValue::None,
            serde_json::Value::Bool(b) => ConstValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ConstValue::Int(i),
                None => ConstValue::Float(n.as_f64()?),
            },
            serde_json::Value::String(s) => ConstValue::Str(s.clone()),
            serde_json::Value::Array(items) => {
                ConstValue::List(items.iter().map(Self::from_json).collect::<Option<_>>()?)
            }
            serde_json::Value::Object(_) => return None,
        })
    }
}

/// Renders values the way the template language prints them: `True`,
/// `None`, `1.0`, and lists with quoted strings.
impl std::fmt::Display for ConstValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstValue::Str(s) => write!(f, "{}", s),
            ConstValue::Int(n) => write!(f, "{}", n),
            ConstValue::Float(n) => write_float(f, *n),
            ConstValue::Bool(true) => write!(f, "True"),
            ConstValue::Bool(false) => write!(f, "False"),
            ConstValue::None => write!(f, "None"),
            ConstValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match item {
                        ConstValue::Str(s) => write!(f, "'{}'", s)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                write!(f, "]")
            }
        }
    }
}

fn write_float(f: &mut std::fmt::Formatter<'_>, n: f64) -> std::fmt::Result {
    if n.is_nan() {
        write!(f, "nan")
    } else if n.is_infinite() {
        write!(f, "{}", if n > 0.0 { "inf" } else { "-inf" })
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        write!(f, "{:.1}", n)
    } else {
        write!(f, "{}", n)
    }
}

/// Why an expression could not be folded to a constant
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionFailure {
    #[error("{0} cannot be resolved to a constant")]
    Unsupported(&'static str),

    #[error("name `{0}` is not a constant")]
    UnboundName(String),

    #[error("call to `{0}` cannot be resolved to a constant")]
    UnsupportedCall(String),

    #[error("variable `{0}` is not defined")]
    UndefinedVariable(String),

    #[error("variable name must resolve to a string")]
    InvalidVariableName,

    #[error("variable `{0}` holds a mapping, which has no constant form")]
    UnsupportedVariableValue(String),

    #[error("cannot concatenate a list")]
    NonScalarConcat,

    #[error("list element {index} cannot be resolved: {source}")]
    ListElement {
        index: usize,
        #[source]
        source: Box<ResolutionFailure>,
    },
}

/// Fold an expression to a constant.
pub fn fold(expr: &Expr, vars: &Variables) -> Result<ConstValue, ResolutionFailure> {
    match expr {
        Expr::Const(value) => Ok(value.clone()),
        Expr::List(items) | Expr::Tuple(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                fold(item, vars).map_err(|e| ResolutionFailure::ListElement {
                    index,
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ConstValue::List),
        Expr::Concat(left, right) => {
            let left = fold(left, vars)?;
            let right = fold(right, vars)?;
            if left.is_list() || right.is_list() {
                return Err(ResolutionFailure::NonScalarConcat);
            }
            Ok(ConstValue::Str(format!("{}{}", left, right)))
        }
        Expr::Call(call) => match call.name() {
            Some("var") => fold_var(call, vars),
            Some(name) => Err(ResolutionFailure::UnsupportedCall(name.to_string())),
            None => Err(ResolutionFailure::Unsupported(expr.kind_name())),
        },
        Expr::Name(name) => Err(ResolutionFailure::UnboundName(name.clone())),
        other => Err(ResolutionFailure::Unsupported(other.kind_name())),
    }
}

/// `var('name')` or `var('name', default)`
fn fold_var(call: &Call, vars: &Variables) -> Result<ConstValue, ResolutionFailure> {
    let name_expr = call.args.first().ok_or(ResolutionFailure::InvalidVariableName)?;
    let name = match fold(name_expr, vars)? {
        ConstValue::Str(name) => name,
        _ => return Err(ResolutionFailure::InvalidVariableName),
    };

    match vars.get(&name) {
        Some(value) => {
            ConstValue::from_json(value).ok_or(ResolutionFailure::UnsupportedVariableValue(name))
        }
        None => match call.args.get(1).or_else(|| call.kwarg("default")) {
            Some(default) => fold(default, vars),
            None => Err(ResolutionFailure::UndefinedVariable(name)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fold_str(source: &str, vars: &Variables) -> Result<ConstValue, ResolutionFailure> {
        fold(&parse_expression(source).unwrap(), vars)
    }

    fn vars() -> Variables {
        let mut vars = Variables::new();
        vars.insert("code".into(), json!("us"));
        vars.insert("days".into(), json!(7));
        vars.insert("regions".into(), json!(["eu", "us"]));
        vars.insert("conn".into(), json!({"host": "db"}));
        vars
    }

    #[test]
    fn literals_fold_to_themselves() {
        let vars = Variables::new();
        assert_eq!(fold_str("'abc'", &vars), Ok(ConstValue::Str("abc".into())));
        assert_eq!(fold_str("42", &vars), Ok(ConstValue::Int(42)));
        assert_eq!(fold_str("true", &vars), Ok(ConstValue::Bool(true)));
    }

    #[test]
    fn lists_fold_when_every_element_folds() {
        let vars = Variables::new();
        assert_eq!(
            fold_str("[1, 'two']", &vars),
            Ok(ConstValue::List(vec![ConstValue::Int(1), ConstValue::Str("two".into())]))
        );

        let err = fold_str("['a', b]", &vars).unwrap_err();
        assert_eq!(
            err,
            ResolutionFailure::ListElement {
                index: 1,
                source: Box::new(ResolutionFailure::UnboundName("b".into())),
            }
        );
    }

    #[test]
    fn concat_with_variable() {
        assert_eq!(
            fold_str("'stg_' ~ var('code')", &vars()),
            Ok(ConstValue::Str("stg_us".into()))
        );
        assert_eq!(
            fold_str("'last_' ~ var('days') ~ '_days'", &vars()),
            Ok(ConstValue::Str("last_7_days".into()))
        );
    }

    #[test]
    fn concat_prints_like_the_template_language() {
        let vars = Variables::new();
        assert_eq!(fold_str("'v' ~ 1.0", &vars), Ok(ConstValue::Str("v1.0".into())));
        assert_eq!(fold_str("'v' ~ 2.5", &vars), Ok(ConstValue::Str("v2.5".into())));
        assert_eq!(fold_str("'flag_' ~ true", &vars), Ok(ConstValue::Str("flag_True".into())));
        assert_eq!(fold_str("'x' ~ none", &vars), Ok(ConstValue::Str("xNone".into())));

        let list = ConstValue::List(vec![ConstValue::Str("a".into()), ConstValue::Bool(false)]);
        assert_eq!(list.to_string(), "['a', False]");
    }

    #[test]
    fn concat_rejects_lists() {
        assert_eq!(
            fold_str("'x' ~ var('regions')", &vars()),
            Err(ResolutionFailure::NonScalarConcat)
        );
    }

    #[test]
    fn variable_lookup() {
        assert_eq!(
            fold_str("var('regions')", &vars()),
            Ok(ConstValue::List(vec![
                ConstValue::Str("eu".into()),
                ConstValue::Str("us".into())
            ]))
        );
        assert_eq!(
            fold_str("var('missing')", &vars()),
            Err(ResolutionFailure::UndefinedVariable("missing".into()))
        );
        assert_eq!(
            fold_str("var('conn')", &vars()),
            Err(ResolutionFailure::UnsupportedVariableValue("conn".into()))
        );
        assert_eq!(
            fold_str("var(some_name)", &vars()),
            Err(ResolutionFailure::UnboundName("some_name".into()))
        );
    }

    #[test]
    fn variable_defaults() {
        assert_eq!(
            fold_str("var('missing', 'fallback')", &vars()),
            Ok(ConstValue::Str("fallback".into()))
        );
        assert_eq!(
            fold_str("var('missing', default=3)", &vars()),
            Ok(ConstValue::Int(3))
        );
        assert_eq!(
            fold_str("var('code', 'fallback')", &vars()),
            Ok(ConstValue::Str("us".into()))
        );
    }

    #[test]
    fn other_nodes_do_not_fold() {
        let vars = Variables::new();
        assert_eq!(
            fold_str("ref('x')", &vars),
            Err(ResolutionFailure::UnsupportedCall("ref".into()))
        );
        assert_eq!(
            fold_str("1 + 2", &vars),
            Err(ResolutionFailure::Unsupported("binary operation"))
        );
        assert_eq!(
            fold_str("'a' | upper", &vars),
            Err(ResolutionFailure::Unsupported("filter"))
        );
    }

    #[test]
    fn failure_messages_are_readable() {
        let err = fold_str("[1, x]", &Variables::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "list element 1 cannot be resolved: name `x` is not a constant"
        );
    }
}
