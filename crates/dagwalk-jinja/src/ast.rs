//! Template expression AST
//!
//! Covers the expression subset of the template language. Statements are not
//! modelled; the parser only hands back the expressions embedded in them.

use crate::fold::ConstValue;

/// Binary operators other than `~` (which has its own node)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

/// A keyword argument: `key=value`
#[derive(Debug, Clone, PartialEq)]
pub struct Kwarg {
    pub key: String,
    pub value: Expr,
}

/// A function-style invocation: `func(args, key=value)`
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub func: Box<Expr>,
    pub args: Vec<Expr>,
    pub kwargs: Vec<Kwarg>,
}

impl Call {
    /// Name of the called function when it is a plain identifier.
    ///
    /// `ref('x')` gives `Some("ref")`, `adapter.dispatch('x')()` gives `None`.
    pub fn name(&self) -> Option<&str> {
        match self.func.as_ref() {
            Expr::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Last keyword argument with the given key
    pub fn kwarg(&self, key: &str) -> Option<&Expr> {
        self.kwargs.iter().rev().find(|k| k.key == key).map(|k| &k.value)
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String, number, boolean or none literal
    Const(ConstValue),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `(a, b)`
    Tuple(Vec<Expr>),
    /// `{k: v}`
    Dict(Vec<(Expr, Expr)>),
    /// `a ~ b`
    Concat(Box<Expr>, Box<Expr>),
    /// Bare identifier
    Name(String),
    /// `value.attr`
    GetAttr { value: Box<Expr>, attr: String },
    /// `value[index]`
    GetItem { value: Box<Expr>, index: Box<Expr> },
    Call(Call),
    /// `value | name(args)`
    Filter { value: Box<Expr>, name: String, args: Vec<Expr>, kwargs: Vec<Kwarg> },
    /// `value is [not] name(args)`
    Test { value: Box<Expr>, name: String, args: Vec<Expr>, negated: bool },
    BinOp { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    /// `a if test else b`
    Cond { test: Box<Expr>, then: Box<Expr>, otherwise: Option<Box<Expr>> },
}

impl Expr {
    /// Short node-kind label used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Const(_) => "constant",
            Expr::List(_) => "list",
            Expr::Tuple(_) => "tuple",
            Expr::Dict(_) => "dict",
            Expr::Concat(..) => "concatenation",
            Expr::Name(_) => "name",
            Expr::GetAttr { .. } => "attribute access",
            Expr::GetItem { .. } => "subscript",
            Expr::Call(_) => "call",
            Expr::Filter { .. } => "filter",
            Expr::Test { .. } => "test",
            Expr::BinOp { .. } => "binary operation",
            Expr::UnaryOp { .. } => "unary operation",
            Expr::Cond { .. } => "conditional expression",
        }
    }

    /// Visit every call in this expression, outermost first, in source order.
    pub fn walk_calls<'a>(&'a self, visit: &mut dyn FnMut(&'a Call)) {
        match self {
            Expr::Const(_) | Expr::Name(_) => {}
            Expr::List(items) | Expr::Tuple(items) => {
                for item in items {
                    item.walk_calls(visit);
                }
            }
            Expr::Dict(pairs) => {
                for (key, value) in pairs {
                    key.walk_calls(visit);
                    value.walk_calls(visit);
                }
            }
            Expr::Concat(left, right) | Expr::BinOp { left, right, .. } => {
                left.walk_calls(visit);
                right.walk_calls(visit);
            }
            Expr::GetAttr { value, .. } => value.walk_calls(visit),
            Expr::GetItem { value, index } => {
                value.walk_calls(visit);
                index.walk_calls(visit);
            }
            Expr::Call(call) => {
                visit(call);
                call.func.walk_calls(visit);
                for arg in &call.args {
                    arg.walk_calls(visit);
                }
                for kwarg in &call.kwargs {
                    kwarg.value.walk_calls(visit);
                }
            }
            Expr::Filter { value, args, kwargs, .. } => {
                value.walk_calls(visit);
                for arg in args {
                    arg.walk_calls(visit);
                }
                for kwarg in kwargs {
                    kwarg.value.walk_calls(visit);
                }
            }
            Expr::Test { value, args, .. } => {
                value.walk_calls(visit);
                for arg in args {
                    arg.walk_calls(visit);
                }
            }
            Expr::UnaryOp { operand, .. } => operand.walk_calls(visit),
            Expr::Cond { test, then, otherwise } => {
                then.walk_calls(visit);
                test.walk_calls(visit);
                if let Some(otherwise) = otherwise {
                    otherwise.walk_calls(visit);
                }
            }
        }
    }

    /// All calls in this expression, outermost first.
    pub fn calls(&self) -> Vec<&Call> {
        let mut calls = Vec::new();
        self.walk_calls(&mut |call| calls.push(call));
        calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call(Call {
            func: Box::new(Expr::Name(name.to_string())),
            args,
            kwargs: Vec::new(),
        })
    }

    #[test]
    fn walk_finds_nested_calls() {
        let expr = call(
            "ref",
            vec![Expr::Concat(
                Box::new(Expr::Const(ConstValue::Str("stg_".into()))),
                Box::new(call("var", vec![Expr::Const(ConstValue::Str("code".into()))])),
            )],
        );

        let names: Vec<_> = expr.calls().iter().filter_map(|c| c.name()).collect();
        assert_eq!(names, vec!["ref", "var"]);
    }

    #[test]
    fn last_kwarg_wins() {
        let Expr::Call(mut c) = call("config", Vec::new()) else {
            unreachable!()
        };
        c.kwargs.push(Kwarg { key: "tags".into(), value: Expr::Const(ConstValue::Str("a".into())) });
        c.kwargs.push(Kwarg { key: "tags".into(), value: Expr::Const(ConstValue::Str("b".into())) });

        assert_eq!(c.kwarg("tags"), Some(&Expr::Const(ConstValue::Str("b".into()))));
        assert_eq!(c.kwarg("materialized"), None);
    }
}
