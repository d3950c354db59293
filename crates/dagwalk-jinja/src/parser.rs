//! Recursive-descent parser for template expressions
//!
//! Operator precedence follows the template language, loosest first:
//! conditional, `or`, `and`, `not`, comparison, `+ -`, `~`, `* / // %`,
//! `**`, unary, then postfix access, calls, filters and tests.

use crate::ast::{BinOp, Call, Expr, Kwarg, UnaryOp};
use crate::fold::ConstValue;
use crate::lexer::{self, Block, BlockKind, LexError, Token};

/// Error produced while parsing one template block
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unexpected `{found}`, expected {expected}")]
    Unexpected { found: String, expected: &'static str },

    #[error("unexpected end of block, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("argument unpacking (`*args`, `**kwargs`) is not supported")]
    ArgumentUnpacking,
}

/// Parse a single standalone expression
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(lexer::tokenize(source)?);
    let expr = parser.expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse the expressions carried by one template block.
///
/// Expression blocks yield exactly one expression. Statement blocks yield the
/// expressions of `set`, `if`, `elif`, `for`, `do` and `call` tags; all other
/// tags (`endif`, `macro`, `snapshot`, ...) yield nothing.
pub fn parse_block(block: &Block<'_>) -> Result<Vec<Expr>, ParseError> {
    let tokens = lexer::tokenize(block.body)?;
    let mut parser = Parser::new(tokens);

    match block.kind {
        BlockKind::Expression => {
            let expr = parser.expression()?;
            parser.expect_end()?;
            Ok(vec![expr])
        }
        BlockKind::Statement => parser.statement(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_symbol(&self, symbol: &str) -> bool {
        matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == keyword)
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if self.at_symbol(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &'static str) -> Result<(), ParseError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.unexpected(symbol))
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(other) => Err(ParseError::Unexpected { found: other.to_string(), expected }),
            None => Err(ParseError::UnexpectedEnd(expected)),
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ParseError::Unexpected {
                found: token.to_string(),
                expected: "end of block",
            }),
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::Unexpected { found: token.to_string(), expected },
            None => ParseError::UnexpectedEnd(expected),
        }
    }

    // --- statements ---

    fn statement(&mut self) -> Result<Vec<Expr>, ParseError> {
        let Some(Token::Ident(tag)) = self.next() else {
            return Ok(Vec::new());
        };

        match tag.as_str() {
            "set" => {
                // `{% set a, b = expr %}`; the block form has no `=`.
                loop {
                    self.expect_ident("assignment target")?;
                    if !self.eat_symbol(",") {
                        break;
                    }
                }
                if !self.eat_symbol("=") {
                    return Ok(Vec::new());
                }
                let expr = self.expression()?;
                self.expect_end()?;
                Ok(vec![expr])
            }
            "if" | "elif" | "do" => {
                let expr = self.expression()?;
                self.expect_end()?;
                Ok(vec![expr])
            }
            "for" => {
                while !self.at_keyword("in") {
                    if self.next().is_none() {
                        return Err(ParseError::UnexpectedEnd("`in`"));
                    }
                }
                self.pos += 1;
                let mut exprs = vec![self.or_expr()?];
                if self.eat_keyword("if") {
                    exprs.push(self.or_expr()?);
                }
                self.eat_keyword("recursive");
                self.expect_end()?;
                Ok(exprs)
            }
            "call" => {
                // `{% call(row) macro(args) %}`: skip the caller signature.
                if self.at_symbol("(") {
                    self.skip_balanced()?;
                }
                let expr = self.expression()?;
                self.expect_end()?;
                Ok(vec![expr])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn skip_balanced(&mut self) -> Result<(), ParseError> {
        let mut depth = 0usize;
        loop {
            match self.next() {
                Some(Token::Symbol("(")) => depth += 1,
                Some(Token::Symbol(")")) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => {}
                None => return Err(ParseError::UnexpectedEnd("`)`")),
            }
        }
    }

    // --- expressions ---

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let expr = self.or_expr()?;
        if !self.eat_keyword("if") {
            return Ok(expr);
        }

        let test = self.or_expr()?;
        let otherwise = if self.eat_keyword("else") {
            Some(Box::new(self.expression()?))
        } else {
            None
        };

        Ok(Expr::Cond { test: Box::new(test), then: Box::new(expr), otherwise })
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = binop(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = binop(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword("not") {
            let operand = self.not_expr()?;
            return Ok(Expr::UnaryOp { op: UnaryOp::Not, operand: Box::new(operand) });
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol("==")) => BinOp::Eq,
                Some(Token::Symbol("!=")) => BinOp::Ne,
                Some(Token::Symbol("<")) => BinOp::Lt,
                Some(Token::Symbol("<=")) => BinOp::Le,
                Some(Token::Symbol(">")) => BinOp::Gt,
                Some(Token::Symbol(">=")) => BinOp::Ge,
                Some(Token::Ident(s)) if s == "in" => BinOp::In,
                Some(Token::Ident(s))
                    if s == "not" && matches!(self.peek_at(1), Some(Token::Ident(n)) if n == "in") =>
                {
                    self.pos += 1;
                    BinOp::NotIn
                }
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = binop(op, left, right);
        }
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.concat()?;
        loop {
            let op = if self.eat_symbol("+") {
                BinOp::Add
            } else if self.eat_symbol("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.concat()?;
            left = binop(op, left, right);
        }
    }

    fn concat(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        while self.eat_symbol("~") {
            let right = self.multiplicative()?;
            left = Expr::Concat(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.power()?;
        loop {
            let op = if self.eat_symbol("*") {
                BinOp::Mul
            } else if self.eat_symbol("//") {
                BinOp::FloorDiv
            } else if self.eat_symbol("/") {
                BinOp::Div
            } else if self.eat_symbol("%") {
                BinOp::Mod
            } else {
                return Ok(left);
            };
            let right = self.power()?;
            left = binop(op, left, right);
        }
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        while self.eat_symbol("**") {
            let right = self.unary()?;
            left = binop(BinOp::Pow, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = if self.eat_symbol("-") {
            UnaryOp::Neg
        } else if self.eat_symbol("+") {
            UnaryOp::Pos
        } else {
            return self.postfix();
        };
        let operand = self.unary()?;
        Ok(Expr::UnaryOp { op, operand: Box::new(operand) })
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_symbol(".") {
                let attr = match self.next() {
                    Some(Token::Ident(name)) => name,
                    Some(Token::Int(n)) => n.to_string(),
                    Some(other) => {
                        return Err(ParseError::Unexpected {
                            found: other.to_string(),
                            expected: "attribute name",
                        })
                    }
                    None => return Err(ParseError::UnexpectedEnd("attribute name")),
                };
                expr = Expr::GetAttr { value: Box::new(expr), attr };
            } else if self.eat_symbol("[") {
                let index = self.expression()?;
                self.expect_symbol("]")?;
                expr = Expr::GetItem { value: Box::new(expr), index: Box::new(index) };
            } else if self.at_symbol("(") {
                let (args, kwargs) = self.call_args()?;
                expr = Expr::Call(Call { func: Box::new(expr), args, kwargs });
            } else if self.eat_symbol("|") {
                let name = self.expect_ident("filter name")?;
                let (args, kwargs) = if self.at_symbol("(") {
                    self.call_args()?
                } else {
                    (Vec::new(), Vec::new())
                };
                expr = Expr::Filter { value: Box::new(expr), name, args, kwargs };
            } else if self.eat_keyword("is") {
                let negated = self.eat_keyword("not");
                let name = self.expect_ident("test name")?;
                let args = if self.at_symbol("(") {
                    self.call_args()?.0
                } else {
                    Vec::new()
                };
                expr = Expr::Test { value: Box::new(expr), name, args, negated };
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<Kwarg>), ParseError> {
        self.expect_symbol("(")?;
        let mut args = Vec::new();
        let mut kwargs = Vec::new();

        while !self.eat_symbol(")") {
            if self.at_symbol("*") || self.at_symbol("**") {
                return Err(ParseError::ArgumentUnpacking);
            }

            let is_kwarg = matches!(self.peek(), Some(Token::Ident(_)))
                && matches!(self.peek_at(1), Some(Token::Symbol("=")));
            if is_kwarg {
                let key = self.expect_ident("keyword")?;
                self.pos += 1;
                let value = self.expression()?;
                kwargs.push(Kwarg { key, value });
            } else {
                args.push(self.expression()?);
            }

            if !self.eat_symbol(",") {
                self.expect_symbol(")")?;
                break;
            }
        }

        Ok((args, kwargs))
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.next() else {
            return Err(ParseError::UnexpectedEnd("expression"));
        };

        match token {
            Token::Str(first) => {
                // Adjacent string literals join: 'a' 'b' == 'ab'
                let mut value = first;
                while let Some(Token::Str(next)) = self.peek() {
                    value.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Const(ConstValue::Str(value)))
            }
            Token::Int(n) => Ok(Expr::Const(ConstValue::Int(n))),
            Token::Float(n) => Ok(Expr::Const(ConstValue::Float(n))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" | "True" => Expr::Const(ConstValue::Bool(true)),
                "false" | "False" => Expr::Const(ConstValue::Bool(false)),
                "none" | "None" => Expr::Const(ConstValue::None),
                _ => Expr::Name(name),
            }),
            Token::Symbol("(") => {
                if self.eat_symbol(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.expression()?;
                if !self.eat_symbol(",") {
                    self.expect_symbol(")")?;
                    return Ok(first);
                }
                let mut items = vec![first];
                items.extend(self.sequence(")")?);
                Ok(Expr::Tuple(items))
            }
            Token::Symbol("[") => Ok(Expr::List(self.sequence("]")?)),
            Token::Symbol("{") => {
                let mut pairs = Vec::new();
                while !self.eat_symbol("}") {
                    let key = self.expression()?;
                    self.expect_symbol(":")?;
                    let value = self.expression()?;
                    pairs.push((key, value));
                    if !self.eat_symbol(",") {
                        self.expect_symbol("}")?;
                        break;
                    }
                }
                Ok(Expr::Dict(pairs))
            }
            other => Err(ParseError::Unexpected { found: other.to_string(), expected: "expression" }),
        }
    }

    /// Comma-separated items up to `close`; a trailing comma is allowed.
    fn sequence(&mut self, close: &'static str) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while !self.eat_symbol(close) {
            items.push(self.expression()?);
            if !self.eat_symbol(",") {
                self.expect_symbol(close)?;
                break;
            }
        }
        Ok(items)
    }
}

fn binop(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::BinOp { op, left: Box::new(left), right: Box::new(right) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::split_template;
    use pretty_assertions::assert_eq;

    fn s(value: &str) -> Expr {
        Expr::Const(ConstValue::Str(value.to_string()))
    }

    fn name(value: &str) -> Expr {
        Expr::Name(value.to_string())
    }

    fn call(func: &str, args: Vec<Expr>, kwargs: Vec<Kwarg>) -> Expr {
        Expr::Call(Call { func: Box::new(name(func)), args, kwargs })
    }

    #[test]
    fn parses_ref_with_variable_concat() {
        let expr = parse_expression("ref('stg_' ~ var('code'))").unwrap();
        assert_eq!(
            expr,
            call(
                "ref",
                vec![Expr::Concat(Box::new(s("stg_")), Box::new(call("var", vec![s("code")], vec![])))],
                vec![],
            )
        );
    }

    #[test]
    fn parses_config_kwargs() {
        let expr = parse_expression("config(materialized='table', tags=['a', \"b\"],)").unwrap();
        assert_eq!(
            expr,
            call(
                "config",
                vec![],
                vec![
                    Kwarg { key: "materialized".into(), value: s("table") },
                    Kwarg { key: "tags".into(), value: Expr::List(vec![s("a"), s("b")]) },
                ],
            )
        );
    }

    #[test]
    fn concat_binds_tighter_than_plus() {
        let expr = parse_expression("a + b ~ c").unwrap();
        assert_eq!(
            expr,
            binop(BinOp::Add, name("a"), Expr::Concat(Box::new(name("b")), Box::new(name("c"))))
        );
    }

    #[test]
    fn parses_filters_tests_and_conditionals() {
        let expr = parse_expression("x | default('y') if y is not none else ref('z')").unwrap();
        let Expr::Cond { test, then, otherwise } = expr else {
            panic!("expected conditional");
        };
        assert!(matches!(*then, Expr::Filter { ref name, .. } if name == "default"));
        assert!(matches!(*test, Expr::Test { negated: true, ref name, .. } if name == "none"));
        assert_eq!(otherwise.map(|e| *e), Some(call("ref", vec![s("z")], vec![])));
    }

    #[test]
    fn parses_attribute_calls_and_subscripts() {
        let expr = parse_expression("adapter.dispatch('x', 'pkg')()[0]").unwrap();
        let names: Vec<_> = expr.calls().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec![None, None]);
    }

    #[test]
    fn parses_tuples_and_dicts() {
        assert_eq!(parse_expression("()").unwrap(), Expr::Tuple(vec![]));
        assert_eq!(parse_expression("(1)").unwrap(), Expr::Const(ConstValue::Int(1)));
        assert_eq!(
            parse_expression("('a', 'b')").unwrap(),
            Expr::Tuple(vec![s("a"), s("b")])
        );
        assert_eq!(
            parse_expression("{'k': ref('m')}").unwrap(),
            Expr::Dict(vec![(s("k"), call("ref", vec![s("m")], vec![]))])
        );
    }

    #[test]
    fn adjacent_strings_join() {
        assert_eq!(parse_expression("'stg_' 'orders'").unwrap(), s("stg_orders"));
    }

    #[test]
    fn not_in_is_one_operator() {
        let expr = parse_expression("a not in b").unwrap();
        assert_eq!(expr, binop(BinOp::NotIn, name("a"), name("b")));
    }

    #[test]
    fn statement_blocks() {
        let split = split_template(
            "{% set src = ref('a') %}{% for r in ref('b') if r %}{% endfor %}\
             {% if var('flag') %}{% endif %}{% call(row) statement(ref('c')) %}{% endcall %}\
             {% macro m(x=ref('ignored')) %}{% endmacro %}{% set body %}{% endset %}",
        );

        let exprs: Vec<Expr> = split
            .blocks
            .iter()
            .flat_map(|b| parse_block(b).unwrap())
            .collect();

        let names: Vec<String> = exprs
            .iter()
            .flat_map(|e| e.calls())
            .filter_map(|c| c.name().map(str::to_string))
            .collect();
        assert_eq!(names, vec!["ref", "ref", "var", "statement", "ref"]);
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(
            parse_expression("ref('a'"),
            Err(ParseError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            parse_expression("ref('a') ref('b')"),
            Err(ParseError::Unexpected { .. })
        ));
        assert_eq!(parse_expression("f(*args)"), Err(ParseError::ArgumentUnpacking));
        assert!(matches!(parse_expression("'open"), Err(ParseError::Lex(_))));
    }
}
