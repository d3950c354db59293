//! Template lexing
//!
//! Two stages: [`split_template`] cuts a template into `{{ }}` / `{% %}`
//! blocks (comments and raw text are dropped), and [`tokenize`] turns one
//! block body into expression tokens.

/// Kind of template block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `{{ ... }}`
    Expression,
    /// `{% ... %}`
    Statement,
}

/// One template block with whitespace-control markers stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    pub kind: BlockKind,
    pub body: &'a str,
    /// 1-indexed line of the opening delimiter
    pub line: usize,
}

/// Error produced while lexing a template
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("unterminated block opened with `{open}` on line {line}")]
    UnterminatedBlock { open: &'static str, line: usize },

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),

    #[error("invalid number literal `{0}`")]
    InvalidNumber(String),
}

impl LexError {
    /// Line the error was found on, when known
    pub fn line(&self) -> Option<usize> {
        match self {
            LexError::UnterminatedBlock { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Blocks found in a template, plus the error that stopped the split early
#[derive(Debug, Clone, Default)]
pub struct SplitTemplate<'a> {
    pub blocks: Vec<Block<'a>>,
    pub error: Option<LexError>,
}

/// Split a template into blocks.
///
/// An unterminated block ends the split; everything found before it is kept.
pub fn split_template(source: &str) -> SplitTemplate<'_> {
    let mut split = SplitTemplate::default();
    let bytes = source.as_bytes();
    let mut pos = 0;
    let mut in_raw = false;

    while let Some(offset) = source[pos..].find('{') {
        let open = pos + offset;
        let (kind, close) = match bytes.get(open + 1) {
            Some(b'{') => (Some(BlockKind::Expression), "}}"),
            Some(b'%') => (Some(BlockKind::Statement), "%}"),
            Some(b'#') => (None, "#}"),
            _ => {
                pos = open + 1;
                continue;
            }
        };
        let line = line_of(source, open);

        // Comments may contain anything, so no quote tracking.
        let end = if kind.is_none() {
            source[open + 2..].find(close).map(|i| open + 2 + i)
        } else {
            find_close(source, open + 2, close)
        };
        let Some(end) = end else {
            let open_delim = match kind {
                Some(BlockKind::Expression) => "{{",
                Some(BlockKind::Statement) => "{%",
                None => "{#",
            };
            split.error = Some(LexError::UnterminatedBlock { open: open_delim, line });
            break;
        };
        pos = end + close.len();

        let Some(kind) = kind else { continue };
        let body = trim_whitespace_control(&source[open + 2..end]);

        if kind == BlockKind::Statement {
            match first_word(body) {
                "raw" => {
                    in_raw = true;
                    continue;
                }
                "endraw" => {
                    in_raw = false;
                    continue;
                }
                _ => {}
            }
        }
        if in_raw {
            continue;
        }

        split.blocks.push(Block { kind, body, line });
    }

    split
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

fn first_word(body: &str) -> &str {
    body.split_whitespace().next().unwrap_or("")
}

fn trim_whitespace_control(body: &str) -> &str {
    let body = body.strip_prefix(['-', '+']).unwrap_or(body);
    let body = body.strip_suffix(['-', '+']).unwrap_or(body);
    body.trim()
}

/// Find `close` starting at `from`, skipping over quoted strings.
fn find_close(source: &str, from: usize, close: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut i = from;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                } else if bytes[i..].starts_with(close.as_bytes()) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }

    None
}

/// Expression token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Symbol(&'static str),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{}", s),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Int(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{}", n),
            Token::Symbol(s) => write!(f, "{}", s),
        }
    }
}

// Longest first so `**` wins over `*`.
const SYMBOLS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "(", ")", "[", "]", "{", "}", ",", ".", ":", "~",
    "+", "-", "*", "/", "%", "=", "<", ">", "|",
];

/// Tokenize one block body
pub fn tokenize(body: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
        } else if c == '\'' || c == '"' {
            let (value, next) = lex_string(&chars, i)?;
            tokens.push(Token::Str(value));
            i = next;
        } else if c.is_ascii_digit() {
            let (token, next) = lex_number(&chars, i)?;
            tokens.push(token);
            i = next;
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let symbol = SYMBOLS
                .iter()
                .copied()
                .find(|s| rest.starts_with(*s))
                .ok_or(LexError::UnexpectedChar(c))?;
            tokens.push(Token::Symbol(symbol));
            i += symbol.len();
        }
    }

    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), LexError> {
    let quote = chars[start];
    let mut value = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars.get(i + 1).ok_or(LexError::UnterminatedString)?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => *other,
                });
                i += 2;
            }
            c if c == quote => return Ok((value, i + 1)),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }

    Err(LexError::UnterminatedString)
}

fn lex_number(chars: &[char], start: usize) -> Result<(Token, usize), LexError> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
        i += 1;
    }
    if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
        is_float = true;
        i += 1;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
            i += 1;
        }
    }

    let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
    let token = if is_float {
        text.parse().map(Token::Float).map_err(|_| LexError::InvalidNumber(text.clone()))?
    } else {
        text.parse().map(Token::Int).map_err(|_| LexError::InvalidNumber(text.clone()))?
    };

    Ok((token, i))
}
