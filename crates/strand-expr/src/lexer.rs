use crate::error::{ExprError, Result};

/// A lexical token of the condition language.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    True,
    False,
    Number(f64),
    Str(String),
    /// Identifier, possibly `$`-prefixed. Dots are separate tokens.
    Ident(String),
    Dot,
    Eq,
    NotEq,
    Gt,
    Lt,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl TokenKind {
    /// Source spelling used in error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::True => "true".into(),
            TokenKind::False => "false".into(),
            TokenKind::Number(n) => n.to_string(),
            TokenKind::Str(s) => format!("{:?}", s),
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Dot => ".".into(),
            TokenKind::Eq => "==".into(),
            TokenKind::NotEq => "!=".into(),
            TokenKind::Gt => ">".into(),
            TokenKind::Lt => "<".into(),
            TokenKind::And => "&&".into(),
            TokenKind::Or => "||".into(),
            TokenKind::Not => "!".into(),
            TokenKind::LParen => "(".into(),
            TokenKind::RParen => ")".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based column of the first character.
    pub position: usize,
    /// The exact source text, kept so the transform can tell `and` from `&&`.
    pub lexeme: String,
}

/// Split a condition into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let position = i + 1;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let two = chars.get(i + 1).copied();
        let (kind, len) = match (c, two) {
            ('=', Some('=')) => (TokenKind::Eq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('&', Some('&')) => (TokenKind::And, 2),
            ('|', Some('|')) => (TokenKind::Or, 2),
            ('!', _) => (TokenKind::Not, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('"', _) | ('\'', _) => {
                let (text, len) = lex_string(&chars, i)?;
                (TokenKind::Str(text), len)
            }
            (d, _) if d.is_ascii_digit() => lex_number(&chars, i)?,
            ('-', Some(d)) if d.is_ascii_digit() => lex_number(&chars, i)?,
            (s, _) if s == '_' || s == '$' || s.is_alphabetic() => {
                let mut end = i + 1;
                while end < chars.len() && (chars[end] == '_' || chars[end].is_alphanumeric()) {
                    end += 1;
                }
                let word: String = chars[i..end].iter().collect();
                if word == "$" {
                    return Err(ExprError::parse(position, "expected a name after '$'"));
                }
                let kind = match word.as_str() {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    _ => TokenKind::Ident(word),
                };
                (kind, end - i)
            }
            (other, _) => {
                return Err(ExprError::parse(
                    position,
                    format!("unexpected character '{}'", other),
                ))
            }
        };

        tokens.push(Token {
            kind,
            position,
            lexeme: chars[i..i + len].iter().collect(),
        });
        i += len;
    }

    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                let escaped = chars[i + 1];
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1 - start)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(ExprError::parse(start + 1, "unterminated string literal"))
}

fn lex_number(chars: &[char], start: usize) -> Result<(TokenKind, usize)> {
    let mut end = start;
    if chars[end] == '-' {
        end += 1;
    }
    let mut seen_dot = false;
    while end < chars.len() {
        let c = chars[end];
        if c.is_ascii_digit() {
            end += 1;
        } else if c == '.' && !seen_dot && chars.get(end + 1).is_some_and(|n| n.is_ascii_digit()) {
            seen_dot = true;
            end += 1;
        } else {
            break;
        }
    }

    let text: String = chars[start..end].iter().collect();
    text.parse::<f64>()
        .map(|n| (TokenKind::Number(n), end - start))
        .map_err(|_| ExprError::parse(start + 1, format!("invalid number '{}'", text)))
}
