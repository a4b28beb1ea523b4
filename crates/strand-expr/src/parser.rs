//! Recursive-descent parser producing an untyped parse tree.
//!
//! Precedence, loosest first: `||`/`or`, `&&`/`and`, `!`/`not`,
//! comparison. A comparison takes at most one operator; chains such as
//! `a == b == c` are rejected as trailing input.

use crate::error::{ExprError, Result};
use crate::lexer::{tokenize, Token, TokenKind};

/// Untyped parse tree. Operators are kept as their source spelling and
/// resolved by [`crate::ast::lower`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParseTree {
    Bool(bool),
    Number(f64),
    Str(String),
    /// One or more dot-separated segments; the first may carry a `$`.
    Name(Vec<String>),
    Group(Box<ParseTree>),
    Unary {
        op: String,
        operand: Box<ParseTree>,
    },
    Binary {
        op: String,
        left: Box<ParseTree>,
        right: Box<ParseTree>,
    },
}

/// Deepest `!`/`(` nesting, and most binary operators, one condition
/// may carry. Past either limit parsing fails instead of recursing.
pub const MAX_DEPTH: usize = 256;

/// Parse a single-line condition.
pub fn parse(input: &str) -> Result<ParseTree> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.chars().count() + 1,
        depth: 0,
        operators: 0,
    };

    if parser.tokens.is_empty() {
        return Err(ExprError::parse(1, "empty expression"));
    }

    let tree = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::parse(
            token.position,
            format!("unexpected '{}' after expression", token.lexeme),
        ));
    }
    Ok(tree)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn next_is(&self, pred: impl Fn(&TokenKind) -> bool) -> bool {
        self.peek().is_some_and(|t| pred(&t.kind))
    }

    fn descend(&mut self, position: usize) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::parse(
                position,
                format!("expression nested deeper than {MAX_DEPTH} levels"),
            ));
        }
        Ok(())
    }

    /// Take the next binary operator token, counting it against the limit.
    fn operator(&mut self) -> Result<String> {
        let token = self.advance();
        self.operators += 1;
        if self.operators > MAX_DEPTH {
            let position = token.as_ref().map_or(self.end, |t| t.position);
            return Err(ExprError::parse(
                position,
                format!("expression has more than {MAX_DEPTH} operators"),
            ));
        }
        Ok(token.map(|t| t.lexeme).unwrap_or_default())
    }

    fn parse_or(&mut self) -> Result<ParseTree> {
        let mut left = self.parse_and()?;
        while self.next_is(|k| *k == TokenKind::Or) {
            let op = self.operator()?;
            let right = self.parse_and()?;
            left = ParseTree::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ParseTree> {
        let mut left = self.parse_unary()?;
        while self.next_is(|k| *k == TokenKind::And) {
            let op = self.operator()?;
            let right = self.parse_unary()?;
            left = ParseTree::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ParseTree> {
        if self.next_is(|k| *k == TokenKind::Not) {
            let Some(token) = self.advance() else {
                return self.parse_comparison();
            };
            self.descend(token.position)?;
            let operand = self.parse_unary()?;
            self.depth -= 1;
            let op = token.lexeme;
            return Ok(ParseTree::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<ParseTree> {
        let left = self.parse_primary()?;
        let is_cmp = |k: &TokenKind| {
            matches!(
                k,
                TokenKind::Eq | TokenKind::NotEq | TokenKind::Gt | TokenKind::Lt
            )
        };
        if self.next_is(is_cmp) {
            let op = self.operator()?;
            let right = self.parse_primary()?;
            return Ok(ParseTree::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<ParseTree> {
        let Some(token) = self.advance() else {
            return Err(ExprError::parse(
                self.end,
                "unexpected end of input, expected a value",
            ));
        };

        match token.kind {
            TokenKind::True => Ok(ParseTree::Bool(true)),
            TokenKind::False => Ok(ParseTree::Bool(false)),
            TokenKind::Number(n) => Ok(ParseTree::Number(n)),
            TokenKind::Str(s) => Ok(ParseTree::Str(s)),
            TokenKind::Ident(first) => self.parse_name(first),
            TokenKind::LParen => {
                self.descend(token.position)?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.advance() {
                    Some(t) if t.kind == TokenKind::RParen => {
                        Ok(ParseTree::Group(Box::new(inner)))
                    }
                    Some(t) => Err(ExprError::parse(
                        t.position,
                        format!("expected ')' but found '{}'", t.lexeme),
                    )),
                    None => Err(ExprError::parse(self.end, "unclosed '('")),
                }
            }
            other => Err(ExprError::parse(
                token.position,
                format!("unexpected '{}', expected a value", other.describe()),
            )),
        }
    }

    fn parse_name(&mut self, first: String) -> Result<ParseTree> {
        let mut segments = vec![first];
        while self.next_is(|k| *k == TokenKind::Dot) {
            let dot = self.advance();
            match self.advance() {
                Some(Token {
                    kind: TokenKind::Ident(seg),
                    position,
                    ..
                }) => {
                    if seg.starts_with('$') {
                        return Err(ExprError::parse(
                            position,
                            "'$' is only allowed at the start of a name",
                        ));
                    }
                    segments.push(seg);
                }
                Some(t) => {
                    return Err(ExprError::parse(
                        t.position,
                        format!("expected a name after '.', found '{}'", t.lexeme),
                    ))
                }
                None => {
                    let position = dot.map(|d| d.position).unwrap_or(self.end);
                    return Err(ExprError::parse(position, "trailing '.' in name"));
                }
            }
        }
        Ok(ParseTree::Name(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Box<ParseTree> {
        Box::new(ParseTree::Name(s.split('.').map(String::from).collect()))
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("true").unwrap(), ParseTree::Bool(true));
        assert_eq!(parse("false").unwrap(), ParseTree::Bool(false));
        assert_eq!(parse("7").unwrap(), ParseTree::Number(7.0));
        assert_eq!(parse("'ok'").unwrap(), ParseTree::Str("ok".into()));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let tree = parse("a || b && c").unwrap();
        assert_eq!(
            tree,
            ParseTree::Binary {
                op: "||".into(),
                left: name("a"),
                right: Box::new(ParseTree::Binary {
                    op: "&&".into(),
                    left: name("b"),
                    right: name("c"),
                }),
            }
        );
    }

    #[test]
    fn test_not_wraps_comparison() {
        let tree = parse("not x == 1").unwrap();
        assert_eq!(
            tree,
            ParseTree::Unary {
                op: "not".into(),
                operand: Box::new(ParseTree::Binary {
                    op: "==".into(),
                    left: name("x"),
                    right: Box::new(ParseTree::Number(1.0)),
                }),
            }
        );
    }

    #[test]
    fn test_dotted_names() {
        assert_eq!(*name("utils.is_ready"), parse("utils.is_ready").unwrap());
        assert_eq!(*name("$output.count"), parse("$output.count").unwrap());
    }

    #[test]
    fn test_grouping() {
        let tree = parse("(a)").unwrap();
        assert_eq!(tree, ParseTree::Group(name("a")));
    }

    #[test]
    fn test_missing_right_operand() {
        let err = parse("x ==").unwrap_err();
        assert!(matches!(err, ExprError::Parse { position: 5, .. }));
    }

    #[test]
    fn test_leading_operator() {
        let err = parse("&& y").unwrap_err();
        assert!(matches!(err, ExprError::Parse { position: 1, .. }));
    }

    #[test]
    fn test_prose_is_rejected() {
        let err = parse("invalid syntax here").unwrap_err();
        assert!(matches!(err, ExprError::Parse { position: 9, .. }));
    }

    #[test]
    fn test_unclosed_group() {
        assert!(parse("(a && b").is_err());
        assert!(parse("a)").is_err());
    }

    #[test]
    fn test_chained_comparison_rejected() {
        assert!(parse("a == b == c").is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("   ").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}x{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse(&ok).is_ok());

        let deep = format!("{}x{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        let err = parse(&deep).unwrap_err();
        assert!(matches!(err, ExprError::Parse { position, .. } if position == MAX_DEPTH + 1));

        assert!(parse(&format!("{}x", "!".repeat(MAX_DEPTH))).is_ok());
        assert!(parse(&format!("{}x", "!".repeat(MAX_DEPTH + 1))).is_err());
    }

    #[test]
    fn test_sibling_groups_do_not_accumulate_depth() {
        let group = format!("{}x{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse(&format!("{group} && {group}")).is_ok());
    }

    #[test]
    fn test_operator_limit() {
        let chain = vec!["x"; MAX_DEPTH + 1].join(" && ");
        assert!(parse(&chain).is_ok());

        let long = vec!["x"; MAX_DEPTH + 2].join(" || ");
        assert!(matches!(parse(&long), Err(ExprError::Parse { .. })));
    }

    #[test]
    fn test_dollar_inside_path() {
        assert!(parse("a.$b").is_err());
        assert!(parse("a.").is_err());
    }
}
