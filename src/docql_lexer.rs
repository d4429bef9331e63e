//! DocQL lexer.
//!
//! Tokenizes query text for the parser. Keywords are matched
//! case-insensitively. Every token carries the offset it starts at, so
//! parse errors can point at the offending span.
//!
//! Example query:
//! ```docql
//! select subject where subject.in_study = study and study.name = "s0"
//! ```

use crate::error::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    Select,
    Where,
    And,
    Or,
    In,
    As,

    // Literals
    Identifier(String),
    Str(String),
    Integer(i64),

    // Operators
    Equal,        // =
    NotEqual,     // !=
    GreaterEq,    // >=
    LessEq,       // <=
    Greater,      // >
    Less,         // <

    // Punctuation
    Dot,          // .
    Comma,        // ,
    Slash,        // /
    Question,     // ?
    LeftParen,    // (
    RightParen,   // )

    // Special
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier(s) => write!(f, "identifier '{}'", s),
            TokenKind::Str(s) => write!(f, "string \"{}\"", s),
            TokenKind::Integer(n) => write!(f, "integer {}", n),
            TokenKind::Eof => write!(f, "end of query"),
            _ => write!(f, "{:?}", self),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the entire input.
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token> {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
        let pos = self.position;
        let Some(ch) = self.current() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                pos,
            });
        };
        let kind = if ch.is_ascii_alphabetic() || ch == '_' {
            self.read_identifier()
        } else if ch.is_ascii_digit() {
            self.read_integer(pos)?
        } else if ch == '"' {
            self.read_string(pos)?
        } else {
            self.read_operator(ch, pos)?
        };
        Ok(Token { kind, pos })
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn read_identifier(&mut self) -> TokenKind {
        let mut result = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        match result.to_lowercase().as_str() {
            "select" => TokenKind::Select,
            "where" => TokenKind::Where,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "in" => TokenKind::In,
            "as" => TokenKind::As,
            _ => TokenKind::Identifier(result),
        }
    }

    fn read_integer(&mut self, pos: usize) -> Result<TokenKind> {
        let mut result = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
            .parse::<i64>()
            .map(TokenKind::Integer)
            .map_err(|_| Error::Parse {
                message: format!("integer '{}' out of range", result),
                position: pos,
            })
    }

    fn read_string(&mut self, pos: usize) -> Result<TokenKind> {
        self.advance(); // opening quote
        let mut result = String::new();
        while let Some(ch) = self.current() {
            if ch == '"' {
                self.advance();
                return Ok(TokenKind::Str(result));
            }
            result.push(ch);
            self.advance();
        }
        Err(Error::Parse {
            message: "unterminated string literal".to_string(),
            position: pos,
        })
    }

    fn read_operator(&mut self, ch: char, pos: usize) -> Result<TokenKind> {
        let kind = match (ch, self.peek()) {
            ('!', Some('=')) => {
                self.advance();
                TokenKind::NotEqual
            }
            ('>', Some('=')) => {
                self.advance();
                TokenKind::GreaterEq
            }
            ('<', Some('=')) => {
                self.advance();
                TokenKind::LessEq
            }
            ('=', _) => TokenKind::Equal,
            ('>', _) => TokenKind::Greater,
            ('<', _) => TokenKind::Less,
            ('.', _) => TokenKind::Dot,
            (',', _) => TokenKind::Comma,
            ('/', _) => TokenKind::Slash,
            ('?', _) => TokenKind::Question,
            ('(', _) => TokenKind::LeftParen,
            (')', _) => TokenKind::RightParen,
            _ => {
                return Err(Error::Parse {
                    message: format!("unexpected character '{}'", ch),
                    position: pos,
                })
            }
        };
        self.advance();
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(query: &str) -> Vec<TokenKind> {
        Lexer::new(query)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            kinds("SELECT Where AND or In aS"),
            vec![
                TokenKind::Select,
                TokenKind::Where,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::In,
                TokenKind::As,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_qualified_field() {
        assert_eq!(
            kinds("subject.code"),
            vec![
                TokenKind::Identifier("subject".to_string()),
                TokenKind::Dot,
                TokenKind::Identifier("code".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_collection_path() {
        assert_eq!(
            kinds("study000/subjects"),
            vec![
                TokenKind::Identifier("study000".to_string()),
                TokenKind::Slash,
                TokenKind::Identifier("subjects".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("= != >= <= > <"),
            vec![
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::GreaterEq,
                TokenKind::LessEq,
                TokenKind::Greater,
                TokenKind::Less,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds(r#""study000" 42 ?"#),
            vec![
                TokenKind::Str("study000".to_string()),
                TokenKind::Integer(42),
                TokenKind::Question,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_identifiers_are_ascii_only() {
        let err = Lexer::new("café").tokenize().unwrap_err();
        assert!(matches!(err, Error::Parse { position: 3, .. }));
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert!(matches!(err, Error::Parse { position: 0, .. }));
    }

    #[test]
    fn test_positions() {
        let tokens = Lexer::new("select a").tokenize().unwrap();
        assert_eq!(tokens[0].pos, 0);
        assert_eq!(tokens[1].pos, 7);
    }
}
