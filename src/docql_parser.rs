//! DocQL parser.
//!
//! Recursive descent over the token stream. The grammar:
//!
//! ```text
//! query          := select_clause? where_clause?   // at least one present
//! select_clause  := "select" select_item ("," select_item)*
//! select_item    := collection_field ("as" identifier)? | collection_path
//! collection_field := collection_path? "." identifier
//! collection_path  := identifier ("/" identifier)*
//! where_clause   := "where" bool_expr
//! bool_expr      := ( "(" bool_expr ")" | condition ) ( ("and"|"or") bool_expr )?
//! condition      := operand operator operand | operand "in" operand
//! operand        := collection_field | collection_path | literal | "?"
//! literal        := quoted_string | integer
//! ```
//!
//! Note the recursive tail of `bool_expr`: `and`/`or` bind to the right
//! of the current term, so `A and B or C` parses as `A and (B or C)`.

use crate::docql_ast::*;
use crate::docql_lexer::{Lexer, Token, TokenKind};
use crate::error::{Error, Result};

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    /// Parse a DocQL query string.
    pub fn parse(query: &str) -> Result<Query> {
        let tokens = Lexer::new(query).tokenize()?;
        let mut parser = Parser {
            tokens,
            position: 0,
        };
        let ast = parser.parse_query()?;
        parser.expect_eof()?;
        Ok(ast)
    }

    fn parse_query(&mut self) -> Result<Query> {
        let select = if self.current().kind == TokenKind::Select {
            self.advance();
            Some(self.parse_select_items()?)
        } else {
            None
        };
        let where_clause = if self.current().kind == TokenKind::Where {
            self.advance();
            Some(self.parse_bool_expr()?)
        } else {
            None
        };
        if select.is_none() && where_clause.is_none() {
            return Err(self.error("expected 'select' or 'where'"));
        }
        Ok(Query {
            select,
            where_clause,
        })
    }

    fn parse_select_items(&mut self) -> Result<Vec<SelectItem>> {
        let mut items = vec![self.parse_select_item()?];
        while self.current().kind == TokenKind::Comma {
            self.advance();
            items.push(self.parse_select_item()?);
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        // A leading dot is a field of the implicit current collection.
        if self.current().kind == TokenKind::Dot {
            self.advance();
            let field = self.parse_identifier()?;
            let alias = self.parse_alias()?;
            return Ok(SelectItem::Field {
                collection: None,
                field,
                alias,
            });
        }
        let path = self.parse_collection_path()?;
        if self.current().kind == TokenKind::Dot {
            self.advance();
            let field = self.parse_identifier()?;
            let alias = self.parse_alias()?;
            Ok(SelectItem::Field {
                collection: Some(path),
                field,
                alias,
            })
        } else {
            Ok(SelectItem::Collection(path))
        }
    }

    fn parse_alias(&mut self) -> Result<Option<String>> {
        if self.current().kind == TokenKind::As {
            self.advance();
            Ok(Some(self.parse_identifier()?))
        } else {
            Ok(None)
        }
    }

    fn parse_collection_path(&mut self) -> Result<String> {
        let mut path = self.parse_identifier()?;
        while self.current().kind == TokenKind::Slash {
            self.advance();
            path.push('/');
            path.push_str(&self.parse_identifier()?);
        }
        Ok(path)
    }

    /// `bool_expr := term (("and"|"or") bool_expr)?` — the recursive
    /// tail makes chained `and`/`or` group to the right.
    fn parse_bool_expr(&mut self) -> Result<BoolExpr> {
        let first = if self.current().kind == TokenKind::LeftParen {
            self.advance();
            let inner = self.parse_bool_expr()?;
            self.expect(TokenKind::RightParen)?;
            inner
        } else {
            BoolExpr::Condition(self.parse_condition()?)
        };
        match self.current().kind {
            TokenKind::And => {
                self.advance();
                let rest = self.parse_bool_expr()?;
                Ok(BoolExpr::And(Box::new(first), Box::new(rest)))
            }
            TokenKind::Or => {
                self.advance();
                let rest = self.parse_bool_expr()?;
                Ok(BoolExpr::Or(Box::new(first), Box::new(rest)))
            }
            _ => Ok(first),
        }
    }

    fn parse_condition(&mut self) -> Result<Condition> {
        let left = self.parse_operand()?;
        let op = match self.current().kind {
            TokenKind::Equal => CompareOp::Eq,
            TokenKind::NotEqual => CompareOp::Ne,
            TokenKind::GreaterEq => CompareOp::Ge,
            TokenKind::LessEq => CompareOp::Le,
            TokenKind::Greater => CompareOp::Gt,
            TokenKind::Less => CompareOp::Lt,
            TokenKind::In => {
                self.advance();
                let right = self.parse_operand()?;
                return Ok(Condition::In { left, right });
            }
            _ => return Err(self.error("expected a comparison operator or 'in'")),
        };
        self.advance();
        let right = self.parse_operand()?;
        Ok(Condition::Compare { left, op, right })
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        match self.current().kind.clone() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(Operand::Str(s))
            }
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Operand::Int(n))
            }
            TokenKind::Question => {
                self.advance();
                Ok(Operand::Placeholder)
            }
            TokenKind::Dot => {
                self.advance();
                let field = self.parse_identifier()?;
                Ok(Operand::Field {
                    collection: None,
                    field,
                })
            }
            TokenKind::Identifier(_) => {
                let path = self.parse_collection_path()?;
                if self.current().kind == TokenKind::Dot {
                    self.advance();
                    let field = self.parse_identifier()?;
                    Ok(Operand::Field {
                        collection: Some(path),
                        field,
                    })
                } else {
                    Ok(Operand::Collection(path))
                }
            }
            _ => Err(self.error("expected an operand")),
        }
    }

    fn parse_identifier(&mut self) -> Result<String> {
        match self.current().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("expected an identifier")),
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn advance(&mut self) {
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.current().kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("expected {}", kind)))
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        if self.current().kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    fn error(&self, message: &str) -> Error {
        let token = self.current();
        Error::Parse {
            message: format!("{}, got {}", message, token.kind),
            position: token.pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(collection: &str, name: &str) -> Operand {
        Operand::Field {
            collection: Some(collection.to_string()),
            field: name.to_string(),
        }
    }

    #[test]
    fn test_select_only() {
        let query = Parser::parse("select subject.code, study").unwrap();
        assert_eq!(
            query.select,
            Some(vec![
                SelectItem::Field {
                    collection: Some("subject".to_string()),
                    field: "code".to_string(),
                    alias: None,
                },
                SelectItem::Collection("study".to_string()),
            ])
        );
        assert!(query.where_clause.is_none());
    }

    #[test]
    fn test_select_alias_and_path() {
        let query = Parser::parse("select study000/subjects.code as c").unwrap();
        assert_eq!(
            query.select,
            Some(vec![SelectItem::Field {
                collection: Some("study000/subjects".to_string()),
                field: "code".to_string(),
                alias: Some("c".to_string()),
            }])
        );
    }

    #[test]
    fn test_where_only() {
        let query = Parser::parse(r#"where subject.code = "s0""#).unwrap();
        assert!(query.select.is_none());
        assert_eq!(
            query.where_clause,
            Some(BoolExpr::Condition(Condition::Compare {
                left: field("subject", "code"),
                op: CompareOp::Eq,
                right: Operand::Str("s0".to_string()),
            }))
        );
    }

    #[test]
    fn test_in_condition() {
        let query = Parser::parse(r#"where "subject/1" in acquisition.concerns"#).unwrap();
        assert_eq!(
            query.where_clause,
            Some(BoolExpr::Condition(Condition::In {
                left: Operand::Str("subject/1".to_string()),
                right: field("acquisition", "concerns"),
            }))
        );
    }

    #[test]
    fn test_and_or_chains_to_the_right() {
        let query = Parser::parse("where a.x = 1 and b.y = 2 or c.z = 3").unwrap();
        let cond = |coll: &str, f: &str, n: i64| {
            BoolExpr::Condition(Condition::Compare {
                left: field(coll, f),
                op: CompareOp::Eq,
                right: Operand::Int(n),
            })
        };
        // a.x = 1 and (b.y = 2 or c.z = 3), not left-to-right.
        assert_eq!(
            query.where_clause,
            Some(BoolExpr::And(
                Box::new(cond("a", "x", 1)),
                Box::new(BoolExpr::Or(
                    Box::new(cond("b", "y", 2)),
                    Box::new(cond("c", "z", 3)),
                )),
            ))
        );
    }

    #[test]
    fn test_parenthesized_expression() {
        let query = Parser::parse("where (a.x = 1 or b.y = 2) and c.z = 3").unwrap();
        assert!(matches!(
            query.where_clause,
            Some(BoolExpr::And(l, _)) if matches!(*l, BoolExpr::Or(_, _))
        ));
    }

    #[test]
    fn test_placeholder_operand() {
        let query = Parser::parse("where subject.code = ?").unwrap();
        assert_eq!(
            query.where_clause,
            Some(BoolExpr::Condition(Condition::Compare {
                left: field("subject", "code"),
                op: CompareOp::Eq,
                right: Operand::Placeholder,
            }))
        );
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(matches!(
            Parser::parse("").unwrap_err(),
            Error::Parse { .. }
        ));
    }

    #[test]
    fn test_trailing_input_rejected() {
        assert!(matches!(
            Parser::parse("select study nonsense nonsense").unwrap_err(),
            Error::Parse { .. }
        ));
    }

    #[test]
    fn test_error_carries_position() {
        let err = Parser::parse("select study where").unwrap_err();
        match err {
            // The operand is missing; the error points at end of input.
            Error::Parse { position, .. } => assert_eq!(position, 18),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
