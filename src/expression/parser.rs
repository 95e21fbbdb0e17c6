//! Pratt parser producing [`Node`] trees.
//!
//! Binding powers live on [`Token::lbp`]. Projections stop collecting their
//! right-hand side at any token binding weaker than [`PROJECTION_STOP`].

use std::mem::discriminant;

use super::ast::{Comparator, KeyValuePair, Node};
use super::error::ParseError;
use super::functions;
use super::lexer::{Lexer, Spanned, Token};

const PROJECTION_STOP: u8 = 10;

const STAR_BP: u8 = 20;
const FILTER_BP: u8 = 21;
const DOT_BP: u8 = 40;
const NOT_BP: u8 = 45;
const FLATTEN_BP: u8 = 9;

/// Deepest tree, and deepest chain of nested parser calls, a parse accepts.
pub const MAX_DEPTH: usize = 64;

/// Parse expression text into a tree.
pub fn parse(source: &str) -> Result<Node, ParseError> {
    if source.is_empty() {
        return Err(ParseError::Empty);
    }

    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        source,
        tokens,
        index: 0,
        depth: 0,
    };

    let node = parser.expression(0)?;
    if !matches!(parser.current(), Token::Eof) {
        let token = parser.current_spanned().clone();
        let message = format!("Unexpected token: {}", token.token.lexeme());
        return Err(parser.error_at(&token, message));
    }
    // Some constructs add several levels per token, e.g. `a[][]`.
    if node.depth() > MAX_DEPTH {
        return Err(ParseError::TooDeep { limit: MAX_DEPTH });
    }
    Ok(node)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
    index: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn current_spanned(&self) -> &Spanned {
        let last = self.tokens.len() - 1;
        &self.tokens[self.index.min(last)]
    }

    fn current(&self) -> &Token {
        &self.current_spanned().token
    }

    fn lookahead(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.index + offset).min(last)].token
    }

    fn advance(&mut self) {
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
    }

    /// Consume a token of the same kind as `expected`, or fail.
    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if discriminant(self.current()) == discriminant(&expected) {
            self.advance();
            return Ok(());
        }
        let token = self.current_spanned().clone();
        let message = format!(
            "Expecting: {}, got: {}",
            expected.type_name(),
            token.token.type_name()
        );
        Err(self.error_at(&token, message))
    }

    fn error_at(&self, spanned: &Spanned, message: impl Into<String>) -> ParseError {
        let message = if matches!(spanned.token, Token::Eof) {
            "Invalid jmespath expression: Incomplete expression".to_string()
        } else {
            message.into()
        };
        ParseError::Syntax {
            message,
            position: spanned.position,
            token: spanned.token.lexeme(),
            token_type: spanned.token.type_name(),
            expression: self.source.to_string(),
        }
    }

    fn expression(&mut self, rbp: u8) -> Result<Node, ParseError> {
        let entry = self.depth;
        self.descend()?;
        let token = self.current_spanned().clone();
        self.advance();
        let mut left = self.nud(token)?;

        while rbp < self.current().lbp() {
            self.descend()?;
            let token = self.current_spanned().clone();
            self.advance();
            left = self.led(token, left)?;
        }
        self.depth = entry;
        Ok(left)
    }

    /// Count one more level of nesting; every recursive path passes here.
    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(())
    }

    fn nud(&mut self, spanned: Spanned) -> Result<Node, ParseError> {
        match spanned.token {
            Token::Literal(value) => Ok(Node::Literal(value)),
            Token::Identifier(name) => Ok(Node::Field(name)),
            Token::QuotedIdentifier(name) => {
                if matches!(self.current(), Token::LeftParen) {
                    let token = self.current_spanned().clone();
                    return Err(
                        self.error_at(&token, "Quoted identifier not allowed for function names.")
                    );
                }
                Ok(Node::Field(name))
            }
            Token::Star => {
                let rhs = if matches!(self.current(), Token::RightBracket) {
                    Node::Identity
                } else {
                    self.projection_rhs(STAR_BP)?
                };
                Ok(Node::ValueProjection {
                    lhs: Box::new(Node::Identity),
                    rhs: Box::new(rhs),
                })
            }
            Token::Filter => self.filter(Node::Identity),
            Token::LeftBrace => self.multi_select_hash(),
            Token::LeftParen => {
                let inner = self.expression(0)?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Token::Flatten => {
                let lhs = Node::Flatten(Box::new(Node::Identity));
                let rhs = self.projection_rhs(FLATTEN_BP)?;
                Ok(Node::Projection {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                })
            }
            Token::Not => {
                let inner = self.expression(NOT_BP)?;
                Ok(Node::Not(Box::new(inner)))
            }
            Token::LeftBracket => match self.current() {
                Token::Number(_) | Token::Colon => {
                    let rhs = self.index_expression()?;
                    self.project_if_slice(Node::Identity, rhs)
                }
                Token::Star if matches!(self.lookahead(1), Token::RightBracket) => {
                    self.advance();
                    self.advance();
                    let rhs = self.projection_rhs(STAR_BP)?;
                    Ok(Node::Projection {
                        lhs: Box::new(Node::Identity),
                        rhs: Box::new(rhs),
                    })
                }
                _ => self.multi_select_list(),
            },
            Token::At => Ok(Node::Current),
            Token::Dollar => Ok(Node::Root),
            Token::Expref => {
                let inner = self.expression(0)?;
                Ok(Node::Expref(Box::new(inner)))
            }
            _ => Err(self.error_at(&spanned, "Invalid token.")),
        }
    }

    fn led(&mut self, spanned: Spanned, left: Node) -> Result<Node, ParseError> {
        match spanned.token {
            Token::Dot => {
                if matches!(self.current(), Token::Star) {
                    self.advance();
                    let rhs = self.projection_rhs(DOT_BP)?;
                    Ok(Node::ValueProjection {
                        lhs: Box::new(left),
                        rhs: Box::new(rhs),
                    })
                } else {
                    let rhs = self.dot_rhs(DOT_BP)?;
                    Ok(Node::Subexpression {
                        lhs: Box::new(left),
                        rhs: Box::new(rhs),
                    })
                }
            }
            Token::Pipe => {
                let rhs = self.expression(spanned.token.lbp())?;
                Ok(Node::Pipe {
                    lhs: Box::new(left),
                    rhs: Box::new(rhs),
                })
            }
            Token::Or => {
                let rhs = self.expression(spanned.token.lbp())?;
                Ok(Node::Or {
                    lhs: Box::new(left),
                    rhs: Box::new(rhs),
                })
            }
            Token::And => {
                let rhs = self.expression(spanned.token.lbp())?;
                Ok(Node::And {
                    lhs: Box::new(left),
                    rhs: Box::new(rhs),
                })
            }
            Token::LeftParen => {
                let name = match left {
                    Node::Field(name) => name,
                    _ => return Err(self.error_at(&spanned, "Invalid function name")),
                };
                let mut args = Vec::new();
                while !matches!(self.current(), Token::RightParen) {
                    args.push(self.expression(0)?);
                    if !matches!(self.current(), Token::RightParen) {
                        self.expect(Token::Comma)?;
                    }
                }
                self.expect(Token::RightParen)?;
                functions::check_call_arity(&name, args.len()).map_err(ParseError::Arity)?;
                Ok(Node::Function { name, args })
            }
            Token::Filter => self.filter(left),
            Token::Flatten => {
                let rhs = self.projection_rhs(FLATTEN_BP)?;
                Ok(Node::Projection {
                    lhs: Box::new(Node::Flatten(Box::new(left))),
                    rhs: Box::new(rhs),
                })
            }
            Token::LeftBracket => match self.current() {
                Token::Number(_) | Token::Colon => {
                    let rhs = self.index_expression()?;
                    self.project_if_slice(left, rhs)
                }
                _ => {
                    self.expect(Token::Star)?;
                    self.expect(Token::RightBracket)?;
                    let rhs = self.projection_rhs(STAR_BP)?;
                    Ok(Node::Projection {
                        lhs: Box::new(left),
                        rhs: Box::new(rhs),
                    })
                }
            },
            ref token => match comparator(token) {
                Some(op) => {
                    let rhs = self.expression(token.lbp())?;
                    Ok(Node::Comparator {
                        op,
                        lhs: Box::new(left),
                        rhs: Box::new(rhs),
                    })
                }
                None => Err(self.error_at(&spanned, "Invalid token.")),
            },
        }
    }

    fn filter(&mut self, left: Node) -> Result<Node, ParseError> {
        let condition = self.expression(0)?;
        self.expect(Token::RightBracket)?;
        let rhs = if matches!(self.current(), Token::Flatten) {
            Node::Identity
        } else {
            self.projection_rhs(FILTER_BP)?
        };
        Ok(Node::FilterProjection {
            lhs: Box::new(left),
            rhs: Box::new(rhs),
            condition: Box::new(condition),
        })
    }

    /// Called after `[` when the next token is a number or colon.
    fn index_expression(&mut self) -> Result<Node, ParseError> {
        if matches!(self.lookahead(0), Token::Colon) || matches!(self.lookahead(1), Token::Colon)
        {
            return self.slice_expression();
        }
        let index = match self.current() {
            Token::Number(n) => *n,
            _ => {
                let token = self.current_spanned().clone();
                return Err(self.error_at(&token, "Expecting: number"));
            }
        };
        self.advance();
        self.expect(Token::RightBracket)?;
        Ok(Node::Index(index))
    }

    fn slice_expression(&mut self) -> Result<Node, ParseError> {
        let mut parts: [Option<i64>; 3] = [None, None, None];
        let mut slot = 0;

        loop {
            match self.current() {
                Token::RightBracket => break,
                Token::Colon => {
                    slot += 1;
                    if slot == 3 {
                        let token = self.current_spanned().clone();
                        return Err(self.error_at(&token, "Syntax error: too many colons in slice"));
                    }
                    self.advance();
                }
                Token::Number(n) => {
                    parts[slot] = Some(*n);
                    self.advance();
                }
                _ => {
                    let token = self.current_spanned().clone();
                    return Err(self.error_at(&token, "Expecting: number, colon or rbracket"));
                }
            }
        }

        self.expect(Token::RightBracket)?;
        let [start, stop, step] = parts;
        Ok(Node::Slice { start, stop, step })
    }

    fn project_if_slice(&mut self, left: Node, right: Node) -> Result<Node, ParseError> {
        let is_slice = matches!(right, Node::Slice { .. });
        let indexed = Node::IndexExpression {
            lhs: Box::new(left),
            rhs: Box::new(right),
        };
        if !is_slice {
            return Ok(indexed);
        }
        let rhs = self.projection_rhs(STAR_BP)?;
        Ok(Node::Projection {
            lhs: Box::new(indexed),
            rhs: Box::new(rhs),
        })
    }

    /// Called after `[` has been consumed.
    fn multi_select_list(&mut self) -> Result<Node, ParseError> {
        let mut items = Vec::new();
        loop {
            items.push(self.expression(0)?);
            if matches!(self.current(), Token::RightBracket) {
                break;
            }
            self.expect(Token::Comma)?;
        }
        self.expect(Token::RightBracket)?;
        Ok(Node::MultiSelectList(items))
    }

    /// Called after `{` has been consumed.
    fn multi_select_hash(&mut self) -> Result<Node, ParseError> {
        let mut pairs = Vec::new();
        loop {
            let key = match self.current() {
                Token::Identifier(name) | Token::QuotedIdentifier(name) => name.clone(),
                _ => {
                    let token = self.current_spanned().clone();
                    let message = format!(
                        "Expecting: quoted_identifier or unquoted_identifier, got: {}",
                        token.token.type_name()
                    );
                    return Err(self.error_at(&token, message));
                }
            };
            self.advance();
            self.expect(Token::Colon)?;
            let value = self.expression(0)?;
            pairs.push(KeyValuePair { key, value });

            match self.current() {
                Token::Comma => self.advance(),
                Token::RightBrace => {
                    self.advance();
                    break;
                }
                _ => {
                    let token = self.current_spanned().clone();
                    let message = format!(
                        "Expecting: comma or rbrace, got: {}",
                        token.token.type_name()
                    );
                    return Err(self.error_at(&token, message));
                }
            }
        }
        Ok(Node::MultiSelectHash(pairs))
    }

    fn projection_rhs(&mut self, rbp: u8) -> Result<Node, ParseError> {
        if self.current().lbp() < PROJECTION_STOP {
            return Ok(Node::Identity);
        }
        match self.current() {
            Token::LeftBracket | Token::Filter => self.expression(rbp),
            Token::Dot => {
                self.advance();
                self.dot_rhs(rbp)
            }
            _ => {
                let token = self.current_spanned().clone();
                Err(self.error_at(&token, "Syntax error"))
            }
        }
    }

    fn dot_rhs(&mut self, rbp: u8) -> Result<Node, ParseError> {
        match self.current() {
            Token::Identifier(_) | Token::QuotedIdentifier(_) | Token::Star => self.expression(rbp),
            Token::LeftBracket => {
                self.advance();
                self.multi_select_list()
            }
            Token::LeftBrace => {
                self.advance();
                self.multi_select_hash()
            }
            _ => {
                let token = self.current_spanned().clone();
                let message = format!(
                    "Expecting: [quoted_identifier, unquoted_identifier, lbracket, lbrace], got: {}",
                    token.token.type_name()
                );
                Err(self.error_at(&token, message))
            }
        }
    }
}

fn comparator(token: &Token) -> Option<Comparator> {
    match token {
        Token::Equal => Some(Comparator::Equal),
        Token::NotEqual => Some(Comparator::NotEqual),
        Token::LessThan => Some(Comparator::LessThan),
        Token::LessThanOrEqual => Some(Comparator::LessThanOrEqual),
        Token::GreaterThan => Some(Comparator::GreaterThan),
        Token::GreaterThanOrEqual => Some(Comparator::GreaterThanOrEqual),
        _ => None,
    }
}
