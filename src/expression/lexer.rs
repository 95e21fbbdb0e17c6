//! Tokenizer for query expressions.

use serde_json::Value;

use super::error::ParseError;

/// Lexical tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(String),
    QuotedIdentifier(String),
    Number(i64),
    Literal(Value),
    Dot,
    Star,
    Flatten,
    Filter,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    Comma,
    Colon,
    Pipe,
    Or,
    And,
    Not,
    Expref,
    At,
    Dollar,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Eof,
}

impl Token {
    /// Grammar name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Token::Identifier(_) => "unquoted_identifier",
            Token::QuotedIdentifier(_) => "quoted_identifier",
            Token::Number(_) => "number",
            Token::Literal(_) => "literal",
            Token::Dot => "dot",
            Token::Star => "star",
            Token::Flatten => "flatten",
            Token::Filter => "filter",
            Token::LeftBracket => "lbracket",
            Token::RightBracket => "rbracket",
            Token::LeftBrace => "lbrace",
            Token::RightBrace => "rbrace",
            Token::LeftParen => "lparen",
            Token::RightParen => "rparen",
            Token::Comma => "comma",
            Token::Colon => "colon",
            Token::Pipe => "pipe",
            Token::Or => "or",
            Token::And => "and",
            Token::Not => "not",
            Token::Expref => "expref",
            Token::At => "current",
            Token::Dollar => "root",
            Token::Equal => "eq",
            Token::NotEqual => "ne",
            Token::LessThan => "lt",
            Token::LessThanOrEqual => "lte",
            Token::GreaterThan => "gt",
            Token::GreaterThanOrEqual => "gte",
            Token::Eof => "eof",
        }
    }

    /// Source text of the token, as shown in error messages.
    pub fn lexeme(&self) -> String {
        match self {
            Token::Identifier(name) | Token::QuotedIdentifier(name) => name.clone(),
            Token::Number(n) => n.to_string(),
            Token::Literal(value) => value.to_string(),
            Token::Dot => ".".into(),
            Token::Star => "*".into(),
            Token::Flatten => "[]".into(),
            Token::Filter => "[?".into(),
            Token::LeftBracket => "[".into(),
            Token::RightBracket => "]".into(),
            Token::LeftBrace => "{".into(),
            Token::RightBrace => "}".into(),
            Token::LeftParen => "(".into(),
            Token::RightParen => ")".into(),
            Token::Comma => ",".into(),
            Token::Colon => ":".into(),
            Token::Pipe => "|".into(),
            Token::Or => "||".into(),
            Token::And => "&&".into(),
            Token::Not => "!".into(),
            Token::Expref => "&".into(),
            Token::At => "@".into(),
            Token::Dollar => "$".into(),
            Token::Equal => "==".into(),
            Token::NotEqual => "!=".into(),
            Token::LessThan => "<".into(),
            Token::LessThanOrEqual => "<=".into(),
            Token::GreaterThan => ">".into(),
            Token::GreaterThanOrEqual => ">=".into(),
            Token::Eof => String::new(),
        }
    }

    /// Left binding power used by the Pratt parser.
    pub fn lbp(&self) -> u8 {
        match self {
            Token::Pipe => 1,
            Token::Or => 2,
            Token::And => 3,
            Token::Equal
            | Token::NotEqual
            | Token::LessThan
            | Token::LessThanOrEqual
            | Token::GreaterThan
            | Token::GreaterThanOrEqual => 5,
            Token::Flatten => 9,
            Token::Star => 20,
            Token::Filter => 21,
            Token::Dot => 40,
            Token::Not => 45,
            Token::LeftBrace => 50,
            Token::LeftBracket => 55,
            Token::LeftParen => 60,
            _ => 0,
        }
    }
}

/// A token and the character offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Converts expression text into tokens, terminated by [`Token::Eof`].
pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            let start = self.pos;
            let token = match c {
                ' ' | '\t' | '\n' | '\r' => {
                    self.pos += 1;
                    continue;
                }
                '.' => self.single(Token::Dot),
                '*' => self.single(Token::Star),
                ']' => self.single(Token::RightBracket),
                ',' => self.single(Token::Comma),
                ':' => self.single(Token::Colon),
                '@' => self.single(Token::At),
                '$' => self.single(Token::Dollar),
                '(' => self.single(Token::LeftParen),
                ')' => self.single(Token::RightParen),
                '{' => self.single(Token::LeftBrace),
                '}' => self.single(Token::RightBrace),
                '[' => {
                    self.pos += 1;
                    match self.peek() {
                        Some(']') => self.single(Token::Flatten),
                        Some('?') => self.single(Token::Filter),
                        _ => Token::LeftBracket,
                    }
                }
                '&' => self.pair('&', Token::And, Token::Expref),
                '|' => self.pair('|', Token::Or, Token::Pipe),
                '!' => self.pair('=', Token::NotEqual, Token::Not),
                '<' => self.pair('=', Token::LessThanOrEqual, Token::LessThan),
                '>' => self.pair('=', Token::GreaterThanOrEqual, Token::GreaterThan),
                '=' => {
                    self.pos += 1;
                    if self.peek() == Some('=') {
                        self.single(Token::Equal)
                    } else {
                        return Err(self.error(start, "Unknown token '='"));
                    }
                }
                '\'' => self.raw_string(start)?,
                '"' => self.quoted_identifier(start)?,
                '`' => self.json_literal(start)?,
                '-' | '0'..='9' => self.number(start)?,
                c if c.is_ascii_alphabetic() || c == '_' => self.identifier(),
                other => return Err(self.error(start, format!("Unknown token '{other}'"))),
            };
            tokens.push(Spanned {
                token,
                position: start,
            });
        }

        tokens.push(Spanned {
            token: Token::Eof,
            position: self.chars.len(),
        });
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn single(&mut self, token: Token) -> Token {
        self.pos += 1;
        token
    }

    /// Consume one char, then a second `next` if present to pick `matched`.
    fn pair(&mut self, next: char, matched: Token, otherwise: Token) -> Token {
        self.pos += 1;
        if self.peek() == Some(next) {
            self.pos += 1;
            matched
        } else {
            otherwise
        }
    }

    fn identifier(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        Token::Identifier(self.chars[start..self.pos].iter().collect())
    }

    fn number(&mut self, start: usize) -> Result<Token, ParseError> {
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while matches!(self.peek(), Some('0'..='9')) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(self.error(start, "Unknown token '-'"));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<i64>()
            .map(Token::Number)
            .map_err(|_| self.error(start, format!("Number out of range: {text}")))
    }

    /// Read up to the closing `delimiter`, keeping escape sequences intact.
    fn delimited(&mut self, start: usize, delimiter: char) -> Result<String, ParseError> {
        self.pos += 1;
        let mut buffer = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(start, format!("Unclosed {delimiter} delimiter")));
                }
                Some(c) if c == delimiter => {
                    self.pos += 1;
                    return Ok(buffer);
                }
                Some('\\') => {
                    buffer.push('\\');
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        buffer.push(escaped);
                        self.pos += 1;
                    }
                }
                Some(c) => {
                    buffer.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn raw_string(&mut self, start: usize) -> Result<Token, ParseError> {
        let lexeme = self.delimited(start, '\'')?;
        Ok(Token::Literal(Value::String(lexeme.replace("\\'", "'"))))
    }

    fn quoted_identifier(&mut self, start: usize) -> Result<Token, ParseError> {
        let lexeme = self.delimited(start, '"')?;
        serde_json::from_str::<String>(&format!("\"{lexeme}\""))
            .map(Token::QuotedIdentifier)
            .map_err(|e| self.error(start, format!("Invalid quoted identifier: {e}")))
    }

    fn json_literal(&mut self, start: usize) -> Result<Token, ParseError> {
        let lexeme = self.delimited(start, '`')?.replace("\\`", "`");
        if let Ok(value) = serde_json::from_str::<Value>(&lexeme) {
            return Ok(Token::Literal(value));
        }
        if is_out_of_range_number(lexeme.trim()) {
            return Err(self.error(start, format!("Number out of range: {}", lexeme.trim())));
        }
        // Legacy form: an unquoted string between backticks.
        serde_json::from_str::<String>(&format!("\"{}\"", lexeme.trim()))
            .map(|s| Token::Literal(Value::String(s)))
            .map_err(|_| self.error(start, format!("Bad token `{lexeme}`")))
    }

    fn error(&self, position: usize, message: impl Into<String>) -> ParseError {
        ParseError::Lexer {
            message: message.into(),
            position,
            expression: self.source.to_string(),
        }
    }
}

/// Numeric text that parses but overflows to infinity, such as `1e400`.
fn is_out_of_range_number(text: &str) -> bool {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    unsigned.starts_with(|c: char| c.is_ascii_digit())
        && text.parse::<f64>().is_ok_and(|n| n.is_infinite())
}
