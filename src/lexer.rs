use crate::error::{YamletError, YamletResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: std::ops::Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Int(i64),
    Float(f64),
    StringLiteral(String),
    Comma,
    Dot,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Identifier(name) => format!("identifier `{}`", name),
            TokenKind::Int(n) => format!("number `{}`", n),
            TokenKind::Float(n) => format!("number `{}`", n),
            TokenKind::StringLiteral(s) => format!("string {:?}", s),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::Dot => "`.`".to_string(),
            TokenKind::LParen => "`(`".to_string(),
            TokenKind::RParen => "`)`".to_string(),
            TokenKind::Plus => "`+`".to_string(),
            TokenKind::Minus => "`-`".to_string(),
            TokenKind::Star => "`*`".to_string(),
            TokenKind::Slash => "`/`".to_string(),
            TokenKind::Eof => "end of expression".to_string(),
        }
    }
}

/// True when `text` lexes as a single identifier token.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some('a'..='z' | 'A'..='Z' | '_'))
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

pub struct Lexer<'a> {
    source: &'a str,
    current_index: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            current_index: 0,
        }
    }

    pub fn lex(mut self) -> YamletResult<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance_char();
                continue;
            }

            let start = self.current_index;
            let kind = match ch {
                'a'..='z' | 'A'..='Z' | '_' => self.read_identifier(),
                '0'..='9' => self.read_number(start)?,
                '"' | '\'' => self.read_string(ch, start)?,
                _ => {
                    let kind = match ch {
                        ',' => TokenKind::Comma,
                        '.' => TokenKind::Dot,
                        '(' => TokenKind::LParen,
                        ')' => TokenKind::RParen,
                        '+' => TokenKind::Plus,
                        '-' => TokenKind::Minus,
                        '*' => TokenKind::Star,
                        '/' => TokenKind::Slash,
                        other => {
                            return Err(YamletError::syntax(
                                format!("unexpected character '{}'", other),
                                start,
                            ))
                        }
                    };
                    self.advance_char();
                    kind
                }
            };

            tokens.push(Token {
                kind,
                span: start..self.current_index,
            });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: self.current_index..self.current_index,
        });

        Ok(tokens)
    }

    fn read_identifier(&mut self) -> TokenKind {
        let start = self.current_index;
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance_char();
            } else {
                break;
            }
        }
        TokenKind::Identifier(self.source[start..self.current_index].to_string())
    }

    fn read_number(&mut self, start: usize) -> YamletResult<TokenKind> {
        self.consume_digits();

        // A '.' only continues the literal when a digit follows it.
        let is_decimal = self.peek_char() == Some('.')
            && self.peek_second().is_some_and(|ch| ch.is_ascii_digit());
        if is_decimal {
            self.advance_char();
            self.consume_digits();
            let text = &self.source[start..self.current_index];
            let value = text.parse::<f64>().map_err(|err| {
                YamletError::syntax(format!("invalid number literal '{}': {}", text, err), start)
            })?;
            return Ok(TokenKind::Float(value));
        }

        let text = &self.source[start..self.current_index];
        let value = text.parse::<i64>().map_err(|err| {
            YamletError::syntax(format!("invalid number literal '{}': {}", text, err), start)
        })?;
        Ok(TokenKind::Int(value))
    }

    fn read_string(&mut self, quote: char, start: usize) -> YamletResult<TokenKind> {
        self.advance_char(); // opening quote
        let content_start = self.current_index;

        while let Some(ch) = self.peek_char() {
            if ch == quote {
                let content = self.source[content_start..self.current_index].to_string();
                self.advance_char();
                return Ok(TokenKind::StringLiteral(content));
            }
            self.advance_char();
        }

        Err(YamletError::syntax("unterminated string literal", start))
    }

    fn consume_digits(&mut self) {
        while self.peek_char().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance_char();
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.current_index..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.source[self.current_index..].chars().nth(1)
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.current_index += ch.len_utf8();
        Some(ch)
    }
}
