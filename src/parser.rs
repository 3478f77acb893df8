use crate::{
    ast::{BinaryOperator, Expression},
    error::{YamletError, YamletResult},
    lexer::{Lexer, Token, TokenKind},
    value::Value,
};

/// Parses expression text into an AST. The whole input must reduce to a
/// single expression.
pub fn parse(source: &str) -> YamletResult<Expression> {
    let tokens = Lexer::new(source).lex()?;
    let mut parser = Parser::new(tokens);
    parser.parse_complete()
}

/// Returns the text inside the outer parentheses when `scalar`, trimmed, is
/// wrapped in one matching pair; `None` for every other scalar.
///
/// `(1) + (2)` is not wrapped: its first `(` closes before the end.
/// Parentheses inside quoted strings are ignored.
pub fn expression_body(scalar: &str) -> Option<&str> {
    let trimmed = scalar.trim();
    if !trimmed.starts_with('(') || !trimmed.ends_with(')') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (index, ch) in trimmed.char_indices() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return if index == trimmed.len() - 1 {
                        Some(&trimmed[1..index])
                    } else {
                        None
                    };
                }
            }
            _ => {}
        }
    }
    None
}

/// Deepest nesting of groups and argument lists `parse` accepts.
pub const MAX_NESTING_DEPTH: usize = 128;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            depth: 0,
        }
    }

    fn error_here(&self, msg: impl Into<String>) -> YamletError {
        YamletError::syntax(msg, self.current_token().span.start)
    }

    pub fn parse_complete(&mut self) -> YamletResult<Expression> {
        if self.is_at_end() {
            return Err(self.error_here("empty expression"));
        }
        let expr = self.parse_expression()?;
        if !self.is_at_end() {
            return Err(self.error_here(format!(
                "unexpected {} after expression",
                self.current_kind().describe()
            )));
        }
        Ok(expr)
    }

    pub fn parse_expression(&mut self) -> YamletResult<Expression> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error_here("expression nested too deeply"));
        }
        self.depth += 1;
        let expr = self.parse_binary_expression(0);
        self.depth -= 1;
        expr
    }

    fn parse_binary_expression(&mut self, min_precedence: u8) -> YamletResult<Expression> {
        let mut left = self.parse_primary_expression()?;

        while let Some(precedence) = self.current_precedence() {
            if precedence < min_precedence {
                break;
            }
            let op = self.parse_operator()?;
            let right = self.parse_binary_expression(precedence + 1)?;
            left = Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_primary_expression(&mut self) -> YamletResult<Expression> {
        match self.current_kind().clone() {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expression::Literal(Value::Int(value)))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expression::Literal(Value::Float(value)))
            }
            TokenKind::StringLiteral(text) => {
                self.advance();
                Ok(Expression::Literal(Value::Text(text)))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                self.parse_reference(Expression::Identifier(name))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen, "expected ')' to close group")?;
                Ok(Expression::Grouping(Box::new(inner)))
            }
            TokenKind::Eof => Err(self.error_here("expected operand, found end of expression")),
            other => Err(self.error_here(format!("expected operand, found {}", other.describe()))),
        }
    }

    /// `identifier ('.' identifier)* ('(' arglist ')')?`
    fn parse_reference(&mut self, mut expr: Expression) -> YamletResult<Expression> {
        while matches!(self.current_kind(), TokenKind::Dot) {
            self.advance();
            let field = self.consume_identifier("expected attribute name after '.'")?;
            expr = Expression::Attribute {
                base: Box::new(expr),
                field,
            };
        }

        if matches!(self.current_kind(), TokenKind::LParen) {
            self.advance();
            let args = self.parse_argument_list()?;
            self.expect(TokenKind::RParen, "expected ')' after arguments")?;
            expr = Expression::Call {
                callee: Box::new(expr),
                args,
            };
        }

        Ok(expr)
    }

    fn parse_argument_list(&mut self) -> YamletResult<Vec<Expression>> {
        let mut args = Vec::new();
        if matches!(self.current_kind(), TokenKind::RParen) {
            return Ok(args);
        }

        loop {
            args.push(self.parse_expression()?);
            if matches!(self.current_kind(), TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(args)
    }

    fn parse_operator(&mut self) -> YamletResult<BinaryOperator> {
        let op = match self.current_kind() {
            TokenKind::Plus => BinaryOperator::Add,
            TokenKind::Minus => BinaryOperator::Sub,
            TokenKind::Star => BinaryOperator::Mul,
            TokenKind::Slash => BinaryOperator::Div,
            other => {
                return Err(
                    self.error_here(format!("expected operator, found {}", other.describe()))
                )
            }
        };
        self.advance();
        Ok(op)
    }

    fn current_precedence(&self) -> Option<u8> {
        match self.current_kind() {
            TokenKind::Plus | TokenKind::Minus => Some(0),
            TokenKind::Star | TokenKind::Slash => Some(1),
            _ => None,
        }
    }

    fn consume_identifier(&mut self, msg: &str) -> YamletResult<String> {
        if let TokenKind::Identifier(name) = self.current_kind().clone() {
            self.advance();
            Ok(name)
        } else {
            Err(self.error_here(msg))
        }
    }

    fn expect(&mut self, expected: TokenKind, msg: &str) -> YamletResult<()> {
        if std::mem::discriminant(self.current_kind()) == std::mem::discriminant(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!(
                "{}, found {}",
                msg,
                self.current_kind().describe()
            )))
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn current_token(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current_token().kind
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }
}
