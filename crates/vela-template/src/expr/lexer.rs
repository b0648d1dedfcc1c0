//! Tokenizer for expressions.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Identifier(String),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    Null,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

pub(crate) struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }

    pub(crate) fn next_token(&mut self) -> Result<Token, ExprError> {
        self.skip_whitespace();

        let Some(ch) = self.peek_char() else {
            return Ok(Token::Eof);
        };
        let start = self.pos;

        // Two-character operators first
        let two = match (ch, self.peek_second()) {
            ('&', Some('&')) => Some(Token::AndAnd),
            ('|', Some('|')) => Some(Token::OrOr),
            ('=', Some('=')) => Some(Token::EqEq),
            ('!', Some('=')) => Some(Token::NotEq),
            ('<', Some('=')) => Some(Token::Le),
            ('>', Some('=')) => Some(Token::Ge),
            _ => None,
        };
        if let Some(token) = two {
            self.pos += 2;
            return Ok(token);
        }

        let single = match ch {
            '(' => Some(Token::OpenParen),
            ')' => Some(Token::CloseParen),
            '[' => Some(Token::OpenBracket),
            ']' => Some(Token::CloseBracket),
            ',' => Some(Token::Comma),
            '.' => Some(Token::Dot),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '!' => Some(Token::Bang),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            _ => None,
        };
        if let Some(token) = single {
            self.pos += 1;
            return Ok(token);
        }

        if ch == '"' || ch == '\'' {
            return self.read_string(ch);
        }

        if ch.is_ascii_digit() {
            return self.read_number();
        }

        if ch.is_alphabetic() || ch == '_' || ch == '$' {
            while let Some(c) = self.peek_char() {
                if c.is_alphanumeric() || c == '_' || c == '$' {
                    self.pos += c.len_utf8();
                } else {
                    break;
                }
            }
            let word = &self.input[start..self.pos];
            return Ok(match word {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                _ => Token::Identifier(word.to_string()),
            });
        }

        Err(ExprError::syntax(start, format!("unexpected character '{ch}'")))
    }

    fn read_string(&mut self, quote: char) -> Result<Token, ExprError> {
        let start = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(ExprError::syntax(start, "unterminated string")),
                Some(c) if c == quote => return Ok(Token::Str(value)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some(other) => {
                            return Err(ExprError::syntax(
                                self.pos,
                                format!("unknown escape '\\{other}'"),
                            ));
                        }
                        None => return Err(ExprError::syntax(start, "unterminated string")),
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, ExprError> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == '.' && !is_float && self.peek_second().is_some_and(|d| d.is_ascii_digit()) {
                is_float = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ExprError::syntax(start, format!("invalid number '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| ExprError::syntax(start, format!("invalid number '{text}'")))
        }
    }
}
