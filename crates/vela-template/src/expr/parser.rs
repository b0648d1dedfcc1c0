//! Recursive-descent parser producing an [`Expr`] tree.

use std::fmt;

use serde_json::Value;

use super::ExprError;
use super::lexer::{Token, Tokenizer};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Binary operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }

    fn comparison(token: &Token) -> Option<Self> {
        match token {
            Token::EqEq => Some(Self::Eq),
            Token::NotEq => Some(Self::Ne),
            Token::Lt => Some(Self::Lt),
            Token::Le => Some(Self::Le),
            Token::Gt => Some(Self::Gt),
            Token::Ge => Some(Self::Ge),
            _ => None,
        }
    }
}

/// Parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Root or local variable reference.
    Ident(String),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    /// Dotted path of a reference expression, used in error messages.
    pub fn path(&self) -> String {
        self.to_string()
    }

    /// Returns the root identifiers referenced anywhere in the expression.
    pub fn roots(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_roots(&mut out);
        out
    }

    fn collect_roots<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::Ident(name) => out.push(name),
            Self::Field(base, _) => base.collect_roots(out),
            Self::Index(base, index) => {
                base.collect_roots(out);
                index.collect_roots(out);
            }
            Self::Unary(_, inner) => inner.collect_roots(out),
            Self::Binary(_, left, right) => {
                left.collect_roots(out);
                right.collect_roots(out);
            }
            Self::Call(_, args) => args.iter().for_each(|a| a.collect_roots(out)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(Value::String(s)) => write!(f, "{s:?}"),
            Self::Literal(v) => write!(f, "{v}"),
            Self::Ident(name) => write!(f, "{name}"),
            Self::Field(base, field) => write!(f, "{base}.{field}"),
            Self::Index(base, index) => write!(f, "{base}[{index}]"),
            Self::Unary(UnaryOp::Not, inner) => write!(f, "!{inner}"),
            Self::Unary(UnaryOp::Neg, inner) => write!(f, "-{inner}"),
            Self::Binary(op, left, right) => write!(f, "{left} {} {right}", op.symbol()),
            Self::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

struct Parser<'a> {
    tokenizer: Tokenizer<'a>,
    current: Token,
    /// Offset where `current` starts.
    current_pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, ExprError> {
        let mut tokenizer = Tokenizer::new(input);
        let current = tokenizer.next_token()?;
        Ok(Self {
            tokenizer,
            current,
            current_pos: 0,
        })
    }

    fn advance(&mut self) -> Result<(), ExprError> {
        self.current_pos = self.tokenizer.pos();
        self.current = self.tokenizer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ExprError> {
        if self.current != token {
            return Err(ExprError::syntax(self.current_pos, format!("expected {what}")));
        }
        self.advance()
    }

    fn parse(&mut self) -> Result<Expr, ExprError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.current == Token::OrOr {
            self.advance()?;
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_comparison()?;
        while self.current == Token::AndAnd {
            self.advance()?;
            let right = self.parse_comparison()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// Comparisons do not chain: `a < b < c` is a syntax error.
    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_sum()?;
        let Some(op) = BinaryOp::comparison(&self.current) else {
            return Ok(left);
        };
        self.advance()?;
        let right = self.parse_sum()?;
        if BinaryOp::comparison(&self.current).is_some() {
            return Err(ExprError::syntax(
                self.current_pos,
                "comparison operators cannot be chained",
            ));
        }
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_sum(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_product()?;
        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance()?;
            let right = self.parse_product()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_product(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.current {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        self.advance()?;
        let inner = self.parse_unary()?;
        Ok(Expr::Unary(op, Box::new(inner)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current {
                Token::Dot => {
                    self.advance()?;
                    let Token::Identifier(field) = &self.current else {
                        return Err(ExprError::syntax(
                            self.current_pos,
                            "expected field name after '.'",
                        ));
                    };
                    let field = field.clone();
                    self.advance()?;
                    expr = Expr::Field(Box::new(expr), field);
                }
                Token::OpenBracket => {
                    self.advance()?;
                    let index = self.parse()?;
                    self.expect(Token::CloseBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let expr = match &self.current {
            Token::OpenParen => {
                self.advance()?;
                let inner = self.parse()?;
                self.expect(Token::CloseParen, "')'")?;
                return Ok(inner);
            }
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                if self.current == Token::OpenParen {
                    self.advance()?;
                    let args = self.parse_arguments()?;
                    return Ok(Expr::Call(name, args));
                }
                return Ok(Expr::Ident(name));
            }
            Token::Str(s) => Expr::Literal(Value::String(s.clone())),
            Token::Int(n) => Expr::Literal(Value::from(*n)),
            Token::Float(n) => Expr::Literal(Value::from(*n)),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Null => Expr::Literal(Value::Null),
            Token::Eof => {
                return Err(ExprError::syntax(
                    self.current_pos,
                    "unexpected end of expression",
                ));
            }
            other => {
                return Err(ExprError::syntax(
                    self.current_pos,
                    format!("unexpected token {other:?}"),
                ));
            }
        };
        self.advance()?;
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.current == Token::CloseParen {
            self.advance()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse()?);
            match self.current {
                Token::Comma => self.advance()?,
                Token::CloseParen => {
                    self.advance()?;
                    return Ok(args);
                }
                _ => {
                    return Err(ExprError::syntax(
                        self.current_pos,
                        "expected ',' or ')' in argument list",
                    ));
                }
            }
        }
    }
}

/// Parses an expression string.
pub fn parse_expression(input: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse()?;

    if parser.current != Token::Eof {
        return Err(ExprError::syntax(
            parser.current_pos,
            "unexpected tokens after expression",
        ));
    }

    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    #[test]
    fn test_parse_path() {
        let expr = parse_expression("context.output.spec.containers[0].image").unwrap();
        assert_eq!(expr.path(), "context.output.spec.containers[0].image");
        assert_eq!(expr.roots(), vec!["context"]);
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse_expression("a + b * 2 == c || !d").unwrap();
        let expected = Expr::Binary(
            BinaryOp::Or,
            Box::new(Expr::Binary(
                BinaryOp::Eq,
                Box::new(Expr::Binary(
                    BinaryOp::Add,
                    ident("a"),
                    Box::new(Expr::Binary(
                        BinaryOp::Mul,
                        ident("b"),
                        Box::new(Expr::Literal(json!(2))),
                    )),
                )),
                ident("c"),
            )),
            Box::new(Expr::Unary(UnaryOp::Not, ident("d"))),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_parse_call_and_grouping() {
        let expr = parse_expression("len(parameter.cmd) > (1 + 1)").unwrap();
        assert_eq!(expr.to_string(), "len(parameter.cmd) > 1 + 1");
        assert_eq!(expr.roots(), vec!["parameter"]);
    }

    #[test]
    fn test_parse_errors() {
        for input in ["", "a.", "a[1", "(a", "a b", "a < b < c", "f(a b)"] {
            let err = parse_expression(input).unwrap_err();
            assert!(
                matches!(err, ExprError::Syntax { .. }),
                "{input:?} should fail with a syntax error, got {err:?}"
            );
        }
    }
}
