//! Expression language shared by templates, health policies and custom
//! status messages.
//!
//! # Syntax
//!
//! ```text
//! expr    = or
//! or      = and ("||" and)*
//! and     = cmp ("&&" cmp)*
//! cmp     = sum (("==" / "!=" / "<" / "<=" / ">" / ">=") sum)?
//! sum     = prod (("+" / "-") prod)*
//! prod    = unary (("*" / "/" / "%") unary)*
//! unary   = ("!" / "-") unary / postfix
//! postfix = primary ("." ident / "[" expr "]")*
//! primary = number / string / "true" / "false" / "null"
//!         / ident / ident "(" [expr ("," expr)*] ")" / "(" expr ")"
//! ```
//!
//! # Examples
//!
//! ```text
//! parameter.replicas
//! context.output.status.readyReplicas == context.output.status.replicas
//! "type: " + context.output.spec.template.spec.containers[0].image
//! len(context.outputs.service.spec.clusterIP) > 0
//! ```

mod eval;
mod lexer;
mod parser;

pub use eval::Scope;
pub(crate) use eval::{stringify, type_name};
pub use parser::{BinaryOp, Expr, UnaryOp, parse_expression};

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    /// The expression text is malformed.
    #[error("syntax error at offset {pos}: {message}")]
    Syntax { pos: usize, message: String },

    /// A reference has no value in the current scope.
    #[error("unresolved reference {path}")]
    Unresolved { path: String },

    /// An operator or function was applied to values of the wrong type.
    #[error("type error: {message}")]
    Type { message: String },

    /// Call to a function the language does not define.
    #[error("unknown function {name}")]
    UnknownFunction { name: String },
}

impl ExprError {
    pub(crate) fn syntax(pos: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            pos,
            message: message.into(),
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved { .. })
    }
}

/// Parses and evaluates `source` against `scope` in one step.
pub fn evaluate(source: &str, scope: &Scope<'_>) -> Result<serde_json::Value, ExprError> {
    parse_expression(source)?.eval(scope)
}
