//! Expression evaluation over JSON values.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::ExprError;
use super::parser::{BinaryOp, Expr, UnaryOp};

/// Variables visible to an expression.
///
/// Locals shadow root fields; the most recently bound local wins.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    root: &'a Value,
    locals: Vec<(String, Value)>,
}

impl<'a> Scope<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            locals: Vec::new(),
        }
    }

    /// Returns a child scope with `name` bound to `value`.
    #[must_use]
    pub fn bind(&self, name: impl Into<String>, value: Value) -> Self {
        let mut child = self.clone();
        child.locals.push((name.into(), value));
        child
    }

    pub fn root(&self) -> &Value {
        self.root
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|(_, value)| value)
            .or_else(|| self.root.get(name))
    }
}

impl Expr {
    /// Evaluates the expression. Missing fields surface as
    /// [`ExprError::Unresolved`] carrying the path that was being read.
    pub fn eval(&self, scope: &Scope<'_>) -> Result<Value, ExprError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Ident(name) => scope.lookup(name).cloned().ok_or_else(|| unresolved(self)),
            Self::Field(base, field) => {
                let base_value = base.eval(scope)?;
                base_value
                    .get(field.as_str())
                    .cloned()
                    .ok_or_else(|| unresolved(self))
            }
            Self::Index(base, index) => {
                let base_value = base.eval(scope)?;
                let index_value = index.eval(scope)?;
                index_into(&base_value, &index_value)?.ok_or_else(|| unresolved(self))
            }
            Self::Unary(op, inner) => {
                let value = inner.eval(scope)?;
                apply_unary(*op, value)
            }
            Self::Binary(BinaryOp::And, left, right) => {
                if !as_bool(&left.eval(scope)?, "&&")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(as_bool(&right.eval(scope)?, "&&")?))
            }
            Self::Binary(BinaryOp::Or, left, right) => {
                if as_bool(&left.eval(scope)?, "||")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(as_bool(&right.eval(scope)?, "||")?))
            }
            Self::Binary(op, left, right) => {
                let left = left.eval(scope)?;
                let right = right.eval(scope)?;
                apply_binary(*op, &left, &right)
            }
            Self::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval(scope))
                    .collect::<Result<Vec<_>, _>>()?;
                call(name, &values)
            }
        }
    }
}

fn unresolved(expr: &Expr) -> ExprError {
    ExprError::Unresolved { path: expr.path() }
}

fn index_into(base: &Value, index: &Value) -> Result<Option<Value>, ExprError> {
    match (base, index) {
        (Value::Array(items), Value::Number(n)) => {
            let Some(i) = n.as_i64() else {
                return Err(ExprError::type_error(format!("array index {n} is not an integer")));
            };
            Ok(usize::try_from(i).ok().and_then(|i| items.get(i)).cloned())
        }
        (Value::Object(map), Value::String(key)) => Ok(map.get(key).cloned()),
        (base, index) => Err(ExprError::type_error(format!(
            "cannot index {} with {}",
            type_name(base),
            type_name(index)
        ))),
    }
}

fn apply_unary(op: UnaryOp, value: Value) -> Result<Value, ExprError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!as_bool(&value, "!")?)),
        UnaryOp::Neg => match Num::from_value(&value) {
            Some(Num::Int(i)) => i
                .checked_neg()
                .map(Value::from)
                .ok_or_else(|| ExprError::type_error("integer overflow")),
            Some(Num::Float(f)) => float_value(-f),
            None => Err(ExprError::type_error(format!(
                "cannot negate {}",
                type_name(&value)
            ))),
        },
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(left, right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Add if left.is_string() || right.is_string() => Ok(Value::String(format!(
            "{}{}",
            stringify(left),
            stringify(right)
        ))),
        BinaryOp::Add => {
            if let (Value::Array(a), Value::Array(b)) = (left, right) {
                return Ok(Value::Array(a.iter().chain(b).cloned().collect()));
            }
            arithmetic(op, left, right)
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(match op {
            BinaryOp::And => as_bool(left, "&&")? && as_bool(right, "&&")?,
            _ => as_bool(left, "||")? || as_bool(right, "||")?,
        })),
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_value(value: &Value) -> Option<Self> {
        let Value::Number(n) = value else {
            return None;
        };
        n.as_i64()
            .map(Num::Int)
            .or_else(|| n.as_f64().map(Num::Float))
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    let (Some(a), Some(b)) = (Num::from_value(left), Num::from_value(right)) else {
        return Err(ExprError::type_error(format!(
            "cannot apply {op:?} to {} and {}",
            type_name(left),
            type_name(right)
        )));
    };

    if let (Num::Int(a), Num::Int(b)) = (a, b) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div | BinaryOp::Rem if b == 0 => {
                return Err(ExprError::type_error("division by zero"));
            }
            // Exact integer division stays integral.
            BinaryOp::Div => match a.checked_rem(b) {
                Some(0) => a.checked_div(b),
                Some(_) => return float_value(a as f64 / b as f64),
                None => None,
            },
            BinaryOp::Rem => a.checked_rem(b),
            _ => None,
        };
        return result
            .map(Value::from)
            .ok_or_else(|| ExprError::type_error("integer overflow"));
    }

    let (a, b) = (a.as_f64(), b.as_f64());
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => {
            return Err(ExprError::type_error("division by zero"));
        }
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return Err(ExprError::type_error(format!("unsupported operator {op:?}"))),
    };
    float_value(result)
}

fn float_value(f: f64) -> Result<Value, ExprError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ExprError::type_error("result is not a finite number"))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (Num::from_value(left), Num::from_value(right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, ExprError> {
    if let (Some(a), Some(b)) = (Num::from_value(left), Num::from_value(right)) {
        return match (a, b) {
            (Num::Int(a), Num::Int(b)) => Ok(a.cmp(&b)),
            (a, b) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| ExprError::type_error("numbers are not comparable")),
        };
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ExprError::type_error(format!(
            "cannot compare {} with {}",
            type_name(left),
            type_name(right)
        ))),
    }
}

fn as_bool(value: &Value, op: &str) -> Result<bool, ExprError> {
    value.as_bool().ok_or_else(|| {
        ExprError::type_error(format!("operand of {op} must be boolean, found {}", type_name(value)))
    })
}

fn call(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let single = |args: &[Value]| -> Result<Value, ExprError> {
        match args {
            [value] => Ok(value.clone()),
            _ => Err(ExprError::type_error(format!(
                "{name}() takes exactly one argument, {} given",
                args.len()
            ))),
        }
    };

    match name {
        "len" => {
            let value = single(args)?;
            let len = match &value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(ExprError::type_error(format!(
                        "len() of {}",
                        type_name(other)
                    )));
                }
            };
            Ok(Value::from(len as u64))
        }
        "string" => Ok(Value::String(stringify(&single(args)?))),
        _ => Err(ExprError::UnknownFunction {
            name: name.to_string(),
        }),
    }
}

/// String form used by `+` concatenation and `string()`.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
