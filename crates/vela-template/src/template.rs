//! Template documents and value-template evaluation.
//!
//! A value-template is plain JSON with three extensions:
//!
//! - `"${expr}"` strings evaluate to the typed value of `expr`; strings
//!   that mix text and `${...}` segments interpolate (`$$` is a literal `$`);
//! - object keys ending in `?` are dropped when their value references
//!   something unresolved;
//! - `{"$for": "k, v in expr", "$yield": ...}` inside an array expands once
//!   per element, and `{"$for": ..., "$key": ..., "$value": ...}` builds a map.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::RenderError;
use crate::expr::{Expr, ExprError, Scope, parse_expression, stringify, type_name};
use crate::fetch::FetchRequest;
use crate::schema::ParamSchema;

const FOR_KEY: &str = "$for";
const YIELD_KEY: &str = "$yield";
const MAP_KEY: &str = "$key";
const MAP_VALUE: &str = "$value";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTemplate {
    #[serde(default)]
    parameter: BTreeMap<String, ParamSchema>,
    #[serde(default)]
    processing: Option<RawProcessing>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    outputs: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProcessing {
    http: Value,
}

/// A parsed capability template with all expressions compiled.
#[derive(Debug, Clone)]
pub struct Template {
    parameter: BTreeMap<String, ParamSchema>,
    http: Option<Node>,
    output: Option<Node>,
    outputs: BTreeMap<String, Node>,
}

impl Template {
    /// Parses and compiles a template document.
    pub fn parse(document: &Value) -> Result<Self, RenderError> {
        let raw: RawTemplate = serde_json::from_value(document.clone())
            .map_err(|e| RenderError::invalid_template(e.to_string()))?;

        if raw.output.is_none() && raw.outputs.is_empty() {
            return Err(RenderError::invalid_template(
                "template declares neither output nor outputs",
            ));
        }

        let http = raw
            .processing
            .map(|p| Node::compile(&p.http, "processing.http"))
            .transpose()?;
        let output = raw
            .output
            .as_ref()
            .map(|o| Node::compile(o, "output"))
            .transpose()?;
        let outputs = raw
            .outputs
            .iter()
            .map(|(key, value)| Ok((key.clone(), Node::compile(value, &format!("outputs.{key}"))?)))
            .collect::<Result<_, RenderError>>()?;

        Ok(Self {
            parameter: raw.parameter,
            http,
            output,
            outputs,
        })
    }

    pub fn parameter_schema(&self) -> &BTreeMap<String, ParamSchema> {
        &self.parameter
    }

    pub fn has_processing(&self) -> bool {
        self.http.is_some()
    }

    /// Evaluates `processing.http` into a request, if the template has one.
    pub(crate) fn fetch_request(&self, scope: &Scope<'_>) -> Result<Option<FetchRequest>, RenderError> {
        let Some(node) = &self.http else {
            return Ok(None);
        };
        let value = node.eval(scope, "processing.http")?;
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| RenderError::invalid_template(format!("processing.http: {e}")))
    }

    pub(crate) fn eval_output(&self, scope: &Scope<'_>) -> Result<Option<Value>, RenderError> {
        self.output
            .as_ref()
            .map(|node| node.eval(scope, "output"))
            .transpose()
    }

    /// Evaluates every auxiliary output in key order.
    pub(crate) fn eval_outputs(
        &self,
        scope: &Scope<'_>,
    ) -> Result<BTreeMap<String, Value>, RenderError> {
        self.outputs
            .iter()
            .map(|(key, node)| Ok((key.clone(), node.eval(scope, &format!("outputs.{key}"))?)))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone)]
struct ForClause {
    key_var: Option<String>,
    value_var: String,
    source: Expr,
}

#[derive(Debug, Clone)]
struct Field {
    key: String,
    optional: bool,
    value: Node,
}

#[derive(Debug, Clone)]
enum Element {
    Item(Node),
    Expand(ForClause, Node),
}

#[derive(Debug, Clone)]
enum Node {
    Literal(Value),
    Expr(Expr),
    Interpolate(Vec<Segment>),
    Array(Vec<Element>),
    Object(Vec<Field>),
    MapFor(ForClause, Box<Node>, Box<Node>),
}

impl Node {
    fn compile(value: &Value, field: &str) -> Result<Self, RenderError> {
        match value {
            Value::String(s) => compile_string(s, field),
            Value::Array(items) => {
                let mut elements = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let path = format!("{field}[{i}]");
                    match item.as_object().filter(|m| m.contains_key(FOR_KEY)) {
                        Some(map) => {
                            let (clause, body) = compile_array_for(map, &path)?;
                            elements.push(Element::Expand(clause, body));
                        }
                        None => elements.push(Element::Item(Node::compile(item, &path)?)),
                    }
                }
                Ok(Node::Array(elements))
            }
            Value::Object(map) if map.contains_key(FOR_KEY) => compile_map_for(map, field),
            Value::Object(map) => {
                let mut fields = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let (key, optional) = match key.strip_suffix('?') {
                        Some(stripped) => (stripped.to_string(), true),
                        None => (key.clone(), false),
                    };
                    let path = format!("{field}.{key}");
                    fields.push(Field {
                        value: Node::compile(value, &path)?,
                        key,
                        optional,
                    });
                }
                Ok(Node::Object(fields))
            }
            other => Ok(Node::Literal(other.clone())),
        }
    }

    fn eval(&self, scope: &Scope<'_>, field: &str) -> Result<Value, RenderError> {
        match self {
            Node::Literal(value) => Ok(value.clone()),
            Node::Expr(expr) => expr
                .eval(scope)
                .map_err(|e| RenderError::expression(field, e)),
            Node::Interpolate(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(text) => out.push_str(text),
                        Segment::Expr(expr) => {
                            let value = expr
                                .eval(scope)
                                .map_err(|e| RenderError::expression(field, e))?;
                            out.push_str(&stringify(&value));
                        }
                    }
                }
                Ok(Value::String(out))
            }
            Node::Array(elements) => {
                let mut out = Vec::new();
                for element in elements {
                    let path = format!("{field}[{}]", out.len());
                    match element {
                        Element::Item(node) => out.push(node.eval(scope, &path)?),
                        Element::Expand(clause, body) => {
                            for child in clause.bindings(scope, &path)? {
                                let path = format!("{field}[{}]", out.len());
                                out.push(body.eval(&child, &path)?);
                            }
                        }
                    }
                }
                Ok(Value::Array(out))
            }
            Node::Object(fields) => {
                let mut out = Map::new();
                for f in fields {
                    let path = format!("{field}.{}", f.key);
                    match f.value.eval(scope, &path) {
                        Ok(value) => {
                            out.insert(f.key.clone(), value);
                        }
                        Err(e) if f.optional && e.is_unresolved() => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(Value::Object(out))
            }
            Node::MapFor(clause, key, value) => {
                let mut out = Map::new();
                for child in clause.bindings(scope, field)? {
                    let name = match key.eval(&child, field)? {
                        Value::String(s) => s,
                        other => {
                            return Err(RenderError::expression(
                                field,
                                ExprError::type_error(format!(
                                    "map key must be a string, found {}",
                                    type_name(&other)
                                )),
                            ));
                        }
                    };
                    let path = format!("{field}.{name}");
                    let v = value.eval(&child, &path)?;
                    out.insert(name, v);
                }
                Ok(Value::Object(out))
            }
        }
    }
}

impl ForClause {
    fn parse(source: &str, field: &str) -> Result<Self, RenderError> {
        let invalid = |message: &str| {
            RenderError::invalid_template(format!("{field}: {message} in \"$for\": {source:?}"))
        };

        let (vars, expr) = source
            .split_once(" in ")
            .ok_or_else(|| invalid("expected `<vars> in <expr>`"))?;
        let vars: Vec<&str> = vars.split(',').map(str::trim).collect();
        if vars.iter().any(|v| !is_identifier(v)) {
            return Err(invalid("invalid loop variable"));
        }
        let (key_var, value_var) = match vars.as_slice() {
            [value] => (None, value.to_string()),
            [key, value] => (Some(key.to_string()), value.to_string()),
            _ => return Err(invalid("expected one or two loop variables")),
        };
        let source = parse_expression(expr.trim())
            .map_err(|e| RenderError::invalid_template(format!("{field}: {e}")))?;

        Ok(Self {
            key_var,
            value_var,
            source,
        })
    }

    /// Child scopes, one per iterated element. Maps iterate in key order.
    fn bindings<'a>(
        &self,
        scope: &Scope<'a>,
        field: &str,
    ) -> Result<Vec<Scope<'a>>, RenderError> {
        let collection = self
            .source
            .eval(scope)
            .map_err(|e| RenderError::expression(field, e))?;

        let pairs: Vec<(Value, Value)> = match collection {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i as u64), item))
                .collect(),
            Value::Object(map) => {
                let mut entries: Vec<(String, Value)> = map.into_iter().collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                entries
                    .into_iter()
                    .map(|(k, v)| (Value::String(k), v))
                    .collect()
            }
            other => {
                return Err(RenderError::expression(
                    field,
                    ExprError::type_error(format!("cannot iterate over {}", type_name(&other))),
                ));
            }
        };

        Ok(pairs
            .into_iter()
            .map(|(k, v)| {
                let child = match &self.key_var {
                    Some(key_var) => scope.bind(key_var.clone(), k),
                    None => scope.clone(),
                };
                child.bind(self.value_var.clone(), v)
            })
            .collect())
    }
}

fn compile_array_for(map: &Map<String, Value>, field: &str) -> Result<(ForClause, Node), RenderError> {
    if map.len() != 2 || !map.contains_key(YIELD_KEY) {
        return Err(RenderError::invalid_template(format!(
            "{field}: array comprehension takes exactly \"$for\" and \"$yield\""
        )));
    }
    let clause = for_clause(map, field)?;
    let body = Node::compile(&map[YIELD_KEY], field)?;
    Ok((clause, body))
}

fn compile_map_for(map: &Map<String, Value>, field: &str) -> Result<Node, RenderError> {
    if map.len() != 3 || !map.contains_key(MAP_KEY) || !map.contains_key(MAP_VALUE) {
        return Err(RenderError::invalid_template(format!(
            "{field}: map comprehension takes exactly \"$for\", \"$key\" and \"$value\""
        )));
    }
    let clause = for_clause(map, field)?;
    let key = Node::compile(&map[MAP_KEY], field)?;
    let value = Node::compile(&map[MAP_VALUE], field)?;
    Ok(Node::MapFor(clause, Box::new(key), Box::new(value)))
}

fn for_clause(map: &Map<String, Value>, field: &str) -> Result<ForClause, RenderError> {
    match &map[FOR_KEY] {
        Value::String(source) => ForClause::parse(source, field),
        _ => Err(RenderError::invalid_template(format!(
            "{field}: \"$for\" must be a string"
        ))),
    }
}

fn compile_string(s: &str, field: &str) -> Result<Node, RenderError> {
    let segments = split_segments(s)
        .map_err(|message| RenderError::invalid_template(format!("{field}: {message}")))?;

    let mut compiled = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            RawSegment::Text(text) => compiled.push(Segment::Text(text)),
            RawSegment::Expr(source) => {
                let expr = parse_expression(&source)
                    .map_err(|e| RenderError::invalid_template(format!("{field}: {e}")))?;
                compiled.push(Segment::Expr(expr));
            }
        }
    }

    Ok(match compiled.as_slice() {
        [] => Node::Literal(Value::String(String::new())),
        [Segment::Text(text)] => Node::Literal(Value::String(text.clone())),
        [Segment::Expr(expr)] => Node::Expr(expr.clone()),
        _ => Node::Interpolate(compiled),
    })
}

#[derive(Debug, PartialEq)]
enum RawSegment {
    Text(String),
    Expr(String),
}

/// Splits a string into literal text and `${...}` expression sources.
fn split_segments(s: &str) -> Result<Vec<RawSegment>, String> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = s.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if ch != '$' {
            text.push(ch);
            continue;
        }
        match chars.peek() {
            Some((_, '$')) => {
                chars.next();
                text.push('$');
            }
            Some((start, '{')) => {
                let start = start + 1;
                chars.next();
                let mut quote: Option<char> = None;
                let mut end = None;
                while let Some((i, c)) = chars.next() {
                    match (quote, c) {
                        (Some(_), '\\') => {
                            chars.next();
                        }
                        (Some(q), c) if c == q => quote = None,
                        (None, '"' | '\'') => quote = Some(c),
                        (None, '}') => {
                            end = Some(i);
                            break;
                        }
                        _ => {}
                    }
                }
                let end = end.ok_or_else(|| format!("unterminated \"${{\" in {s:?}"))?;
                if !text.is_empty() {
                    segments.push(RawSegment::Text(std::mem::take(&mut text)));
                }
                segments.push(RawSegment::Expr(s[start..end].trim().to_string()));
            }
            _ => text.push('$'),
        }
    }
    if !text.is_empty() {
        segments.push(RawSegment::Text(text));
    }
    Ok(segments)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}
