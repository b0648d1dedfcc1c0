//! Health-policy and custom-status evaluation against live objects.
//!
//! Both take an expression over `context` (with `context.output` and
//! `context.outputs` bound to the live objects) and `parameter`. A
//! leading `isHealth:` or `message:` label is accepted and ignored.

use serde_json::{Map, Value};

use crate::context::RenderContext;
use crate::error::RenderError;
use crate::expr::{ExprError, Scope, parse_expression, stringify, type_name};

const HEALTH_PREFIX: &str = "isHealth:";
const MESSAGE_PREFIX: &str = "message:";

fn status_root(context: &RenderContext, parameter: &Value) -> Value {
    let mut root = Map::new();
    root.insert("context".into(), context.to_value());
    root.insert("parameter".into(), parameter.clone());
    Value::Object(root)
}

fn strip_label<'a>(source: &'a str, label: &str) -> &'a str {
    let trimmed = source.trim();
    trimmed.strip_prefix(label).unwrap_or(trimmed).trim()
}

/// Evaluates a health policy.
///
/// No policy means healthy. A policy that reads a field the live object
/// does not have yet is unhealthy rather than an error.
pub fn evaluate_health(
    policy: Option<&str>,
    context: &RenderContext,
    parameter: &Value,
) -> Result<bool, RenderError> {
    let Some(source) = policy.map(|p| strip_label(p, HEALTH_PREFIX)).filter(|p| !p.is_empty())
    else {
        return Ok(true);
    };

    let expr = parse_expression(source).map_err(|e| RenderError::expression("healthPolicy", e))?;
    let root = status_root(context, parameter);
    match expr.eval(&Scope::new(&root)) {
        Ok(Value::Bool(healthy)) => Ok(healthy),
        Ok(other) => Err(RenderError::expression(
            "healthPolicy",
            ExprError::Type {
                message: format!("health policy must be boolean, found {}", type_name(&other)),
            },
        )),
        Err(ExprError::Unresolved { path }) => {
            tracing::trace!(component = %context.name, %path, "Health policy unresolved");
            Ok(false)
        }
        Err(e) => Err(RenderError::expression("healthPolicy", e)),
    }
}

/// Evaluates a custom status message.
///
/// Returns `None` when there is no expression or it references something
/// the live objects do not have yet.
pub fn evaluate_custom_status(
    custom_status: Option<&str>,
    context: &RenderContext,
    parameter: &Value,
) -> Result<Option<String>, RenderError> {
    let Some(source) = custom_status
        .map(|s| strip_label(s, MESSAGE_PREFIX))
        .filter(|s| !s.is_empty())
    else {
        return Ok(None);
    };

    let expr =
        parse_expression(source).map_err(|e| RenderError::expression("customStatus", e))?;
    let root = status_root(context, parameter);
    match expr.eval(&Scope::new(&root)) {
        Ok(value) => Ok(Some(stringify(&value))),
        Err(ExprError::Unresolved { .. }) => Ok(None),
        Err(e) => Err(RenderError::expression("customStatus", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn live_context() -> RenderContext {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "gameconfig".to_string(),
            json!({"kind": "ConfigMap", "data": {"enemies": "alien", "lives": "3"}}),
        );
        RenderContext::new("myweb", "app", "default")
            .with_output(json!({
                "kind": "Deployment",
                "spec": {"template": {"spec": {"containers": [{"image": "busybox"}]}}},
                "status": {"replicas": 1, "readyReplicas": 1}
            }))
            .with_outputs(outputs)
    }

    #[test]
    fn test_health_policy() {
        let ctx = live_context();
        let policy = "isHealth: context.output.status.readyReplicas == context.output.status.replicas";
        assert!(evaluate_health(Some(policy), &ctx, &json!({})).unwrap());
        assert!(evaluate_health(None, &ctx, &json!({})).unwrap());
        assert!(evaluate_health(Some("  "), &ctx, &json!({})).unwrap());
    }

    #[test]
    fn test_health_policy_unresolved_is_unhealthy() {
        let ctx = RenderContext::new("myweb", "app", "default")
            .with_output(json!({"kind": "Deployment", "status": {}}));
        let policy = "context.output.status.readyReplicas > 0";
        assert!(!evaluate_health(Some(policy), &ctx, &json!({})).unwrap());
    }

    #[test]
    fn test_health_policy_must_be_boolean() {
        let ctx = live_context();
        let err = evaluate_health(Some("context.output.kind"), &ctx, &json!({})).unwrap_err();
        assert!(matches!(err, RenderError::Expression { .. }));

        let err = evaluate_health(Some("context.output.kind =="), &ctx, &json!({})).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Expression {
                source: ExprError::Syntax { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_custom_status_message() {
        let ctx = live_context();
        let status = r#"message: "type: " + context.output.spec.template.spec.containers[0].image + ",\t enemies:" + context.outputs.gameconfig.data.enemies"#;
        assert_eq!(
            evaluate_custom_status(Some(status), &ctx, &json!({})).unwrap(),
            Some("type: busybox,\t enemies:alien".to_string())
        );
    }

    #[test]
    fn test_custom_status_uses_parameters() {
        let ctx = live_context();
        let status = "'replicas: ' + parameter.replicas";
        assert_eq!(
            evaluate_custom_status(Some(status), &ctx, &json!({"replicas": 3})).unwrap(),
            Some("replicas: 3".to_string())
        );
        assert_eq!(
            evaluate_custom_status(Some("parameter.missing"), &ctx, &json!({})).unwrap(),
            None
        );
        assert_eq!(evaluate_custom_status(None, &ctx, &json!({})).unwrap(), None);
    }
}
