//! Renderer: parameters + context + template -> rendered objects.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::context::RenderContext;
use crate::error::RenderError;
use crate::expr::Scope;
use crate::fetch::{DataFetcher, HttpFetcher, HttpFetcherConfig};
use crate::schema::validate_parameters;
use crate::template::Template;

/// Default bound on the external-data step of a single render.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of rendering one template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOutput {
    /// Primary object from `output`.
    pub output: Option<Value>,
    /// Auxiliary objects from `outputs`, ordered by key.
    pub outputs: BTreeMap<String, Value>,
}

impl RenderOutput {
    pub fn is_empty(&self) -> bool {
        self.output.is_none() && self.outputs.is_empty()
    }
}

/// Renders capability templates.
///
/// Cheap to clone; the fetcher is shared.
#[derive(Clone)]
pub struct Renderer {
    fetcher: Arc<dyn DataFetcher>,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    pub fn new(fetcher: Arc<dyn DataFetcher>, fetch_timeout: Duration) -> Self {
        Self {
            fetcher,
            fetch_timeout,
        }
    }

    /// Renderer backed by an [`HttpFetcher`] with default settings.
    pub fn with_http(fetch_timeout: Duration) -> Result<Self, RenderError> {
        let fetcher = HttpFetcher::new(HttpFetcherConfig::default())?;
        Ok(Self::new(Arc::new(fetcher), fetch_timeout))
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Parses `document` and renders it. See [`Renderer::render_template`].
    pub async fn render(
        &self,
        document: &Value,
        parameters: &Value,
        context: &RenderContext,
    ) -> Result<RenderOutput, RenderError> {
        let template = Template::parse(document)?;
        self.render_template(&template, parameters, context).await
    }

    /// Validates parameters, runs the optional fetch step and evaluates the
    /// outputs. Identical inputs give identical output.
    pub async fn render_template(
        &self,
        template: &Template,
        parameters: &Value,
        context: &RenderContext,
    ) -> Result<RenderOutput, RenderError> {
        let parameter = validate_parameters(template.parameter_schema(), parameters)?;

        let mut root = Map::new();
        root.insert("parameter".into(), parameter);
        root.insert("context".into(), context.to_value());
        let mut root = Value::Object(root);

        let request = template.fetch_request(&Scope::new(&root))?;
        if let Some(request) = request {
            let fetched = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(&request))
                .await
                .map_err(|_| RenderError::FetchTimeout {
                    url: request.url.clone(),
                    timeout_ms: u64::try_from(self.fetch_timeout.as_millis()).unwrap_or(u64::MAX),
                })??;
            if let Value::Object(map) = &mut root {
                map.insert("processing".into(), serde_json::json!({ "output": fetched }));
            }
        }

        let scope = Scope::new(&root);
        let output = template.eval_output(&scope)?;
        let outputs = template.eval_outputs(&scope)?;

        tracing::trace!(
            component = %context.name,
            outputs = outputs.len(),
            "Rendered template"
        );
        Ok(RenderOutput { output, outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::fetch::FetchRequest;

    struct SlowFetcher;

    #[async_trait]
    impl DataFetcher for SlowFetcher {
        async fn fetch(&self, _request: &FetchRequest) -> Result<Value, RenderError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        }
    }

    struct FixedFetcher(Value);

    #[async_trait]
    impl DataFetcher for FixedFetcher {
        async fn fetch(&self, _request: &FetchRequest) -> Result<Value, RenderError> {
            Ok(self.0.clone())
        }
    }

    fn http_trait() -> Value {
        json!({
            "parameter": {
                "replicas": {"type": "integer", "default": 1},
                "serviceURL": {"type": "string", "default": "http://127.0.0.1:8090/api/v1/token?val=test-token"}
            },
            "processing": {"http": {"method": "GET", "url": "${parameter.serviceURL}"}},
            "outputs": {
                "scaler": {
                    "apiVersion": "core.oam.dev/v1alpha2",
                    "kind": "ManualScalerTrait",
                    "spec": {
                        "replicaCount": "${parameter.replicas}",
                        "token": "${processing.output.token}"
                    }
                }
            }
        })
    }

    #[tokio::test]
    async fn test_render_with_processing() {
        let renderer = Renderer::new(
            Arc::new(FixedFetcher(json!({"token": "test-token"}))),
            DEFAULT_FETCH_TIMEOUT,
        );
        let ctx = RenderContext::new("myweb", "app", "default");
        let out = renderer
            .render(&http_trait(), &json!({"replicas": 2}), &ctx)
            .await
            .unwrap();
        assert!(out.output.is_none());
        assert_eq!(
            out.outputs["scaler"]["spec"],
            json!({"replicaCount": 2, "token": "test-token"})
        );
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let renderer = Renderer::new(Arc::new(SlowFetcher), Duration::from_millis(20));
        let ctx = RenderContext::new("myweb", "app", "default");
        let err = renderer
            .render(&http_trait(), &json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::FetchTimeout { timeout_ms: 20, .. }));
    }

    #[tokio::test]
    async fn test_invalid_parameters_fail_before_fetch() {
        let renderer = Renderer::new(Arc::new(SlowFetcher), Duration::from_secs(60));
        let ctx = RenderContext::new("myweb", "app", "default");
        let err = renderer
            .render(&http_trait(), &json!({"replicas": "2"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::TypeMismatch { .. }));
    }
}
