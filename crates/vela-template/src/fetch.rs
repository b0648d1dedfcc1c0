//! External-data step (`processing.http`) of a template.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::RenderError;

fn default_method() -> String {
    "GET".to_string()
}

/// A rendered `processing.http` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub request: FetchBody,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub header: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            url: url.into(),
            request: FetchBody::default(),
        }
    }
}

/// Source of external data for templates.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    /// Performs the request and returns the JSON response document.
    async fn fetch(&self, request: &FetchRequest) -> Result<Value, RenderError>;
}

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Transport timeout; the renderer applies its own per-render bound on top.
    pub request_timeout: Duration,
    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,
    pub user_agent: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_response_size: 1024 * 1024,
            user_agent: concat!("vela/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`DataFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http_client: reqwest::Client,
    config: HttpFetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self, RenderError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RenderError::fetch("", format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            config,
        })
    }
}

#[async_trait]
impl DataFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Value, RenderError> {
        let url = Url::parse(&request.url)
            .map_err(|e| RenderError::fetch(&request.url, format!("invalid URL: {e}")))?;
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| RenderError::fetch(&request.url, format!("invalid method {}", request.method)))?;

        let mut builder = self
            .http_client
            .request(method, url)
            .header("Accept", "application/json");
        for (name, value) in &request.request.header {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.request.body {
            builder = match body {
                Value::String(text) => builder.body(text.clone()),
                other => builder.json(other),
            };
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(url = %request.url, error = %e, "Template fetch failed");
            RenderError::fetch(&request.url, e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(RenderError::fetch(
                &request.url,
                format!("HTTP status {}", response.status().as_u16()),
            ));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_response_size
        {
            return Err(RenderError::fetch(
                &request.url,
                format!(
                    "response exceeds maximum size of {} bytes",
                    self.config.max_response_size
                ),
            ));
        }

        let document: Value = response.json().await.map_err(|e| {
            tracing::warn!(url = %request.url, error = %e, "Template fetch returned invalid JSON");
            RenderError::fetch(&request.url, format!("invalid JSON response: {e}"))
        })?;

        tracing::debug!(url = %request.url, "Fetched template data");
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(HttpFetcherConfig::default()).unwrap()
    }

    #[test]
    fn test_request_defaults() {
        let request: FetchRequest =
            serde_json::from_value(json!({"url": "http://127.0.0.1/api"})).unwrap();
        assert_eq!(request, FetchRequest::get("http://127.0.0.1/api"));
    }

    #[tokio::test]
    async fn test_fetch_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/token"))
            .and(query_param("val", "test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "test-token"})))
            .mount(&server)
            .await;

        let request = FetchRequest::get(format!("{}/api/v1/token?val=test-token", server.uri()));
        let document = fetcher().fetch(&request).await.unwrap();
        assert_eq!(document, json!({"token": "test-token"}));
    }

    #[tokio::test]
    async fn test_fetch_post_with_body_and_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("x-tenant", "blue"))
            .and(body_json(json!({"name": "web"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let mut request = FetchRequest::get(format!("{}/echo", server.uri()));
        request.method = "post".into();
        request.request.body = Some(json!({"name": "web"}));
        request
            .request
            .header
            .insert("x-tenant".into(), "blue".into());

        assert_eq!(fetcher().fetch(&request).await.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_fetch_errors() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&FetchRequest::get(format!("{}/missing", server.uri())))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP status 404"));

        let err = fetcher()
            .fetch(&FetchRequest::get(format!("{}/text", server.uri())))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));

        let err = fetcher()
            .fetch(&FetchRequest::get("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Fetch { .. }));
    }
}
