//! Ambient `context` values visible to templates and status expressions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// One user-config entry exposed as `context.config[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub name: String,
    pub value: String,
}

/// Values bound to `context` while rendering one component or trait.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    /// Component name.
    pub name: String,
    pub app_name: String,
    pub namespace: String,
    /// Sorted by name.
    pub config: Vec<ConfigEntry>,
    /// Rendered workload, set for trait rendering and status evaluation.
    pub output: Option<Value>,
    /// Auxiliary workload outputs, keyed by output name.
    pub outputs: BTreeMap<String, Value>,
}

impl RenderContext {
    pub fn new(
        name: impl Into<String>,
        app_name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            app_name: app_name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Sets the user config from unordered key/value pairs.
    #[must_use]
    pub fn with_config<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config: Vec<ConfigEntry> = entries
            .into_iter()
            .map(|(name, value)| ConfigEntry { name, value })
            .collect();
        config.sort_by(|a, b| a.name.cmp(&b.name));
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    #[must_use]
    pub fn with_outputs(mut self, outputs: BTreeMap<String, Value>) -> Self {
        self.outputs = outputs;
        self
    }

    /// JSON form bound to `context`.
    ///
    /// `output` and `outputs` are present only when set, so a template that
    /// reads them outside trait rendering sees an unresolved reference.
    pub fn to_value(&self) -> Value {
        let mut ctx = Map::new();
        ctx.insert("name".into(), Value::String(self.name.clone()));
        ctx.insert("appName".into(), Value::String(self.app_name.clone()));
        ctx.insert("namespace".into(), Value::String(self.namespace.clone()));
        ctx.insert("config".into(), json!(self.config));
        if let Some(output) = &self.output {
            ctx.insert("output".into(), output.clone());
        }
        if !self.outputs.is_empty() {
            ctx.insert("outputs".into(), json!(self.outputs));
        }
        Value::Object(ctx)
    }
}
