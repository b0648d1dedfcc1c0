use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vela_controller::ControllerConfig;
use vela_core::oam::DEFAULT_SYSTEM_NAMESPACE;
use vela_template::HttpFetcherConfig;

/// Top-level manager configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub controller: ControllerSettings,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub manifests: ManifestsConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.controller.concurrent_reconciles == 0 {
            return Err("controller.concurrent_reconciles must be > 0".into());
        }
        if self.controller.resync_interval_secs == 0 {
            return Err("controller.resync_interval_secs must be > 0".into());
        }
        if self.controller.pass_timeout_ms == 0 {
            return Err("controller.pass_timeout_ms must be > 0".into());
        }
        if self.controller.system_namespace.trim().is_empty() {
            return Err("controller.system_namespace must not be empty".into());
        }
        if self.render.fetch_timeout_ms == 0 {
            return Err("render.fetch_timeout_ms must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            concurrent_reconciles: self.controller.concurrent_reconciles,
            resync_interval: Duration::from_secs(self.controller.resync_interval_secs),
            max_conflict_retries: self.controller.max_conflict_retries,
            pass_timeout: Duration::from_millis(self.controller.pass_timeout_ms),
            ..ControllerConfig::default()
        }
    }

    pub fn fetcher_config(&self) -> HttpFetcherConfig {
        HttpFetcherConfig {
            request_timeout: self.render.fetch_timeout(),
            user_agent: self.render.user_agent.clone(),
            ..HttpFetcherConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub concurrent_reconciles: usize,
    pub resync_interval_secs: u64,
    pub max_conflict_retries: u32,
    pub pass_timeout_ms: u64,
    /// Namespace searched for definitions after the Application's own.
    pub system_namespace: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        let defaults = ControllerConfig::default();
        Self {
            concurrent_reconciles: defaults.concurrent_reconciles,
            resync_interval_secs: defaults.resync_interval.as_secs(),
            max_conflict_retries: defaults.max_conflict_retries,
            pass_timeout_ms: millis(defaults.pass_timeout),
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Bound on a template's `processing.http` step.
    pub fetch_timeout_ms: u64,
    pub user_agent: String,
}

impl RenderSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: millis(vela_template::DEFAULT_FETCH_TIMEOUT),
            user_agent: HttpFetcherConfig::default().user_agent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Directories of JSON or TOML object manifests loaded at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestsConfig {
    #[serde(default)]
    pub dirs: Vec<PathBuf>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "vela.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., VELA__CONTROLLER__CONCURRENT_RECONCILES=8
        builder = builder.add_source(
            Environment::with_prefix("VELA")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
