//! # vela-manager
//!
//! Startup plumbing for the control plane binary: layered configuration,
//! tracing setup and manifest loading. [`run`] wires them to the controller.

pub mod config;
pub mod manifests;
pub mod observability;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;
use vela_controller::{Controller, DefinitionRegistry};
use vela_db_memory::InMemoryStore;
use vela_storage::{DynStore, EventedStore};
use vela_template::{HttpFetcher, Renderer};

pub use config::AppConfig;
pub use manifests::{ManifestError, ManifestSummary, apply_manifests, load_manifest_file};

/// Builds the store and controller from `cfg` and runs until `shutdown` flips.
pub async fn run(cfg: AppConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let evented = Arc::new(EventedStore::new(InMemoryStore::new()));
    let store: DynStore = evented.clone();
    // Subscribe before loading so manifest writes reach the controller.
    let events = evented.subscribe();

    let summary = apply_manifests(store.as_ref(), &cfg.manifests.dirs)
        .await
        .context("failed to load manifests")?;
    info!(
        files = summary.files,
        created = summary.created,
        updated = summary.updated,
        "Manifests applied"
    );

    let fetcher = HttpFetcher::new(cfg.fetcher_config()).context("failed to build HTTP fetcher")?;
    let renderer = Renderer::new(Arc::new(fetcher), cfg.render.fetch_timeout());
    let registry = Arc::new(DefinitionRegistry::new(&cfg.controller.system_namespace));

    let controller = Arc::new(Controller::new(
        store,
        registry,
        renderer,
        cfg.controller_config(),
    ));
    controller.run(events, shutdown).await;
    Ok(())
}
