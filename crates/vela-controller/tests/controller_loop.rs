//! The controller loop driven by store events.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use vela_controller::{Controller, ControllerConfig, DefinitionRegistry};
use vela_core::{Application, ApplicationComponent, ApplicationPhase};
use vela_storage::ObjectStore;
use vela_template::Renderer;

use common::*;

fn config() -> ControllerConfig {
    ControllerConfig {
        concurrent_reconciles: 2,
        resync_interval: Duration::from_secs(60),
        max_conflict_retries: 3,
        pass_timeout: Duration::from_secs(5),
        requeue_after: Duration::from_millis(50),
    }
}

/// Polls until `check` holds for the stored Application or the deadline passes.
async fn wait_for(
    store: &vela_storage::DynStore,
    check: impl Fn(&Application) -> bool,
) -> Application {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(stored) = store.get(&app_key().object_key()).await.unwrap() {
            let app: Application = stored.decode().unwrap();
            if check(&app) {
                return app;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "application did not reach the expected state"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn controller_reconciles_on_events() {
    let (evented, store) = evented_store();
    seed(&store, &[worker_definition()]).await;

    let registry = Arc::new(DefinitionRegistry::new(SYSTEM_NAMESPACE));
    let renderer = Renderer::with_http(Duration::from_secs(5)).unwrap();
    let controller = Arc::new(Controller::new(store.clone(), registry, renderer, config()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let events = evented.subscribe();
    let running = tokio::spawn(controller.clone().run(events, shutdown_rx));

    // Missing trait definition first: the pass records the failure.
    create_app(
        &store,
        &Application::new("app", "default").with_component(
            ApplicationComponent::new("myweb", "worker", json!({"image": "busybox"}))
                .with_trait("scaler", json!({"replicas": 2})),
        ),
    )
    .await;
    wait_for(&store, |app| {
        app.status
            .condition("Parsed")
            .is_some_and(|c| c.reason == "DefinitionNotFound")
    })
    .await;

    // Adding the definition refreshes the registry and requeues the app.
    store.create(&scaler_definition()).await.unwrap();
    let app = wait_for(&store, |app| {
        app.status.phase == Some(ApplicationPhase::Running)
    })
    .await;
    assert_eq!(app.status.latest_revision.unwrap().name, "app-v1");

    // A spec change produces the next revision.
    update_app(&store, |app| {
        app.spec.components[0].properties = json!({"image": "nginx"});
    })
    .await;
    wait_for(&store, |app| {
        app.status
            .latest_revision
            .as_ref()
            .is_some_and(|r| r.name == "app-v2")
    })
    .await;

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(controller.queue().in_flight().await, 0);
}

#[tokio::test]
async fn definition_update_cuts_revision_through_events() {
    let (evented, store) = evented_store();
    seed(&store, &[worker_definition()]).await;

    let registry = Arc::new(DefinitionRegistry::new(SYSTEM_NAMESPACE));
    let renderer = Renderer::with_http(Duration::from_secs(5)).unwrap();
    let controller = Arc::new(Controller::new(store.clone(), registry, renderer, config()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(controller.clone().run(evented.subscribe(), shutdown_rx));

    create_app(
        &store,
        &Application::new("app", "default").with_component(ApplicationComponent::new(
            "myweb",
            "worker",
            json!({"image": "busybox"}),
        )),
    )
    .await;
    let first = wait_for(&store, |app| {
        app.status.phase == Some(ApplicationPhase::Running)
    })
    .await;

    // Only the definition changes; the Application spec stays as it was.
    let key = vela_core::ObjectKey::new("ComponentDefinition", SYSTEM_NAMESPACE, "worker");
    let mut definition = store.get(&key).await.unwrap().unwrap().object;
    definition["spec"]["schematic"]["template"]["output"]["spec"]["replicas"] = json!(2);
    store.update(&definition, None).await.unwrap();

    let app = wait_for(&store, |app| {
        app.status
            .latest_revision
            .as_ref()
            .is_some_and(|r| r.name == "app-v2")
    })
    .await;
    assert_eq!(app.spec, first.spec);
    assert_ne!(
        app.status.latest_revision.unwrap().revision_hash,
        first.status.latest_revision.unwrap().revision_hash
    );

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
}
