//! Watch-driven controller loop.
//!
//! Store events are mapped to Application keys and pushed onto a
//! deduplicating work queue drained by a fixed number of workers. A key is
//! never processed by two workers at once; a key that changes while it is
//! being processed is queued again once the running pass ends.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{Mutex, Notify, broadcast, watch};
use tracing::{debug, error, info, warn};
use vela_core::oam::{annotation, kind, label};
use vela_storage::{DynStore, ListParams, WatchEvent};
use vela_template::Renderer;

use crate::appfile::AppParser;
use crate::apply::{AppKey, ApplyHandler};
use crate::registry::{DefinitionRegistry, is_definition_kind};

/// Runtime settings of the controller loop.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of workers processing Applications concurrently.
    pub concurrent_reconciles: usize,
    pub resync_interval: Duration,
    /// Immediate retries of a pass that lost a write race.
    pub max_conflict_retries: u32,
    pub pass_timeout: Duration,
    /// Delay before another pass for Applications that are not yet healthy
    /// or that failed.
    pub requeue_after: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            concurrent_reconciles: 4,
            resync_interval: Duration::from_secs(300),
            max_conflict_retries: 5,
            pass_timeout: Duration::from_secs(30),
            requeue_after: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<AppKey>,
    queued: HashSet<AppKey>,
    active: HashSet<AppKey>,
    dirty: HashSet<AppKey>,
    shutdown: bool,
}

/// Deduplicating FIFO of Application keys.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `key` unless it is already waiting.
    pub async fn add(&self, key: AppKey) {
        let mut state = self.state.lock().await;
        if state.shutdown || state.queued.contains(&key) {
            return;
        }
        if state.active.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        state.queued.insert(key.clone());
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Waits for the next key. Returns `None` once the queue is shut down.
    pub async fn next(&self) -> Option<AppKey> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if state.shutdown {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.active.insert(key.clone());
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Marks `key` finished, queueing it again if it changed meanwhile.
    pub async fn done(&self, key: &AppKey) {
        let mut state = self.state.lock().await;
        state.active.remove(key);
        if state.dirty.remove(key) && !state.shutdown && state.queued.insert(key.clone()) {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Number of keys waiting.
    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Keys waiting or being processed.
    pub async fn in_flight(&self) -> usize {
        let state = self.state.lock().await;
        state.queue.len() + state.active.len()
    }

    /// Drops waiting keys and wakes every worker. Keys being processed are
    /// released through [`WorkQueue::done`] as usual.
    pub async fn shut_down(&self) {
        let mut state = self.state.lock().await;
        state.shutdown = true;
        state.queue.clear();
        state.queued.clear();
        state.dirty.clear();
        drop(state);
        self.notify.notify_waiters();
    }
}

/// Reconciles every Application in a store.
pub struct Controller {
    store: DynStore,
    registry: Arc<DefinitionRegistry>,
    handler: ApplyHandler,
    queue: Arc<WorkQueue>,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(
        store: DynStore,
        registry: Arc<DefinitionRegistry>,
        renderer: Renderer,
        config: ControllerConfig,
    ) -> Self {
        let parser = AppParser::new(registry.clone(), renderer);
        let handler = ApplyHandler::new(store.clone(), parser);
        Self {
            store,
            registry,
            handler,
            queue: Arc::new(WorkQueue::new()),
            config,
        }
    }

    pub fn handler(&self) -> &ApplyHandler {
        &self.handler
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Runs until `shutdown` turns `true` or its sender is dropped.
    ///
    /// `events` must be subscribed to the same store the controller writes
    /// to.
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            workers = self.config.concurrent_reconciles,
            backend = self.store.backend_name(),
            "Controller started"
        );

        if let Err(e) = self.registry.refresh(self.store.as_ref()).await {
            error!(error = %e, "Failed to load definitions");
        }
        self.enqueue_all().await;

        let workers: Vec<_> = (0..self.config.concurrent_reconciles.max(1))
            .map(|id| {
                let controller = self.clone();
                tokio::spawn(async move { controller.worker(id).await })
            })
            .collect();

        let mut resync = tokio::time::interval(self.config.resync_interval);
        resync.tick().await;

        loop {
            tokio::select! {
                biased;

                result = shutdown.changed() => {
                    match result {
                        Ok(()) if *shutdown.borrow() => {
                            info!("Controller shutting down");
                            break;
                        }
                        Ok(()) => {}
                        Err(_) => {
                            info!("Controller shutdown channel closed");
                            break;
                        }
                    }
                }

                result = events.recv() => {
                    match result {
                        Ok(event) => self.handle_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(missed = n, "Missed watch events, resyncing");
                            self.resync().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Watch channel closed");
                            break;
                        }
                    }
                }

                _ = resync.tick() => {
                    debug!("Periodic resync");
                    self.resync().await;
                }
            }
        }

        self.queue.shut_down().await;
        for result in join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "Controller worker panicked");
            }
        }
        info!("Controller stopped");
    }

    async fn worker(&self, id: usize) {
        debug!(worker = id, "Worker started");
        while let Some(key) = self.queue.next().await {
            self.process(&key).await;
            self.queue.done(&key).await;
        }
        debug!(worker = id, "Worker stopped");
    }

    /// Runs passes for `key` until one finishes without a conflict.
    pub async fn process(&self, key: &AppKey) {
        let mut attempt = 0;
        loop {
            let result =
                tokio::time::timeout(self.config.pass_timeout, self.handler.reconcile(key)).await;
            match result {
                Ok(Ok(outcome)) => {
                    if outcome.requeue() {
                        self.requeue_later(key.clone());
                    }
                    return;
                }
                Ok(Err(e)) if e.is_conflict() && attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    debug!(app = %key, attempt, error = %e, "Conflict, retrying pass");
                }
                Ok(Err(e)) => {
                    error!(
                        app = %key,
                        category = %e.category(),
                        error = %e,
                        "Reconcile failed"
                    );
                    self.requeue_later(key.clone());
                    return;
                }
                Err(_) => {
                    let timeout_ms =
                        u64::try_from(self.config.pass_timeout.as_millis()).unwrap_or(u64::MAX);
                    warn!(
                        app = %key,
                        timeout_ms,
                        "Reconcile pass timed out"
                    );
                    self.requeue_later(key.clone());
                    return;
                }
            }
        }
    }

    fn requeue_later(&self, key: AppKey) {
        let queue = self.queue.clone();
        let delay = self.config.requeue_after;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key).await;
        });
    }

    async fn handle_event(&self, event: WatchEvent) {
        let WatchEvent { key, metadata, .. } = event;

        if key.kind == kind::APPLICATION {
            self.queue.add(AppKey::new(key.namespace, key.name)).await;
            return;
        }

        if is_definition_kind(&key.kind) {
            match self.registry.refresh(self.store.as_ref()).await {
                Ok(_) => self.enqueue_all().await,
                Err(e) => error!(error = %e, "Failed to refresh definitions"),
            }
            return;
        }

        if key.kind == kind::CONFIG_MAP {
            self.enqueue_config_users(&key.namespace, &key.name).await;
            return;
        }

        if let Some(app) = metadata.labels.get(label::APP_NAME) {
            self.queue.add(AppKey::new(key.namespace, app.clone())).await;
        } else if let Some(owner) = metadata
            .controller_owner()
            .filter(|o| o.kind == kind::APPLICATION)
        {
            self.queue
                .add(AppKey::new(key.namespace, owner.name.clone()))
                .await;
        }
    }

    /// Queues Applications in `namespace` that read ConfigMap `name`.
    async fn enqueue_config_users(&self, namespace: &str, name: &str) {
        let params = ListParams::new().in_namespace(namespace);
        match self.store.list(kind::APPLICATION, &params).await {
            Ok(listed) => {
                for entry in listed.entries {
                    let uses = entry
                        .metadata()
                        .is_ok_and(|m| m.annotation(annotation::USER_CONFIG) == Some(name));
                    if uses {
                        self.queue
                            .add(AppKey::new(entry.key.namespace, entry.key.name))
                            .await;
                    }
                }
            }
            Err(e) => error!(error = %e, "Failed to list applications"),
        }
    }

    async fn enqueue_all(&self) {
        match self.store.list(kind::APPLICATION, &ListParams::new()).await {
            Ok(listed) => {
                debug!(count = listed.len(), "Queueing all applications");
                for entry in listed.entries {
                    self.queue
                        .add(AppKey::new(entry.key.namespace, entry.key.name))
                        .await;
                }
            }
            Err(e) => error!(error = %e, "Failed to list applications"),
        }
    }

    async fn resync(&self) {
        self.enqueue_all().await;
        if let Err(e) = self.store.collect_garbage().await {
            error!(error = %e, "Garbage collection failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_deduplicates() {
        let queue = WorkQueue::new();
        queue.add(AppKey::new("default", "a")).await;
        queue.add(AppKey::new("default", "a")).await;
        queue.add(AppKey::new("default", "b")).await;
        assert_eq!(queue.len().await, 2);

        assert_eq!(queue.next().await, Some(AppKey::new("default", "a")));
        assert_eq!(queue.next().await, Some(AppKey::new("default", "b")));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_active_key_requeued_when_dirty() {
        let queue = WorkQueue::new();
        let key = AppKey::new("default", "a");
        queue.add(key.clone()).await;
        let taken = queue.next().await.unwrap();

        // Changed while processing: held back until done.
        queue.add(key.clone()).await;
        assert!(queue.is_empty().await);
        assert_eq!(queue.in_flight().await, 1);

        queue.done(&taken).await;
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.next().await, Some(key.clone()));
        queue.done(&key).await;
        assert_eq!(queue.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let queue = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::task::yield_now().await;
        queue.shut_down().await;
        assert_eq!(waiter.await.unwrap(), None);

        queue.add(AppKey::new("default", "late")).await;
        assert!(queue.is_empty().await);
    }
}
