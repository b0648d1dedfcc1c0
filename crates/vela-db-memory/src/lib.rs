//! In-memory [`ObjectStore`](vela_storage::ObjectStore) backend.
//!
//! Objects live in a sharded `DashMap`, so the version check of a
//! conditional write and the write itself happen under one shard lock.
//! Deletes cascade through owner references; `collect_garbage` sweeps
//! whatever a crashed pass left without a live owner.
//!
//! ```ignore
//! use vela_db_memory::InMemoryStore;
//! use vela_storage::ObjectStore;
//!
//! let store = InMemoryStore::new();
//! let app = serde_json::json!({
//!     "kind": "Application",
//!     "metadata": {"name": "demo", "namespace": "default"},
//!     "spec": {"components": []}
//! });
//! let created = store.create(&app).await?;
//! assert_eq!(created.resource_version, "1");
//! ```

mod object_store;
pub mod storage;

pub use storage::InMemoryStore;
