//! # vela-storage
//!
//! The object store contract shared by the controller and its backends.
//! Objects are JSON documents addressed by [`vela_core::ObjectKey`]; every
//! stored copy carries a uid and a `resourceVersion` that conditional
//! writes are checked against.
//!
//! [`ObjectStore`] covers:
//! - get/list with namespace, label and owner selectors
//! - create/update/delete conditioned on a version token
//! - owner-reference cascade deletion and garbage collection
//!
//! [`EventedStore`] wraps any backend and publishes [`WatchEvent`]s, the
//! watch primitive the controller loop consumes. The in-memory backend
//! lives in `vela-db-memory`.
//!
//! ```ignore
//! use vela_storage::{ListParams, ObjectStore, StorageError, StoredObject};
//!
//! async fn components_of(
//!     store: &dyn ObjectStore,
//!     app: &str,
//! ) -> Result<Vec<StoredObject>, StorageError> {
//!     let params = ListParams::new().with_label("app.oam.dev/name", app);
//!     Ok(store.list("Component", &params).await?.entries)
//! }
//! ```

mod error;
pub mod evented;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use evented::{EventedStore, WatchEvent, WatchEventKind};
pub use traits::ObjectStore;
pub use types::{ListParams, ListResult, StoredObject};

/// Shared handle to a store.
pub type DynStore = std::sync::Arc<dyn ObjectStore>;
