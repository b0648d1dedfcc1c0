//! Capability definition registry.
//!
//! Holds an immutable snapshot of every definition behind an `ArcSwap`, so
//! lookups are lock-free and a refresh becomes visible to the next pass as
//! a whole. Lookups fall back from the Application's namespace to the
//! system namespace.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use vela_core::oam::{self, kind};
use vela_core::{
    ComponentDefinition, Definition, DefinitionSpec, ScopeDefinition, TraitDefinition,
    WorkloadDefinition,
};
use vela_storage::{ListParams, ObjectStore, StorageError};

/// Read access to capability definitions.
///
/// The parser depends on this trait rather than on [`DefinitionRegistry`]
/// so tests can supply definitions directly.
pub trait DefinitionLookup: Send + Sync {
    fn component_definition(&self, namespace: &str, name: &str) -> Option<Arc<ComponentDefinition>>;
    fn workload_definition(&self, namespace: &str, name: &str) -> Option<Arc<WorkloadDefinition>>;
    fn trait_definition(&self, namespace: &str, name: &str) -> Option<Arc<TraitDefinition>>;
    fn scope_definition(&self, namespace: &str, name: &str) -> Option<Arc<ScopeDefinition>>;
}

type Table<S> = HashMap<(String, String), Arc<Definition<S>>>;

/// One consistent view of all definitions.
#[derive(Debug, Default)]
pub struct DefinitionSnapshot {
    components: Table<vela_core::ComponentDefinitionSpec>,
    workloads: Table<vela_core::WorkloadDefinitionSpec>,
    traits: Table<vela_core::TraitDefinitionSpec>,
    scopes: Table<vela_core::ScopeDefinitionSpec>,
}

impl DefinitionSnapshot {
    pub fn insert_component(&mut self, definition: ComponentDefinition) {
        insert(&mut self.components, definition);
    }

    pub fn insert_workload(&mut self, definition: WorkloadDefinition) {
        insert(&mut self.workloads, definition);
    }

    pub fn insert_trait(&mut self, definition: TraitDefinition) {
        insert(&mut self.traits, definition);
    }

    pub fn insert_scope(&mut self, definition: ScopeDefinition) {
        insert(&mut self.scopes, definition);
    }

    /// Total number of definitions.
    pub fn len(&self) -> usize {
        self.components.len() + self.workloads.len() + self.traits.len() + self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert<S: DefinitionSpec>(table: &mut Table<S>, definition: Definition<S>) {
    let key = (
        definition.metadata.namespace.clone(),
        definition.metadata.name.clone(),
    );
    table.insert(key, Arc::new(definition));
}

/// Registry of capability definitions with atomic snapshot refresh.
pub struct DefinitionRegistry {
    snapshot: ArcSwap<DefinitionSnapshot>,
    system_namespace: String,
}

impl std::fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("definitions", &self.snapshot.load().len())
            .field("system_namespace", &self.system_namespace)
            .finish()
    }
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new(oam::DEFAULT_SYSTEM_NAMESPACE)
    }
}

impl DefinitionRegistry {
    /// Creates an empty registry.
    pub fn new(system_namespace: impl Into<String>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(DefinitionSnapshot::default()),
            system_namespace: system_namespace.into(),
        }
    }

    /// Creates a registry serving `snapshot`.
    pub fn with_snapshot(system_namespace: impl Into<String>, snapshot: DefinitionSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            system_namespace: system_namespace.into(),
        }
    }

    pub fn system_namespace(&self) -> &str {
        &self.system_namespace
    }

    /// Number of definitions in the current snapshot.
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the snapshot.
    pub fn replace(&self, snapshot: DefinitionSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Reloads every definition from the store and swaps the snapshot in.
    ///
    /// Documents that do not decode are skipped with a warning so one bad
    /// definition cannot hide the rest.
    pub async fn refresh(&self, store: &dyn ObjectStore) -> Result<usize, StorageError> {
        let mut snapshot = DefinitionSnapshot::default();
        for definition in load::<vela_core::ComponentDefinitionSpec>(store).await? {
            snapshot.insert_component(definition);
        }
        for definition in load::<vela_core::WorkloadDefinitionSpec>(store).await? {
            snapshot.insert_workload(definition);
        }
        for definition in load::<vela_core::TraitDefinitionSpec>(store).await? {
            snapshot.insert_trait(definition);
        }
        for definition in load::<vela_core::ScopeDefinitionSpec>(store).await? {
            snapshot.insert_scope(definition);
        }

        let count = snapshot.len();
        self.replace(snapshot);
        info!(definitions = count, "Definition registry refreshed");
        Ok(count)
    }

    fn find<S>(
        &self,
        select: impl Fn(&DefinitionSnapshot) -> &Table<S>,
        namespace: &str,
        name: &str,
    ) -> Option<Arc<Definition<S>>> {
        let snapshot = self.snapshot.load();
        let table = select(&**snapshot);
        table
            .get(&(namespace.to_string(), name.to_string()))
            .or_else(|| table.get(&(self.system_namespace.clone(), name.to_string())))
            .cloned()
    }
}

async fn load<S>(store: &dyn ObjectStore) -> Result<Vec<Definition<S>>, StorageError>
where
    S: DefinitionSpec + DeserializeOwned,
{
    let listed = store.list(S::KIND, &ListParams::new()).await?;
    let mut definitions = Vec::with_capacity(listed.entries.len());
    for entry in listed.entries {
        match entry.decode::<Definition<S>>() {
            Ok(definition) => definitions.push(definition),
            Err(e) => warn!(definition = %entry.key, error = %e, "Skipping invalid definition"),
        }
    }
    debug!(kind = S::KIND, count = definitions.len(), "Loaded definitions");
    Ok(definitions)
}

impl DefinitionLookup for DefinitionRegistry {
    fn component_definition(&self, namespace: &str, name: &str) -> Option<Arc<ComponentDefinition>> {
        self.find(|s| &s.components, namespace, name)
    }

    fn workload_definition(&self, namespace: &str, name: &str) -> Option<Arc<WorkloadDefinition>> {
        self.find(|s| &s.workloads, namespace, name)
    }

    fn trait_definition(&self, namespace: &str, name: &str) -> Option<Arc<TraitDefinition>> {
        self.find(|s| &s.traits, namespace, name)
    }

    fn scope_definition(&self, namespace: &str, name: &str) -> Option<Arc<ScopeDefinition>> {
        self.find(|s| &s.scopes, namespace, name)
    }
}

/// Returns `true` if `kind` is one of the definition kinds.
pub fn is_definition_kind(kind_name: &str) -> bool {
    kind::DEFINITIONS.contains(&kind_name)
}
