//! Box adapters
//!
//! An adapter is the typed, read-oriented face of one box for UI or audio
//! code. [`BoxAdapters`] creates adapters lazily from factories keyed by
//! schema name and drops them once their box is gone.

use crate::error::AdapterError;
use box_core::{Address, BoxId};
use box_graph::{BoxGraph, GraphUpdate, SubscriptionId};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Typed view of one box
pub trait BoxAdapter: Send {
    fn uuid(&self) -> BoxId;

    /// Schema name of the adapted box
    fn schema_name(&self) -> &str;

    fn address(&self) -> Address {
        Address::root(self.uuid())
    }

    /// Release graph subscriptions; called once before the adapter is dropped
    fn terminate(&mut self, _graph: &mut BoxGraph) {}

    fn as_any(&self) -> &dyn Any;
}

/// Builds the adapter for a box of one schema
pub type AdapterFactory =
    Box<dyn Fn(&mut BoxGraph, BoxId) -> Result<Box<dyn BoxAdapter>, AdapterError> + Send>;

/// Lazily created adapters, one per box
pub struct BoxAdapters {
    factories: HashMap<String, AdapterFactory>,
    adapters: BTreeMap<BoxId, Box<dyn BoxAdapter>>,
    deleted: Arc<Mutex<Vec<BoxId>>>,
    subscription: SubscriptionId,
}

impl std::fmt::Debug for BoxAdapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxAdapters")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl BoxAdapters {
    /// Start tracking deletions in `graph`
    pub fn attach(graph: &mut BoxGraph) -> Self {
        let deleted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&deleted);
        let subscription = graph.subscribe_all(move |update| {
            if let GraphUpdate::Delete { uuid, .. } = update {
                sink.lock().push(*uuid);
            }
        });
        Self {
            factories: HashMap::new(),
            adapters: BTreeMap::new(),
            deleted,
            subscription,
        }
    }

    /// Register the factory for boxes named `name`, replacing any previous one
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&mut BoxGraph, BoxId) -> Result<Box<dyn BoxAdapter>, AdapterError>
            + Send
            + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Adapter for `uuid`, created on first request
    ///
    /// # Errors
    /// Returns a graph error for unknown boxes, [`AdapterError::NoFactory`]
    /// when no factory handles the box type, or the factory's error
    pub fn adapter_for(
        &mut self,
        graph: &mut BoxGraph,
        uuid: BoxId,
    ) -> Result<&dyn BoxAdapter, AdapterError> {
        self.collect(graph);
        if !self.adapters.contains_key(&uuid) {
            let name = graph.require_box(uuid)?.name().to_string();
            let factory = self
                .factories
                .get(&name)
                .ok_or_else(|| AdapterError::NoFactory(name.clone()))?;
            let adapter = factory(graph, uuid)?;
            tracing::debug!(%uuid, %name, "adapter created");
            self.adapters.insert(uuid, adapter);
        }
        self.adapters
            .get(&uuid)
            .map(AsRef::as_ref)
            .ok_or(AdapterError::Graph(box_graph::GraphError::UnknownBox(uuid)))
    }

    /// Typed adapter for `uuid`, `None` when it is of another type
    ///
    /// # Errors
    /// Same as [`Self::adapter_for`]
    pub fn adapter_as<T: BoxAdapter + 'static>(
        &mut self,
        graph: &mut BoxGraph,
        uuid: BoxId,
    ) -> Result<Option<&T>, AdapterError> {
        Ok(self.adapter_for(graph, uuid)?.as_any().downcast_ref::<T>())
    }

    /// Existing adapter for `uuid`, without creating one
    #[must_use]
    pub fn get(&self, uuid: BoxId) -> Option<&dyn BoxAdapter> {
        self.adapters.get(&uuid).map(AsRef::as_ref)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Terminate adapters whose boxes were deleted; returns how many
    ///
    /// A box deleted and restored (by undo) since the last call keeps its
    /// adapter.
    pub fn collect(&mut self, graph: &mut BoxGraph) -> usize {
        let deleted = std::mem::take(&mut *self.deleted.lock());
        let mut dropped = 0;
        for uuid in deleted {
            if graph.contains(uuid) {
                continue;
            }
            if let Some(mut adapter) = self.adapters.remove(&uuid) {
                adapter.terminate(graph);
                dropped += 1;
                tracing::debug!(%uuid, "adapter dropped");
            }
        }
        dropped
    }

    /// Terminate every adapter and stop tracking the graph
    pub fn detach(mut self, graph: &mut BoxGraph) {
        for (_, mut adapter) in std::mem::take(&mut self.adapters) {
            adapter.terminate(graph);
        }
        graph.unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use box_graph::DeleteMode;
    use box_test_utils::{build_project, graph, AUDIO_FILE, AUDIO_UNIT};

    struct Plain {
        uuid: BoxId,
        name: &'static str,
    }

    impl BoxAdapter for Plain {
        fn uuid(&self) -> BoxId {
            self.uuid
        }

        fn schema_name(&self) -> &str {
            self.name
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn adapters(graph: &mut BoxGraph) -> BoxAdapters {
        let mut adapters = BoxAdapters::attach(graph);
        adapters.register(AUDIO_UNIT, |_, uuid| {
            Ok(Box::new(Plain {
                uuid,
                name: AUDIO_UNIT,
            }) as Box<dyn BoxAdapter>)
        });
        adapters
    }

    #[test]
    fn adapters_are_created_once() {
        let mut graph = graph();
        let project = build_project(&mut graph).unwrap();
        let mut adapters = adapters(&mut graph);

        let adapter = adapters.adapter_for(&mut graph, project.unit).unwrap();
        assert_eq!(adapter.schema_name(), AUDIO_UNIT);
        assert_eq!(adapter.address(), Address::root(project.unit));
        adapters.adapter_for(&mut graph, project.unit).unwrap();
        assert_eq!(adapters.len(), 1);
        assert!(adapters
            .adapter_as::<Plain>(&mut graph, project.unit)
            .unwrap()
            .is_some());
    }

    #[test]
    fn missing_factory_is_reported() {
        let mut graph = graph();
        let project = build_project(&mut graph).unwrap();
        let mut adapters = adapters(&mut graph);
        assert!(matches!(
            adapters.adapter_for(&mut graph, project.file),
            Err(AdapterError::NoFactory(name)) if name == AUDIO_FILE
        ));
    }

    #[test]
    fn deleted_boxes_lose_their_adapters() {
        let mut graph = graph();
        let project = build_project(&mut graph).unwrap();
        let mut adapters = adapters(&mut graph);
        adapters.adapter_for(&mut graph, project.unit).unwrap();

        graph.begin_transaction().unwrap();
        graph.delete_box(project.unit, DeleteMode::Cascade).unwrap();
        graph.commit().unwrap();

        assert_eq!(adapters.collect(&mut graph), 1);
        assert!(adapters.get(project.unit).is_none());
    }
}
