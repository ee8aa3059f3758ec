//! Box Graph
//!
//! Reference-tracked project state: typed boxes connected by pointer fields,
//! a reverse index kept in lockstep with every pointer write, transactional
//! mutation with rollback, and undo/redo built on the transaction journal.
//!
//! # Core Concepts
//!
//! - [`BoxGraph`]: owns all boxes in id order, their pointer hubs and listeners
//! - [`PointerHub`]: incoming pointers of one vertex, never edited directly
//! - [`GraphUpdate`]: the four change records every mutation produces
//! - [`Editing`]: undo/redo stacks of committed modifications
//! - [`Checksum`]: SHA-256 of the canonical graph snapshot
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use box_core::{Address, BoxSchema, FieldSchema, PrimitiveValue, SchemaRegistry};
//! use box_graph::{BoxGraph, Editing, GraphError};
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register(BoxSchema::new("Tempo").field(FieldSchema::float32(1, "bpm", 120.0)))?;
//!
//! let mut graph = BoxGraph::new(Arc::new(registry));
//! let mut editing = Editing::default();
//!
//! let tempo = editing.modify(&mut graph, |g| g.create("Tempo", |_| Ok(())))?;
//! let bpm = Address::compose(tempo, &[1]);
//! editing.modify(&mut graph, |g| g.set_primitive(&bpm, 96.0f32))?;
//!
//! editing.undo(&mut graph)?;
//! assert_eq!(graph.primitive(&bpm)?, &PrimitiveValue::Float32(120.0));
//! # Ok::<(), GraphError>(())
//! ```

#![warn(unreachable_pub)]

mod config;
mod editing;
mod error;
mod graph;
mod node;
mod pointer_hub;
mod snapshot;
mod subscription;
mod update;

// Re-exports
pub use config::{EditingConfig, GraphConfig, DEFAULT_HISTORY_LIMIT};
pub use editing::{Editing, Modification};
pub use error::GraphError;
pub use graph::{BoxGraph, DeleteMode};
pub use node::{BoxInit, BoxNode, Vertex};
pub use pointer_hub::{HubEvent, PointerHub};
pub use snapshot::{Checksum, GRAPH_MAGIC};
pub use subscription::{
    HubListener, Propagation, SubscriptionId, TransactionEvent, TransactionListener,
    UpdateListener,
};
pub use update::GraphUpdate;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use box_core::{Address, BoxSchema, FieldSchema, PointerRules, PointerType, SchemaRegistry};
    use std::sync::{Arc, Mutex};

    const OWNER: PointerType = PointerType::new(1);

    fn registry() -> Arc<SchemaRegistry> {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                BoxSchema::new("A")
                    .rules(PointerRules::accepting(&[OWNER]))
                    .field(FieldSchema::string(1, "name", "")),
            )
            .unwrap();
        registry
            .register(BoxSchema::new("B").field(FieldSchema::pointer(1, "owner", OWNER, true)))
            .unwrap();
        Arc::new(registry)
    }

    #[test]
    fn editing_and_listeners_see_the_same_updates() {
        let mut graph = BoxGraph::new(registry());
        let mut editing = Editing::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        graph.subscribe_all(move |update| sink.lock().unwrap().push(update.clone()));

        let a = editing
            .modify(&mut graph, |g| {
                g.create("A", |init| {
                    init.set(&[1], "foo")?;
                    Ok(())
                })
            })
            .unwrap();
        editing
            .modify(&mut graph, |g| {
                g.create("B", |init| {
                    init.set_pointer(&[1], Some(Address::root(a)))?;
                    Ok(())
                })
            })
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|u| matches!(u, GraphUpdate::New { .. })));
    }

    #[test]
    fn cascade_delete_is_one_undoable_step() {
        let mut graph = BoxGraph::new(registry());
        let mut editing = Editing::default();
        let a = editing
            .modify(&mut graph, |g| g.create("A", |_| Ok(())))
            .unwrap();
        editing
            .modify(&mut graph, |g| {
                g.create("B", |init| {
                    init.set_pointer(&[1], Some(Address::root(a)))?;
                    Ok(())
                })
            })
            .unwrap();
        let before = graph.checksum();

        let deleted = editing
            .modify(&mut graph, |g| g.delete_box(a, DeleteMode::Cascade))
            .unwrap();
        assert_eq!(deleted.len(), 2);
        assert_eq!(graph.box_count(), 0);

        editing.undo(&mut graph).unwrap();
        assert_eq!(graph.checksum(), before);
        graph.verify_pointer_hubs().unwrap();
    }
}
