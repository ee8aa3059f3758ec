//! Whole-graph snapshots, checksums and the hub audit
//!
//! Snapshot layout:
//!
//! ```text
//! GRAPH_MAGIC u32 | box count u32 | { name string | id 16 bytes | fields bytes }*
//! ```
//!
//! Boxes are written in id order, so equal graphs always produce equal bytes
//! and therefore equal checksums.

use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::graph::BoxGraph;
use crate::subscription::TransactionEvent;
use box_core::{Address, BoxId, DataInput, DataOutput, SchemaRegistry};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};
use std::sync::Arc;

/// Marks the start of a graph snapshot ("BGRF")
pub const GRAPH_MAGIC: u32 = 0x4247_5246;

/// SHA-256 of a graph snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    /// Hash arbitrary snapshot bytes
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex representation
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl BoxGraph {
    /// Encode every box
    #[must_use]
    pub fn to_snapshot(&self) -> Bytes {
        let mut out = DataOutput::new();
        out.write_u32(GRAPH_MAGIC);
        out.write_u32(u32::try_from(self.boxes.len()).unwrap_or(u32::MAX));
        for node in self.boxes.values() {
            out.write_string(node.name());
            out.write_raw(node.uuid().as_bytes());
            out.write_bytes(&node.encode());
        }
        out.into_bytes()
    }

    /// Build a graph from a snapshot
    ///
    /// # Errors
    /// Returns a corruption error on malformed bytes, unknown box types,
    /// duplicate ids or dangling pointers
    pub fn from_snapshot(
        config: GraphConfig,
        registry: Arc<SchemaRegistry>,
        bytes: Bytes,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::with_config(registry, config);
        let mut input = DataInput::new(bytes);
        let corrupt = |err: box_core::IoError| GraphError::CorruptSnapshot(err.to_string());

        let magic = input.read_u32().map_err(corrupt)?;
        if magic != GRAPH_MAGIC {
            return Err(GraphError::CorruptSnapshot(format!(
                "bad snapshot header {magic:#010x}"
            )));
        }
        let count = input.read_u32().map_err(corrupt)?;

        graph.begin_transaction()?;
        for _ in 0..count {
            let name = input.read_string().map_err(corrupt)?;
            let raw = input.read_raw(BoxId::LENGTH).map_err(corrupt)?;
            let uuid = BoxId::from_slice(&raw)
                .map_err(|err| GraphError::CorruptSnapshot(err.to_string()))?;
            let fields = input.read_bytes().map_err(corrupt)?;
            graph.create_box_from_snapshot(&name, uuid, fields)?;
        }
        if !input.is_empty() {
            return Err(GraphError::CorruptSnapshot(format!(
                "{} trailing bytes",
                input.remaining()
            )));
        }
        graph.commit()?;
        tracing::debug!(boxes = graph.box_count(), "snapshot decoded");
        Ok(graph)
    }

    /// Replace the graph's content with a snapshot
    ///
    /// The snapshot is fully decoded before anything is replaced; on error
    /// the graph is untouched. Listeners are kept and receive
    /// [`TransactionEvent::Reloaded`].
    ///
    /// # Errors
    /// Returns [`GraphError::TransactionInProgress`] inside a transaction, or
    /// the decoding error
    pub fn load_snapshot(&mut self, bytes: Bytes) -> Result<(), GraphError> {
        if self.in_transaction() {
            return Err(GraphError::TransactionInProgress);
        }
        let fresh = Self::from_snapshot(self.config().clone(), self.registry().clone(), bytes)?;
        self.boxes = fresh.boxes;
        self.hubs = fresh.hubs;
        tracing::info!(boxes = self.boxes.len(), "graph reloaded from snapshot");
        self.listeners.dispatch_transaction(TransactionEvent::Reloaded);
        Ok(())
    }

    /// SHA-256 of [`Self::to_snapshot`]
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        Checksum::of(&self.to_snapshot())
    }

    /// Recompute the reverse index from pointer fields and compare
    ///
    /// # Errors
    /// Returns [`GraphError::HubInconsistent`] naming the first diverging vertex
    pub fn verify_pointer_hubs(&self) -> Result<(), GraphError> {
        let mut expected: BTreeMap<Address, BTreeSet<Address>> = BTreeMap::new();
        for node in self.boxes.values() {
            for (pointer, target) in node.outgoing() {
                if self.try_find_vertex(&target).is_some() {
                    expected.entry(target).or_default().insert(pointer);
                }
            }
        }
        let actual: BTreeMap<&Address, BTreeSet<Address>> = self
            .hubs
            .iter()
            .filter(|(_, hub)| !hub.is_empty())
            .map(|(target, hub)| (target, hub.incoming().cloned().collect()))
            .collect();

        for (target, pointers) in &expected {
            if actual.get(target) != Some(pointers) {
                return Err(GraphError::HubInconsistent {
                    target: target.clone(),
                });
            }
        }
        if let Some(extra) = actual.keys().find(|target| !expected.contains_key(**target)) {
            return Err(GraphError::HubInconsistent {
                target: (*extra).clone(),
            });
        }
        Ok(())
    }
}
