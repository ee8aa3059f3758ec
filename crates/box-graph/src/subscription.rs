//! Listener registry
//!
//! Listeners receive borrowed events and cannot reach the graph, so a
//! dispatch can never re-enter a mutation. Each registration returns a
//! [`SubscriptionId`] used to cancel it.

use crate::pointer_hub::HubEvent;
use crate::update::GraphUpdate;
use box_core::Address;
use std::collections::BTreeMap;

/// Handle for cancelling a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Which updates a vertex subscription receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Only updates addressed exactly to the vertex
    #[default]
    This,
    /// Updates to the vertex and anything below it
    Children,
}

/// Transaction lifecycle notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
    Began,
    Committed,
    RolledBack,
    /// Whole graph content replaced from a snapshot
    Reloaded,
}

pub type UpdateListener = Box<dyn FnMut(&GraphUpdate) + Send>;
pub type TransactionListener = Box<dyn FnMut(TransactionEvent) + Send>;
pub type HubListener = Box<dyn FnMut(&HubEvent) + Send>;

struct VertexListener {
    id: SubscriptionId,
    propagation: Propagation,
    listener: UpdateListener,
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    all: Vec<(SubscriptionId, UpdateListener)>,
    vertices: BTreeMap<Address, Vec<VertexListener>>,
    transactions: Vec<(SubscriptionId, TransactionListener)>,
    hubs: BTreeMap<Address, Vec<(SubscriptionId, HubListener)>>,
}

impl Listeners {
    fn next(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    pub(crate) fn add_update(&mut self, listener: UpdateListener) -> SubscriptionId {
        let id = self.next();
        self.all.push((id, listener));
        id
    }

    pub(crate) fn add_vertex(
        &mut self,
        address: Address,
        propagation: Propagation,
        listener: UpdateListener,
    ) -> SubscriptionId {
        let id = self.next();
        self.vertices.entry(address).or_default().push(VertexListener {
            id,
            propagation,
            listener,
        });
        id
    }

    pub(crate) fn add_transaction(&mut self, listener: TransactionListener) -> SubscriptionId {
        let id = self.next();
        self.transactions.push((id, listener));
        id
    }

    pub(crate) fn add_hub(&mut self, target: Address, listener: HubListener) -> SubscriptionId {
        let id = self.next();
        self.hubs.entry(target).or_default().push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.len();
        self.all.retain(|(i, _)| *i != id);
        self.transactions.retain(|(i, _)| *i != id);
        for list in self.vertices.values_mut() {
            list.retain(|l| l.id != id);
        }
        self.vertices.retain(|_, list| !list.is_empty());
        for list in self.hubs.values_mut() {
            list.retain(|(i, _)| *i != id);
        }
        self.hubs.retain(|_, list| !list.is_empty());
        self.len() < before
    }

    pub(crate) fn len(&self) -> usize {
        self.all.len()
            + self.transactions.len()
            + self.vertices.values().map(Vec::len).sum::<usize>()
            + self.hubs.values().map(Vec::len).sum::<usize>()
    }

    pub(crate) fn dispatch_update(&mut self, update: &GraphUpdate) {
        for (_, listener) in &mut self.all {
            listener(update);
        }
        if self.vertices.is_empty() {
            return;
        }
        let address = update.address();
        for vertex in address.lineage() {
            let exact = vertex == address;
            if let Some(list) = self.vertices.get_mut(&vertex) {
                for entry in list {
                    if exact || entry.propagation == Propagation::Children {
                        (entry.listener)(update);
                    }
                }
            }
        }
    }

    pub(crate) fn dispatch_transaction(&mut self, event: TransactionEvent) {
        for (_, listener) in &mut self.transactions {
            listener(event);
        }
    }

    pub(crate) fn dispatch_hub(&mut self, event: &HubEvent) {
        if let Some(list) = self.hubs.get_mut(event.target()) {
            for (_, listener) in list {
                listener(event);
            }
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("count", &self.len()).finish()
    }
}
