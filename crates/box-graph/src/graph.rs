//! The box graph
//!
//! [`BoxGraph`] owns every box of a project, the reverse pointer index and
//! the listener registry. All writes go through its address-based API and
//! must happen inside a transaction; each write is recorded as a
//! [`GraphUpdate`] that is dispatched to listeners and journaled so the
//! transaction can be rolled back or handed to undo history on commit.

use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::node::{check_type, pointer_type_of, BoxInit, BoxNode, Vertex};
use crate::pointer_hub::{HubEvent, PointerHub};
use crate::subscription::{
    HubListener, Listeners, Propagation, SubscriptionId, TransactionEvent, TransactionListener,
    UpdateListener,
};
use crate::update::GraphUpdate;
use box_core::{
    decode_fields, Address, BoxId, BoxSchema, Field, FieldSet, PointerType, PrimitiveValue,
    SchemaRegistry,
};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// How [`BoxGraph::delete_box`] treats mandatory incoming pointers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Fail when another box holds a mandatory pointer into the box
    #[default]
    Strict,
    /// Delete every box transitively holding mandatory pointers into it
    Cascade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Live,
    Pending,
}

#[derive(Debug, Default)]
struct Transaction {
    journal: Vec<GraphUpdate>,
    touched: BTreeSet<BoxId>,
}

/// Project state graph
#[derive(Debug)]
pub struct BoxGraph {
    config: GraphConfig,
    registry: Arc<SchemaRegistry>,
    pub(crate) boxes: BTreeMap<BoxId, BoxNode>,
    pub(crate) hubs: BTreeMap<Address, PointerHub>,
    /// Pointer fields whose target box has not been staged yet
    pending: BTreeMap<Address, Address>,
    transaction: Option<Transaction>,
    pub(crate) listeners: Listeners,
}

impl BoxGraph {
    /// Create an empty graph over a schema registry
    #[must_use]
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self::with_config(registry, GraphConfig::default())
    }

    /// Create an empty graph with explicit configuration
    #[must_use]
    pub fn with_config(registry: Arc<SchemaRegistry>, config: GraphConfig) -> Self {
        Self {
            config,
            registry,
            boxes: BTreeMap::new(),
            hubs: BTreeMap::new(),
            pending: BTreeMap::new(),
            transaction: None,
            listeners: Listeners::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// All boxes in id order
    pub fn boxes(&self) -> impl ExactSizeIterator<Item = &BoxNode> {
        self.boxes.values()
    }

    /// Boxes of one schema, in id order
    pub fn boxes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a BoxNode> + 'a {
        self.boxes.values().filter(move |node| node.name() == name)
    }

    #[inline]
    #[must_use]
    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, uuid: BoxId) -> bool {
        self.boxes.contains_key(&uuid)
    }

    #[inline]
    #[must_use]
    pub fn get_box(&self, uuid: BoxId) -> Option<&BoxNode> {
        self.boxes.get(&uuid)
    }

    /// Box by id
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownBox`] when absent
    pub fn require_box(&self, uuid: BoxId) -> Result<&BoxNode, GraphError> {
        self.boxes.get(&uuid).ok_or(GraphError::UnknownBox(uuid))
    }

    /// Greatest box whose id is `<= uuid`
    #[must_use]
    pub fn floor_box(&self, uuid: BoxId) -> Option<&BoxNode> {
        self.boxes.range(..=uuid).next_back().map(|(_, node)| node)
    }

    /// Boxes with ids in `from..=to`
    pub fn boxes_in_range(&self, from: BoxId, to: BoxId) -> impl Iterator<Item = &BoxNode> {
        let range = if from <= to { Some(self.boxes.range(from..=to)) } else { None };
        range.into_iter().flatten().map(|(_, node)| node)
    }

    /// Resolve an address to a box or field
    ///
    /// # Errors
    /// Returns [`GraphError::UnresolvedAddress`] when the box or key path is missing
    pub fn find_vertex<'a>(&'a self, address: &'a Address) -> Result<Vertex<'a>, GraphError> {
        self.try_find_vertex(address)
            .ok_or_else(|| GraphError::UnresolvedAddress(address.clone()))
    }

    /// Resolve an address, `None` when it does not exist (yet)
    #[must_use]
    pub fn try_find_vertex<'a>(&'a self, address: &'a Address) -> Option<Vertex<'a>> {
        let node = self.boxes.get(&address.uuid())?;
        if address.is_box() {
            return Some(Vertex::Box(node));
        }
        let path = address.keys();
        let schema = node.schema().field_schema(path)?;
        let field = node.field(path)?;
        Some(Vertex::Field {
            node,
            path,
            schema,
            field,
        })
    }

    /// Value of a primitive field
    ///
    /// # Errors
    /// Returns error when the address is unresolved or not a primitive field
    pub fn primitive(&self, address: &Address) -> Result<&PrimitiveValue, GraphError> {
        self.field(address)?
            .as_primitive()
            .ok_or_else(|| GraphError::NotAPrimitive(address.clone()))
    }

    /// Target of a pointer field
    ///
    /// # Errors
    /// Returns error when the address is unresolved or not a pointer field
    pub fn pointer(&self, address: &Address) -> Result<Option<&Address>, GraphError> {
        self.field(address)?
            .as_pointer()
            .ok_or_else(|| GraphError::NotAPointer(address.clone()))
    }

    /// Vertex a pointer field currently resolves to
    ///
    /// `None` when the pointer is unset or its target is not (yet) present.
    ///
    /// # Errors
    /// Returns error when `pointer` is not a pointer field
    pub fn target_vertex(&self, pointer: &Address) -> Result<Option<Vertex<'_>>, GraphError> {
        Ok(self.pointer(pointer)?.and_then(|target| self.try_find_vertex(target)))
    }

    fn field(&self, address: &Address) -> Result<&Field, GraphError> {
        self.boxes
            .get(&address.uuid())
            .and_then(|node| node.field(address.keys()))
            .ok_or_else(|| GraphError::UnresolvedAddress(address.clone()))
    }

    /// Reverse index of a vertex, `None` when nothing points at it
    #[must_use]
    pub fn pointer_hub(&self, target: &Address) -> Option<&PointerHub> {
        self.hubs.get(target)
    }

    /// Pointer fields targeting exactly `target`
    #[must_use]
    pub fn incoming(&self, target: &Address) -> Vec<Address> {
        self.hubs
            .get(target)
            .map(|hub| hub.incoming().cloned().collect())
            .unwrap_or_default()
    }

    /// Pointer fields of other boxes targeting any vertex of `uuid`
    #[must_use]
    pub fn incoming_to_box(&self, uuid: BoxId) -> Vec<Address> {
        self.hubs
            .range(Address::root(uuid)..)
            .take_while(|(target, _)| target.uuid() == uuid)
            .flat_map(|(_, hub)| hub.incoming())
            .filter(|pointer| pointer.uuid() != uuid)
            .cloned()
            .collect()
    }

    /// Incoming pointers to `uuid` that are mandatory for their owner
    #[must_use]
    pub fn mandatory_incoming(&self, uuid: BoxId) -> Vec<Address> {
        self.incoming_to_box(uuid)
            .into_iter()
            .filter(|pointer| {
                self.boxes
                    .get(&pointer.uuid())
                    .and_then(|owner| pointer_type_of(owner.schema(), pointer.keys()))
                    .is_some_and(|(_, mandatory)| mandatory)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Open a transaction
    ///
    /// # Errors
    /// Returns [`GraphError::TransactionInProgress`] when one is already open
    pub fn begin_transaction(&mut self) -> Result<(), GraphError> {
        if self.transaction.is_some() {
            return Err(GraphError::TransactionInProgress);
        }
        self.transaction = Some(Transaction::default());
        self.listeners.dispatch_transaction(TransactionEvent::Began);
        Ok(())
    }

    /// Close the open transaction, returning its updates in emission order
    ///
    /// Pending pointers are resolved and, when configured, requirements are
    /// validated for every box the transaction touched.
    ///
    /// # Errors
    /// Returns the failing check's error after rolling the transaction back
    pub fn commit(&mut self) -> Result<Vec<GraphUpdate>, GraphError> {
        if self.transaction.is_none() {
            return Err(GraphError::NoTransaction);
        }
        let mut resolved = Vec::new();
        let checked = self
            .resolve_pending(&mut resolved)
            .and_then(|()| self.validate_touched());
        if let Err(err) = checked {
            tracing::warn!(error = %err, "commit failed, rolling back");
            // Links made while resolving are not in the journal.
            for (pointer, target) in resolved.iter().rev() {
                self.unlink(pointer, target);
            }
            self.rollback()?;
            return Err(err);
        }
        let journal = self
            .transaction
            .take()
            .map(|tx| tx.journal)
            .unwrap_or_default();
        tracing::debug!(updates = journal.len(), boxes = self.boxes.len(), "transaction committed");
        self.listeners.dispatch_transaction(TransactionEvent::Committed);
        Ok(journal)
    }

    /// Revert every update of the open transaction
    ///
    /// Listeners observe the reverting updates, newest first.
    ///
    /// # Errors
    /// Returns [`GraphError::NoTransaction`] when none is open, or
    /// [`GraphError::RevertFailed`] for the first update that could not be
    /// reverted. The transaction is closed in both cases.
    pub fn rollback(&mut self) -> Result<(), GraphError> {
        let Some(tx) = self.transaction.take() else {
            return Err(GraphError::NoTransaction);
        };
        tracing::warn!(updates = tx.journal.len(), "rolling back transaction");
        // Reverts run in a scratch transaction whose journal is dropped.
        self.transaction = Some(Transaction::default());
        let mut failure = None;
        for update in tx.journal.iter().rev() {
            if let Err(err) = self.apply(&update.inverse()) {
                tracing::error!(error = %err, kind = update.kind(), "failed to revert update");
                failure.get_or_insert(GraphError::RevertFailed {
                    kind: update.kind(),
                    source: Box::new(err),
                });
            }
        }
        if let Err(err) = self.resolve_pending(&mut Vec::new()) {
            tracing::error!(error = %err, "pointer left unresolved by rollback");
            failure.get_or_insert(GraphError::RevertFailed {
                kind: "pointer",
                source: Box::new(err),
            });
        }
        self.pending.clear();
        self.transaction = None;
        self.listeners.dispatch_transaction(TransactionEvent::RolledBack);
        failure.map_or(Ok(()), Err)
    }

    fn require_transaction(&self) -> Result<(), GraphError> {
        if self.transaction.is_some() {
            Ok(())
        } else {
            Err(GraphError::NoTransaction)
        }
    }

    /// Link every pending pointer, recording each link in `resolved`
    fn resolve_pending(
        &mut self,
        resolved: &mut Vec<(Address, Address)>,
    ) -> Result<(), GraphError> {
        while let Some((pointer, target)) = self.pending.pop_first() {
            let Some((pointer_type, _)) = self
                .boxes
                .get(&pointer.uuid())
                .and_then(|owner| pointer_type_of(owner.schema(), pointer.keys()))
            else {
                // owner was removed after the write
                continue;
            };
            match self.check_target(&pointer, pointer_type, &target) {
                Ok(Resolution::Live) => {
                    self.link(pointer.clone(), target.clone());
                    resolved.push((pointer, target));
                }
                Ok(Resolution::Pending) => {
                    return Err(GraphError::UnresolvedPointer { pointer, target });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn validate_touched(&self) -> Result<(), GraphError> {
        if !self.config.validate_on_commit {
            return Ok(());
        }
        let Some(tx) = &self.transaction else {
            return Ok(());
        };
        for uuid in &tx.touched {
            let Some(node) = self.boxes.get(uuid) else {
                continue;
            };
            for pointer in node.mandatory_pointers() {
                if matches!(node.pointer(pointer.keys()), Some(None)) {
                    return Err(GraphError::RequirementViolated {
                        address: pointer,
                        reason: "mandatory pointer is not set".into(),
                    });
                }
            }
            for target in node.mandatory_targets() {
                if self.hubs.get(&target).map_or(true, PointerHub::is_empty) {
                    return Err(GraphError::RequirementViolated {
                        address: target,
                        reason: "vertex requires an incoming pointer".into(),
                    });
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Create and stage a box with a fresh random id
    ///
    /// # Errors
    /// See [`Self::create_box`]
    pub fn create<F>(&mut self, name: &str, init: F) -> Result<BoxId, GraphError>
    where
        F: FnOnce(&mut BoxInit<'_>) -> Result<(), GraphError>,
    {
        self.create_box(name, BoxId::random(), init)
    }

    /// Create and stage a box of schema `name`
    ///
    /// `init` sets the initial field values; they are captured in the `New`
    /// update instead of producing updates of their own.
    ///
    /// # Errors
    /// Returns error outside a transaction, on a duplicate id, an unknown
    /// schema, a failing initializer or a rejected pointer target
    pub fn create_box<F>(&mut self, name: &str, uuid: BoxId, init: F) -> Result<BoxId, GraphError>
    where
        F: FnOnce(&mut BoxInit<'_>) -> Result<(), GraphError>,
    {
        self.require_transaction()?;
        if self.boxes.contains_key(&uuid) {
            return Err(GraphError::DuplicateBox(uuid));
        }
        let schema = self.registry.require(name)?;
        let mut fields = FieldSet::for_box(&schema);
        init(&mut BoxInit::new(uuid, &schema, &mut fields))?;
        self.stage(uuid, schema, fields)?;
        Ok(uuid)
    }

    /// Stage a box from its encoded fields
    ///
    /// # Errors
    /// Returns error outside a transaction, on a duplicate id, an unknown
    /// schema or a corrupt payload
    pub fn create_box_from_snapshot(
        &mut self,
        name: &str,
        uuid: BoxId,
        snapshot: Bytes,
    ) -> Result<(), GraphError> {
        self.require_transaction()?;
        if self.boxes.contains_key(&uuid) {
            return Err(GraphError::DuplicateBox(uuid));
        }
        let schema = self.registry.require(name)?;
        let fields = decode_fields(&schema, snapshot)?;
        self.stage(uuid, schema, fields)
    }

    fn stage(
        &mut self,
        uuid: BoxId,
        schema: Arc<BoxSchema>,
        fields: FieldSet,
    ) -> Result<(), GraphError> {
        let node = BoxNode::new(uuid, schema, fields);
        let mut links = Vec::new();
        for (pointer, target) in node.outgoing() {
            let (pointer_type, _) = pointer_type_of(node.schema(), pointer.keys())
                .ok_or_else(|| GraphError::NotAPointer(pointer.clone()))?;
            let resolution = self.check_target(&pointer, pointer_type, &target)?;
            links.push((pointer, target, resolution));
        }
        let name = node.name().to_string();
        let snapshot = node.encode();
        self.boxes.insert(uuid, node);
        for (pointer, target, resolution) in links {
            match resolution {
                Resolution::Live => self.link(pointer, target),
                Resolution::Pending => {
                    self.pending.insert(pointer, target);
                }
            }
        }
        tracing::debug!(%uuid, %name, "box staged");
        self.emit(GraphUpdate::New {
            uuid,
            name,
            snapshot,
        });
        Ok(())
    }

    /// Write a primitive field; writing the current value is a no-op
    ///
    /// # Errors
    /// Returns error outside a transaction, when the address is not a
    /// primitive field or the value type differs
    pub fn set_primitive(
        &mut self,
        address: &Address,
        value: impl Into<PrimitiveValue>,
    ) -> Result<(), GraphError> {
        self.require_transaction()?;
        let value = value.into();
        let slot = self
            .boxes
            .get_mut(&address.uuid())
            .and_then(|node| node.fields_mut().get_mut(address.keys()))
            .ok_or_else(|| GraphError::UnresolvedAddress(address.clone()))?;
        let Field::Primitive(current) = slot else {
            return Err(GraphError::NotAPrimitive(address.clone()));
        };
        check_type(address, current, &value)?;
        if *current == value {
            return Ok(());
        }
        let old = std::mem::replace(current, value.clone());
        tracing::trace!(%address, %value, "primitive set");
        self.emit(GraphUpdate::Primitive {
            address: address.clone(),
            old,
            new: value,
        });
        Ok(())
    }

    /// Retarget a pointer field; writing the current target is a no-op
    ///
    /// The old target's hub loses the pointer before the new one gains it.
    /// A target box that does not exist yet leaves the pointer pending until
    /// commit.
    ///
    /// # Errors
    /// Returns error outside a transaction, when the address is not a pointer
    /// field, the target path does not exist in a present box, or the target
    /// rejects the pointer type
    pub fn set_pointer(
        &mut self,
        address: &Address,
        target: Option<Address>,
    ) -> Result<(), GraphError> {
        self.require_transaction()?;
        let node = self
            .boxes
            .get(&address.uuid())
            .ok_or_else(|| GraphError::UnresolvedAddress(address.clone()))?;
        let (pointer_type, _) = pointer_type_of(node.schema(), address.keys())
            .ok_or_else(|| GraphError::NotAPointer(address.clone()))?;
        let old = node
            .pointer(address.keys())
            .ok_or_else(|| GraphError::UnresolvedAddress(address.clone()))?
            .cloned();
        if old == target {
            return Ok(());
        }
        let resolution = target
            .as_ref()
            .map(|t| self.check_target(address, pointer_type, t))
            .transpose()?;

        if let Some(old_target) = &old {
            self.unlink(address, old_target);
        }
        if let Some(slot) = self
            .boxes
            .get_mut(&address.uuid())
            .and_then(|node| node.fields_mut().get_mut(address.keys()))
        {
            *slot = Field::Pointer(target.clone());
        }
        match (&target, resolution) {
            (Some(t), Some(Resolution::Live)) => self.link(address.clone(), t.clone()),
            (Some(t), Some(Resolution::Pending)) => {
                self.pending.insert(address.clone(), t.clone());
            }
            _ => {}
        }
        tracing::trace!(%address, ?target, "pointer set");
        self.emit(GraphUpdate::Pointer {
            address: address.clone(),
            old,
            new: target,
        });
        Ok(())
    }

    /// Unstage a box that nothing points at
    ///
    /// The box's own outgoing pointers are deregistered; its fields are kept
    /// in the `Delete` update.
    ///
    /// # Errors
    /// Returns error outside a transaction, for unknown ids, or when other
    /// boxes still point into the box
    pub fn remove_box(&mut self, uuid: BoxId) -> Result<(), GraphError> {
        self.require_transaction()?;
        let node = self.boxes.get(&uuid).ok_or(GraphError::UnknownBox(uuid))?;
        let count = self.incoming_to_box(uuid).len();
        if count > 0 {
            return Err(GraphError::HasIncomingPointers { uuid, count });
        }
        let outgoing = node.outgoing();
        let name = node.name().to_string();
        let snapshot = node.encode();
        for (pointer, target) in &outgoing {
            self.unlink(pointer, target);
        }
        self.boxes.remove(&uuid);
        tracing::debug!(%uuid, %name, "box unstaged");
        self.emit(GraphUpdate::Delete {
            uuid,
            name,
            snapshot,
        });
        Ok(())
    }

    /// Delete a box, severing every pointer into and out of it
    ///
    /// Returns the ids of all deleted boxes.
    ///
    /// # Errors
    /// Returns [`GraphError::MandatoryPointers`] in strict mode when another box
    /// depends on the box, and [`GraphError::CascadeCycle`] when cascading meets
    /// a cycle of mandatory pointers. The graph is unchanged in both cases.
    pub fn delete_box(&mut self, uuid: BoxId, mode: DeleteMode) -> Result<Vec<BoxId>, GraphError> {
        self.require_transaction()?;
        if !self.boxes.contains_key(&uuid) {
            return Err(GraphError::UnknownBox(uuid));
        }
        let doomed = self.deletion_set(uuid, mode)?;

        for id in &doomed {
            let outgoing = self.boxes.get(id).map(BoxNode::outgoing).unwrap_or_default();
            for (pointer, _) in outgoing {
                self.set_pointer(&pointer, None)?;
            }
        }
        for id in &doomed {
            for pointer in self.incoming_to_box(*id) {
                self.set_pointer(&pointer, None)?;
            }
        }
        for id in &doomed {
            self.remove_box(*id)?;
        }
        tracing::debug!(%uuid, count = doomed.len(), ?mode, "boxes deleted");
        Ok(doomed)
    }

    fn deletion_set(&self, root: BoxId, mode: DeleteMode) -> Result<Vec<BoxId>, GraphError> {
        let mut order = Vec::new();
        let mut done = BTreeSet::new();
        let mut path = Vec::new();
        self.collect_dependents(root, mode, &mut path, &mut done, &mut order)?;
        Ok(order)
    }

    fn collect_dependents(
        &self,
        uuid: BoxId,
        mode: DeleteMode,
        path: &mut Vec<BoxId>,
        done: &mut BTreeSet<BoxId>,
        order: &mut Vec<BoxId>,
    ) -> Result<(), GraphError> {
        if done.contains(&uuid) {
            return Ok(());
        }
        if path.contains(&uuid) {
            let mut cycle = path.clone();
            cycle.push(uuid);
            return Err(GraphError::CascadeCycle { path: cycle });
        }
        let holders = self.mandatory_incoming(uuid);
        if mode == DeleteMode::Strict && !holders.is_empty() {
            return Err(GraphError::MandatoryPointers {
                target: uuid,
                pointers: holders,
            });
        }
        path.push(uuid);
        let owners: BTreeSet<BoxId> = holders.iter().map(Address::uuid).collect();
        for owner in owners {
            self.collect_dependents(owner, mode, path, done, order)?;
        }
        path.pop();
        done.insert(uuid);
        order.push(uuid);
        Ok(())
    }

    /// Apply an update forward
    ///
    /// This is how undo, redo and rollback replay recorded changes.
    ///
    /// # Errors
    /// Returns the underlying mutation's error
    pub fn apply(&mut self, update: &GraphUpdate) -> Result<(), GraphError> {
        match update {
            GraphUpdate::New {
                uuid,
                name,
                snapshot,
            } => self.create_box_from_snapshot(name, *uuid, snapshot.clone()),
            GraphUpdate::Primitive { address, new, .. } => self.set_primitive(address, new.clone()),
            GraphUpdate::Pointer { address, new, .. } => self.set_pointer(address, new.clone()),
            GraphUpdate::Delete { uuid, .. } => self.remove_box(*uuid),
        }
    }

    fn check_target(
        &self,
        pointer: &Address,
        pointer_type: PointerType,
        target: &Address,
    ) -> Result<Resolution, GraphError> {
        if !self.boxes.contains_key(&target.uuid()) {
            return Ok(Resolution::Pending);
        }
        let vertex = self.find_vertex(target)?;
        if vertex.pointer_rules().accepts(pointer_type) {
            Ok(Resolution::Live)
        } else {
            Err(GraphError::PointerRejected {
                pointer: pointer.clone(),
                target: target.clone(),
                pointer_type,
            })
        }
    }

    fn link(&mut self, pointer: Address, target: Address) {
        self.hubs.entry(target.clone()).or_default().add(pointer.clone());
        self.listeners
            .dispatch_hub(&HubEvent::Added { target, pointer });
    }

    fn unlink(&mut self, pointer: &Address, target: &Address) {
        if self.pending.remove(pointer).is_some() {
            return;
        }
        let Some(hub) = self.hubs.get_mut(target) else {
            return;
        };
        if !hub.remove(pointer) {
            return;
        }
        if hub.is_empty() {
            self.hubs.remove(target);
        }
        self.listeners.dispatch_hub(&HubEvent::Removed {
            target: target.clone(),
            pointer: pointer.clone(),
        });
    }

    fn emit(&mut self, update: GraphUpdate) {
        self.listeners.dispatch_update(&update);
        let Some(tx) = self.transaction.as_mut() else {
            return;
        };
        tx.touched.insert(update.uuid());
        if let GraphUpdate::Pointer { old, new, .. } = &update {
            tx.touched.extend(old.iter().chain(new.iter()).map(Address::uuid));
        }
        tx.journal.push(update);
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Receive every update
    pub fn subscribe_all(&mut self, listener: impl FnMut(&GraphUpdate) + Send + 'static) -> SubscriptionId {
        self.listeners.add_update(Box::new(listener))
    }

    /// Receive updates addressed to a vertex (and below it with [`Propagation::Children`])
    pub fn subscribe_vertex(
        &mut self,
        address: Address,
        propagation: Propagation,
        listener: impl FnMut(&GraphUpdate) + Send + 'static,
    ) -> SubscriptionId {
        self.listeners.add_vertex(address, propagation, Box::new(listener))
    }

    /// Receive transaction lifecycle events
    pub fn subscribe_transactions(
        &mut self,
        listener: impl FnMut(TransactionEvent) + Send + 'static,
    ) -> SubscriptionId {
        let listener: TransactionListener = Box::new(listener);
        self.listeners.add_transaction(listener)
    }

    /// Receive hub changes of `target` after replaying its current pointers as `Added`
    pub fn catchup_and_subscribe_hub(
        &mut self,
        target: Address,
        mut listener: impl FnMut(&HubEvent) + Send + 'static,
    ) -> SubscriptionId {
        for pointer in self.incoming(&target) {
            listener(&HubEvent::Added {
                target: target.clone(),
                pointer,
            });
        }
        let listener: HubListener = Box::new(listener);
        self.listeners.add_hub(target, listener)
    }

    /// Receive a primitive field's current value now and each new value after
    ///
    /// # Errors
    /// Returns error when the address is not a primitive field
    pub fn catchup_and_subscribe_primitive(
        &mut self,
        address: Address,
        mut listener: impl FnMut(&PrimitiveValue) + Send + 'static,
    ) -> Result<SubscriptionId, GraphError> {
        listener(self.primitive(&address)?);
        let forward: UpdateListener = Box::new(move |update| {
            if let GraphUpdate::Primitive { new, .. } = update {
                listener(new);
            }
        });
        Ok(self.listeners.add_vertex(address, Propagation::This, forward))
    }

    /// Receive a pointer field's current target now and each new target after
    ///
    /// # Errors
    /// Returns error when the address is not a pointer field
    pub fn catchup_and_subscribe_pointer(
        &mut self,
        address: Address,
        mut listener: impl FnMut(Option<&Address>) + Send + 'static,
    ) -> Result<SubscriptionId, GraphError> {
        listener(self.pointer(&address)?);
        let forward: UpdateListener = Box::new(move |update| {
            if let GraphUpdate::Pointer { new, .. } = update {
                listener(new.as_ref());
            }
        });
        Ok(self.listeners.add_vertex(address, Propagation::This, forward))
    }

    /// Cancel a subscription; `false` when already cancelled
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use box_core::{FieldSchema, PointerRules};
    use std::sync::Mutex;

    const OWNS: PointerType = PointerType::new(1);

    fn registry() -> Arc<SchemaRegistry> {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                BoxSchema::new("Owner")
                    .rules(PointerRules::accepting(&[OWNS]))
                    .field(FieldSchema::string(1, "name", "")),
            )
            .unwrap();
        registry
            .register(
                BoxSchema::new("Child")
                    .rules(PointerRules::accepting(&[OWNS]))
                    .field(FieldSchema::pointer(1, "owner", OWNS, true))
                    .field(FieldSchema::pointer(2, "peer", OWNS, false)),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn in_tx<R>(graph: &mut BoxGraph, f: impl FnOnce(&mut BoxGraph) -> Result<R, GraphError>) -> R {
        graph.begin_transaction().unwrap();
        let result = f(graph).unwrap();
        graph.commit().unwrap();
        result
    }

    #[test]
    fn mutations_need_a_transaction() {
        let mut graph = BoxGraph::new(registry());
        assert!(matches!(
            graph.create("Owner", |_| Ok(())),
            Err(GraphError::NoTransaction)
        ));
        graph.begin_transaction().unwrap();
        assert!(matches!(
            graph.begin_transaction(),
            Err(GraphError::TransactionInProgress)
        ));
    }

    #[test]
    fn create_duplicate_fails() {
        let mut graph = BoxGraph::new(registry());
        let id = BoxId::random();
        graph.begin_transaction().unwrap();
        graph.create_box("Owner", id, |_| Ok(())).unwrap();
        assert!(matches!(
            graph.create_box("Owner", id, |_| Ok(())),
            Err(GraphError::DuplicateBox(dup)) if dup == id
        ));
    }

    #[test]
    fn identical_primitive_write_is_silent() {
        let mut graph = BoxGraph::new(registry());
        let owner = in_tx(&mut graph, |g| g.create("Owner", |_| Ok(())));
        let events = Arc::new(Mutex::new(0));
        let counter = events.clone();
        graph.subscribe_all(move |_| *counter.lock().unwrap() += 1);

        let name = Address::compose(owner, &[1]);
        in_tx(&mut graph, |g| {
            g.set_primitive(&name, "")?;
            g.set_primitive(&name, "bass")
        });
        assert_eq!(*events.lock().unwrap(), 1);
        assert_eq!(graph.primitive(&name).unwrap(), &PrimitiveValue::from("bass"));
    }

    #[test]
    fn pointer_writes_maintain_hubs() {
        let mut graph = BoxGraph::new(registry());
        let (a, b) = in_tx(&mut graph, |g| {
            Ok((g.create("Owner", |_| Ok(()))?, g.create("Owner", |_| Ok(()))?))
        });
        let child = in_tx(&mut graph, |g| {
            g.create("Child", |init| {
                init.set_pointer(&[1], Some(Address::root(a)))?;
                Ok(())
            })
        });
        let owner_field = Address::compose(child, &[1]);
        assert_eq!(graph.incoming(&Address::root(a)), vec![owner_field.clone()]);

        in_tx(&mut graph, |g| g.set_pointer(&owner_field, Some(Address::root(b))));
        assert!(graph.pointer_hub(&Address::root(a)).is_none());
        assert_eq!(graph.incoming(&Address::root(b)), vec![owner_field]);
    }

    #[test]
    fn rejected_pointer_type_fails() {
        let mut registry = SchemaRegistry::new();
        registry.register(BoxSchema::new("Closed")).unwrap();
        registry
            .register(BoxSchema::new("Ref").field(FieldSchema::pointer(1, "to", OWNS, false)))
            .unwrap();
        let mut graph = BoxGraph::new(Arc::new(registry));
        let closed = in_tx(&mut graph, |g| g.create("Closed", |_| Ok(())));
        let r = in_tx(&mut graph, |g| g.create("Ref", |_| Ok(())));

        graph.begin_transaction().unwrap();
        let result = graph.set_pointer(&Address::compose(r, &[1]), Some(Address::root(closed)));
        assert!(matches!(result, Err(GraphError::PointerRejected { .. })));
    }

    #[test]
    fn pending_pointer_resolves_when_target_arrives() {
        let mut graph = BoxGraph::new(registry());
        let owner = BoxId::random();
        let child = in_tx(&mut graph, |g| {
            let child = g.create("Child", |init| {
                init.set_pointer(&[1], Some(Address::root(owner)))?;
                Ok(())
            })?;
            g.create_box("Owner", owner, |_| Ok(()))?;
            Ok(child)
        });
        assert_eq!(
            graph.incoming(&Address::root(owner)),
            vec![Address::compose(child, &[1])]
        );
    }

    #[test]
    fn unresolved_pending_pointer_fails_commit_and_rolls_back() {
        let mut graph = BoxGraph::new(registry());
        graph.begin_transaction().unwrap();
        graph
            .create("Child", |init| {
                init.set_pointer(&[1], Some(Address::root(BoxId::random())))?;
                Ok(())
            })
            .unwrap();
        assert!(matches!(
            graph.commit(),
            Err(GraphError::UnresolvedPointer { .. })
        ));
        assert_eq!(graph.box_count(), 0);
        assert!(!graph.in_transaction());
    }

    #[test]
    fn failed_commit_unlinks_resolved_pointers() {
        let mut graph = BoxGraph::new(registry());
        in_tx(&mut graph, |g| g.create("Owner", |_| Ok(())));
        let before = graph.checksum();
        let hub_events = Arc::new(Mutex::new(Vec::new()));
        let sink = hub_events.clone();
        let late = BoxId::random();
        graph.catchup_and_subscribe_hub(Address::root(late), move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        graph.begin_transaction().unwrap();
        graph
            .create("Child", |init| {
                init.set_pointer(&[1], Some(Address::root(late)))?;
                Ok(())
            })
            .unwrap();
        graph.create_box("Owner", late, |_| Ok(())).unwrap();
        graph.create("Child", |_| Ok(())).unwrap();

        assert!(matches!(
            graph.commit(),
            Err(GraphError::RequirementViolated { .. })
        ));
        assert_eq!(graph.box_count(), 1);
        assert!(!graph.contains(late));
        assert_eq!(graph.checksum(), before);
        assert!(graph.incoming(&Address::root(late)).is_empty());
        graph.verify_pointer_hubs().unwrap();

        let events = hub_events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], HubEvent::Added { .. }));
        assert!(matches!(events[1], HubEvent::Removed { .. }));
    }

    #[test]
    fn missing_field_in_present_box_is_rejected() {
        let mut graph = BoxGraph::new(registry());
        let owner = in_tx(&mut graph, |g| g.create("Owner", |_| Ok(())));
        graph.begin_transaction().unwrap();
        let result = graph.create("Child", |init| {
            init.set_pointer(&[1], Some(Address::compose(owner, &[9])))?;
            Ok(())
        });
        assert!(matches!(result, Err(GraphError::UnresolvedAddress(_))));
    }

    #[test]
    fn commit_validates_mandatory_pointers() {
        let mut graph = BoxGraph::new(registry());
        graph.begin_transaction().unwrap();
        graph.create("Child", |_| Ok(())).unwrap();
        assert!(matches!(
            graph.commit(),
            Err(GraphError::RequirementViolated { .. })
        ));
        assert_eq!(graph.box_count(), 0);

        let mut lenient = BoxGraph::with_config(
            registry(),
            GraphConfig {
                validate_on_commit: false,
            },
        );
        in_tx(&mut lenient, |g| g.create("Child", |_| Ok(())));
        assert_eq!(lenient.box_count(), 1);
    }

    #[test]
    fn strict_delete_leaves_graph_unchanged() {
        let mut graph = BoxGraph::new(registry());
        let owner = in_tx(&mut graph, |g| g.create("Owner", |_| Ok(())));
        in_tx(&mut graph, |g| {
            g.create("Child", |init| {
                init.set_pointer(&[1], Some(Address::root(owner)))?;
                Ok(())
            })
        });

        graph.begin_transaction().unwrap();
        let result = graph.delete_box(owner, DeleteMode::Strict);
        assert!(matches!(result, Err(GraphError::MandatoryPointers { .. })));
        assert_eq!(graph.commit().unwrap(), Vec::new());
        assert_eq!(graph.box_count(), 2);
    }

    #[test]
    fn delete_clears_optional_pointers_of_survivors() {
        let mut graph = BoxGraph::new(registry());
        let (owner, peer) = in_tx(&mut graph, |g| {
            Ok((g.create("Owner", |_| Ok(()))?, g.create("Owner", |_| Ok(()))?))
        });
        let child = in_tx(&mut graph, |g| {
            g.create("Child", |init| {
                init.set_pointer(&[1], Some(Address::root(owner)))?;
                init.set_pointer(&[2], Some(Address::root(peer)))?;
                Ok(())
            })
        });

        let deleted = in_tx(&mut graph, |g| g.delete_box(peer, DeleteMode::Strict));
        assert_eq!(deleted, vec![peer]);
        assert_eq!(graph.pointer(&Address::compose(child, &[2])).unwrap(), None);
        graph.verify_pointer_hubs().unwrap();
    }

    #[test]
    fn cascade_cycle_is_reported() {
        let mut graph = BoxGraph::with_config(
            registry(),
            GraphConfig {
                validate_on_commit: false,
            },
        );
        let (a, b) = in_tx(&mut graph, |g| {
            Ok((g.create("Child", |_| Ok(()))?, g.create("Child", |_| Ok(()))?))
        });
        in_tx(&mut graph, |g| {
            g.set_pointer(&Address::compose(a, &[1]), Some(Address::root(b)))?;
            g.set_pointer(&Address::compose(b, &[1]), Some(Address::root(a)))
        });

        graph.begin_transaction().unwrap();
        match graph.delete_box(a, DeleteMode::Cascade) {
            Err(GraphError::CascadeCycle { path }) => assert_eq!(path, vec![a, b, a]),
            other => panic!("expected cycle, got {other:?}"),
        }
        graph.rollback().unwrap();
        assert_eq!(graph.box_count(), 2);
    }

    #[test]
    fn rollback_restores_state_and_notifies() {
        let mut graph = BoxGraph::new(registry());
        let owner = in_tx(&mut graph, |g| {
            g.create("Owner", |init| {
                init.set(&[1], "drums")?;
                Ok(())
            })
        });
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        graph.subscribe_transactions(move |event| sink.lock().unwrap().push(event));

        let name = Address::compose(owner, &[1]);
        graph.begin_transaction().unwrap();
        graph.set_primitive(&name, "keys").unwrap();
        graph.create("Owner", |_| Ok(())).unwrap();
        graph.rollback().unwrap();

        assert_eq!(graph.primitive(&name).unwrap(), &PrimitiveValue::from("drums"));
        assert_eq!(graph.box_count(), 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec![TransactionEvent::Began, TransactionEvent::RolledBack]
        );
    }

    #[test]
    fn floor_and_range_queries_follow_id_order() {
        let mut graph = BoxGraph::new(registry());
        let ids = [[1u8; 16], [5u8; 16], [9u8; 16]].map(BoxId::from_bytes);
        in_tx(&mut graph, |g| {
            for id in ids {
                g.create_box("Owner", id, |_| Ok(()))?;
            }
            Ok(())
        });
        let probe = BoxId::from_bytes([6u8; 16]);
        assert_eq!(graph.floor_box(probe).map(BoxNode::uuid), Some(ids[1]));
        assert!(graph.floor_box(BoxId::LOWEST).is_none());
        let range: Vec<_> = graph
            .boxes_in_range(ids[1], BoxId::HIGHEST)
            .map(BoxNode::uuid)
            .collect();
        assert_eq!(range, vec![ids[1], ids[2]]);
        assert_eq!(graph.boxes_in_range(ids[2], ids[0]).count(), 0);
    }

    #[test]
    fn catchup_subscriptions_replay_current_state() {
        let mut graph = BoxGraph::new(registry());
        let owner = in_tx(&mut graph, |g| g.create("Owner", |_| Ok(())));
        let child = in_tx(&mut graph, |g| {
            g.create("Child", |init| {
                init.set_pointer(&[1], Some(Address::root(owner)))?;
                Ok(())
            })
        });

        let hub_events = Arc::new(Mutex::new(Vec::new()));
        let sink = hub_events.clone();
        graph.catchup_and_subscribe_hub(Address::root(owner), move |event| {
            sink.lock().unwrap().push(event.clone());
        });
        let names = Arc::new(Mutex::new(Vec::new()));
        let sink = names.clone();
        graph
            .catchup_and_subscribe_primitive(Address::compose(owner, &[1]), move |value| {
                sink.lock().unwrap().push(value.clone());
            })
            .unwrap();

        in_tx(&mut graph, |g| {
            g.set_primitive(&Address::compose(owner, &[1]), "synth")?;
            g.set_pointer(&Address::compose(child, &[2]), Some(Address::root(owner)))
        });

        assert_eq!(
            *names.lock().unwrap(),
            vec![PrimitiveValue::from(""), PrimitiveValue::from("synth")]
        );
        let pointers: Vec<_> = hub_events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.pointer().clone())
            .collect();
        assert_eq!(
            pointers,
            vec![Address::compose(child, &[1]), Address::compose(child, &[2])]
        );
    }
}
