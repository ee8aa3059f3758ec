//! Capability queries
//!
//! Boxes are asked for their host, enabled flag, label or index through the
//! field path their schema declares for that [`Capability`], never by
//! looking for fields with a particular name.

use crate::error::AdapterError;
use box_core::{Address, BoxId, Capability, PrimitiveValue};
use box_graph::BoxGraph;

/// Address of the field implementing `capability` on box `uuid`
///
/// # Errors
/// Returns [`AdapterError::MissingCapability`] when the box type does not
/// declare it, or a graph error for an unknown box
pub fn capability_address(
    graph: &BoxGraph,
    uuid: BoxId,
    capability: Capability,
) -> Result<Address, AdapterError> {
    let node = graph.require_box(uuid)?;
    let path = node
        .schema()
        .capability_path(capability)
        .ok_or_else(|| AdapterError::MissingCapability {
            name: node.name().to_string(),
            capability,
        })?;
    Ok(Address::compose(uuid, path))
}

/// Check if box `uuid` declares `capability`
#[must_use]
pub fn implements(graph: &BoxGraph, uuid: BoxId, capability: Capability) -> bool {
    graph
        .get_box(uuid)
        .is_some_and(|node| node.schema().implements(capability))
}

/// Vertex the box is attached to, `None` while its host pointer is unset
///
/// # Errors
/// Returns error when the box lacks [`Capability::Host`]
pub fn host_of(graph: &BoxGraph, uuid: BoxId) -> Result<Option<Address>, AdapterError> {
    let address = capability_address(graph, uuid, Capability::Host)?;
    Ok(graph.pointer(&address)?.cloned())
}

/// Enabled flag of the box
///
/// # Errors
/// Returns error when the box lacks [`Capability::Enabled`]
pub fn is_enabled(graph: &BoxGraph, uuid: BoxId) -> Result<bool, AdapterError> {
    let address = capability_address(graph, uuid, Capability::Enabled)?;
    match graph.primitive(&address)? {
        PrimitiveValue::Boolean(enabled) => Ok(*enabled),
        other => Err(mistyped(Capability::Enabled, address, other)),
    }
}

/// Display label of the box
///
/// # Errors
/// Returns error when the box lacks [`Capability::Label`]
pub fn label_of(graph: &BoxGraph, uuid: BoxId) -> Result<String, AdapterError> {
    let address = capability_address(graph, uuid, Capability::Label)?;
    match graph.primitive(&address)? {
        PrimitiveValue::String(label) => Ok(label.clone()),
        other => Err(mistyped(Capability::Label, address, other)),
    }
}

/// Position of the box among its siblings
///
/// # Errors
/// Returns error when the box lacks [`Capability::Index`]
pub fn index_of(graph: &BoxGraph, uuid: BoxId) -> Result<i32, AdapterError> {
    let address = capability_address(graph, uuid, Capability::Index)?;
    match graph.primitive(&address)? {
        PrimitiveValue::Int32(index) => Ok(*index),
        other => Err(mistyped(Capability::Index, address, other)),
    }
}

/// Boxes whose host pointer targets `host`, ordered by index then id
///
/// Boxes without [`Capability::Index`] sort after indexed ones. Each call
/// reads the graph afresh.
pub fn hosted_by<'a>(graph: &'a BoxGraph, host: &Address) -> impl Iterator<Item = BoxId> + 'a {
    let mut children: Vec<(i32, BoxId)> = graph
        .incoming(host)
        .into_iter()
        .filter(|pointer| {
            graph
                .get_box(pointer.uuid())
                .and_then(|node| node.schema().capability_path(Capability::Host))
                .is_some_and(|path| path == pointer.keys())
        })
        .map(|pointer| {
            let uuid = pointer.uuid();
            (index_of(graph, uuid).unwrap_or(i32::MAX), uuid)
        })
        .collect();
    children.sort_unstable();
    children.into_iter().map(|(_, uuid)| uuid)
}

fn mistyped(capability: Capability, address: Address, value: &PrimitiveValue) -> AdapterError {
    AdapterError::CapabilityType {
        capability,
        address,
        actual: Some(value.primitive_type()),
    }
}
