//! Error types for adapters

use box_core::{Address, Capability, PrimitiveType};
use box_graph::GraphError;

/// Main adapter error type
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Box type does not declare the capability
    #[error("box type {name} does not declare the {capability:?} capability")]
    MissingCapability { name: String, capability: Capability },

    /// Capability field holds a value of the wrong type
    #[error("{capability:?} field {address} holds {actual:?}")]
    CapabilityType {
        capability: Capability,
        address: Address,
        actual: Option<PrimitiveType>,
    },

    /// No factory is registered for the box type
    #[error("no adapter factory for box type {0}")]
    NoFactory(String),

    /// Field type does not fit the mapping
    #[error("{address} holds {actual:?} values, mapping produces {expected:?}")]
    MappingMismatch {
        address: Address,
        expected: PrimitiveType,
        actual: Option<PrimitiveType>,
    },

    /// Mapping range is unusable
    #[error("invalid mapping range {min}..{max}")]
    InvalidRange { min: f32, max: f32 },

    #[error("parameter {0} is already bound")]
    AlreadyBound(Address),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
