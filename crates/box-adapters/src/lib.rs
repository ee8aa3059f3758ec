//! Box Adapters
//!
//! Read-side views over a [`box_graph::BoxGraph`]: typed adapters created on
//! demand per box, parameter observers that follow values and control
//! sources through graph subscriptions, and capability queries that find
//! fields by declared role instead of by name.
//!
//! # Core Concepts
//!
//! - [`BoxAdapters`]: lazy registry of [`BoxAdapter`]s keyed by box id
//! - [`ParameterAdapter`]: value and incoming pointers of one primitive field
//! - [`ValueMapping`]: unit position to stored value conversion
//! - Capability queries: [`host_of`], [`is_enabled`], [`label_of`], [`index_of`], [`hosted_by`]
//!
//! # Example
//!
//! ```rust
//! use box_adapters::{label_of, ParameterAdapter, ValueMapping};
//! use box_core::{Address, PrimitiveValue};
//! use box_graph::Editing;
//! use box_test_utils::{build_project, graph, keys};
//!
//! let mut graph = graph();
//! let mut editing = Editing::default();
//! let project = build_project(&mut graph)?;
//! assert_eq!(label_of(&graph, project.unit)?, "Drums");
//!
//! let volume = Address::compose(project.unit, &[keys::UNIT_VOLUME]);
//! let parameter = ParameterAdapter::bind(&mut graph, volume, ValueMapping::UNIPOLAR)?;
//! parameter.set_unit_value(&mut editing, &mut graph, 0.5)?;
//! assert_eq!(parameter.value(), PrimitiveValue::Float32(0.5));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(unreachable_pub)]

mod adapter;
mod capability;
mod error;
mod mapping;
mod parameter;

// Re-exports
pub use adapter::{AdapterFactory, BoxAdapter, BoxAdapters};
pub use capability::{
    capability_address, host_of, hosted_by, implements, index_of, is_enabled, label_of,
};
pub use error::AdapterError;
pub use mapping::ValueMapping;
pub use parameter::{ParameterAdapter, ParameterAdapterSet};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
