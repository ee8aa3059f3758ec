//! Box Graph Core
//!
//! Identity, addressing, schema and binary codec primitives shared by every
//! crate of the box graph engine.
//!
//! # Core Concepts
//!
//! - [`BoxId`]: 16-byte UUID identifying a box, ordered byte-lexicographically
//! - [`Address`]: box id plus field-key chain locating any vertex
//! - [`BoxSchema`]: data-driven description of a box type and its fields
//! - [`FieldSet`]: the owned field values of one box
//! - [`encode_fields`]/[`decode_fields`]: the length-prefixed, key-addressed
//!   binary format for field collections
//!
//! # Example
//!
//! ```rust
//! use box_core::{encode_fields, decode_fields, BoxSchema, FieldSchema, FieldSet};
//!
//! let schema = BoxSchema::new("Note")
//!     .field(FieldSchema::int32(1, "pitch", 60))
//!     .field(FieldSchema::float32(2, "velocity", 0.8));
//!
//! let fields = FieldSet::for_box(&schema);
//! let bytes = encode_fields(&fields);
//! assert_eq!(decode_fields(&schema, bytes).unwrap(), fields);
//! ```

#![warn(unreachable_pub)]

mod address;
mod field;
mod id;
mod io;
mod schema;
mod serializer;
mod value;

// Re-exports
pub use address::{Address, AddressError, FieldKey, FieldKeys};
pub use field::{Field, FieldSet};
pub use id::{BoxId, IdError};
pub use io::{DataInput, DataOutput, IoError, MAX_ENTRIES};
pub use schema::{
    BoxSchema, Capability, FieldKind, FieldSchema, PointerRules, PointerType, SchemaError,
    SchemaRegistry,
};
pub use serializer::{
    decode_fields, encode_fields, read_field, read_fields, write_field, write_fields,
    SerializeError, MAGIC_HEADER,
};
pub use value::{PrimitiveType, PrimitiveValue, ValueError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
