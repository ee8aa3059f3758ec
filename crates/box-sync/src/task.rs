//! Update tasks
//!
//! A task is the replayable form of one [`GraphUpdate`]: `New` keeps the
//! full encoded fields, field updates keep only the new value and `Delete`
//! only the id. Tasks own their data, so a queued task is never affected by
//! later edits on the source graph.
//!
//! Wire layout (big-endian):
//!
//! ```text
//! 0 New       | name string | id 16 bytes | fields bytes
//! 1 Primitive | address | tagged value
//! 2 Pointer   | address | present bool | [address]
//! 3 Delete    | id 16 bytes
//! ```

use crate::error::CodecError;
use box_core::{Address, BoxId, DataInput, DataOutput, PrimitiveValue};
use box_graph::{BoxGraph, GraphError, GraphUpdate};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

const TAG_NEW: u8 = 0;
const TAG_PRIMITIVE: u8 = 1;
const TAG_POINTER: u8 = 2;
const TAG_DELETE: u8 = 3;

/// One replayable change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UpdateTask {
    New {
        name: String,
        uuid: BoxId,
        snapshot: Bytes,
    },
    #[serde(rename = "update-primitive")]
    Primitive {
        address: Address,
        value: PrimitiveValue,
    },
    #[serde(rename = "update-pointer")]
    Pointer {
        address: Address,
        target: Option<Address>,
    },
    Delete {
        uuid: BoxId,
    },
}

impl UpdateTask {
    /// Replay against a graph inside its open transaction
    ///
    /// # Errors
    /// Returns the graph error of the underlying mutation
    pub fn apply(&self, graph: &mut BoxGraph) -> Result<(), GraphError> {
        match self {
            Self::New {
                name,
                uuid,
                snapshot,
            } => graph.create_box_from_snapshot(name, *uuid, snapshot.clone()),
            Self::Primitive { address, value } => graph.set_primitive(address, value.clone()),
            Self::Pointer { address, target } => graph.set_pointer(address, target.clone()),
            Self::Delete { uuid } => graph.remove_box(*uuid),
        }
    }

    /// Append the binary form
    pub fn write(&self, out: &mut DataOutput) {
        match self {
            Self::New {
                name,
                uuid,
                snapshot,
            } => {
                out.write_u8(TAG_NEW);
                out.write_string(name);
                out.write_raw(uuid.as_bytes());
                out.write_bytes(snapshot);
            }
            Self::Primitive { address, value } => {
                out.write_u8(TAG_PRIMITIVE);
                address.write(out);
                value.write_tagged(out);
            }
            Self::Pointer { address, target } => {
                out.write_u8(TAG_POINTER);
                address.write(out);
                out.write_bool(target.is_some());
                if let Some(target) = target {
                    target.write(out);
                }
            }
            Self::Delete { uuid } => {
                out.write_u8(TAG_DELETE);
                out.write_raw(uuid.as_bytes());
            }
        }
    }

    /// Read one task written by [`Self::write`]
    ///
    /// # Errors
    /// Returns [`CodecError`] on unknown tags or truncated input
    pub fn read(input: &mut DataInput) -> Result<Self, CodecError> {
        let task = match input.read_u8()? {
            TAG_NEW => Self::New {
                name: input.read_string()?,
                uuid: read_id(input)?,
                snapshot: input.read_bytes()?,
            },
            TAG_PRIMITIVE => Self::Primitive {
                address: Address::read(input)?,
                value: PrimitiveValue::read_tagged(input)?,
            },
            TAG_POINTER => {
                let address = Address::read(input)?;
                let target = if input.read_bool()? {
                    Some(Address::read(input)?)
                } else {
                    None
                };
                Self::Pointer { address, target }
            }
            TAG_DELETE => Self::Delete {
                uuid: read_id(input)?,
            },
            tag => return Err(CodecError::UnknownTag { kind: "task", tag }),
        };
        Ok(task)
    }
}

impl From<&GraphUpdate> for UpdateTask {
    fn from(update: &GraphUpdate) -> Self {
        match update {
            GraphUpdate::New {
                uuid,
                name,
                snapshot,
            } => Self::New {
                name: name.clone(),
                uuid: *uuid,
                snapshot: snapshot.clone(),
            },
            GraphUpdate::Primitive { address, new, .. } => Self::Primitive {
                address: address.clone(),
                value: new.clone(),
            },
            GraphUpdate::Pointer { address, new, .. } => Self::Pointer {
                address: address.clone(),
                target: new.clone(),
            },
            GraphUpdate::Delete { uuid, .. } => Self::Delete { uuid: *uuid },
        }
    }
}

pub(crate) fn read_id(input: &mut DataInput) -> Result<BoxId, CodecError> {
    let raw = input.read_raw(BoxId::LENGTH)?;
    Ok(BoxId::from_slice(&raw)?)
}
