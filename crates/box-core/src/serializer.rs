//! Field collection codec
//!
//! Layout of one collection:
//!
//! ```text
//! MAGIC_HEADER u32 | field count u16 | { key u16 | byte length u32 | payload }*
//! ```
//!
//! Each payload is written by its own field. Objects and arrays nest a full
//! collection (arrays key their entries by index). Readers dispatch a payload
//! only when the key exists in their schema and skip unknown keys, so fields
//! added by newer schema revisions never break older readers. Fields absent
//! from the input keep their defaults.

use crate::address::{Address, FieldKey};
use crate::field::{Field, FieldSet};
use crate::io::{count_u16, len_u32, DataInput, DataOutput, IoError};
use crate::schema::{BoxSchema, FieldKind, FieldSchema};
use crate::value::PrimitiveValue;
use bytes::Bytes;

/// Marks the start of every field collection ("FLDS")
pub const MAGIC_HEADER: u32 = 0x464c_4453;

/// Encode a box's fields
#[must_use]
pub fn encode_fields(fields: &FieldSet) -> Bytes {
    let mut out = DataOutput::new();
    write_fields(&mut out, fields);
    out.into_bytes()
}

/// Decode a box's fields, starting from schema defaults
///
/// # Errors
/// Returns [`SerializeError`] when the magic header is wrong or a payload is
/// malformed
pub fn decode_fields(schema: &BoxSchema, bytes: Bytes) -> Result<FieldSet, SerializeError> {
    let mut fields = FieldSet::for_box(schema);
    let mut input = DataInput::new(bytes);
    read_fields(&mut input, &schema.fields, &mut fields)?;
    if !input.is_empty() {
        return Err(SerializeError::Corrupt(format!(
            "{} trailing bytes after field collection",
            input.remaining()
        )));
    }
    Ok(fields)
}

/// Write a collection
///
/// # Panics
/// When `fields` was built from a schema that skipped validation and holds
/// more than [`crate::MAX_ENTRIES`] entries
pub fn write_fields(out: &mut DataOutput, fields: &FieldSet) {
    write_collection(out, fields.iter());
}

fn write_collection<'a>(
    out: &mut DataOutput,
    entries: impl ExactSizeIterator<Item = (FieldKey, &'a Field)>,
) {
    out.write_u32(MAGIC_HEADER);
    out.write_u16(count_u16(entries.len()));
    for (key, field) in entries {
        out.write_u16(key);
        let at = out.reserve_u32();
        let start = out.len();
        write_field(out, field);
        let written = out.len() - start;
        out.patch_u32(at, len_u32(written));
    }
}

/// Write one field payload
pub fn write_field(out: &mut DataOutput, field: &Field) {
    match field {
        Field::Primitive(value) => value.write(out),
        Field::Pointer(None) => out.write_bool(false),
        Field::Pointer(Some(target)) => {
            out.write_bool(true);
            target.write(out);
        }
        Field::Array(items) => {
            let entries = items
                .iter()
                .enumerate()
                .map(|(index, item)| (count_u16(index), item));
            write_collection(out, entries);
        }
        Field::Object(set) => write_fields(out, set),
        Field::Target => {}
    }
}

/// Read a collection into `target`, which must already hold defaults
///
/// # Errors
/// Returns error on magic mismatch or malformed payloads
pub fn read_fields(
    input: &mut DataInput,
    schemas: &[FieldSchema],
    target: &mut FieldSet,
) -> Result<(), SerializeError> {
    read_collection(input, |key, payload| {
        let Some(schema) = schemas.iter().find(|s| s.key == key) else {
            return Ok(());
        };
        let slot = target
            .slot_mut(key)
            .ok_or_else(|| SerializeError::Corrupt(format!("no slot for field {key}")))?;
        read_payload(payload, schema, slot)
    })
}

fn read_collection(
    input: &mut DataInput,
    mut dispatch: impl FnMut(FieldKey, Bytes) -> Result<(), SerializeError>,
) -> Result<(), SerializeError> {
    let magic = input.read_u32()?;
    if magic != MAGIC_HEADER {
        return Err(SerializeError::BadMagic(magic));
    }
    let count = input.read_u16()?;
    for _ in 0..count {
        let key = input.read_u16()?;
        let len = input.read_u32()? as usize;
        let payload = input.read_raw(len)?;
        dispatch(key, payload)?;
    }
    Ok(())
}

fn read_payload(payload: Bytes, schema: &FieldSchema, slot: &mut Field) -> Result<(), SerializeError> {
    let mut input = DataInput::new(payload);
    read_field(&mut input, schema, slot)?;
    if !input.is_empty() {
        return Err(SerializeError::Corrupt(format!(
            "field {} ({}) left {} unread bytes",
            schema.key,
            schema.name,
            input.remaining()
        )));
    }
    Ok(())
}

/// Read one field payload according to its schema
///
/// # Errors
/// Returns error on malformed payloads
pub fn read_field(input: &mut DataInput, schema: &FieldSchema, slot: &mut Field) -> Result<(), SerializeError> {
    match &schema.kind {
        FieldKind::Primitive { default } => {
            *slot = Field::Primitive(PrimitiveValue::read(default.primitive_type(), input)?);
        }
        FieldKind::Pointer { .. } => {
            let target = if input.read_bool()? {
                Some(Address::read(input)?)
            } else {
                None
            };
            *slot = Field::Pointer(target);
        }
        FieldKind::Array { element, .. } => {
            let Field::Array(items) = slot else {
                return Err(SerializeError::Corrupt(format!("field {} is not an array", schema.key)));
            };
            read_collection(input, |index, payload| match items.get_mut(index as usize) {
                Some(item) => read_payload(payload, element, item),
                None => Ok(()),
            })?;
        }
        FieldKind::Object { fields } => {
            let Field::Object(set) = slot else {
                return Err(SerializeError::Corrupt(format!("field {} is not an object", schema.key)));
            };
            read_fields(input, fields, set)?;
        }
        FieldKind::Target => {}
    }
    Ok(())
}

/// Errors decoding serialized state
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// Collection did not start with [`MAGIC_HEADER`]
    #[error("corrupt data: bad magic header {0:#010x}")]
    BadMagic(u32),

    /// Structurally invalid content
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Truncated or malformed bytes
    #[error("corrupt data: {0}")]
    Io(#[from] IoError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::BoxId;
    use crate::schema::PointerType;

    fn v1() -> BoxSchema {
        BoxSchema::new("Region")
            .field(FieldSchema::int32(1, "position", 0))
            .field(FieldSchema::pointer(2, "track", PointerType::new(1), false))
            .field(FieldSchema::array(3, "gains", FieldSchema::float32(0, "gain", 1.0), 2))
    }

    fn v2() -> BoxSchema {
        v1().field(FieldSchema::string(4, "label", "untitled"))
    }

    #[test]
    fn header_layout() {
        let set = FieldSet::for_box(&BoxSchema::new("Empty").field(FieldSchema::int32(7, "x", 5)));
        let bytes = encode_fields(&set);
        // magic, count, key, length, i32 payload
        assert_eq!(&bytes[..4], b"FLDS");
        assert_eq!(&bytes[4..6], &[0, 1]);
        assert_eq!(&bytes[6..8], &[0, 7]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 4]);
        assert_eq!(&bytes[12..], &5i32.to_be_bytes());
    }

    #[test]
    fn round_trip_preserves_values() {
        let schema = v1();
        let mut set = FieldSet::for_box(&schema);
        *set.get_mut(&[1]).unwrap() = Field::Primitive(PrimitiveValue::Int32(960));
        *set.get_mut(&[2]).unwrap() = Field::Pointer(Some(Address::compose(BoxId::random(), &[4])));
        *set.get_mut(&[3, 1]).unwrap() = Field::Primitive(PrimitiveValue::Float32(0.25));

        let decoded = decode_fields(&schema, encode_fields(&set)).unwrap();
        assert_eq!(decoded, set);
    }

    #[test]
    fn newer_fields_are_skipped_by_older_readers() {
        let mut set = FieldSet::for_box(&v2());
        *set.get_mut(&[4]).unwrap() = Field::Primitive(PrimitiveValue::from("kick"));
        *set.get_mut(&[1]).unwrap() = Field::Primitive(PrimitiveValue::Int32(3));

        let decoded = decode_fields(&v1(), encode_fields(&set)).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(
            decoded.get(&[1]).and_then(Field::as_primitive),
            Some(&PrimitiveValue::Int32(3))
        );
    }

    #[test]
    fn missing_fields_keep_defaults() {
        let set = FieldSet::for_box(&v1());
        let decoded = decode_fields(&v2(), encode_fields(&set)).unwrap();
        assert_eq!(
            decoded.get(&[4]).and_then(Field::as_primitive),
            Some(&PrimitiveValue::from("untitled"))
        );
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let result = decode_fields(&v1(), Bytes::from_static(&[0, 0, 0, 0, 0, 0]));
        assert!(matches!(result, Err(SerializeError::BadMagic(0))));
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let bytes = encode_fields(&FieldSet::for_box(&v1()));
        let truncated = bytes.slice(..bytes.len() - 3);
        assert!(matches!(
            decode_fields(&v1(), truncated),
            Err(SerializeError::Io(_))
        ));
    }
}
