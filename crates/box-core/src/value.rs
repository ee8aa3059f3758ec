//! Primitive field values

use crate::io::{DataInput, DataOutput, IoError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Scalar type of a primitive field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    Int32,
    Float32,
    Boolean,
    String,
    Bytes,
}

impl Display for PrimitiveType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// Value held by a primitive field
///
/// Floats compare by bit pattern so that setting the same NaN twice is a
/// no-op and equality stays reflexive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PrimitiveValue {
    Int32(i32),
    Float32(f32),
    Boolean(bool),
    String(String),
    Bytes(Bytes),
}

impl PrimitiveValue {
    /// Scalar type of this value
    #[inline]
    #[must_use]
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Self::Int32(_) => PrimitiveType::Int32,
            Self::Float32(_) => PrimitiveType::Float32,
            Self::Boolean(_) => PrimitiveType::Boolean,
            Self::String(_) => PrimitiveType::String,
            Self::Bytes(_) => PrimitiveType::Bytes,
        }
    }

    /// Zero value of a type
    #[must_use]
    pub fn zero(ty: PrimitiveType) -> Self {
        match ty {
            PrimitiveType::Int32 => Self::Int32(0),
            PrimitiveType::Float32 => Self::Float32(0.0),
            PrimitiveType::Boolean => Self::Boolean(false),
            PrimitiveType::String => Self::String(String::new()),
            PrimitiveType::Bytes => Self::Bytes(Bytes::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float32(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Encode the value payload (no type tag; the schema supplies the type)
    pub fn write(&self, out: &mut DataOutput) {
        match self {
            Self::Int32(v) => out.write_i32(*v),
            Self::Float32(v) => out.write_f32(*v),
            Self::Boolean(v) => out.write_bool(*v),
            Self::String(v) => out.write_string(v),
            Self::Bytes(v) => out.write_bytes(v),
        }
    }

    /// Decode a payload of the given type
    ///
    /// # Errors
    /// Returns error on truncated or malformed input
    pub fn read(ty: PrimitiveType, input: &mut DataInput) -> Result<Self, IoError> {
        Ok(match ty {
            PrimitiveType::Int32 => Self::Int32(input.read_i32()?),
            PrimitiveType::Float32 => Self::Float32(input.read_f32()?),
            PrimitiveType::Boolean => Self::Boolean(input.read_bool()?),
            PrimitiveType::String => Self::String(input.read_string()?),
            PrimitiveType::Bytes => Self::Bytes(input.read_bytes()?),
        })
    }

    /// Encode with a leading type tag, for contexts without a schema
    pub fn write_tagged(&self, out: &mut DataOutput) {
        out.write_u8(type_tag(self.primitive_type()));
        self.write(out);
    }

    /// Decode a value written by [`Self::write_tagged`]
    ///
    /// # Errors
    /// Returns error on unknown tags or malformed payload
    pub fn read_tagged(input: &mut DataInput) -> Result<Self, ValueError> {
        let tag = input.read_u8()?;
        let ty = match tag {
            0 => PrimitiveType::Int32,
            1 => PrimitiveType::Float32,
            2 => PrimitiveType::Boolean,
            3 => PrimitiveType::String,
            4 => PrimitiveType::Bytes,
            other => return Err(ValueError::UnknownTag(other)),
        };
        Ok(Self::read(ty, input)?)
    }
}

fn type_tag(ty: PrimitiveType) -> u8 {
    match ty {
        PrimitiveType::Int32 => 0,
        PrimitiveType::Float32 => 1,
        PrimitiveType::Boolean => 2,
        PrimitiveType::String => 3,
        PrimitiveType::Bytes => 4,
    }
}

impl PartialEq for PrimitiveValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Float32(a), Self::Float32(b)) => a.to_bits() == b.to_bits(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PrimitiveValue {}

impl Display for PrimitiveValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i32> for PrimitiveValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<f32> for PrimitiveValue {
    fn from(value: f32) -> Self {
        Self::Float32(value)
    }
}

impl From<bool> for PrimitiveValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for PrimitiveValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PrimitiveValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Bytes> for PrimitiveValue {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for PrimitiveValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

/// Errors decoding tagged values
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// Unknown type tag
    #[error("unknown primitive type tag: {0}")]
    UnknownTag(u8),

    /// Payload error
    #[error(transparent)]
    Io(#[from] IoError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(PrimitiveValue::Float32(f32::NAN), PrimitiveValue::Float32(f32::NAN));
        assert_ne!(PrimitiveValue::Float32(0.0), PrimitiveValue::Float32(-0.0));
    }

    #[test]
    fn different_types_never_equal() {
        assert_ne!(PrimitiveValue::Int32(1), PrimitiveValue::Boolean(true));
    }

    #[test]
    fn tagged_round_trip() {
        let values = [
            PrimitiveValue::from(-3),
            PrimitiveValue::from(1.5f32),
            PrimitiveValue::from(true),
            PrimitiveValue::from("lead"),
            PrimitiveValue::from(vec![1u8, 2, 3]),
        ];
        let mut out = DataOutput::new();
        for v in &values {
            v.write_tagged(&mut out);
        }
        let mut input = DataInput::new(out.into_bytes());
        for v in &values {
            assert_eq!(&PrimitiveValue::read_tagged(&mut input).unwrap(), v);
        }
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut input = DataInput::from_slice(&[9]);
        assert!(matches!(
            PrimitiveValue::read_tagged(&mut input),
            Err(ValueError::UnknownTag(9))
        ));
    }

    #[test]
    fn serde_json_tagged() {
        let json = serde_json::to_string(&PrimitiveValue::Int32(5)).unwrap();
        assert_eq!(json, r#"{"type":"int32","value":5}"#);
    }
}
