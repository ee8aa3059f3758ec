//! Box schemas
//!
//! A [`BoxSchema`] is the data-driven description of one box type: its fixed
//! set of keyed fields, the pointer rules of its vertices and the capability
//! interfaces it implements. Schemas are produced by an external generator
//! and registered in a [`SchemaRegistry`]; nothing in the graph hardcodes a
//! box shape.

use crate::address::FieldKey;
use crate::io::MAX_ENTRIES;
use crate::value::{PrimitiveType, PrimitiveValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Closed set of pointer kinds, enumerated by the schema provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointerType(u16);

impl PointerType {
    #[inline]
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn id(self) -> u16 {
        self.0
    }
}

impl Display for PointerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "pointer#{}", self.0)
    }
}

/// Which pointers may attach to a vertex
///
/// `mandatory` marks a vertex that is only valid while at least one pointer
/// targets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerRules {
    #[serde(default)]
    pub accepts: Vec<PointerType>,
    #[serde(default)]
    pub mandatory: bool,
}

impl PointerRules {
    /// Rules rejecting every pointer
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Rules accepting the given pointer types
    #[must_use]
    pub fn accepting(types: &[PointerType]) -> Self {
        Self {
            accepts: types.to_vec(),
            mandatory: false,
        }
    }

    /// Require at least one incoming pointer
    #[inline]
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Check if a pointer type may attach
    #[inline]
    #[must_use]
    pub fn accepts(&self, pointer_type: PointerType) -> bool {
        self.accepts.contains(&pointer_type)
    }

    /// Check if any pointer may attach
    #[inline]
    #[must_use]
    pub fn is_target(&self) -> bool {
        !self.accepts.is_empty()
    }
}

/// Capability interfaces a box type can declare
///
/// Consumers ask a schema for the field implementing a capability instead of
/// probing for fields by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Pointer field attaching the box to its host
    Host,
    /// Boolean field switching the box on or off
    Enabled,
    /// String field naming the box for display
    Label,
    /// Int32 field ordering the box among siblings
    Index,
}

/// Shape of a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Scalar value with its default
    Primitive { default: PrimitiveValue },
    /// Optional reference to another vertex
    Pointer {
        pointer_type: PointerType,
        #[serde(default)]
        mandatory: bool,
    },
    /// Fixed-length homogeneous sequence, keyed by index
    Array {
        element: Box<FieldSchema>,
        length: u16,
    },
    /// Nested record
    Object { fields: Vec<FieldSchema> },
    /// Data-less vertex that exists to be pointed at
    Target,
}

/// Schema of one keyed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub key: FieldKey,
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub pointer_rules: PointerRules,
}

impl FieldSchema {
    /// Create field schema
    #[must_use]
    pub fn new(key: FieldKey, name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key,
            name: name.into(),
            kind,
            pointer_rules: PointerRules::none(),
        }
    }

    /// Primitive field with a default value
    #[must_use]
    pub fn primitive(key: FieldKey, name: impl Into<String>, default: impl Into<PrimitiveValue>) -> Self {
        Self::new(
            key,
            name,
            FieldKind::Primitive {
                default: default.into(),
            },
        )
    }

    #[must_use]
    pub fn int32(key: FieldKey, name: impl Into<String>, default: i32) -> Self {
        Self::primitive(key, name, default)
    }

    #[must_use]
    pub fn float32(key: FieldKey, name: impl Into<String>, default: f32) -> Self {
        Self::primitive(key, name, default)
    }

    #[must_use]
    pub fn boolean(key: FieldKey, name: impl Into<String>, default: bool) -> Self {
        Self::primitive(key, name, default)
    }

    #[must_use]
    pub fn string(key: FieldKey, name: impl Into<String>, default: &str) -> Self {
        Self::primitive(key, name, default)
    }

    #[must_use]
    pub fn bytes(key: FieldKey, name: impl Into<String>) -> Self {
        Self::primitive(key, name, PrimitiveValue::zero(PrimitiveType::Bytes))
    }

    /// Pointer field
    #[must_use]
    pub fn pointer(key: FieldKey, name: impl Into<String>, pointer_type: PointerType, mandatory: bool) -> Self {
        Self::new(
            key,
            name,
            FieldKind::Pointer {
                pointer_type,
                mandatory,
            },
        )
    }

    /// Fixed-length array of `element`
    #[must_use]
    pub fn array(key: FieldKey, name: impl Into<String>, element: FieldSchema, length: u16) -> Self {
        Self::new(
            key,
            name,
            FieldKind::Array {
                element: Box::new(element),
                length,
            },
        )
    }

    /// Nested object
    #[must_use]
    pub fn object(key: FieldKey, name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self::new(key, name, FieldKind::Object { fields })
    }

    /// Pointer target without data
    #[must_use]
    pub fn target(key: FieldKey, name: impl Into<String>, rules: PointerRules) -> Self {
        Self::new(key, name, FieldKind::Target).with_rules(rules)
    }

    /// Set the pointer rules of this field's vertex
    #[inline]
    #[must_use]
    pub fn with_rules(mut self, rules: PointerRules) -> Self {
        self.pointer_rules = rules;
        self
    }

    /// Child schema for a key (object member or array element)
    #[must_use]
    pub fn child(&self, key: FieldKey) -> Option<&FieldSchema> {
        match &self.kind {
            FieldKind::Object { fields } => fields.iter().find(|f| f.key == key),
            FieldKind::Array { element, length } if key < *length => Some(element),
            _ => None,
        }
    }

    fn validate(&self, box_name: &str) -> Result<(), SchemaError> {
        match &self.kind {
            FieldKind::Object { fields } => validate_fields(box_name, fields),
            FieldKind::Array { element, .. } => element.validate(box_name),
            _ => Ok(()),
        }
    }
}

fn validate_fields(box_name: &str, fields: &[FieldSchema]) -> Result<(), SchemaError> {
    if fields.len() > MAX_ENTRIES {
        return Err(SchemaError::TooManyFields {
            box_name: box_name.to_string(),
            count: fields.len(),
        });
    }
    let mut seen = BTreeSet::new();
    for field in fields {
        if !seen.insert(field.key) {
            return Err(SchemaError::DuplicateKey {
                box_name: box_name.to_string(),
                key: field.key,
            });
        }
        field.validate(box_name)?;
    }
    Ok(())
}

/// Schema of one box type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub pointer_rules: PointerRules,
    #[serde(default)]
    pub capabilities: BTreeMap<Capability, Vec<FieldKey>>,
}

impl BoxSchema {
    /// Create schema with no fields
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            pointer_rules: PointerRules::none(),
            capabilities: BTreeMap::new(),
        }
    }

    /// Add a field
    #[must_use]
    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the pointer rules of the box vertex
    #[must_use]
    pub fn rules(mut self, rules: PointerRules) -> Self {
        self.pointer_rules = rules;
        self
    }

    /// Declare a capability implemented by the field at `path`
    #[must_use]
    pub fn capability(mut self, capability: Capability, path: &[FieldKey]) -> Self {
        self.capabilities.insert(capability, path.to_vec());
        self
    }

    /// Field path implementing a capability
    #[must_use]
    pub fn capability_path(&self, capability: Capability) -> Option<&[FieldKey]> {
        self.capabilities.get(&capability).map(Vec::as_slice)
    }

    /// Check if the box implements a capability
    #[inline]
    #[must_use]
    pub fn implements(&self, capability: Capability) -> bool {
        self.capabilities.contains_key(&capability)
    }

    /// Top-level field by key
    #[must_use]
    pub fn top_field(&self, key: FieldKey) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Field schema at a key path
    ///
    /// Array elements resolve to the array's element schema.
    #[must_use]
    pub fn field_schema(&self, path: &[FieldKey]) -> Option<&FieldSchema> {
        let (first, rest) = path.split_first()?;
        let mut current = self.top_field(*first)?;
        for key in rest {
            current = current.child(*key)?;
        }
        Some(current)
    }

    /// Pointer rules of the vertex at `path` (the box itself when empty)
    #[must_use]
    pub fn rules_at(&self, path: &[FieldKey]) -> Option<&PointerRules> {
        if path.is_empty() {
            return Some(&self.pointer_rules);
        }
        self.field_schema(path).map(|f| &f.pointer_rules)
    }

    /// Check structural validity
    ///
    /// # Errors
    /// Returns error on duplicate keys or capability paths that do not
    /// resolve to a field of the expected shape
    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_fields(&self.name, &self.fields)?;
        for (capability, path) in &self.capabilities {
            let field = self
                .field_schema(path)
                .ok_or_else(|| SchemaError::InvalidCapability {
                    box_name: self.name.clone(),
                    capability: *capability,
                })?;
            let fits = match (capability, &field.kind) {
                (Capability::Host, FieldKind::Pointer { .. }) => true,
                (Capability::Enabled, FieldKind::Primitive { default }) => {
                    default.primitive_type() == PrimitiveType::Boolean
                }
                (Capability::Label, FieldKind::Primitive { default }) => {
                    default.primitive_type() == PrimitiveType::String
                }
                (Capability::Index, FieldKind::Primitive { default }) => {
                    default.primitive_type() == PrimitiveType::Int32
                }
                _ => false,
            };
            if !fits {
                return Err(SchemaError::InvalidCapability {
                    box_name: self.name.clone(),
                    capability: *capability,
                });
            }
        }
        Ok(())
    }
}

/// Registry of box schemas by name
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<BoxSchema>>,
}

impl SchemaRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a schema
    ///
    /// # Errors
    /// Returns error if the name is taken or the schema is invalid
    pub fn register(&mut self, schema: BoxSchema) -> Result<Arc<BoxSchema>, SchemaError> {
        if self.schemas.contains_key(&schema.name) {
            return Err(SchemaError::DuplicateBox(schema.name));
        }
        schema.validate()?;
        let schema = Arc::new(schema);
        self.schemas.insert(schema.name.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Build a registry from a JSON array of schemas
    ///
    /// # Errors
    /// Returns error on malformed JSON or invalid schemas
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schemas: Vec<BoxSchema> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for schema in schemas {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    /// Serialize all schemas as a JSON array
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, SchemaError> {
        let schemas: Vec<&BoxSchema> = self.schemas.values().map(AsRef::as_ref).collect();
        Ok(serde_json::to_string_pretty(&schemas)?)
    }

    /// Schema by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<BoxSchema>> {
        self.schemas.get(name).cloned()
    }

    /// Schema by name, or an error naming the missing box type
    ///
    /// # Errors
    /// Returns [`SchemaError::UnknownBox`] when not registered
    pub fn require(&self, name: &str) -> Result<Arc<BoxSchema>, SchemaError> {
        self.get(name)
            .ok_or_else(|| SchemaError::UnknownBox(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Schema definition and lookup errors
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Box type registered twice
    #[error("box type already registered: {0}")]
    DuplicateBox(String),

    /// Box type not registered
    #[error("unknown box type: {0}")]
    UnknownBox(String),

    /// Two sibling fields share a key
    #[error("duplicate field key {key} in box type {box_name}")]
    DuplicateKey { box_name: String, key: FieldKey },

    /// Collection holds more fields than its `u16` count can describe
    #[error("box type {box_name} declares {count} fields in one collection, at most 65535 are allowed")]
    TooManyFields { box_name: String, count: usize },

    /// Capability path missing or of the wrong shape
    #[error("capability {capability:?} of box type {box_name} does not resolve to a suitable field")]
    InvalidCapability {
        box_name: String,
        capability: Capability,
    },

    /// Schema document malformed
    #[error("schema json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACKS: PointerType = PointerType::new(1);

    fn track_schema() -> BoxSchema {
        BoxSchema::new("Track")
            .field(FieldSchema::pointer(1, "host", TRACKS, true))
            .field(FieldSchema::string(2, "label", "Track"))
            .field(FieldSchema::boolean(3, "enabled", true))
            .field(FieldSchema::array(
                4,
                "sends",
                FieldSchema::float32(0, "level", 0.0),
                4,
            ))
            .field(FieldSchema::object(
                5,
                "color",
                vec![FieldSchema::int32(1, "hue", 0), FieldSchema::int32(2, "sat", 0)],
            ))
            .capability(Capability::Host, &[1])
            .capability(Capability::Label, &[2])
            .capability(Capability::Enabled, &[3])
    }

    #[test]
    fn field_schema_walks_nested_paths() {
        let schema = track_schema();
        assert_eq!(schema.field_schema(&[5, 2]).unwrap().name, "sat");
        assert_eq!(schema.field_schema(&[4, 3]).unwrap().name, "level");
        assert!(schema.field_schema(&[4, 4]).is_none());
        assert!(schema.field_schema(&[9]).is_none());
        assert!(schema.field_schema(&[]).is_none());
    }

    #[test]
    fn rules_at_root_is_box_rules() {
        let schema = track_schema().rules(PointerRules::accepting(&[TRACKS]).mandatory());
        assert!(schema.rules_at(&[]).unwrap().accepts(TRACKS));
        assert!(schema.rules_at(&[]).unwrap().mandatory);
        assert!(!schema.rules_at(&[2]).unwrap().is_target());
    }

    #[test]
    fn capabilities_are_queried_not_probed() {
        let schema = track_schema();
        assert_eq!(schema.capability_path(Capability::Host), Some(&[1u16][..]));
        assert!(!schema.implements(Capability::Index));
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn capability_with_wrong_shape_rejected() {
        let schema = track_schema().capability(Capability::Index, &[2]);
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::InvalidCapability {
                capability: Capability::Index,
                ..
            })
        ));
    }

    #[test]
    fn duplicate_keys_rejected() {
        let schema = BoxSchema::new("Bad")
            .field(FieldSchema::int32(1, "a", 0))
            .field(FieldSchema::int32(1, "b", 0));
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::DuplicateKey { key: 1, .. })
        ));
    }

    #[test]
    fn collections_wider_than_u16_count_rejected() {
        let wide = (0..=u16::MAX).fold(BoxSchema::new("Wide"), |schema, key| {
            schema.field(FieldSchema::int32(key, "slot", 0))
        });
        assert!(matches!(
            SchemaRegistry::new().register(wide),
            Err(SchemaError::TooManyFields { count: 65_536, .. })
        ));
    }

    #[test]
    fn registry_rejects_duplicates_and_reports_unknown() {
        let mut registry = SchemaRegistry::new();
        registry.register(track_schema()).unwrap();
        assert!(matches!(
            registry.register(track_schema()),
            Err(SchemaError::DuplicateBox(_))
        ));
        assert!(matches!(
            registry.require("Clip"),
            Err(SchemaError::UnknownBox(_))
        ));
    }

    #[test]
    fn registry_json_round_trip() {
        let mut registry = SchemaRegistry::new();
        registry.register(track_schema()).unwrap();
        let json = registry.to_json().unwrap();
        let restored = SchemaRegistry::from_json(&json).unwrap();
        assert_eq!(*restored.require("Track").unwrap(), track_schema());
    }
}
