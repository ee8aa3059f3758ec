//! Boxes and vertices

use crate::error::GraphError;
use box_core::{
    encode_fields, Address, BoxId, BoxSchema, Field, FieldKey, FieldKind, FieldSchema, FieldSet,
    PointerRules, PointerType, PrimitiveValue,
};
use bytes::Bytes;
use std::sync::Arc;

/// A staged box: identity, schema and owned field values
#[derive(Debug, Clone, PartialEq)]
pub struct BoxNode {
    uuid: BoxId,
    schema: Arc<BoxSchema>,
    fields: FieldSet,
}

impl BoxNode {
    pub(crate) fn new(uuid: BoxId, schema: Arc<BoxSchema>, fields: FieldSet) -> Self {
        Self {
            uuid,
            schema,
            fields,
        }
    }

    #[inline]
    #[must_use]
    pub fn uuid(&self) -> BoxId {
        self.uuid
    }

    /// Box type name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Arc<BoxSchema> {
        &self.schema
    }

    #[inline]
    #[must_use]
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    #[inline]
    #[must_use]
    pub fn address(&self) -> Address {
        Address::root(self.uuid)
    }

    /// Field at a key path
    #[must_use]
    pub fn field(&self, path: &[FieldKey]) -> Option<&Field> {
        self.fields.get(path)
    }

    /// Primitive value at a key path
    #[must_use]
    pub fn primitive(&self, path: &[FieldKey]) -> Option<&PrimitiveValue> {
        self.fields.get(path).and_then(Field::as_primitive)
    }

    /// Pointer target at a key path; outer `None` when not a pointer field
    #[must_use]
    pub fn pointer(&self, path: &[FieldKey]) -> Option<Option<&Address>> {
        self.fields.get(path).and_then(Field::as_pointer)
    }

    /// Encoded fields
    #[must_use]
    pub fn encode(&self) -> Bytes {
        encode_fields(&self.fields)
    }

    /// All set pointers as `(pointer address, target)` pairs
    #[must_use]
    pub fn outgoing(&self) -> Vec<(Address, Address)> {
        self.fields.pointers(&self.address())
    }

    /// Addresses of mandatory pointer fields (set or not)
    #[must_use]
    pub fn mandatory_pointers(&self) -> Vec<Address> {
        let mut out = Vec::new();
        walk(&self.schema.fields, &self.address(), &mut |at, schema| {
            if matches!(schema.kind, FieldKind::Pointer { mandatory: true, .. }) {
                out.push(at.clone());
            }
        });
        out
    }

    /// Vertices (box included) whose pointer rules demand an incoming edge
    #[must_use]
    pub fn mandatory_targets(&self) -> Vec<Address> {
        let mut out = Vec::new();
        if self.schema.pointer_rules.mandatory {
            out.push(self.address());
        }
        walk(&self.schema.fields, &self.address(), &mut |at, schema| {
            if schema.pointer_rules.mandatory {
                out.push(at.clone());
            }
        });
        out
    }

    pub(crate) fn fields_mut(&mut self) -> &mut FieldSet {
        &mut self.fields
    }
}

fn walk(fields: &[FieldSchema], base: &Address, visit: &mut impl FnMut(&Address, &FieldSchema)) {
    for schema in fields {
        walk_field(schema, &base.append(schema.key), visit);
    }
}

fn walk_field(schema: &FieldSchema, at: &Address, visit: &mut impl FnMut(&Address, &FieldSchema)) {
    visit(at, schema);
    match &schema.kind {
        FieldKind::Object { fields } => walk(fields, at, visit),
        FieldKind::Array { element, length } => {
            for index in 0..*length {
                walk_field(element, &at.append(index), visit);
            }
        }
        _ => {}
    }
}

/// Resolved vertex: a box or one of its fields
#[derive(Debug, Clone, Copy)]
pub enum Vertex<'a> {
    Box(&'a BoxNode),
    Field {
        node: &'a BoxNode,
        path: &'a [FieldKey],
        schema: &'a FieldSchema,
        field: &'a Field,
    },
}

impl<'a> Vertex<'a> {
    /// Owning box
    #[must_use]
    pub fn node(&self) -> &'a BoxNode {
        match *self {
            Self::Box(node) | Self::Field { node, .. } => node,
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        match *self {
            Self::Box(node) => node.address(),
            Self::Field { node, path, .. } => Address::compose(node.uuid(), path),
        }
    }

    /// Pointer rules governing edges into this vertex
    #[must_use]
    pub fn pointer_rules(&self) -> &'a PointerRules {
        match *self {
            Self::Box(node) => &node.schema().pointer_rules,
            Self::Field { schema, .. } => &schema.pointer_rules,
        }
    }

    /// Field value, `None` for the box itself
    #[must_use]
    pub fn field(&self) -> Option<&'a Field> {
        match *self {
            Self::Box(_) => None,
            Self::Field { field, .. } => Some(field),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_box(&self) -> bool {
        matches!(self, Self::Box(_))
    }
}

/// Field access for a box that is not yet staged
///
/// Writes made here are part of the box's initial state: they emit no
/// updates and are captured in the `New` snapshot.
pub struct BoxInit<'a> {
    uuid: BoxId,
    schema: &'a BoxSchema,
    fields: &'a mut FieldSet,
}

impl<'a> BoxInit<'a> {
    pub(crate) fn new(uuid: BoxId, schema: &'a BoxSchema, fields: &'a mut FieldSet) -> Self {
        Self {
            uuid,
            schema,
            fields,
        }
    }

    /// Id of the box being created
    #[inline]
    #[must_use]
    pub fn uuid(&self) -> BoxId {
        self.uuid
    }

    /// Set a primitive field
    ///
    /// # Errors
    /// Returns error when the path is not a primitive field of the value's type
    pub fn set(
        &mut self,
        path: &[FieldKey],
        value: impl Into<PrimitiveValue>,
    ) -> Result<&mut Self, GraphError> {
        let value = value.into();
        let address = Address::compose(self.uuid, path);
        let slot = self
            .fields
            .get_mut(path)
            .ok_or_else(|| GraphError::UnresolvedAddress(address.clone()))?;
        let Field::Primitive(current) = slot else {
            return Err(GraphError::NotAPrimitive(address));
        };
        check_type(&address, current, &value)?;
        *current = value;
        Ok(self)
    }

    /// Set a pointer field
    ///
    /// Targets are checked when the box is staged.
    ///
    /// # Errors
    /// Returns error when the path is not a pointer field
    pub fn set_pointer(
        &mut self,
        path: &[FieldKey],
        target: Option<Address>,
    ) -> Result<&mut Self, GraphError> {
        let address = Address::compose(self.uuid, path);
        if pointer_type_of(self.schema, path).is_none() {
            return Err(GraphError::NotAPointer(address));
        }
        let slot = self
            .fields
            .get_mut(path)
            .ok_or(GraphError::UnresolvedAddress(address))?;
        *slot = Field::Pointer(target);
        Ok(self)
    }

    /// Current field value
    #[must_use]
    pub fn get(&self, path: &[FieldKey]) -> Option<&Field> {
        self.fields.get(path)
    }
}

pub(crate) fn check_type(
    address: &Address,
    current: &PrimitiveValue,
    value: &PrimitiveValue,
) -> Result<(), GraphError> {
    let expected = current.primitive_type();
    let actual = value.primitive_type();
    if expected == actual {
        Ok(())
    } else {
        Err(GraphError::TypeMismatch {
            address: address.clone(),
            expected,
            actual,
        })
    }
}

/// Pointer type and mandatory flag of a pointer field
pub(crate) fn pointer_type_of(schema: &BoxSchema, path: &[FieldKey]) -> Option<(PointerType, bool)> {
    match schema.field_schema(path)?.kind {
        FieldKind::Pointer {
            pointer_type,
            mandatory,
        } => Some((pointer_type, mandatory)),
        _ => None,
    }
}
