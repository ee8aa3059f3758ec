//! Field value trees
//!
//! A box's state is a [`FieldSet`]: keyed [`Field`] values shaped by the box
//! schema. Fields are plain owned data; every field belongs to exactly one
//! box and is located by that box's id plus its key path.

use crate::address::{Address, FieldKey};
use crate::io::count_u16;
use crate::schema::{BoxSchema, FieldKind, FieldSchema};
use crate::value::PrimitiveValue;
use std::collections::BTreeMap;

/// Value of one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Primitive(PrimitiveValue),
    /// Target address, `None` when unset
    Pointer(Option<Address>),
    Array(Vec<Field>),
    Object(FieldSet),
    Target,
}

impl Field {
    /// Default value for a schema
    #[must_use]
    pub fn default_for(schema: &FieldSchema) -> Self {
        match &schema.kind {
            FieldKind::Primitive { default } => Self::Primitive(default.clone()),
            FieldKind::Pointer { .. } => Self::Pointer(None),
            FieldKind::Array { element, length } => {
                Self::Array((0..*length).map(|_| Self::default_for(element)).collect())
            }
            FieldKind::Object { fields } => Self::Object(FieldSet::defaults(fields)),
            FieldKind::Target => Self::Target,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Self::Primitive(v) => Some(v),
            _ => None,
        }
    }

    /// Pointer target; outer `None` when this is not a pointer field
    #[inline]
    #[must_use]
    pub fn as_pointer(&self) -> Option<Option<&Address>> {
        match self {
            Self::Pointer(target) => Some(target.as_ref()),
            _ => None,
        }
    }

    fn child(&self, key: FieldKey) -> Option<&Field> {
        match self {
            Self::Array(items) => items.get(key as usize),
            Self::Object(set) => set.fields.get(&key),
            _ => None,
        }
    }

    fn child_mut(&mut self, key: FieldKey) -> Option<&mut Field> {
        match self {
            Self::Array(items) => items.get_mut(key as usize),
            Self::Object(set) => set.fields.get_mut(&key),
            _ => None,
        }
    }

    fn collect_pointers(&self, at: &Address, out: &mut Vec<(Address, Address)>) {
        match self {
            Self::Pointer(Some(target)) => out.push((at.clone(), target.clone())),
            Self::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let key = count_u16(index);
                    item.collect_pointers(&at.append(key), out);
                }
            }
            Self::Object(set) => set.collect_pointers(at, out),
            _ => {}
        }
    }
}

/// Keyed collection of fields (a box's root, or an object field)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    fields: BTreeMap<FieldKey, Field>,
}

impl FieldSet {
    /// Create empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default values for a list of field schemas
    #[must_use]
    pub fn defaults(schemas: &[FieldSchema]) -> Self {
        Self {
            fields: schemas
                .iter()
                .map(|s| (s.key, Field::default_for(s)))
                .collect(),
        }
    }

    /// Default values for a box schema
    #[inline]
    #[must_use]
    pub fn for_box(schema: &BoxSchema) -> Self {
        Self::defaults(&schema.fields)
    }

    /// Field at a key path
    #[must_use]
    pub fn get(&self, path: &[FieldKey]) -> Option<&Field> {
        let (first, rest) = path.split_first()?;
        let mut current = self.fields.get(first)?;
        for key in rest {
            current = current.child(*key)?;
        }
        Some(current)
    }

    /// Mutable field at a key path
    pub fn get_mut(&mut self, path: &[FieldKey]) -> Option<&mut Field> {
        let (first, rest) = path.split_first()?;
        let mut current = self.fields.get_mut(first)?;
        for key in rest {
            current = current.child_mut(*key)?;
        }
        Some(current)
    }

    /// Top-level entries in key order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (FieldKey, &Field)> {
        self.fields.iter().map(|(k, f)| (*k, f))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn slot_mut(&mut self, key: FieldKey) -> Option<&mut Field> {
        self.fields.get_mut(&key)
    }

    /// All set pointers below `base`, as `(pointer address, target)` pairs
    #[must_use]
    pub fn pointers(&self, base: &Address) -> Vec<(Address, Address)> {
        let mut out = Vec::new();
        self.collect_pointers(base, &mut out);
        out
    }

    fn collect_pointers(&self, base: &Address, out: &mut Vec<(Address, Address)>) {
        for (key, field) in &self.fields {
            field.collect_pointers(&base.append(*key), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::BoxId;
    use crate::schema::PointerType;

    fn schema() -> BoxSchema {
        BoxSchema::new("Mixer")
            .field(FieldSchema::float32(1, "volume", 0.5))
            .field(FieldSchema::array(
                2,
                "inputs",
                FieldSchema::pointer(0, "input", PointerType::new(1), false),
                3,
            ))
            .field(FieldSchema::object(
                3,
                "meta",
                vec![FieldSchema::string(1, "label", "Main")],
            ))
    }

    #[test]
    fn defaults_follow_schema() {
        let set = FieldSet::for_box(&schema());
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.get(&[1]).and_then(Field::as_primitive),
            Some(&PrimitiveValue::Float32(0.5))
        );
        assert_eq!(set.get(&[2, 2]).and_then(Field::as_pointer), Some(None));
        assert!(set.get(&[2, 3]).is_none());
        assert_eq!(
            set.get(&[3, 1]).and_then(Field::as_primitive),
            Some(&PrimitiveValue::from("Main"))
        );
    }

    #[test]
    fn pointers_reports_set_fields_with_addresses() {
        let owner = BoxId::random();
        let target = Address::root(BoxId::random());
        let mut set = FieldSet::for_box(&schema());
        *set.get_mut(&[2, 1]).unwrap() = Field::Pointer(Some(target.clone()));

        let pointers = set.pointers(&Address::root(owner));
        assert_eq!(pointers, vec![(Address::compose(owner, &[2, 1]), target)]);
    }
}
