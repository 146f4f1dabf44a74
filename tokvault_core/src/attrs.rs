//! Attribute storage for token objects.
//!
//! An [`AttrList`] is an ordered mapping from attribute-type identifiers to
//! byte values. Values are deep-copied on insert and deep-copied out on
//! full-structure retrieval; lookups hand out read-only views. The two-phase
//! "query size, then fill" protocol of the token interface is modelled by
//! [`AttributeSlot`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Attribute type identifier from the token-interface vocabulary.
///
/// Types with bit 31 set are vendor-defined; the provider keeps its
/// trust-module blobs and wrapped authorization secret in that range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeType(pub u64);

impl AttributeType {
    pub const CLASS: Self = Self(0x0000);
    pub const TOKEN: Self = Self(0x0001);
    pub const PRIVATE: Self = Self(0x0002);
    pub const LABEL: Self = Self(0x0003);
    pub const VALUE: Self = Self(0x0011);
    pub const KEY_TYPE: Self = Self(0x0100);
    pub const ID: Self = Self(0x0102);
    pub const SENSITIVE: Self = Self(0x0103);
    pub const SIGN: Self = Self(0x0108);
    pub const VERIFY: Self = Self(0x010a);
    pub const EXTRACTABLE: Self = Self(0x0162);

    /// Vendor-defined range marker.
    pub const VENDOR: Self = Self(0x8000_0000);
    /// Public trust-module blob of the object.
    pub const PUBLIC_BLOB: Self = Self(0x8000_0001);
    /// Private trust-module blob of the object.
    pub const PRIVATE_BLOB: Self = Self(0x8000_0002);
    /// Wrapped authorization secret. Never readable through the attribute
    /// query interface.
    pub const WRAPPED_AUTH: Self = Self(0x8000_0003);

    /// Whether this type belongs to the vocabulary the core accepts in
    /// creation templates.
    pub fn is_recognized(&self) -> bool {
        matches!(
            *self,
            Self::CLASS
                | Self::TOKEN
                | Self::PRIVATE
                | Self::LABEL
                | Self::VALUE
                | Self::KEY_TYPE
                | Self::ID
                | Self::SENSITIVE
                | Self::SIGN
                | Self::VERIFY
                | Self::EXTRACTABLE
        ) || self.is_vendor()
    }

    /// Whether this type is in the vendor-defined range.
    pub fn is_vendor(&self) -> bool {
        self.0 & Self::VENDOR.0 != 0
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Object class carried in the `CLASS` attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectClass(pub u64);

impl ObjectClass {
    pub const DATA: Self = Self(0);
    pub const CERTIFICATE: Self = Self(1);
    pub const PUBLIC_KEY: Self = Self(2);
    pub const PRIVATE_KEY: Self = Self(3);
    pub const SECRET_KEY: Self = Self(4);

    /// Fixed 8-byte little-endian encoding used inside attribute values.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Decode from an attribute value, rejecting malformed lengths.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_le_bytes(raw)))
    }

    /// Whether objects of this class carry key material.
    pub fn is_key(&self) -> bool {
        matches!(*self, Self::PUBLIC_KEY | Self::PRIVATE_KEY | Self::SECRET_KEY)
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DATA => write!(f, "data"),
            Self::CERTIFICATE => write!(f, "certificate"),
            Self::PUBLIC_KEY => write!(f, "public-key"),
            Self::PRIVATE_KEY => write!(f, "private-key"),
            Self::SECRET_KEY => write!(f, "secret-key"),
            Self(other) => write!(f, "class-{:#x}", other),
        }
    }
}

/// One (type, value) pair of a template or attribute store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub kind: AttributeType,
    pub value: Vec<u8>,
}

impl Attribute {
    pub fn new(kind: AttributeType, value: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn class(class: ObjectClass) -> Self {
        Self::new(AttributeType::CLASS, class.to_bytes().to_vec())
    }

    pub fn label(label: &str) -> Self {
        Self::new(AttributeType::LABEL, label.as_bytes().to_vec())
    }

    pub fn boolean(kind: AttributeType, value: bool) -> Self {
        Self::new(kind, vec![u8::from(value)])
    }

    pub fn ulong(kind: AttributeType, value: u64) -> Self {
        Self::new(kind, value.to_le_bytes().to_vec())
    }
}

/// One entry of a caller's attribute-query template.
///
/// A slot without capacity is a size query: on return, `length` carries the
/// required byte count (or `None` when the type is unavailable) and no bytes
/// are copied. A slot with capacity at least the value's length receives a
/// copy in `value`; a smaller capacity reports the required length and the
/// batch surfaces [`Error::BufferTooSmall`].
#[derive(Clone, Debug)]
pub struct AttributeSlot {
    pub kind: AttributeType,
    /// Caller-provided buffer capacity in bytes. `None` requests size
    /// discovery only.
    pub capacity: Option<usize>,
    /// Required value length, filled on return. `None` when unavailable.
    pub length: Option<usize>,
    /// The value bytes, filled when the capacity was sufficient.
    pub value: Option<Vec<u8>>,
}

impl AttributeSlot {
    /// Slot requesting size discovery for `kind`.
    pub fn query(kind: AttributeType) -> Self {
        Self {
            kind,
            capacity: None,
            length: None,
            value: None,
        }
    }

    /// Slot offering `capacity` bytes of room for the value of `kind`.
    pub fn with_capacity(kind: AttributeType, capacity: usize) -> Self {
        Self {
            kind,
            capacity: Some(capacity),
            length: None,
            value: None,
        }
    }
}

/// Deep-copy a caller buffer, reporting allocation failure instead of
/// aborting.
pub(crate) fn try_copy(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(bytes.len()).map_err(|_| Error::OutOfMemory)?;
    out.extend_from_slice(bytes);
    Ok(out)
}

/// Ordered attribute store with unique types.
///
/// Insertion order is preserved; setting an existing type replaces its value
/// in place. All value bytes are owned by the store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AttrList {
    entries: Vec<Attribute>,
}

impl AttrList {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build a store from a creation template.
    ///
    /// Byte-identical duplicate entries collapse to one; duplicates with
    /// conflicting values are rejected as an inconsistent template.
    pub fn from_template(template: &[Attribute]) -> Result<Self> {
        let mut list = Self::new();
        for attr in template {
            if let Some(existing) = list.get(attr.kind) {
                if existing != attr.value.as_slice() {
                    return Err(Error::TemplateInconsistent(format!(
                        "conflicting duplicate attribute {}",
                        attr.kind
                    )));
                }
                continue;
            }
            list.insert(attr.kind, &attr.value)?;
        }
        Ok(list)
    }

    /// Deep-copy `bytes` in under `kind`, replacing any existing value of
    /// that type. The caller retains ownership of its own buffer.
    pub fn insert(&mut self, kind: AttributeType, bytes: &[u8]) -> Result<()> {
        let value = try_copy(bytes)?;
        match self.entries.iter_mut().find(|a| a.kind == kind) {
            Some(entry) => entry.value = value,
            None => self.entries.push(Attribute { kind, value }),
        }
        Ok(())
    }

    /// Read-only view of the value stored under `kind`.
    pub fn get(&self, kind: AttributeType) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| a.value.as_slice())
    }

    /// Serve one caller slot following the two-phase protocol.
    pub fn read_into(&self, slot: &mut AttributeSlot) -> Result<()> {
        let Some(value) = self.get(slot.kind) else {
            slot.length = None;
            // A pure size query on an absent type is answered, not failed.
            return match slot.capacity {
                None => Ok(()),
                Some(_) => Err(Error::AttributeTypeInvalid(slot.kind)),
            };
        };

        slot.length = Some(value.len());
        match slot.capacity {
            None => Ok(()),
            Some(capacity) if capacity < value.len() => Err(Error::BufferTooSmall {
                required: value.len(),
            }),
            Some(_) => {
                slot.value = Some(try_copy(value)?);
                Ok(())
            }
        }
    }

    /// Full-structure deep copy of every entry, in insertion order.
    pub fn snapshot(&self) -> Result<Vec<Attribute>> {
        let mut out = Vec::new();
        out.try_reserve_exact(self.entries.len())
            .map_err(|_| Error::OutOfMemory)?;
        for attr in &self.entries {
            out.push(Attribute {
                kind: attr.kind,
                value: try_copy(&attr.value)?,
            });
        }
        Ok(out)
    }

    /// Decoded `CLASS` attribute, when present and well-formed.
    pub fn class(&self) -> Option<ObjectClass> {
        self.get(AttributeType::CLASS).and_then(ObjectClass::from_bytes)
    }

    /// Whether the store marks the object as private-class.
    pub fn is_private(&self) -> bool {
        matches!(self.get(AttributeType::PRIVATE), Some([1]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut attrs = AttrList::new();
        attrs.insert(AttributeType::LABEL, b"k1").unwrap();
        assert_eq!(attrs.get(AttributeType::LABEL), Some(&b"k1"[..]));
        assert!(attrs.get(AttributeType::VALUE).is_none());
    }

    #[test]
    fn test_insert_replaces_existing_type() {
        let mut attrs = AttrList::new();
        attrs.insert(AttributeType::LABEL, b"old").unwrap();
        attrs.insert(AttributeType::VALUE, b"v").unwrap();
        attrs.insert(AttributeType::LABEL, b"new").unwrap();

        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get(AttributeType::LABEL), Some(&b"new"[..]));
        // Replacement keeps the original position.
        assert_eq!(attrs.iter().next().unwrap().kind, AttributeType::LABEL);
    }

    #[test]
    fn test_insert_deep_copies() {
        let mut attrs = AttrList::new();
        let mut caller = b"secret".to_vec();
        attrs.insert(AttributeType::VALUE, &caller).unwrap();
        caller[0] = b'X';
        assert_eq!(attrs.get(AttributeType::VALUE), Some(&b"secret"[..]));
    }

    #[test]
    fn test_size_query_then_fill() {
        let mut attrs = AttrList::new();
        attrs.insert(AttributeType::LABEL, b"mykey").unwrap();

        let mut slot = AttributeSlot::query(AttributeType::LABEL);
        attrs.read_into(&mut slot).unwrap();
        assert_eq!(slot.length, Some(5));
        assert!(slot.value.is_none());

        let mut slot = AttributeSlot::with_capacity(AttributeType::LABEL, slot.length.unwrap());
        attrs.read_into(&mut slot).unwrap();
        assert_eq!(slot.value.as_deref(), Some(&b"mykey"[..]));
    }

    #[test]
    fn test_undersized_buffer_reports_required_length() {
        let mut attrs = AttrList::new();
        attrs.insert(AttributeType::LABEL, b"mykey").unwrap();

        let mut slot = AttributeSlot::with_capacity(AttributeType::LABEL, 2);
        let err = attrs.read_into(&mut slot).unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall { required: 5 }));
        assert_eq!(slot.length, Some(5));
        assert!(slot.value.is_none(), "no bytes may be copied on overflow");
    }

    #[test]
    fn test_absent_type_size_query_is_not_an_error() {
        let attrs = AttrList::new();
        let mut slot = AttributeSlot::query(AttributeType::ID);
        attrs.read_into(&mut slot).unwrap();
        assert_eq!(slot.length, None);
    }

    #[test]
    fn test_absent_type_with_buffer_fails() {
        let attrs = AttrList::new();
        let mut slot = AttributeSlot::with_capacity(AttributeType::ID, 16);
        let err = attrs.read_into(&mut slot).unwrap_err();
        assert!(matches!(err, Error::AttributeTypeInvalid(t) if t == AttributeType::ID));
    }

    #[test]
    fn test_template_conflicting_duplicates_rejected() {
        let template = vec![
            Attribute::label("a"),
            Attribute::class(ObjectClass::DATA),
            Attribute::label("b"),
        ];
        let err = AttrList::from_template(&template).unwrap_err();
        assert!(matches!(err, Error::TemplateInconsistent(_)));
    }

    #[test]
    fn test_template_identical_duplicates_collapse() {
        let template = vec![
            Attribute::label("a"),
            Attribute::label("a"),
            Attribute::class(ObjectClass::DATA),
        ];
        let list = AttrList::from_template(&template).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_snapshot_is_a_deep_copy() {
        let mut attrs = AttrList::new();
        attrs.insert(AttributeType::LABEL, b"k1").unwrap();
        let mut snap = attrs.snapshot().unwrap();
        snap[0].value[0] = b'X';
        assert_eq!(attrs.get(AttributeType::LABEL), Some(&b"k1"[..]));
    }

    #[test]
    fn test_class_round_trip() {
        let mut attrs = AttrList::new();
        attrs
            .insert(AttributeType::CLASS, &ObjectClass::SECRET_KEY.to_bytes())
            .unwrap();
        assert_eq!(attrs.class(), Some(ObjectClass::SECRET_KEY));
        assert!(attrs.class().unwrap().is_key());
    }

    #[test]
    fn test_class_rejects_malformed_encoding() {
        assert!(ObjectClass::from_bytes(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_vendor_range_recognition() {
        assert!(AttributeType::WRAPPED_AUTH.is_vendor());
        assert!(AttributeType::WRAPPED_AUTH.is_recognized());
        assert!(!AttributeType::LABEL.is_vendor());
        assert!(!AttributeType(0x4242).is_recognized());
    }
}
