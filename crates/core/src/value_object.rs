//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value** - two instances
/// with the same attribute values are the same value. A journal entry line or
/// a trial balance line item is a value object; the entry that owns it is an
/// entity with identity.
///
/// To "modify" a value object, construct a new one; never mutate in place.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
