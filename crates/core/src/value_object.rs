//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity** - they are defined entirely by their
//! attribute values. `Email` and `Credentials` are value objects; `User` and
//! `Token` are entities.

/// Marker trait for value objects.
///
/// Value objects are immutable once constructed and compared by value. To
/// "modify" one, build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Email(String);
///
/// impl ValueObject for Email {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
