//! Entity trait: identity + continuity across state changes.

use crate::error::DomainResult;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Checks the entity's field contract (required fields, formats).
    ///
    /// Snapshots handed over by a persistence collaborator should pass this
    /// before any security decision is made on them.
    fn validate(&self) -> DomainResult<()>;
}
