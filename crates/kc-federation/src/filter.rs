//! Allow/deny filtering of fetched descriptors.
//!
//! Checks run in a fixed order and the first rejection wins:
//!
//! 1. entity id deny list
//! 2. entity id allow list (non-empty means the id must be listed)
//! 3. registration authority deny list
//! 4. registration authority allow list (non-empty means the authority must
//!    be listed; a descriptor without one never matches)
//! 5. category deny map (any shared name/value pair excludes)
//! 6. category allow map (non-empty means at least one shared pair)

use kc_model::{FilterSet, ProviderDescriptor};

/// Why a descriptor was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Entity id is on the deny list.
    EntityDenied,
    /// Entity id is missing from a non-empty allow list.
    EntityNotAllowed,
    /// Registration authority is on the deny list.
    AuthorityDenied,
    /// Registration authority is missing from a non-empty allow list.
    AuthorityNotAllowed,
    /// A category is on the deny map.
    CategoryDenied,
    /// No category is on a non-empty allow map.
    CategoryNotAllowed,
}

/// Evaluates `descriptor` against `filters`.
///
/// ## Errors
///
/// Returns the first failing check.
pub fn evaluate(descriptor: &ProviderDescriptor, filters: &FilterSet) -> Result<(), Rejection> {
    if filters.entity_id_deny.contains(&descriptor.id) {
        return Err(Rejection::EntityDenied);
    }
    if !filters.entity_id_allow.is_empty() && !filters.entity_id_allow.contains(&descriptor.id) {
        return Err(Rejection::EntityNotAllowed);
    }

    let authority = descriptor.registration_authority.as_deref();
    if authority.is_some_and(|ra| filters.registration_authority_deny.contains(ra)) {
        return Err(Rejection::AuthorityDenied);
    }
    if !filters.registration_authority_allow.is_empty()
        && !authority.is_some_and(|ra| filters.registration_authority_allow.contains(ra))
    {
        return Err(Rejection::AuthorityNotAllowed);
    }

    if descriptor.shares_category(&filters.category_deny) {
        return Err(Rejection::CategoryDenied);
    }
    if !filters.category_allow.is_empty() && !descriptor.shares_category(&filters.category_allow)
    {
        return Err(Rejection::CategoryNotAllowed);
    }

    Ok(())
}

/// Returns whether `descriptor` survives `filters`.
#[must_use]
pub fn admits(descriptor: &ProviderDescriptor, filters: &FilterSet) -> bool {
    evaluate(descriptor, filters).is_ok()
}
