//! Federation descriptor differ.

use std::collections::HashSet;

use kc_model::{FilterSet, ProviderDescriptor};
use tracing::trace;

use crate::filter;

/// Operations that bring local providers in line with fetched metadata.
///
/// The three lists are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FederationDiff {
    /// Admitted descriptors not yet known locally, in fetched order.
    pub to_add: Vec<ProviderDescriptor>,
    /// Admitted descriptors already known locally, in fetched order.
    pub to_update: Vec<ProviderDescriptor>,
    /// Local ids no longer admitted, sorted.
    pub to_remove: Vec<String>,
}

impl FederationDiff {
    /// Returns true if nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }

    /// Total number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_update.len() + self.to_remove.len()
    }
}

/// Computes the operations for one federation.
///
/// `current` holds the ids of providers that are members of the federation.
/// Descriptors failing `filters` are treated as absent, so a member that is
/// newly filtered out is removed. When an id appears more than once in
/// `fetched`, the first occurrence is used.
#[must_use]
pub fn diff(
    current: &HashSet<String>,
    fetched: &[ProviderDescriptor],
    filters: &FilterSet,
) -> FederationDiff {
    let mut result = FederationDiff::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(fetched.len());

    for descriptor in fetched {
        if !seen.insert(descriptor.id.as_str()) {
            trace!(id = %descriptor.id, "ignoring duplicate descriptor");
            continue;
        }
        if let Err(reason) = filter::evaluate(descriptor, filters) {
            trace!(id = %descriptor.id, ?reason, "descriptor filtered out");
            continue;
        }
        if current.contains(&descriptor.id) {
            result.to_update.push(descriptor.clone());
        } else {
            result.to_add.push(descriptor.clone());
        }
    }

    let admitted: HashSet<&str> = result
        .to_add
        .iter()
        .chain(&result.to_update)
        .map(|d| d.id.as_str())
        .collect();
    let mut to_remove: Vec<String> = current
        .iter()
        .filter(|id| !admitted.contains(id.as_str()))
        .cloned()
        .collect();
    to_remove.sort();
    result.to_remove = to_remove;

    result
}
