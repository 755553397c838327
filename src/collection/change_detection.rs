use std::collections::HashSet;

use super::data::DomainObjectCollectionData;

/// Pluggable comparison of current collection contents against the original
/// snapshot
///
/// The strategy is handed to a data keeper at construction and never created
/// by it, so one unit-of-work context can apply a uniform change-detection
/// policy across all of its end points.
pub trait ChangeDetectionStrategy {
    fn name(&self) -> &'static str;

    fn has_changed(
        &self,
        current: &DomainObjectCollectionData,
        original: &DomainObjectCollectionData,
    ) -> bool;
}

/// Order-sensitive comparison: contents differ if membership or ordering
/// differs
#[derive(Debug, Default)]
pub struct SequenceSensitiveStrategy;

impl ChangeDetectionStrategy for SequenceSensitiveStrategy {
    fn name(&self) -> &'static str {
        "sequence-sensitive"
    }

    fn has_changed(
        &self,
        current: &DomainObjectCollectionData,
        original: &DomainObjectCollectionData,
    ) -> bool {
        current.as_slice() != original.as_slice()
    }
}

/// Order-insensitive comparison: contents differ only if membership differs
#[derive(Debug, Default)]
pub struct SetEqualityStrategy;

impl ChangeDetectionStrategy for SetEqualityStrategy {
    fn name(&self) -> &'static str {
        "set-equality"
    }

    fn has_changed(
        &self,
        current: &DomainObjectCollectionData,
        original: &DomainObjectCollectionData,
    ) -> bool {
        if current.len() != original.len() {
            return true;
        }
        let members: HashSet<_> = original.iter().collect();
        current.iter().any(|id| !members.contains(&id))
    }
}
