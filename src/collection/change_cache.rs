use std::cell::Cell;

use super::change_detection::ChangeDetectionStrategy;
use super::data::DomainObjectCollectionData;
use crate::core::{ObjectId, Result};

/// Current and original collection contents with a cached has-changed answer
///
/// Wraps the raw ordered collection twice: the live view mutated by commands
/// and the snapshot taken at the last commit or load. The change-detection
/// answer is cached until the next mutation because dirty checks run far more
/// often than mutations during a unit-of-work commit sweep.
#[derive(Debug)]
pub struct ChangeCachingCollectionData {
    current: DomainObjectCollectionData,
    original: DomainObjectCollectionData,
    cached_has_changed: Cell<Option<bool>>,
}

impl Default for ChangeCachingCollectionData {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeCachingCollectionData {
    pub fn new() -> Self {
        Self {
            current: DomainObjectCollectionData::new(),
            original: DomainObjectCollectionData::new(),
            cached_has_changed: Cell::new(Some(false)),
        }
    }

    /// Reassemble from persisted views; used when unflattening an end point
    pub(crate) fn from_views(
        current: DomainObjectCollectionData,
        original: DomainObjectCollectionData,
    ) -> Self {
        Self {
            current,
            original,
            cached_has_changed: Cell::new(None),
        }
    }

    pub fn current(&self) -> &DomainObjectCollectionData {
        &self.current
    }

    pub fn original(&self) -> &DomainObjectCollectionData {
        &self.original
    }

    fn invalidate_cache(&mut self) {
        self.cached_has_changed.set(None);
    }

    /// Whether the current view differs from the original snapshot, per the
    /// given strategy
    pub fn has_changed(&self, strategy: &dyn ChangeDetectionStrategy) -> bool {
        if let Some(cached) = self.cached_has_changed.get() {
            return cached;
        }
        let changed = strategy.has_changed(&self.current, &self.original);
        self.cached_has_changed.set(Some(changed));
        changed
    }

    /// Insert into the current view only
    pub fn insert(&mut self, index: usize, id: ObjectId) -> Result<()> {
        self.current.insert(index, id)?;
        self.invalidate_cache();
        Ok(())
    }

    /// Append to the current view only
    pub fn append(&mut self, id: ObjectId) -> Result<()> {
        self.current.append(id)?;
        self.invalidate_cache();
        Ok(())
    }

    /// Remove from the current view only
    pub fn remove(&mut self, id: ObjectId) -> Result<()> {
        self.current.remove(id)?;
        self.invalidate_cache();
        Ok(())
    }

    /// Replace a slot in the current view only
    pub fn replace(&mut self, index: usize, id: ObjectId) -> Result<()> {
        self.current.replace(index, id)?;
        self.invalidate_cache();
        Ok(())
    }

    /// Replace the whole current view
    pub fn replace_current_contents(&mut self, items: &[ObjectId]) -> Result<()> {
        self.current.replace_contents(items)?;
        self.invalidate_cache();
        Ok(())
    }

    /// Clear the current view
    pub fn clear_current(&mut self) {
        self.current.clear();
        self.invalidate_cache();
    }

    /// Record an original member: adds to the snapshot and, when the live view
    /// does not already hold it, to the live view as well
    ///
    /// Membership and back-pointer bookkeeping are registered together by the
    /// data keeper; this is the membership half.
    pub fn register_original_item(&mut self, id: ObjectId) -> Result<()> {
        self.original.append(id)?;
        if !self.current.contains(id) {
            self.current.append(id)?;
        }
        self.invalidate_cache();
        Ok(())
    }

    /// Inverse of `register_original_item`
    pub fn unregister_original_item(&mut self, id: ObjectId) -> Result<()> {
        self.original.remove(id)?;
        if self.current.contains(id) {
            self.current.remove(id)?;
        }
        self.invalidate_cache();
        Ok(())
    }

    /// original := current
    pub fn commit(&mut self) {
        self.original = self.current.clone();
        self.cached_has_changed.set(Some(false));
    }

    /// current := original
    pub fn rollback(&mut self) {
        self.current = self.original.clone();
        self.cached_has_changed.set(Some(false));
    }

    /// Apply one comparer to both views so they stay mutually consistent
    pub fn sort_with(&mut self, comparer: &mut dyn FnMut(&ObjectId, &ObjectId) -> std::cmp::Ordering) {
        self.current.sort_with(comparer);
        self.original.sort_with(comparer);
        self.invalidate_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::change_detection::SequenceSensitiveStrategy;

    #[test]
    fn test_fresh_data_is_unchanged() {
        let data = ChangeCachingCollectionData::new();
        assert!(!data.has_changed(&SequenceSensitiveStrategy));
    }

    #[test]
    fn test_append_marks_changed() {
        let mut data = ChangeCachingCollectionData::new();
        data.append(ObjectId::new()).unwrap();
        assert!(data.has_changed(&SequenceSensitiveStrategy));
    }

    #[test]
    fn test_commit_resets_changed() {
        let mut data = ChangeCachingCollectionData::new();
        let a = ObjectId::new();
        data.append(a).unwrap();
        data.commit();
        assert!(!data.has_changed(&SequenceSensitiveStrategy));
        assert!(data.original().contains(a));
    }

    #[test]
    fn test_rollback_restores_current() {
        let mut data = ChangeCachingCollectionData::new();
        let a = ObjectId::new();
        let b = ObjectId::new();
        data.register_original_item(a).unwrap();
        data.append(b).unwrap();
        data.rollback();
        assert_eq!(data.current().as_slice(), &[a]);
        assert!(!data.has_changed(&SequenceSensitiveStrategy));
    }

    #[test]
    fn test_register_original_item_populates_both_views() {
        let mut data = ChangeCachingCollectionData::new();
        let a = ObjectId::new();
        data.register_original_item(a).unwrap();
        assert!(data.current().contains(a));
        assert!(data.original().contains(a));
        assert!(!data.has_changed(&SequenceSensitiveStrategy));
    }

    #[test]
    fn test_register_original_item_after_current_mutation() {
        let mut data = ChangeCachingCollectionData::new();
        let a = ObjectId::new();
        data.append(a).unwrap();
        // the one side reports an original member that is already current
        data.register_original_item(a).unwrap();
        assert_eq!(data.current().len(), 1);
        assert_eq!(data.original().len(), 1);
    }

    #[test]
    fn test_unregister_original_item_removes_both_views() {
        let mut data = ChangeCachingCollectionData::new();
        let a = ObjectId::new();
        data.register_original_item(a).unwrap();
        data.unregister_original_item(a).unwrap();
        assert!(data.current().is_empty());
        assert!(data.original().is_empty());
    }

    #[test]
    fn test_cache_invalidation_on_mutation() {
        let mut data = ChangeCachingCollectionData::new();
        let a = ObjectId::new();
        data.append(a).unwrap();
        assert!(data.has_changed(&SequenceSensitiveStrategy));
        data.remove(a).unwrap();
        assert!(!data.has_changed(&SequenceSensitiveStrategy));
    }

    #[test]
    fn test_sort_with_applies_to_both_views() {
        let mut data = ChangeCachingCollectionData::new();
        let mut ids = vec![ObjectId::new(), ObjectId::new(), ObjectId::new()];
        for id in &ids {
            data.register_original_item(*id).unwrap();
        }
        ids.sort();
        data.sort_with(&mut |a, b| a.cmp(b));
        assert_eq!(data.current().as_slice(), ids.as_slice());
        assert_eq!(data.original().as_slice(), ids.as_slice());
    }
}
