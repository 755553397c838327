// ============================================================================
// Collection End-Point Data Keeper
// ============================================================================
//
// The mutable storage cell for one collection end point. Holds:
// - the current and original (snapshot) collection contents,
// - the opposite end points known to be synchronized at snapshot time,
// - the current opposite end-point registrations (allowed to diverge from
//   the original set; that divergence is what "unsynchronized" means),
// - the original members for which no opposite end point could be found
//   (a data inconsistency the system tolerates and reports).
//
// Commit invariant: every original member is accounted for by exactly one of
// a synchronized opposite end point or explicit without-end-point status.
//
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::debug;

use crate::collection::{ChangeCachingCollectionData, ChangeDetectionStrategy, DomainObjectCollectionData};
use crate::context::RelationEndPointProvider;
use crate::core::{MappingError, ObjectId, RelationEndPointId, Result};

use super::real_object::SharedRealObjectEndPoint;

pub struct CollectionEndPointDataKeeper {
    id: RelationEndPointId,
    collection_data: ChangeCachingCollectionData,
    original_opposite_end_points: HashMap<ObjectId, SharedRealObjectEndPoint>,
    current_opposite_end_points: HashMap<ObjectId, SharedRealObjectEndPoint>,
    original_items_without_end_points: HashSet<ObjectId>,
    change_detection: Rc<dyn ChangeDetectionStrategy>,
}

impl std::fmt::Debug for CollectionEndPointDataKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEndPointDataKeeper")
            .field("id", &self.id)
            .field("collection_data", &self.collection_data)
            .field(
                "original_opposite_end_points",
                &self.original_opposite_end_points.keys().collect::<Vec<_>>(),
            )
            .field(
                "current_opposite_end_points",
                &self.current_opposite_end_points.keys().collect::<Vec<_>>(),
            )
            .field(
                "original_items_without_end_points",
                &self.original_items_without_end_points,
            )
            .field("change_detection", &self.change_detection.name())
            .finish()
    }
}

impl CollectionEndPointDataKeeper {
    /// Create an empty keeper for the given end point
    ///
    /// The change-detection strategy is supplied by the caller; the keeper
    /// never constructs one itself.
    pub fn new(id: RelationEndPointId, change_detection: Rc<dyn ChangeDetectionStrategy>) -> Self {
        Self {
            id,
            collection_data: ChangeCachingCollectionData::new(),
            original_opposite_end_points: HashMap::new(),
            current_opposite_end_points: HashMap::new(),
            original_items_without_end_points: HashSet::new(),
            change_detection,
        }
    }

    /// Reassemble a keeper from persisted parts; used when unflattening an
    /// end point
    ///
    /// # Errors
    /// Fails if the parts violate the accounting invariant: every original
    /// member must be backed by an original opposite end point or recorded
    /// without one
    pub(crate) fn restore(
        id: RelationEndPointId,
        change_detection: Rc<dyn ChangeDetectionStrategy>,
        collection_data: ChangeCachingCollectionData,
        original_opposite_end_points: HashMap<ObjectId, SharedRealObjectEndPoint>,
        current_opposite_end_points: HashMap<ObjectId, SharedRealObjectEndPoint>,
        original_items_without_end_points: HashSet<ObjectId>,
    ) -> Result<Self> {
        let accounted =
            original_opposite_end_points.len() + original_items_without_end_points.len();
        if accounted != collection_data.original().len() {
            return Err(MappingError::InvariantViolation(format!(
                "Restored bookkeeping mismatch on '{}': {} original members, {} accounted for",
                id,
                collection_data.original().len(),
                accounted
            )));
        }
        Ok(Self {
            id,
            collection_data,
            original_opposite_end_points,
            current_opposite_end_points,
            original_items_without_end_points,
            change_detection,
        })
    }

    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    pub fn collection_data(&self) -> &ChangeCachingCollectionData {
        &self.collection_data
    }

    pub(crate) fn collection_data_mut(&mut self) -> &mut ChangeCachingCollectionData {
        &mut self.collection_data
    }

    pub fn current_data(&self) -> &DomainObjectCollectionData {
        self.collection_data.current()
    }

    pub fn original_data(&self) -> &DomainObjectCollectionData {
        self.collection_data.original()
    }

    pub fn original_opposite_end_points(&self) -> &HashMap<ObjectId, SharedRealObjectEndPoint> {
        &self.original_opposite_end_points
    }

    pub fn current_opposite_end_points(&self) -> &HashMap<ObjectId, SharedRealObjectEndPoint> {
        &self.current_opposite_end_points
    }

    pub fn original_items_without_end_points(&self) -> &HashSet<ObjectId> {
        &self.original_items_without_end_points
    }

    pub fn change_detection(&self) -> &Rc<dyn ChangeDetectionStrategy> {
        &self.change_detection
    }

    /// Record an opposite end point as part of the original snapshot
    ///
    /// Collection membership and the back-pointer registration are always
    /// added together: if the member was previously recorded as having no end
    /// point it is promoted, otherwise it is inserted into the original
    /// collection data. The end point is added to both the original and the
    /// current registration sets.
    ///
    /// # Errors
    /// Fails if an end point for the same object is already registered
    pub fn register_original_opposite_end_point(
        &mut self,
        end_point: SharedRealObjectEndPoint,
    ) -> Result<()> {
        let object_id = end_point.borrow().owner_id();
        if self.original_opposite_end_points.contains_key(&object_id) {
            return Err(MappingError::InvariantViolation(format!(
                "An original opposite end point for object '{}' is already registered with '{}'",
                object_id, self.id
            )));
        }
        if self.current_opposite_end_points.contains_key(&object_id) {
            return Err(MappingError::InvariantViolation(format!(
                "A current opposite end point for object '{}' is already registered with '{}'",
                object_id, self.id
            )));
        }

        if self.original_items_without_end_points.remove(&object_id) {
            debug!(
                "promoting item without end point '{}' on '{}'",
                object_id, self.id
            );
        } else {
            self.collection_data.register_original_item(object_id)?;
        }

        self.original_opposite_end_points
            .insert(object_id, Rc::clone(&end_point));
        self.current_opposite_end_points.insert(object_id, end_point);
        Ok(())
    }

    /// Inverse of `register_original_opposite_end_point`
    ///
    /// # Errors
    /// Fails if no end point for the object is registered in the original set
    pub fn unregister_original_opposite_end_point(
        &mut self,
        end_point: &SharedRealObjectEndPoint,
    ) -> Result<()> {
        let object_id = end_point.borrow().owner_id();
        if self.original_opposite_end_points.remove(&object_id).is_none() {
            return Err(MappingError::InvariantViolation(format!(
                "No original opposite end point for object '{}' is registered with '{}'",
                object_id, self.id
            )));
        }
        self.current_opposite_end_points.remove(&object_id);
        self.collection_data.unregister_original_item(object_id)?;
        Ok(())
    }

    /// Record an original member whose opposite side could not be resolved
    ///
    /// # Errors
    /// Fails if the object is already recorded, either as a without-end-point
    /// item or through an original opposite end point
    pub fn register_original_item_without_end_point(&mut self, object_id: ObjectId) -> Result<()> {
        if self.original_items_without_end_points.contains(&object_id) {
            return Err(MappingError::InvariantViolation(format!(
                "Object '{}' is already registered without an end point on '{}'",
                object_id, self.id
            )));
        }
        if self.original_opposite_end_points.contains_key(&object_id) {
            return Err(MappingError::InvariantViolation(format!(
                "Object '{}' already has an original opposite end point on '{}'",
                object_id, self.id
            )));
        }
        self.collection_data.register_original_item(object_id)?;
        self.original_items_without_end_points.insert(object_id);
        Ok(())
    }

    /// Inverse of `register_original_item_without_end_point`
    ///
    /// # Errors
    /// Fails if the object is not in the without-end-point set
    pub fn unregister_original_item_without_end_point(&mut self, object_id: ObjectId) -> Result<()> {
        if !self.original_items_without_end_points.remove(&object_id) {
            return Err(MappingError::InvariantViolation(format!(
                "Object '{}' is not registered without an end point on '{}'",
                object_id, self.id
            )));
        }
        self.collection_data.unregister_original_item(object_id)?;
        Ok(())
    }

    /// Drop the without-end-point status while keeping the member
    ///
    /// Used by the synchronize repair operation, which accepts the current
    /// contents as the new baseline instead of removing the members.
    pub(crate) fn clear_item_without_end_point_status(&mut self, object_id: ObjectId) -> Result<()> {
        if !self.original_items_without_end_points.remove(&object_id) {
            return Err(MappingError::InvariantViolation(format!(
                "Object '{}' is not registered without an end point on '{}'",
                object_id, self.id
            )));
        }
        Ok(())
    }

    /// Record a current-only opposite end-point registration
    ///
    /// # Errors
    /// Fails if an end point for the same object is already current
    pub fn register_current_opposite_end_point(
        &mut self,
        end_point: SharedRealObjectEndPoint,
    ) -> Result<()> {
        let object_id = end_point.borrow().owner_id();
        if self.current_opposite_end_points.contains_key(&object_id) {
            return Err(MappingError::InvariantViolation(format!(
                "A current opposite end point for object '{}' is already registered with '{}'",
                object_id, self.id
            )));
        }
        self.current_opposite_end_points.insert(object_id, end_point);
        Ok(())
    }

    /// Inverse of `register_current_opposite_end_point`
    ///
    /// # Errors
    /// Fails if no end point for the object is current
    pub fn unregister_current_opposite_end_point(
        &mut self,
        end_point: &SharedRealObjectEndPoint,
    ) -> Result<()> {
        let object_id = end_point.borrow().owner_id();
        if self.current_opposite_end_points.remove(&object_id).is_none() {
            return Err(MappingError::InvariantViolation(format!(
                "No current opposite end point for object '{}' is registered with '{}'",
                object_id, self.id
            )));
        }
        Ok(())
    }

    /// Drop one current registration during command execution
    pub(crate) fn remove_current_opposite_end_point(
        &mut self,
        object_id: ObjectId,
    ) -> Option<SharedRealObjectEndPoint> {
        self.current_opposite_end_points.remove(&object_id)
    }

    /// Drop every current registration during delete execution
    pub(crate) fn clear_current_opposite_end_points(&mut self) {
        self.current_opposite_end_points.clear();
    }

    /// Install a rebuilt current registration map during set execution
    pub(crate) fn set_current_opposite_end_points(
        &mut self,
        end_points: HashMap<ObjectId, SharedRealObjectEndPoint>,
    ) {
        self.current_opposite_end_points = end_points;
    }

    /// Whether the current contents differ from the original snapshot
    pub fn has_data_changed(&self) -> bool {
        self.collection_data.has_changed(self.change_detection.as_ref())
    }

    /// Reorder both the current and original views with one comparer
    pub fn sort_current_and_original_data(
        &mut self,
        comparer: &mut dyn FnMut(&ObjectId, &ObjectId) -> std::cmp::Ordering,
    ) {
        self.collection_data.sort_with(comparer);
    }

    /// Commit the current contents as the new original snapshot
    ///
    /// The original end-point bookkeeping is rebuilt from the new original set
    /// using the current registrations: members with a current opposite end
    /// point become original opposite end points, the rest become items
    /// without end points.
    ///
    /// # Errors
    /// Fails if the rebuilt bookkeeping does not account for every original
    /// member exactly once
    pub fn commit(&mut self) -> Result<()> {
        self.collection_data.commit();

        self.original_opposite_end_points.clear();
        self.original_items_without_end_points.clear();
        for object_id in self.collection_data.original().iter().collect::<Vec<_>>() {
            match self.current_opposite_end_points.get(&object_id) {
                Some(end_point) => {
                    self.original_opposite_end_points
                        .insert(object_id, Rc::clone(end_point));
                }
                None => {
                    self.original_items_without_end_points.insert(object_id);
                }
            }
        }

        let accounted = self.original_opposite_end_points.len()
            + self.original_items_without_end_points.len();
        if accounted != self.collection_data.original().len() {
            return Err(MappingError::InvariantViolation(format!(
                "Commit bookkeeping mismatch on '{}': {} original members, {} accounted for",
                self.id,
                self.collection_data.original().len(),
                accounted
            )));
        }
        Ok(())
    }

    /// Discard current changes and restore the original snapshot
    ///
    /// The current opposite end-point map is rebuilt from the restored
    /// original set.
    pub fn rollback(&mut self) {
        self.collection_data.rollback();
        self.current_opposite_end_points = self
            .original_opposite_end_points
            .iter()
            .map(|(id, ep)| (*id, Rc::clone(ep)))
            .collect();
    }

    /// Adopt the current contents of a nested unit-of-work scope's keeper
    ///
    /// Opposite end points are re-resolved by identifier through the provider
    /// because the source keeper's handles belong to the nested scope.
    ///
    /// # Errors
    /// Fails if a source end point cannot be resolved in this scope; once a
    /// value has been committed from the nested scope the end point must
    /// exist, so an unresolvable one is a programming error
    pub fn set_data_from_sub_transaction(
        &mut self,
        source: &CollectionEndPointDataKeeper,
        resolver: &dyn RelationEndPointProvider,
    ) -> Result<()> {
        let mut resolved = HashMap::new();
        for (object_id, source_end_point) in &source.current_opposite_end_points {
            let end_point_id = source_end_point.borrow().id().clone();
            let end_point = resolver
                .get_relation_end_point_without_loading(&end_point_id)
                .ok_or(MappingError::EndPointNotFound(end_point_id))?;
            resolved.insert(*object_id, end_point);
        }

        self.collection_data
            .replace_current_contents(source.current_data().as_slice())?;
        self.current_opposite_end_points = resolved;
        Ok(())
    }
}
