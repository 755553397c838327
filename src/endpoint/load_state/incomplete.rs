use std::collections::HashSet;
use std::rc::Rc;

use log::warn;

use crate::context::MappingContext;
use crate::core::{MappingError, ObjectId, RelationEndPointId, Result};
use crate::endpoint::data_keeper::CollectionEndPointDataKeeper;
use crate::endpoint::real_object::SharedRealObjectEndPoint;

use super::complete::CompleteLoadState;

/// Placeholder state active before the first load and after an unload
///
/// Answers directly only for operations that need no data; everything else
/// is served by loading and re-dispatching to the complete state. Opposite
/// end points registered while incomplete are remembered and matched against
/// the loaded contents in `mark_data_complete`.
#[derive(Debug)]
pub struct IncompleteLoadState {
    data_keeper: CollectionEndPointDataKeeper,
}

impl IncompleteLoadState {
    /// Wrap a keeper as the incomplete state
    ///
    /// Every opposite end point carried over from a previous complete state
    /// has its synchronization flag reset: unloading forgets sync status,
    /// forcing re-validation on the next load.
    pub fn new(data_keeper: CollectionEndPointDataKeeper) -> Self {
        for end_point in data_keeper.current_opposite_end_points().values() {
            end_point.borrow_mut().reset_sync_state();
        }
        for end_point in data_keeper.original_opposite_end_points().values() {
            end_point.borrow_mut().reset_sync_state();
        }
        Self { data_keeper }
    }

    pub fn is_data_complete(&self) -> bool {
        false
    }

    pub fn data_keeper(&self) -> &CollectionEndPointDataKeeper {
        &self.data_keeper
    }

    pub fn data_keeper_mut(&mut self) -> &mut CollectionEndPointDataKeeper {
        &mut self.data_keeper
    }

    /// Record a pre-load registration from the single-valued side
    pub fn register_original_opposite_end_point(
        &mut self,
        end_point: SharedRealObjectEndPoint,
    ) -> Result<()> {
        self.data_keeper.register_original_opposite_end_point(end_point)
    }

    pub fn unregister_original_opposite_end_point(
        &mut self,
        end_point: &SharedRealObjectEndPoint,
    ) -> Result<()> {
        self.data_keeper.unregister_original_opposite_end_point(end_point)
    }

    /// Synchronizing an individual opposite end point requires loaded data
    pub fn synchronize_opposite_end_point(&self, end_point: &SharedRealObjectEndPoint) -> Result<()> {
        Err(MappingError::IllegalState(format!(
            "Cannot synchronize opposite end point '{}' of '{}': the collection has not been loaded",
            end_point.borrow().id(),
            self.data_keeper.id()
        )))
    }

    /// Build the complete state from loaded contents
    ///
    /// Matches each loaded item against the opposite end points known from
    /// pre-load registrations. Matched end points become synchronized
    /// original registrations on a fresh keeper; unmatched items are recorded
    /// without an end point; end points left over after the walk are returned
    /// so the owning end point can re-register them once the complete state
    /// is installed. Both leftover cases are tolerated, reported
    /// inconsistencies, not errors.
    ///
    /// # Errors
    /// Fails without a state transition if the keeper already reports changed
    /// data (loading into a dirty keeper is unsupported) or if the loaded
    /// items contain a duplicate identifier
    pub fn mark_data_complete(
        &mut self,
        id: &RelationEndPointId,
        items: &[ObjectId],
        ctx: &MappingContext,
    ) -> Result<(CompleteLoadState, Vec<SharedRealObjectEndPoint>)> {
        if self.data_keeper.has_data_changed() {
            return Err(MappingError::InvariantViolation(format!(
                "Cannot mark the data of '{}' complete: the end point already has changes",
                id
            )));
        }
        let mut seen = HashSet::new();
        for item in items {
            if !seen.insert(*item) {
                return Err(MappingError::InvariantViolation(format!(
                    "Loaded contents of '{}' contain object '{}' more than once",
                    id, item
                )));
            }
        }

        // From here on nothing can fail: the fresh keeper is empty and the
        // items are unique, so the registrations below always succeed.
        let placeholder = ctx.data_keeper_factory().create(id.clone());
        let old_keeper = std::mem::replace(&mut self.data_keeper, placeholder);
        let mut known = old_keeper.original_opposite_end_points().clone();

        let mut new_keeper = ctx.data_keeper_factory().create(id.clone());
        for item in items {
            match known.remove(item) {
                Some(end_point) => {
                    new_keeper.register_original_opposite_end_point(Rc::clone(&end_point))?;
                    end_point.borrow_mut().mark_synchronized();
                }
                None => {
                    warn!(
                        "collection '{}' contains object '{}' but no opposite end point is known for it",
                        id, item
                    );
                    new_keeper.register_original_item_without_end_point(*item)?;
                }
            }
        }

        let unmatched: Vec<_> = known.into_values().collect();
        for end_point in &unmatched {
            warn!(
                "opposite end point '{}' claims membership in '{}' but the loaded contents do not include it",
                end_point.borrow().id(),
                id
            );
        }

        Ok((CompleteLoadState::new(new_keeper), unmatched))
    }

    /// Commit pre-load registrations as the new baseline
    ///
    /// An unloaded, never-touched collection cannot have changes, but it can
    /// have received registrations from the single-valued side; those commit
    /// without requiring a load.
    pub fn commit(&mut self) -> Result<()> {
        self.data_keeper.commit()
    }

    pub fn rollback(&mut self) {
        self.data_keeper.rollback();
    }
}
