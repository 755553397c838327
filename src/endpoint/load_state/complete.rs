use std::rc::Rc;

use log::debug;

use crate::collection::DomainObjectCollectionData;
use crate::context::MappingContext;
use crate::core::{MappingError, ObjectId, Result};
use crate::endpoint::command::RelationCommand;
use crate::endpoint::data_keeper::CollectionEndPointDataKeeper;
use crate::endpoint::real_object::SharedRealObjectEndPoint;

/// Outcome of unregistering an original opposite end point on loaded data
#[derive(Debug, PartialEq, Eq)]
pub enum UnregisterDirective {
    /// The registration was current-only; it has been removed
    Done,

    /// The end point backs an original member; removing it would silently
    /// rewrite the loaded baseline, so the owner must unload first and
    /// re-dispatch to the incomplete state
    RequiresUnload,
}

/// State active once the collection contents are loaded
///
/// All operations assume data is present; mutations are answered with
/// unexecuted bidirectional commands after the synchronization blockers have
/// been checked.
#[derive(Debug)]
pub struct CompleteLoadState {
    data_keeper: CollectionEndPointDataKeeper,
}

impl CompleteLoadState {
    pub fn new(data_keeper: CollectionEndPointDataKeeper) -> Self {
        Self { data_keeper }
    }

    pub fn is_data_complete(&self) -> bool {
        true
    }

    pub fn data_keeper(&self) -> &CollectionEndPointDataKeeper {
        &self.data_keeper
    }

    pub fn data_keeper_mut(&mut self) -> &mut CollectionEndPointDataKeeper {
        &mut self.data_keeper
    }

    pub fn get_data(&self) -> &DomainObjectCollectionData {
        self.data_keeper.current_data()
    }

    pub fn get_original_data(&self) -> &DomainObjectCollectionData {
        self.data_keeper.original_data()
    }

    /// Register an opposite end point that announced itself after the load
    ///
    /// If the collection already holds the member without an end point, the
    /// back pointer completes the pair and both sides become synchronized.
    /// Otherwise the relationship is known from the single-valued side only:
    /// the end point is recorded as a current registration and stays
    /// unsynchronized until explicitly resolved.
    pub fn register_original_opposite_end_point(
        &mut self,
        end_point: SharedRealObjectEndPoint,
    ) -> Result<()> {
        let object_id = end_point.borrow().owner_id();
        if self
            .data_keeper
            .original_items_without_end_points()
            .contains(&object_id)
        {
            self.data_keeper
                .register_original_opposite_end_point(Rc::clone(&end_point))?;
            end_point.borrow_mut().mark_synchronized();
        } else {
            self.data_keeper
                .register_current_opposite_end_point(Rc::clone(&end_point))?;
            end_point.borrow_mut().reset_sync_state();
        }
        Ok(())
    }

    /// Unregister an original opposite end point
    ///
    /// See `UnregisterDirective` for the two outcomes.
    pub fn unregister_original_opposite_end_point(
        &mut self,
        end_point: &SharedRealObjectEndPoint,
    ) -> Result<UnregisterDirective> {
        let object_id = end_point.borrow().owner_id();
        let is_current = self
            .data_keeper
            .current_opposite_end_points()
            .contains_key(&object_id);
        let is_original = self
            .data_keeper
            .original_opposite_end_points()
            .contains_key(&object_id);

        if is_current && !is_original {
            // an unsynchronized registration never made it into the baseline
            self.data_keeper.unregister_current_opposite_end_point(end_point)?;
            Ok(UnregisterDirective::Done)
        } else if is_original {
            Ok(UnregisterDirective::RequiresUnload)
        } else {
            Err(MappingError::InvariantViolation(format!(
                "No opposite end point for object '{}' is registered with '{}'",
                object_id,
                self.data_keeper.id()
            )))
        }
    }

    pub fn register_current_opposite_end_point(
        &mut self,
        end_point: SharedRealObjectEndPoint,
    ) -> Result<()> {
        self.data_keeper.register_current_opposite_end_point(end_point)
    }

    pub fn unregister_current_opposite_end_point(
        &mut self,
        end_point: &SharedRealObjectEndPoint,
    ) -> Result<()> {
        self.data_keeper.unregister_current_opposite_end_point(end_point)
    }

    /// Whether every original member is backed by an opposite end point
    pub fn is_synchronized(&self) -> bool {
        self.data_keeper.original_items_without_end_points().is_empty()
    }

    /// Whether any current opposite end-point registration disagrees with the
    /// collection
    pub fn has_unsynchronized_current_opposite_end_points(&self) -> bool {
        self.data_keeper
            .current_opposite_end_points()
            .values()
            .any(|end_point| !end_point.borrow().is_synchronized())
    }

    /// Accept the current contents as the new baseline
    ///
    /// Every member recorded without an opposite end point loses that status;
    /// the members themselves stay in the collection. This is the explicit
    /// user-invoked repair operation for out-of-sync collections.
    pub fn synchronize(&mut self) -> Result<()> {
        let items: Vec<_> = self
            .data_keeper
            .original_items_without_end_points()
            .iter()
            .copied()
            .collect();
        for object_id in items {
            debug!(
                "synchronize: accepting '{}' as a member of '{}' without an opposite end point",
                object_id,
                self.data_keeper.id()
            );
            self.data_keeper.clear_item_without_end_point_status(object_id)?;
        }
        Ok(())
    }

    /// Resolve one unsynchronized opposite end point by promoting it into the
    /// baseline
    ///
    /// # Errors
    /// Fails if the end point is not a current registration or is already
    /// synchronized
    pub fn synchronize_opposite_end_point(
        &mut self,
        end_point: &SharedRealObjectEndPoint,
    ) -> Result<()> {
        let object_id = end_point.borrow().owner_id();
        if !self
            .data_keeper
            .current_opposite_end_points()
            .contains_key(&object_id)
        {
            return Err(MappingError::InvariantViolation(format!(
                "Opposite end point '{}' is not registered with '{}'",
                end_point.borrow().id(),
                self.data_keeper.id()
            )));
        }
        if end_point.borrow().is_synchronized() {
            return Err(MappingError::InvariantViolation(format!(
                "Opposite end point '{}' is already synchronized with '{}'",
                end_point.borrow().id(),
                self.data_keeper.id()
            )));
        }

        self.data_keeper.unregister_current_opposite_end_point(end_point)?;
        self.data_keeper
            .register_original_opposite_end_point(Rc::clone(end_point))?;
        end_point.borrow_mut().mark_synchronized();
        Ok(())
    }

    /// Replace the current contents with another end point's current contents
    ///
    /// Opposite end-point bookkeeping is untouched; the caller drives that
    /// through commands.
    pub fn set_value_from(&mut self, items: &[ObjectId]) -> Result<()> {
        self.data_keeper
            .collection_data_mut()
            .replace_current_contents(items)
    }

    fn out_of_sync(&self, object_id: ObjectId, reason: String) -> MappingError {
        MappingError::OutOfSync {
            end_point_id: self.data_keeper.id().clone(),
            object_id,
            reason,
        }
    }

    /// Whole-collection synchronization blockers, applied to set and delete
    fn check_collection_synchronized(&self) -> Result<()> {
        if let Some((object_id, end_point)) = self
            .data_keeper
            .current_opposite_end_points()
            .iter()
            .find(|(_, end_point)| !end_point.borrow().is_synchronized())
        {
            return Err(self.out_of_sync(
                *object_id,
                format!(
                    "opposite end point '{}' is not synchronized",
                    end_point.borrow().id()
                ),
            ));
        }
        if let Some(object_id) = self
            .data_keeper
            .original_items_without_end_points()
            .iter()
            .next()
        {
            return Err(self.out_of_sync(
                *object_id,
                "the member has no opposite end point".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-member synchronization blockers, applied to the specific object an
    /// insert, add, remove or replace touches
    fn check_object_synchronized(&self, object_id: ObjectId) -> Result<()> {
        if self
            .data_keeper
            .original_items_without_end_points()
            .contains(&object_id)
        {
            return Err(self.out_of_sync(
                object_id,
                "the member has no opposite end point".to_string(),
            ));
        }
        if let Some(end_point) = self.data_keeper.current_opposite_end_points().get(&object_id) {
            if !end_point.borrow().is_synchronized() {
                return Err(self.out_of_sync(
                    object_id,
                    format!(
                        "opposite end point '{}' is not synchronized",
                        end_point.borrow().id()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_not_deleted(&self, object_id: ObjectId, ctx: &MappingContext) -> Result<()> {
        if ctx.object_state(object_id).is_deleted() {
            return Err(MappingError::ObjectDeleted(object_id));
        }
        Ok(())
    }

    pub fn create_insert_command(
        &self,
        object: ObjectId,
        index: usize,
        ctx: &MappingContext,
    ) -> Result<RelationCommand> {
        self.check_not_deleted(object, ctx)?;
        self.check_object_synchronized(object)?;
        if self.data_keeper.current_data().contains(object) {
            return Err(MappingError::InvariantViolation(format!(
                "Object '{}' is already part of '{}'",
                object,
                self.data_keeper.id()
            )));
        }
        if index > self.data_keeper.current_data().len() {
            return Err(MappingError::InvariantViolation(format!(
                "Insert index {} out of bounds for '{}' of length {}",
                index,
                self.data_keeper.id(),
                self.data_keeper.current_data().len()
            )));
        }
        Ok(RelationCommand::Insert {
            end_point_id: self.data_keeper.id().clone(),
            object,
            index,
        })
    }

    pub fn create_add_command(
        &self,
        object: ObjectId,
        ctx: &MappingContext,
    ) -> Result<RelationCommand> {
        self.check_not_deleted(object, ctx)?;
        self.check_object_synchronized(object)?;
        if self.data_keeper.current_data().contains(object) {
            return Err(MappingError::InvariantViolation(format!(
                "Object '{}' is already part of '{}'",
                object,
                self.data_keeper.id()
            )));
        }
        Ok(RelationCommand::Add {
            end_point_id: self.data_keeper.id().clone(),
            object,
        })
    }

    pub fn create_remove_command(&self, object: ObjectId) -> Result<RelationCommand> {
        self.check_object_synchronized(object)?;
        if !self.data_keeper.current_data().contains(object) {
            return Err(MappingError::InvariantViolation(format!(
                "Object '{}' is not part of '{}'",
                object,
                self.data_keeper.id()
            )));
        }
        Ok(RelationCommand::Remove {
            end_point_id: self.data_keeper.id().clone(),
            object,
        })
    }

    pub fn create_replace_command(
        &self,
        index: usize,
        replacement: ObjectId,
        ctx: &MappingContext,
    ) -> Result<RelationCommand> {
        let old_object = self.data_keeper.current_data().get(index).ok_or_else(|| {
            MappingError::InvariantViolation(format!(
                "Replace index {} out of bounds for '{}' of length {}",
                index,
                self.data_keeper.id(),
                self.data_keeper.current_data().len()
            ))
        })?;

        if old_object == replacement {
            return Ok(RelationCommand::ReplaceWithSame {
                end_point_id: self.data_keeper.id().clone(),
                object: replacement,
            });
        }

        self.check_not_deleted(replacement, ctx)?;
        self.check_object_synchronized(old_object)?;
        self.check_object_synchronized(replacement)?;
        if self.data_keeper.current_data().contains(replacement) {
            return Err(MappingError::InvariantViolation(format!(
                "Object '{}' is already part of '{}'",
                replacement,
                self.data_keeper.id()
            )));
        }
        Ok(RelationCommand::Replace {
            end_point_id: self.data_keeper.id().clone(),
            index,
            old_object,
            new_object: replacement,
        })
    }

    pub fn create_delete_command(&self) -> Result<RelationCommand> {
        self.check_collection_synchronized()?;
        Ok(RelationCommand::Delete {
            end_point_id: self.data_keeper.id().clone(),
        })
    }

    pub fn create_set_collection_command(
        &self,
        new_contents: &[ObjectId],
        ctx: &MappingContext,
    ) -> Result<RelationCommand> {
        self.check_collection_synchronized()?;
        let mut seen = std::collections::HashSet::new();
        for object in new_contents {
            if !seen.insert(*object) {
                return Err(MappingError::InvariantViolation(format!(
                    "New contents of '{}' contain object '{}' more than once",
                    self.data_keeper.id(),
                    object
                )));
            }
            self.check_not_deleted(*object, ctx)?;
            self.check_object_synchronized(*object)?;
        }
        Ok(RelationCommand::SetCollection {
            end_point_id: self.data_keeper.id().clone(),
            new_contents: new_contents.to_vec(),
        })
    }

    pub fn commit(&mut self) -> Result<()> {
        self.data_keeper.commit()
    }

    pub fn rollback(&mut self) {
        self.data_keeper.rollback();
    }
}
