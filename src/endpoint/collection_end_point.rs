use std::collections::HashMap;
use std::rc::Rc;

use crate::collection::DomainObjectCollectionData;
use crate::context::MappingContext;
use crate::core::{MappingError, ObjectId, RelationDefinition, RelationEndPointId, Result};

use super::command::RelationCommand;
use super::load_state::{
    CompleteLoadState, IncompleteLoadState, LoadState, UnregisterDirective,
};
use super::real_object::SharedRealObjectEndPoint;

/// The collection side of one bidirectional to-many relationship
///
/// Owns the load-state machine and delegates every operation to the current
/// state. Operations that need data first ensure the contents are loaded
/// through the context's lazy loader, then re-dispatch to the complete
/// state; the two states never duplicate collection semantics.
pub struct CollectionEndPoint {
    id: RelationEndPointId,
    relation: RelationDefinition,
    state: LoadState,
    has_been_touched: bool,
}

impl std::fmt::Debug for CollectionEndPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEndPoint")
            .field("id", &self.id)
            .field("is_data_complete", &self.state.is_data_complete())
            .field("has_been_touched", &self.has_been_touched)
            .finish()
    }
}

impl CollectionEndPoint {
    /// Create an end point in the incomplete state with an empty keeper
    pub fn new(owner: ObjectId, relation: RelationDefinition, ctx: &MappingContext) -> Self {
        let id = RelationEndPointId::new(owner, relation.collection_property_name());
        let keeper = ctx.data_keeper_factory().create(id.clone());
        Self {
            id,
            relation,
            state: LoadState::Incomplete(IncompleteLoadState::new(keeper)),
            has_been_touched: false,
        }
    }

    pub(crate) fn from_parts(
        id: RelationEndPointId,
        relation: RelationDefinition,
        state: LoadState,
        has_been_touched: bool,
    ) -> Self {
        Self {
            id,
            relation,
            state,
            has_been_touched,
        }
    }

    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    pub fn relation(&self) -> &RelationDefinition {
        &self.relation
    }

    pub fn is_data_complete(&self) -> bool {
        self.state.is_data_complete()
    }

    pub fn has_been_touched(&self) -> bool {
        self.has_been_touched
    }

    pub fn touch(&mut self) {
        self.has_been_touched = true;
    }

    /// Whether the current contents differ from the original snapshot
    pub fn has_changed(&self) -> bool {
        self.state.data_keeper().has_data_changed()
    }

    pub(crate) fn state(&self) -> &LoadState {
        &self.state
    }

    fn complete_state(&self) -> Result<&CompleteLoadState> {
        match &self.state {
            LoadState::Complete(state) => Ok(state),
            LoadState::Incomplete(_) => Err(MappingError::InvariantViolation(format!(
                "The data of '{}' is incomplete",
                self.id
            ))),
        }
    }

    fn complete_state_mut(&mut self) -> Result<&mut CompleteLoadState> {
        match &mut self.state {
            LoadState::Complete(state) => Ok(state),
            LoadState::Incomplete(_) => Err(MappingError::InvariantViolation(format!(
                "The data of '{}' is incomplete",
                self.id
            ))),
        }
    }

    /// Load the collection contents if they are not present yet
    ///
    /// Delegates to the context's lazy loader, whose contract is to call
    /// `mark_data_complete` before returning.
    pub fn ensure_data_complete(&mut self, ctx: &MappingContext) -> Result<()> {
        if self.is_data_complete() {
            return Ok(());
        }
        let loader = ctx.lazy_loader();
        loader.load_lazy_collection_end_point(self, ctx)?;
        if !self.is_data_complete() {
            return Err(MappingError::InvariantViolation(format!(
                "The lazy loader returned without completing the data of '{}'",
                self.id
            )));
        }
        Ok(())
    }

    /// Install loaded contents and transition to the complete state
    ///
    /// # Errors
    /// Fails without a transition if the end point is already complete, the
    /// keeper has pending changes, or the items contain duplicates
    pub fn mark_data_complete(&mut self, items: &[ObjectId], ctx: &MappingContext) -> Result<()> {
        let LoadState::Incomplete(incomplete) = &mut self.state else {
            return Err(MappingError::IllegalState(format!(
                "The data of '{}' is already complete",
                self.id
            )));
        };
        let (complete, unmatched) = incomplete.mark_data_complete(&self.id, items, ctx)?;
        self.state = LoadState::Complete(complete);

        // end points known from the single-valued side that the loaded
        // contents did not produce: re-register them against the complete
        // state, where they stay unsynchronized until explicitly resolved
        for end_point in unmatched {
            self.register_original_opposite_end_point(end_point)?;
        }
        Ok(())
    }

    /// Discard loaded contents and transition back to the incomplete state
    ///
    /// The keeper is replaced wholesale: a fresh keeper receives every
    /// current opposite end point as an original registration, with all
    /// synchronization flags reset.
    ///
    /// # Errors
    /// Fails if the end point is already incomplete
    pub fn mark_data_incomplete(&mut self, ctx: &MappingContext) -> Result<()> {
        let LoadState::Complete(complete) = &self.state else {
            return Err(MappingError::IllegalState(format!(
                "The data of '{}' is already incomplete",
                self.id
            )));
        };
        let carried: Vec<SharedRealObjectEndPoint> = complete
            .data_keeper()
            .current_opposite_end_points()
            .values()
            .map(Rc::clone)
            .collect();

        let mut keeper = ctx.data_keeper_factory().create(self.id.clone());
        for end_point in carried {
            keeper.register_original_opposite_end_point(end_point)?;
        }
        self.state = LoadState::Incomplete(IncompleteLoadState::new(keeper));
        Ok(())
    }

    /// Read-only view of the current contents, loading them if necessary
    pub fn get_data(&mut self, ctx: &MappingContext) -> Result<&DomainObjectCollectionData> {
        self.ensure_data_complete(ctx)?;
        Ok(self.complete_state()?.get_data())
    }

    /// Read-only view of the original snapshot, loading it if necessary
    pub fn get_original_data(
        &mut self,
        ctx: &MappingContext,
    ) -> Result<&DomainObjectCollectionData> {
        self.ensure_data_complete(ctx)?;
        Ok(self.complete_state()?.get_original_data())
    }

    /// Registration from the single-valued side; never triggers a load
    ///
    /// An unloaded collection can still receive opposite end-point
    /// registrations before being loaded.
    pub fn register_original_opposite_end_point(
        &mut self,
        end_point: SharedRealObjectEndPoint,
    ) -> Result<()> {
        match &mut self.state {
            LoadState::Incomplete(state) => state.register_original_opposite_end_point(end_point),
            LoadState::Complete(state) => state.register_original_opposite_end_point(end_point),
        }
    }

    /// Inverse registration from the single-valued side; never triggers a load
    ///
    /// On loaded data, removing an end point that backs an original member
    /// would silently rewrite the baseline, so the end point unloads first
    /// and re-dispatches to the incomplete state.
    pub fn unregister_original_opposite_end_point(
        &mut self,
        end_point: &SharedRealObjectEndPoint,
        ctx: &MappingContext,
    ) -> Result<()> {
        let directive = match &mut self.state {
            LoadState::Incomplete(state) => {
                return state.unregister_original_opposite_end_point(end_point);
            }
            LoadState::Complete(state) => state.unregister_original_opposite_end_point(end_point)?,
        };
        match directive {
            UnregisterDirective::Done => Ok(()),
            UnregisterDirective::RequiresUnload => {
                self.mark_data_incomplete(ctx)?;
                match &mut self.state {
                    LoadState::Incomplete(state) => {
                        state.unregister_original_opposite_end_point(end_point)
                    }
                    LoadState::Complete(_) => Err(MappingError::InvariantViolation(format!(
                        "'{}' is still complete after an unload",
                        self.id
                    ))),
                }
            }
        }
    }

    pub fn register_current_opposite_end_point(
        &mut self,
        end_point: SharedRealObjectEndPoint,
        ctx: &MappingContext,
    ) -> Result<()> {
        self.ensure_data_complete(ctx)?;
        self.complete_state_mut()?
            .register_current_opposite_end_point(end_point)
    }

    pub fn unregister_current_opposite_end_point(
        &mut self,
        end_point: &SharedRealObjectEndPoint,
        ctx: &MappingContext,
    ) -> Result<()> {
        self.ensure_data_complete(ctx)?;
        self.complete_state_mut()?
            .unregister_current_opposite_end_point(end_point)
    }

    /// Whether every original member is backed by an opposite end point
    pub fn is_synchronized(&mut self, ctx: &MappingContext) -> Result<bool> {
        self.ensure_data_complete(ctx)?;
        Ok(self.complete_state()?.is_synchronized())
    }

    /// Whether any current opposite end-point registration disagrees with the
    /// collection
    pub fn has_unsynchronized_current_opposite_end_points(
        &mut self,
        ctx: &MappingContext,
    ) -> Result<bool> {
        self.ensure_data_complete(ctx)?;
        Ok(self
            .complete_state()?
            .has_unsynchronized_current_opposite_end_points())
    }

    /// Accept the current contents as the new baseline for members without
    /// opposite end points
    pub fn synchronize(&mut self, ctx: &MappingContext) -> Result<()> {
        self.ensure_data_complete(ctx)?;
        self.complete_state_mut()?.synchronize()
    }

    /// Resolve one unsynchronized opposite end point
    ///
    /// # Errors
    /// Fails while the collection is unloaded; synchronizing an individual
    /// end point without the contents is unsupported
    pub fn synchronize_opposite_end_point(
        &mut self,
        end_point: &SharedRealObjectEndPoint,
    ) -> Result<()> {
        match &mut self.state {
            LoadState::Incomplete(state) => state.synchronize_opposite_end_point(end_point),
            LoadState::Complete(state) => state.synchronize_opposite_end_point(end_point),
        }
    }

    /// Replace the current contents with another end point's current contents
    ///
    /// # Errors
    /// Fails if the end points belong to different relationship properties or
    /// the source is unloaded
    pub fn set_value_from(
        &mut self,
        source: &CollectionEndPoint,
        ctx: &MappingContext,
    ) -> Result<()> {
        if source.id.property_name() != self.id.property_name() {
            return Err(MappingError::InvariantViolation(format!(
                "Cannot set the value of '{}' from '{}': the end points belong to different properties",
                self.id, source.id
            )));
        }
        let source_items: Vec<ObjectId> = source.complete_state()?.get_data().iter().collect();
        self.ensure_data_complete(ctx)?;
        self.complete_state_mut()?.set_value_from(&source_items)?;
        if source.has_been_touched() || self.has_changed() {
            self.touch();
        }
        Ok(())
    }

    /// Reorder the current and original views with one comparer
    pub fn sort_current_and_original_data(
        &mut self,
        comparer: &mut dyn FnMut(&ObjectId, &ObjectId) -> std::cmp::Ordering,
        ctx: &MappingContext,
    ) -> Result<()> {
        self.ensure_data_complete(ctx)?;
        self.complete_state_mut()?
            .data_keeper_mut()
            .sort_current_and_original_data(comparer);
        Ok(())
    }

    pub fn create_insert_command(
        &mut self,
        object: ObjectId,
        index: usize,
        ctx: &MappingContext,
    ) -> Result<RelationCommand> {
        self.ensure_data_complete(ctx)?;
        self.complete_state()?.create_insert_command(object, index, ctx)
    }

    pub fn create_add_command(
        &mut self,
        object: ObjectId,
        ctx: &MappingContext,
    ) -> Result<RelationCommand> {
        self.ensure_data_complete(ctx)?;
        self.complete_state()?.create_add_command(object, ctx)
    }

    pub fn create_remove_command(
        &mut self,
        object: ObjectId,
        ctx: &MappingContext,
    ) -> Result<RelationCommand> {
        self.ensure_data_complete(ctx)?;
        self.complete_state()?.create_remove_command(object)
    }

    pub fn create_replace_command(
        &mut self,
        index: usize,
        replacement: ObjectId,
        ctx: &MappingContext,
    ) -> Result<RelationCommand> {
        self.ensure_data_complete(ctx)?;
        self.complete_state()?
            .create_replace_command(index, replacement, ctx)
    }

    pub fn create_delete_command(&mut self, ctx: &MappingContext) -> Result<RelationCommand> {
        self.ensure_data_complete(ctx)?;
        self.complete_state()?.create_delete_command()
    }

    pub fn create_set_collection_command(
        &mut self,
        new_contents: &[ObjectId],
        ctx: &MappingContext,
    ) -> Result<RelationCommand> {
        self.ensure_data_complete(ctx)?;
        self.complete_state()?
            .create_set_collection_command(new_contents, ctx)
    }

    fn resolve_opposite_end_point(
        &self,
        object: ObjectId,
        ctx: &MappingContext,
    ) -> Result<SharedRealObjectEndPoint> {
        let opposite_id = self.relation.opposite_end_point_id(object);
        ctx.end_point_provider()
            .get_relation_end_point_without_loading(&opposite_id)
            .ok_or(MappingError::EndPointNotFound(opposite_id))
    }

    /// Execute a command produced by one of the factories
    ///
    /// Performs the collection mutation and the matching current opposite
    /// end-point registration change as one logical unit, then touches the
    /// end point.
    pub fn execute_command(
        &mut self,
        command: RelationCommand,
        ctx: &MappingContext,
    ) -> Result<()> {
        if command.end_point_id() != &self.id {
            return Err(MappingError::InvariantViolation(format!(
                "Command for '{}' executed against '{}'",
                command.end_point_id(),
                self.id
            )));
        }
        self.ensure_data_complete(ctx)?;

        match command {
            RelationCommand::Insert { object, index, .. } => {
                let end_point = self.resolve_opposite_end_point(object, ctx)?;
                let keeper = self.complete_state_mut()?.data_keeper_mut();
                keeper.collection_data_mut().insert(index, object)?;
                if !keeper.current_opposite_end_points().contains_key(&object) {
                    keeper.register_current_opposite_end_point(Rc::clone(&end_point))?;
                }
                // both sides were mutated as one unit, so they agree now
                end_point.borrow_mut().mark_synchronized();
            }
            RelationCommand::Add { object, .. } => {
                let end_point = self.resolve_opposite_end_point(object, ctx)?;
                let keeper = self.complete_state_mut()?.data_keeper_mut();
                keeper.collection_data_mut().append(object)?;
                if !keeper.current_opposite_end_points().contains_key(&object) {
                    keeper.register_current_opposite_end_point(Rc::clone(&end_point))?;
                }
                end_point.borrow_mut().mark_synchronized();
            }
            RelationCommand::Remove { object, .. } => {
                let keeper = self.complete_state_mut()?.data_keeper_mut();
                keeper.collection_data_mut().remove(object)?;
                keeper.remove_current_opposite_end_point(object);
            }
            RelationCommand::Replace {
                index,
                old_object,
                new_object,
                ..
            } => {
                let end_point = self.resolve_opposite_end_point(new_object, ctx)?;
                let keeper = self.complete_state_mut()?.data_keeper_mut();
                keeper.collection_data_mut().replace(index, new_object)?;
                keeper.remove_current_opposite_end_point(old_object);
                if !keeper.current_opposite_end_points().contains_key(&new_object) {
                    keeper.register_current_opposite_end_point(Rc::clone(&end_point))?;
                }
                end_point.borrow_mut().mark_synchronized();
            }
            RelationCommand::ReplaceWithSame { .. } => {}
            RelationCommand::Delete { .. } => {
                let keeper = self.complete_state_mut()?.data_keeper_mut();
                keeper.collection_data_mut().clear_current();
                keeper.clear_current_opposite_end_points();
            }
            RelationCommand::SetCollection { new_contents, .. } => {
                let mut end_points = HashMap::new();
                for object in &new_contents {
                    let existing = self
                        .complete_state()?
                        .data_keeper()
                        .current_opposite_end_points()
                        .get(object)
                        .map(Rc::clone);
                    let end_point = match existing {
                        Some(end_point) => end_point,
                        None => self.resolve_opposite_end_point(*object, ctx)?,
                    };
                    end_points.insert(*object, end_point);
                }
                let keeper = self.complete_state_mut()?.data_keeper_mut();
                keeper
                    .collection_data_mut()
                    .replace_current_contents(&new_contents)?;
                for end_point in end_points.values() {
                    end_point.borrow_mut().mark_synchronized();
                }
                keeper.set_current_opposite_end_points(end_points);
            }
        }

        self.touch();
        Ok(())
    }

    /// Commit the current state as the new baseline
    ///
    /// Works in either load state: an unloaded collection can still carry
    /// registrations from the single-valued side.
    pub fn commit(&mut self) -> Result<()> {
        self.state.data_keeper_mut().commit()?;
        self.has_been_touched = false;
        Ok(())
    }

    /// Discard changes and restore the baseline
    pub fn rollback(&mut self) {
        self.state.data_keeper_mut().rollback();
        self.has_been_touched = false;
    }

    /// Adopt a nested unit-of-work scope's view of this relationship
    ///
    /// # Errors
    /// Fails if the source is unloaded or one of its opposite end points
    /// cannot be resolved in this scope
    pub fn set_data_from_sub_transaction(
        &mut self,
        source: &CollectionEndPoint,
        ctx: &MappingContext,
    ) -> Result<()> {
        if source.id.property_name() != self.id.property_name() {
            return Err(MappingError::InvariantViolation(format!(
                "Cannot adopt data of '{}' into '{}': the end points belong to different properties",
                source.id, self.id
            )));
        }
        let source_keeper = source.complete_state()?.data_keeper();
        self.ensure_data_complete(ctx)?;
        self.complete_state_mut()?
            .data_keeper_mut()
            .set_data_from_sub_transaction(source_keeper, ctx.end_point_provider())?;
        if self.has_changed() {
            self.touch();
        }
        Ok(())
    }
}
