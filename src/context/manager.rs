use std::collections::HashMap;

use tracing::{Level, event, info_span};

use crate::core::{MappingError, ObjectId, RelationDefinition, RelationEndPointId, Result};
use crate::endpoint::CollectionEndPoint;

use super::MappingContext;

/// Registry of the collection end points owned by one unit-of-work context
///
/// Each context (and each nested sub-scope) owns an independent manager;
/// sibling scopes never share end-point state. Data crosses scope boundaries
/// only through the explicit adoption walk at sub-scope commit.
#[derive(Default)]
pub struct RelationEndPointManager {
    end_points: HashMap<RelationEndPointId, CollectionEndPoint>,
}

impl RelationEndPointManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.end_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.end_points.is_empty()
    }

    pub fn get(&self, id: &RelationEndPointId) -> Option<&CollectionEndPoint> {
        self.end_points.get(id)
    }

    pub fn get_mut(&mut self, id: &RelationEndPointId) -> Option<&mut CollectionEndPoint> {
        self.end_points.get_mut(id)
    }

    /// Register a new end point in the incomplete state
    ///
    /// # Errors
    /// Fails if an end point for the same relationship is already registered
    pub fn register_end_point(
        &mut self,
        owner: ObjectId,
        relation: RelationDefinition,
        ctx: &MappingContext,
    ) -> Result<&mut CollectionEndPoint> {
        let id = RelationEndPointId::new(owner, relation.collection_property_name());
        if self.end_points.contains_key(&id) {
            return Err(MappingError::InvariantViolation(format!(
                "An end point for '{}' is already registered",
                id
            )));
        }
        let end_point = CollectionEndPoint::new(owner, relation, ctx);
        Ok(self.end_points.entry(id).or_insert(end_point))
    }

    /// Fetch the end point for a relationship, registering it on first touch
    pub fn get_or_register(
        &mut self,
        owner: ObjectId,
        relation: &RelationDefinition,
        ctx: &MappingContext,
    ) -> &mut CollectionEndPoint {
        let id = RelationEndPointId::new(owner, relation.collection_property_name());
        self.end_points
            .entry(id)
            .or_insert_with(|| CollectionEndPoint::new(owner, relation.clone(), ctx))
    }

    /// Whether any registered end point reports changed data
    pub fn has_changed(&self) -> bool {
        self.end_points.values().any(CollectionEndPoint::has_changed)
    }

    /// Commit every end point's current state as its new baseline
    ///
    /// Commit is all-or-nothing per keeper, not across keepers; an error
    /// aborts the sweep and leaves the remaining end points uncommitted.
    pub fn commit_all(&mut self) -> Result<()> {
        let span = info_span!("relation_commit", end_points = self.end_points.len());
        let _enter = span.enter();

        for end_point in self.end_points.values_mut() {
            end_point.commit().inspect_err(|err| {
                event!(Level::ERROR, error = %err, "end point commit failed");
            })?;
        }
        event!(Level::DEBUG, "all end points committed");
        Ok(())
    }

    /// Discard every end point's changes
    pub fn rollback_all(&mut self) {
        let span = info_span!("relation_rollback", end_points = self.end_points.len());
        let _enter = span.enter();

        for end_point in self.end_points.values_mut() {
            end_point.rollback();
        }
        event!(Level::DEBUG, "all end points rolled back");
    }

    /// Adopt the changed collections of a nested scope at its commit point
    ///
    /// For every loaded source end point that was touched or changed, the
    /// matching end point in this scope (registered on demand) replaces its
    /// current contents with the source's, re-resolving opposite end points
    /// through this scope's provider.
    pub fn adopt_sub_transaction(
        &mut self,
        source: &RelationEndPointManager,
        ctx: &MappingContext,
    ) -> Result<()> {
        let span = info_span!("relation_subtx_adopt", end_points = source.end_points.len());
        let _enter = span.enter();

        for source_end_point in source.end_points.values() {
            if !source_end_point.is_data_complete() {
                continue;
            }
            if !source_end_point.has_changed() && !source_end_point.has_been_touched() {
                continue;
            }
            let target = self.get_or_register(
                source_end_point.id().owner(),
                source_end_point.relation(),
                ctx,
            );
            target
                .set_data_from_sub_transaction(source_end_point, ctx)
                .inspect_err(|err| {
                    event!(Level::ERROR, error = %err, "sub-transaction adoption failed");
                })?;
        }
        event!(Level::DEBUG, "sub-transaction data adopted");
        Ok(())
    }
}
