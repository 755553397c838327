// ============================================================================
// Unit-of-Work Context Module
// ============================================================================
//
// The collaborator seams the collection end-point core consumes:
// - LazyCollectionLoader: triggers persistence-layer loading on first data
//   access and drives mark_data_complete
// - DataKeeperFactory: produces empty keepers on every incomplete-to-complete
//   transition
// - RelationEndPointProvider: resolves opposite end points by identifier
//   without triggering lazy loading
//
// MappingContext bundles the collaborators and is passed explicitly into
// every operation that needs transaction-scoped behavior; there is no
// ambient "current transaction" state, so multiple contexts can coexist in
// one process.
//
// ============================================================================

pub mod config;
pub mod manager;

pub use config::{ChangeDetectionKind, MappingConfig};
pub use manager::RelationEndPointManager;

use std::rc::Rc;

use crate::core::{RelationEndPointId, Result};
use crate::endpoint::{
    CollectionEndPoint, CollectionEndPointDataKeeper, SharedRealObjectEndPoint,
};
use crate::entity::{ObjectState, ObjectStateSource};

/// Triggers persistence-layer loading of a collection end point's contents
///
/// The contract is that a successful call eventually invokes
/// `mark_data_complete` on the end point; the call blocks until data is
/// available.
pub trait LazyCollectionLoader {
    fn load_lazy_collection_end_point(
        &self,
        end_point: &mut CollectionEndPoint,
        ctx: &MappingContext,
    ) -> Result<()>;
}

/// Produces empty data keepers
///
/// Used on every incomplete-to-complete transition and whenever a
/// relationship's identity changes.
pub trait DataKeeperFactory {
    fn create(&self, id: RelationEndPointId) -> CollectionEndPointDataKeeper;
}

/// Resolves relation end points that are already registered with the context
///
/// Must never trigger lazy loading itself; it is called during
/// sub-transaction data propagation where re-entrant loading would deadlock
/// the propagation walk.
pub trait RelationEndPointProvider {
    fn get_relation_end_point_without_loading(
        &self,
        id: &RelationEndPointId,
    ) -> Option<SharedRealObjectEndPoint>;
}

/// Default keeper factory: hands every keeper the context's change-detection
/// strategy
pub struct DefaultDataKeeperFactory {
    change_detection: Rc<dyn crate::collection::ChangeDetectionStrategy>,
}

impl DefaultDataKeeperFactory {
    pub fn new(change_detection: Rc<dyn crate::collection::ChangeDetectionStrategy>) -> Self {
        Self { change_detection }
    }

    pub fn from_config(config: &MappingConfig) -> Self {
        Self::new(config.strategy())
    }
}

impl DataKeeperFactory for DefaultDataKeeperFactory {
    fn create(&self, id: RelationEndPointId) -> CollectionEndPointDataKeeper {
        CollectionEndPointDataKeeper::new(id, Rc::clone(&self.change_detection))
    }
}

/// Explicit bundle of the unit-of-work collaborators
///
/// Owned per context; operations receive it as a parameter instead of
/// reaching for ambient state.
pub struct MappingContext {
    lazy_loader: Rc<dyn LazyCollectionLoader>,
    data_keeper_factory: Rc<dyn DataKeeperFactory>,
    end_point_provider: Rc<dyn RelationEndPointProvider>,
    object_states: Rc<dyn ObjectStateSource>,
}

impl MappingContext {
    pub fn new(
        lazy_loader: Rc<dyn LazyCollectionLoader>,
        data_keeper_factory: Rc<dyn DataKeeperFactory>,
        end_point_provider: Rc<dyn RelationEndPointProvider>,
        object_states: Rc<dyn ObjectStateSource>,
    ) -> Self {
        Self {
            lazy_loader,
            data_keeper_factory,
            end_point_provider,
            object_states,
        }
    }

    /// Build a context with the default keeper factory derived from `config`
    pub fn with_config(
        config: &MappingConfig,
        lazy_loader: Rc<dyn LazyCollectionLoader>,
        end_point_provider: Rc<dyn RelationEndPointProvider>,
        object_states: Rc<dyn ObjectStateSource>,
    ) -> Self {
        Self::new(
            lazy_loader,
            Rc::new(DefaultDataKeeperFactory::from_config(config)),
            end_point_provider,
            object_states,
        )
    }

    pub fn lazy_loader(&self) -> Rc<dyn LazyCollectionLoader> {
        Rc::clone(&self.lazy_loader)
    }

    pub fn data_keeper_factory(&self) -> &dyn DataKeeperFactory {
        self.data_keeper_factory.as_ref()
    }

    pub fn end_point_provider(&self) -> &dyn RelationEndPointProvider {
        self.end_point_provider.as_ref()
    }

    pub fn object_state(&self, id: crate::core::ObjectId) -> ObjectState {
        self.object_states.object_state(id)
    }
}
