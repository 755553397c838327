use serde::{Deserialize, Serialize};

use crate::core::ObjectId;

/// Lifecycle state of a managed object as observed by the relation subsystem
///
/// The full entity lifecycle lives outside this crate; the relation core only
/// ever asks whether an object is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectState {
    /// Known by identifier only, contents not materialized
    NotLoaded,

    /// Materialized in the current unit-of-work context
    Loaded,

    /// Marked for deletion in the current unit-of-work context
    Deleted,
}

impl ObjectState {
    pub fn is_deleted(&self) -> bool {
        matches!(self, ObjectState::Deleted)
    }
}

impl std::fmt::Display for ObjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectState::NotLoaded => write!(f, "NOT LOADED"),
            ObjectState::Loaded => write!(f, "LOADED"),
            ObjectState::Deleted => write!(f, "DELETED"),
        }
    }
}

/// A managed domain object as seen by the relation subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainObject {
    id: ObjectId,
    state: ObjectState,
}

impl DomainObject {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            state: ObjectState::Loaded,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn state(&self) -> ObjectState {
        self.state
    }

    pub fn is_deleted(&self) -> bool {
        self.state.is_deleted()
    }

    pub fn mark_deleted(&mut self) {
        self.state = ObjectState::Deleted;
    }
}

/// Source of object lifecycle state, queried by relation mutation checks
///
/// Implemented by the unit-of-work context's object registry. An object that
/// is unknown to the source is reported as `NotLoaded`, never as an error;
/// partial loading is a legitimate situation for this subsystem.
pub trait ObjectStateSource {
    fn object_state(&self, id: ObjectId) -> ObjectState;
}

/// Simple identifier-keyed registry of object states
///
/// Suitable as the default `ObjectStateSource` for a single unit-of-work
/// context.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    states: std::collections::HashMap<ObjectId, ObjectState>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ObjectId, state: ObjectState) {
        self.states.insert(id, state);
    }

    pub fn mark_deleted(&mut self, id: ObjectId) {
        self.states.insert(id, ObjectState::Deleted);
    }
}

impl ObjectStateSource for ObjectRegistry {
    fn object_state(&self, id: ObjectId) -> ObjectState {
        self.states
            .get(&id)
            .copied()
            .unwrap_or(ObjectState::NotLoaded)
    }
}

// Lets a context share one mutable registry: Rc<RefCell<ObjectRegistry>>
// coerces to Rc<dyn ObjectStateSource>.
impl ObjectStateSource for std::cell::RefCell<ObjectRegistry> {
    fn object_state(&self, id: ObjectId) -> ObjectState {
        self.borrow().object_state(id)
    }
}
