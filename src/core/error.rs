use thiserror::Error;

use super::types::{ObjectId, RelationEndPointId};

#[derive(Error, Debug)]
pub enum MappingError {
    /// Programming-error class: double registration, unregistering an absent
    /// key, loading into a dirty keeper. Not recoverable by this crate.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Domain consistency violation: the two sides of the relationship
    /// disagree. Recoverable by an explicit synchronize call.
    #[error(
        "Relation property '{end_point_id}' is out of sync with object '{object_id}': {reason}. \
         Call synchronize on the collection end point to resolve the conflict."
    )]
    OutOfSync {
        end_point_id: RelationEndPointId,
        object_id: ObjectId,
        reason: String,
    },

    /// State-machine misuse: an operation was requested in a load state that
    /// does not support it.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// An end point could not be resolved through the end-point provider.
    #[error("Relation end point '{0}' not found")]
    EndPointNotFound(RelationEndPointId),

    /// The referenced object has been deleted and can no longer participate
    /// in relation mutations.
    #[error("Object '{0}' is deleted")]
    ObjectDeleted(ObjectId),

    /// Flattening/unflattening of persisted end-point state failed.
    #[error("Flatten error: {0}")]
    Flatten(String),
}

pub type Result<T> = std::result::Result<T, MappingError>;

impl From<rmp_serde::encode::Error> for MappingError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Flatten(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for MappingError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Flatten(err.to_string())
    }
}
