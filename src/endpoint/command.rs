// ============================================================================
// Bidirectional Relation Commands
// ============================================================================
//
// Implements the Command Pattern for relation mutations. Each command is a
// value object produced, unexecuted, by a complete collection end point; when
// executed it performs the collection mutation and the matching opposite
// end-point registration change as one logical unit.
//
// ============================================================================

use crate::core::{ObjectId, RelationEndPointId};

/// Classification of a relation command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationCommandKind {
    Insert,
    Add,
    Remove,
    Replace,
    Delete,
    SetCollection,
}

impl std::fmt::Display for RelationCommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationCommandKind::Insert => write!(f, "INSERT"),
            RelationCommandKind::Add => write!(f, "ADD"),
            RelationCommandKind::Remove => write!(f, "REMOVE"),
            RelationCommandKind::Replace => write!(f, "REPLACE"),
            RelationCommandKind::Delete => write!(f, "DELETE"),
            RelationCommandKind::SetCollection => write!(f, "SET COLLECTION"),
        }
    }
}

/// A single unexecuted mutation of a collection end point
///
/// Commands capture identifiers, never object references, so they stay valid
/// across keeper replacement and can be inspected before execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationCommand {
    /// Insert an object at a position in the collection
    Insert {
        end_point_id: RelationEndPointId,
        object: ObjectId,
        index: usize,
    },

    /// Append an object at the end of the collection
    Add {
        end_point_id: RelationEndPointId,
        object: ObjectId,
    },

    /// Remove an object from the collection
    Remove {
        end_point_id: RelationEndPointId,
        object: ObjectId,
    },

    /// Replace the object at a position with another object
    Replace {
        end_point_id: RelationEndPointId,
        index: usize,
        old_object: ObjectId,
        new_object: ObjectId,
    },

    /// Replace the object at a position with itself; executing this is a no-op
    ReplaceWithSame {
        end_point_id: RelationEndPointId,
        object: ObjectId,
    },

    /// Clear the collection because its owner is being deleted
    Delete { end_point_id: RelationEndPointId },

    /// Replace the whole collection contents
    SetCollection {
        end_point_id: RelationEndPointId,
        new_contents: Vec<ObjectId>,
    },
}

impl RelationCommand {
    /// The collection end point this command mutates
    pub fn end_point_id(&self) -> &RelationEndPointId {
        match self {
            RelationCommand::Insert { end_point_id, .. } => end_point_id,
            RelationCommand::Add { end_point_id, .. } => end_point_id,
            RelationCommand::Remove { end_point_id, .. } => end_point_id,
            RelationCommand::Replace { end_point_id, .. } => end_point_id,
            RelationCommand::ReplaceWithSame { end_point_id, .. } => end_point_id,
            RelationCommand::Delete { end_point_id } => end_point_id,
            RelationCommand::SetCollection { end_point_id, .. } => end_point_id,
        }
    }

    pub fn kind(&self) -> RelationCommandKind {
        match self {
            RelationCommand::Insert { .. } => RelationCommandKind::Insert,
            RelationCommand::Add { .. } => RelationCommandKind::Add,
            RelationCommand::Remove { .. } => RelationCommandKind::Remove,
            RelationCommand::Replace { .. } | RelationCommand::ReplaceWithSame { .. } => {
                RelationCommandKind::Replace
            }
            RelationCommand::Delete { .. } => RelationCommandKind::Delete,
            RelationCommand::SetCollection { .. } => RelationCommandKind::SetCollection,
        }
    }

    /// Whether executing this command leaves the end point unchanged
    pub fn is_no_op(&self) -> bool {
        matches!(self, RelationCommand::ReplaceWithSame { .. })
    }
}
