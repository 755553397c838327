use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a managed domain object
///
/// Objects are referenced by identifier throughout the relation subsystem;
/// holding identifiers instead of object references keeps the bidirectional
/// object graph cycle-free and makes flattening straightforward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    /// Generate a new unique object ID
    pub fn new() -> Self {
        ObjectId(Uuid::new_v4())
    }

    /// Get the raw UUID value
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj_{}", self.0.simple())
    }
}

/// Identifier of one side of a relationship: the owning object plus the
/// relationship property on that object.
///
/// Immutable after construction; used as a map key everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationEndPointId {
    owner: ObjectId,
    property_name: String,
}

impl RelationEndPointId {
    pub fn new(owner: ObjectId, property_name: impl Into<String>) -> Self {
        Self {
            owner,
            property_name: property_name.into(),
        }
    }

    /// The object that owns the relationship property
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    /// The relationship property on the owning object
    pub fn property_name(&self) -> &str {
        &self.property_name
    }
}

impl std::fmt::Display for RelationEndPointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.owner, self.property_name)
    }
}

/// Static description of one bidirectional to-many relationship.
///
/// The collection property lives on the "one" side's related objects as a
/// single-valued back pointer named `opposite_property_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    collection_property_name: String,
    opposite_property_name: String,
}

impl RelationDefinition {
    pub fn new(
        collection_property_name: impl Into<String>,
        opposite_property_name: impl Into<String>,
    ) -> Self {
        Self {
            collection_property_name: collection_property_name.into(),
            opposite_property_name: opposite_property_name.into(),
        }
    }

    /// The to-many property on the collection owner (e.g. "order_items")
    pub fn collection_property_name(&self) -> &str {
        &self.collection_property_name
    }

    /// The back-pointer property on each contained object (e.g. "order")
    pub fn opposite_property_name(&self) -> &str {
        &self.opposite_property_name
    }

    /// The end-point ID of the back-pointer property on a contained object
    pub fn opposite_end_point_id(&self, related_object: ObjectId) -> RelationEndPointId {
        RelationEndPointId::new(related_object, self.opposite_property_name.clone())
    }
}
