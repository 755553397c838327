// ============================================================================
// RelMemDB Library
// ============================================================================
//
// In-memory object-relational mapping runtime: the collection end-point
// subsystem backing to-many relationship properties. Collections load
// lazily and at most once, track every mutation against an original
// snapshot for commit/rollback, and keep both sides of a bidirectional
// relationship consistent while detecting and reporting out-of-sync
// situations.
//
// ============================================================================

pub mod collection;
pub mod context;
pub mod core;
pub mod endpoint;
pub mod entity;
pub mod flatten;

// Re-export main types for convenience
pub use self::core::{MappingError, ObjectId, RelationDefinition, RelationEndPointId, Result};

pub use collection::{
    ChangeCachingCollectionData, ChangeDetectionStrategy, DomainObjectCollectionData,
    SequenceSensitiveStrategy, SetEqualityStrategy,
};
pub use context::{
    ChangeDetectionKind, DataKeeperFactory, DefaultDataKeeperFactory, LazyCollectionLoader,
    MappingConfig, MappingContext, RelationEndPointManager, RelationEndPointProvider,
};
pub use endpoint::{
    CollectionEndPoint, CollectionEndPointDataKeeper, RealObjectEndPoint, RelationCommand,
    RelationCommandKind, SharedRealObjectEndPoint,
};
pub use entity::{DomainObject, ObjectRegistry, ObjectState, ObjectStateSource};
pub use flatten::{FlattenedCollectionEndPoint, FlattenedRealObjectEndPoint};
