// ============================================================================
// Collection Data Module
// ============================================================================
//
// Ordered collection contents for to-many relation properties:
// - DomainObjectCollectionData: the raw ordered, duplicate-free member list
// - ChangeCachingCollectionData: current + original views with a cached
//   has-changed answer (Decorator Pattern)
// - ChangeDetectionStrategy: pluggable current-vs-original comparison
//   (Strategy Pattern)
//
// ============================================================================

pub mod change_cache;
pub mod change_detection;
pub mod data;

pub use change_cache::ChangeCachingCollectionData;
pub use change_detection::{ChangeDetectionStrategy, SequenceSensitiveStrategy, SetEqualityStrategy};
pub use data::DomainObjectCollectionData;
