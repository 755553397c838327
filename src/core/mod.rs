pub mod error;
pub mod types;

pub use error::{MappingError, Result};
pub use types::{ObjectId, RelationDefinition, RelationEndPointId};
