pub mod object;

pub use object::{DomainObject, ObjectRegistry, ObjectState, ObjectStateSource};
