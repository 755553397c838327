// ============================================================================
// Collection End-Point Load States
// ============================================================================
//
// Implements the State Pattern for collection end-point loading. Exactly one
// of the two states is active per end point:
//
// ```text
//   [no state] --(first touch)--> Incomplete
//   Incomplete --mark_data_complete--> Complete
//   Complete   --mark_data_incomplete--> Incomplete
//   Incomplete --mark_data_incomplete--> ERROR ("already incomplete")
// ```
//
// Each state owns its own data keeper; there is no shared mutable base
// state. The incomplete state never re-implements collection semantics: it
// either answers the handful of operations that need no data or signals the
// owning end point to load and re-dispatch.
//
// ============================================================================

pub mod complete;
pub mod incomplete;

pub use complete::{CompleteLoadState, UnregisterDirective};
pub use incomplete::IncompleteLoadState;

use crate::endpoint::data_keeper::CollectionEndPointDataKeeper;

/// The active load state of one collection end point
#[derive(Debug)]
pub enum LoadState {
    Incomplete(IncompleteLoadState),
    Complete(CompleteLoadState),
}

impl LoadState {
    pub fn is_data_complete(&self) -> bool {
        matches!(self, LoadState::Complete(_))
    }

    /// The keeper owned by the active state
    ///
    /// Both states carry a keeper: an unloaded end point can still receive
    /// original registrations from the single-valued side, so commit and
    /// rollback must reach the keeper in either state.
    pub fn data_keeper(&self) -> &CollectionEndPointDataKeeper {
        match self {
            LoadState::Incomplete(state) => state.data_keeper(),
            LoadState::Complete(state) => state.data_keeper(),
        }
    }

    pub fn data_keeper_mut(&mut self) -> &mut CollectionEndPointDataKeeper {
        match self {
            LoadState::Incomplete(state) => state.data_keeper_mut(),
            LoadState::Complete(state) => state.data_keeper_mut(),
        }
    }
}
