//! Entity store error types.

use universe_land::ActorId;

/// Errors returned by [`ActorStore`](crate::ActorStore) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActorError {
    /// No actor with this id exists.
    #[error("actor {0} not found")]
    NotFound(ActorId),

    /// Attaching `child` under `target` would make an actor its own ancestor.
    #[error("attaching {child} under {target} would create a cycle")]
    CycleDetected {
        /// Intended parent.
        target: ActorId,
        /// Intended child.
        child: ActorId,
    },

    /// The actor cannot perform the operation in its current state.
    #[error("actor {id}: {reason}")]
    InvalidState {
        /// Offending actor.
        id: ActorId,
        /// What was wrong.
        reason: &'static str,
    },
}
