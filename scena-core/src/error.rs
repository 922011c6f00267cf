//! Error types for scena-core
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Variants are `Clone` because a stored rejection (e.g. a
//! settled [`Signal`](crate::signal::Signal)) may be observed by several
//! waiters.

use thiserror::Error;

use crate::types::ContentState;

/// Main error type for scena-core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Content lifecycle violation
    #[error("invalid content state transition from {from} to {to}")]
    InvalidStateTransition { from: ContentState, to: ContentState },

    /// A queued task with this id is already pending
    #[error("task with id \"{0}\" was already added to the task queue")]
    TaskAlreadyAdded(String),

    /// The task queue manager was torn down before the task started
    #[error("task queue manager destroyed, would not run this task")]
    TaskQueueManagerDestroyed,

    /// The task reached execution after its manager was torn down
    #[error("task queue manager was destroyed, unable to execute task \"{0}\"")]
    RunTaskInDestroyedTaskQueueManager(String),

    /// A completion signal was resolved or rejected twice
    #[error("signal already settled")]
    SignalAlreadySettled,

    /// Operation on a destroyed sequence
    #[error("the sequence was destroyed")]
    SequenceDestroyed,

    /// Operation on a destroyed episode core
    #[error("the core was destroyed")]
    CoreDestroyed,

    /// No component registered under this name
    #[error("component not found: {0}")]
    ComponentNotFound(String),

    /// The named component is not a content instance
    #[error("component \"{0}\" is not a content")]
    NotAContent(String),

    /// Duplicate subsequence id
    #[error("a subsequence with the id {0} already exists")]
    SubsequenceExists(String),

    /// Unknown subsequence id
    #[error("the subsequence with the id {0} does not exist")]
    SubsequenceNotFound(String),

    /// A subsequence needs at least one asset
    #[error("a subsequence with zero assets is not acceptable")]
    EmptySubsequence,

    /// Episode data was injected twice
    #[error("the core already has data for the episode")]
    EpisodeDataAlreadySet,

    /// Episode metadata failed to resolve
    #[error("episode data failed: {0}")]
    EpisodeDataFailed(String),
}

/// Convenience Result type using scena-core Error
pub type Result<T> = std::result::Result<T, Error>;
