use thiserror::Error;

/// Failures produced by the backing stores (record store, object store).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (e.g. a duplicate like).
    #[error("conflict with an existing record")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("io: {0}")]
    Io(String),
}

/// What the mutation engine hands to `on_error` and returns to the caller
/// after a failed authoritative operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mutation failed: {source}")]
pub struct MutationError {
    #[from]
    pub source: StoreError,
}

/// Rejected before any network call; no state is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("comment cannot be empty")]
    EmptyComment,
    #[error("comment is too long ({len} > {max} characters)")]
    CommentTooLong { len: usize, max: usize },
    #[error("sign in required")]
    SignedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
