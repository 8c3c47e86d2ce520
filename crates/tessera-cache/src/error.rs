/// Errors from cache operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The computation behind a pending slot went away without a value.
    #[error("pending computation was abandoned before settling")]
    Abandoned,
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
