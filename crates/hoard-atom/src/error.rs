/// Errors from atom store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AtomError {
    /// The buffer for a new atom could not be reserved.
    #[error("out of memory interning {requested} bytes")]
    OutOfMemory { requested: usize },
}

/// Result alias for atom operations.
pub type AtomResult<T> = Result<T, AtomError>;
