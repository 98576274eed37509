use hoard_atom::AtomError;
use hoard_types::TypeError;

/// Errors from cache engine operations.
///
/// Fetch failures are not errors: they are recorded on the object itself
/// (see `Object::abort`). These variants cover resource exhaustion, misuse
/// of the chunk locking protocol, and operations on dead objects.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A buffer reservation failed or chunk memory hit its hard limit.
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory { requested: usize },

    /// No room for another object even after reclaiming.
    #[error("cache full: {live} live objects (limit {limit})")]
    CacheFull { live: usize, limit: usize },

    /// Chunk index beyond the object's chunk array.
    #[error("chunk index {index} out of range ({count} chunks)")]
    ChunkIndexOutOfRange { index: usize, count: usize },

    /// The chunk has no buffer to lock.
    #[error("chunk {index} holds no data")]
    ChunkEvicted { index: usize },

    /// The chunk is pinned by an in-flight operation.
    #[error("chunk {index} is locked")]
    ChunkLocked { index: usize },

    /// Unlock without a matching lock.
    #[error("chunk {index} is not locked")]
    ChunkNotLocked { index: usize },

    /// The object has been aborted.
    #[error("object aborted with status {code}")]
    Aborted { code: u16 },

    /// The object has been superseded; no further fetch may target it.
    #[error("object has been superseded")]
    Superseded,

    /// The object was created without a fetch handler.
    #[error("object has no fetch handler")]
    NoFetcher,

    /// Data already held exceeds the declared length.
    #[error("inconsistent length: declared {declared}, already have {materialized}")]
    InconsistentLength { declared: usize, materialized: usize },

    /// A body range whose end does not fit in an offset.
    #[error("body range at {offset} + {len} bytes overflows")]
    RangeOverflow { offset: usize, len: usize },

    /// Invalid cache key material.
    #[error("invalid key: {0}")]
    Key(#[from] TypeError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Returns `true` for violations of the chunk locking protocol.
    pub fn is_lock_violation(&self) -> bool {
        matches!(
            self,
            Self::ChunkIndexOutOfRange { .. }
                | Self::ChunkEvicted { .. }
                | Self::ChunkLocked { .. }
                | Self::ChunkNotLocked { .. }
        )
    }

    /// Returns `true` if the failure was resource exhaustion.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}

impl From<AtomError> for CacheError {
    fn from(err: AtomError) -> Self {
        match err {
            AtomError::OutOfMemory { requested } => Self::OutOfMemory { requested },
        }
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
