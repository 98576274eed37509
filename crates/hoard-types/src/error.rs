use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("cache key too long: {len} bytes (max {max})")]
    KeyTooLong { len: usize, max: usize },

    #[error("unknown object type code: {0}")]
    UnknownObjectType(i32),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),
}
