use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest key accepted by [`CacheKey::new`].
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// The kind of resource a cached object holds.
///
/// Two objects with identical key bytes but different types are distinct
/// cache entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    /// A resource fetched over the network (HTTP).
    Http,
    /// A resolved host name.
    Dns,
}

impl ObjectType {
    /// Numeric code used by collaborators that exchange type tags as integers.
    pub fn code(&self) -> i32 {
        match self {
            Self::Http => 1,
            Self::Dns => 2,
        }
    }

    /// Parse from a numeric code.
    pub fn from_code(code: i32) -> Result<Self, TypeError> {
        match code {
            1 => Ok(Self::Http),
            2 => Ok(Self::Dns),
            other => Err(TypeError::UnknownObjectType(other)),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Dns => write!(f, "dns"),
        }
    }
}

/// Canonical address of a cached object: a type tag plus opaque key bytes.
///
/// Key bytes carry an explicit length and may contain NUL or any other byte
/// value; nothing here assumes text.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    kind: ObjectType,
    bytes: Box<[u8]>,
}

impl CacheKey {
    /// Create a key, rejecting key material longer than [`MAX_KEY_LEN`].
    pub fn new(kind: ObjectType, bytes: impl AsRef<[u8]>) -> Result<Self, TypeError> {
        let bytes = bytes.as_ref();
        if bytes.len() > MAX_KEY_LEN {
            return Err(TypeError::KeyTooLong {
                len: bytes.len(),
                max: MAX_KEY_LEN,
            });
        }
        Ok(Self {
            kind,
            bytes: bytes.into(),
        })
    }

    /// Shorthand for an [`ObjectType::Http`] key.
    pub fn http(bytes: impl AsRef<[u8]>) -> Result<Self, TypeError> {
        Self::new(ObjectType::Http, bytes)
    }

    /// The resource type tag.
    pub fn kind(&self) -> ObjectType {
        self.kind
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for a zero-length key.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex-encoded key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Parse key bytes from a hex string.
    pub fn from_hex(kind: ObjectType, s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::new(kind, bytes)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({self})")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.bytes) {
            Ok(s) if !s.chars().any(char::is_control) => write!(f, "{}:{}", self.kind, s),
            _ => write!(f, "{}:0x{}", self.kind, self.to_hex()),
        }
    }
}
