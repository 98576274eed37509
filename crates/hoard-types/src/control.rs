//! Cache-Control directives (RFC 2616 §14.9).
//!
//! The same [`CacheControl`] value describes both the policy stored with a
//! response and the overrides carried by a request.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitset of Cache-Control directives and cache-relevant header markers.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Directives(u16);

impl Directives {
    /// Internal marker: behaves like `no-cache` but is never forwarded.
    pub const NO_HIDDEN: Self = Self(1);
    /// `no-cache`
    pub const NO_CACHE: Self = Self(1 << 1);
    /// `public`
    pub const PUBLIC: Self = Self(1 << 2);
    /// `private`
    pub const PRIVATE: Self = Self(1 << 3);
    /// `no-store`
    pub const NO_STORE: Self = Self(1 << 4);
    /// `no-transform`
    pub const NO_TRANSFORM: Self = Self(1 << 5);
    /// `must-revalidate`
    pub const MUST_REVALIDATE: Self = Self(1 << 6);
    /// `proxy-revalidate`
    pub const PROXY_REVALIDATE: Self = Self(1 << 7);
    /// `only-if-cached`
    pub const ONLY_IF_CACHED: Self = Self(1 << 8);
    /// The response carried a `Vary` header.
    pub const VARY: Self = Self(1 << 9);
    /// The request carried an `Authorization` header.
    pub const AUTHORIZATION: Self = Self(1 << 10);
    /// The response set a cookie.
    pub const COOKIE: Self = Self(1 << 11);
    /// Never combine this response with another instance of the resource.
    pub const MISMATCH: Self = Self(1 << 12);

    const NAMES: [(Self, &'static str); 13] = [
        (Self::NO_HIDDEN, "no-hidden"),
        (Self::NO_CACHE, "no-cache"),
        (Self::PUBLIC, "public"),
        (Self::PRIVATE, "private"),
        (Self::NO_STORE, "no-store"),
        (Self::NO_TRANSFORM, "no-transform"),
        (Self::MUST_REVALIDATE, "must-revalidate"),
        (Self::PROXY_REVALIDATE, "proxy-revalidate"),
        (Self::ONLY_IF_CACHED, "only-if-cached"),
        (Self::VARY, "vary"),
        (Self::AUTHORIZATION, "authorization"),
        (Self::COOKIE, "cookie"),
        (Self::MISMATCH, "mismatch"),
    ];

    const ALL_BITS: u16 = (1 << 13) - 1;

    /// No directives.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits, dropping unknown ones.
    pub const fn from_bits_truncate(bits: u16) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// Raw bit representation.
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Returns `true` if every directive in `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any directive in `other` is set.
    pub const fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for Directives {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Directives {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Debug for Directives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Directives({self})")
    }
}

impl fmt::Display for Directives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Directive flags plus the numeric Cache-Control parameters, in seconds.
///
/// `None` means "absent". For `max_stale`, `Some(i64::MAX)` represents a bare
/// `max-stale` without a value (any staleness accepted).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub flags: Directives,
    pub max_age: Option<i64>,
    pub s_maxage: Option<i64>,
    pub min_fresh: Option<i64>,
    pub max_stale: Option<i64>,
}

impl CacheControl {
    /// The empty override: no directives, no numeric parameters.
    pub const fn none() -> Self {
        Self {
            flags: Directives::empty(),
            max_age: None,
            s_maxage: None,
            min_fresh: None,
            max_stale: None,
        }
    }

    /// Only the given directive flags.
    pub const fn with_flags(flags: Directives) -> Self {
        Self {
            flags,
            ..Self::none()
        }
    }

    pub fn max_age(mut self, secs: i64) -> Self {
        self.max_age = Some(secs);
        self
    }

    pub fn s_maxage(mut self, secs: i64) -> Self {
        self.s_maxage = Some(secs);
        self
    }

    pub fn min_fresh(mut self, secs: i64) -> Self {
        self.min_fresh = Some(secs);
        self
    }

    pub fn max_stale(mut self, secs: i64) -> Self {
        self.max_stale = Some(secs);
        self
    }

    /// Returns `true` if any directive in `flags` is set.
    pub fn has(&self, flags: Directives) -> bool {
        self.flags.intersects(flags)
    }
}
