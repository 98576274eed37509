use hoard_types::CacheControl;

/// Timing and policy metadata stored with a cached response.
///
/// Times are unix seconds; `None` means the corresponding header was absent.
/// `age` is the `Age` contribution already accumulated upstream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheMetadata {
    pub date: Option<i64>,
    pub age: Option<i64>,
    pub expires: Option<i64>,
    pub last_modified: Option<i64>,
    /// Stored directives plus `max-age`/`s-maxage`. `min_fresh` and
    /// `max_stale` are request-only and ignored here.
    pub control: CacheControl,
}

impl CacheMetadata {
    /// Returns `true` if the origin supplied an explicit lifetime.
    pub fn has_explicit_lifetime(&self) -> bool {
        self.expires.is_some() || self.control.max_age.is_some() || self.control.s_maxage.is_some()
    }
}
