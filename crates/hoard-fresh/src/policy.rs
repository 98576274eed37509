use serde::{Deserialize, Serialize};

const DAY: i64 = 24 * 60 * 60;

/// Knobs that shape freshness decisions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessPolicy {
    /// The cache is shared between users: `s-maxage` applies, `private`
    /// responses always revalidate, and `proxy-revalidate` is honoured.
    pub shared: bool,
    /// Upper bound, in seconds, on any explicit (origin-supplied) lifetime.
    pub max_expires_age: i64,
    /// Upper bound, in seconds, on any heuristic lifetime.
    pub max_age: i64,
    /// Fraction of (date - last-modified) used as heuristic lifetime.
    pub max_age_fraction: f64,
    /// Heuristic lifetime, in seconds, when no `Last-Modified` is known.
    pub max_no_modified_age: i64,
    /// Reuse responses carrying `Vary` without revalidating.
    pub mindlessly_cache_vary: bool,
    /// Always revalidate responses that set cookies.
    pub dont_cache_cookies: bool,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            shared: true,
            max_expires_age: 30 * DAY,
            max_age: 14 * DAY,
            max_age_fraction: 0.1,
            max_no_modified_age: 23 * 60,
            mindlessly_cache_vary: false,
            dont_cache_cookies: false,
        }
    }
}
