use hoard_types::{CacheControl, Directives};

use crate::metadata::CacheMetadata;
use crate::policy::FreshnessPolicy;

/// Directives that rule out reuse without revalidation.
const NO_REUSE: Directives = Directives::NO_CACHE
    .union(Directives::NO_HIDDEN)
    .union(Directives::NO_STORE);

/// Result of a full freshness evaluation, in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Freshness {
    /// Effective freshness lifetime.
    pub lifetime: i64,
    /// Current age of the response.
    pub current_age: i64,
    /// Whether the response is stale under the request's overrides.
    pub stale: bool,
}

impl Freshness {
    /// Seconds of freshness left (negative once past the lifetime).
    pub fn remaining(&self) -> i64 {
        self.lifetime.saturating_sub(self.current_age)
    }
}

/// The tighter of a stored and a requested limit.
fn tighten(stored: Option<i64>, requested: Option<i64>) -> Option<i64> {
    match (stored, requested) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

impl FreshnessPolicy {
    /// Effective freshness lifetime of `meta` under `request`.
    ///
    /// `s-maxage` wins in a shared cache, then `max-age`, then
    /// `Expires - Date`; request values only tighten stored ones. Without any
    /// of those the lifetime is a fraction of the time since `Last-Modified`,
    /// or `max_no_modified_age`. Explicit lifetimes are capped by
    /// `max_expires_age`, heuristic ones by `max_age`.
    pub fn lifetime(&self, meta: &CacheMetadata, request: &CacheControl, now: i64) -> i64 {
        let max_age = tighten(meta.control.max_age, request.max_age);
        let s_maxage = tighten(meta.control.s_maxage, request.s_maxage);
        let date = meta.date.unwrap_or(now);

        let explicit = match (self.shared, s_maxage, max_age, meta.expires) {
            (true, Some(s), _, _) => Some(s),
            (_, _, Some(m), _) => Some(m),
            (_, _, None, Some(expires)) => Some(expires.saturating_sub(date)),
            _ => None,
        };
        if let Some(lifetime) = explicit {
            return lifetime.min(self.max_expires_age);
        }

        let heuristic = match meta.last_modified {
            Some(lm) => {
                let since = date.saturating_sub(lm).max(0);
                (since as f64 * self.max_age_fraction) as i64
            }
            None => self.max_no_modified_age,
        };
        heuristic.min(self.max_age)
    }

    /// Current age: time elapsed since `Date` (never negative) plus the
    /// upstream `Age`.
    pub fn current_age(&self, meta: &CacheMetadata, now: i64) -> i64 {
        let elapsed = meta
            .date
            .map(|date| now.saturating_sub(date).max(0))
            .unwrap_or(0);
        elapsed.saturating_add(meta.age.unwrap_or(0).max(0))
    }

    /// Evaluate lifetime, age and staleness together.
    pub fn evaluate(&self, meta: &CacheMetadata, request: &CacheControl, now: i64) -> Freshness {
        let lifetime = self.lifetime(meta, request, now);
        let current_age = self.current_age(meta, now);
        let flags = meta.control.flags | request.flags;

        let stale = if flags.intersects(NO_REUSE) {
            true
        } else {
            let strict = flags.contains(Directives::MUST_REVALIDATE)
                || (self.shared && flags.contains(Directives::PROXY_REVALIDATE));
            let mut limit = lifetime;
            if let Some(min_fresh) = request.min_fresh {
                limit = limit.saturating_sub(min_fresh.max(0));
            } else if let (false, Some(max_stale)) = (strict, request.max_stale) {
                limit = limit.saturating_add(max_stale.max(0));
            }
            current_age > limit
        };

        Freshness {
            lifetime,
            current_age,
            stale,
        }
    }

    /// Returns `true` if the response may no longer be served as-is.
    ///
    /// `no-cache`, `no-store` and the internal no-hidden marker force
    /// staleness at any age. `must-revalidate` (and `proxy-revalidate` in a
    /// shared cache) forbid the request from relaxing freshness with
    /// `max-stale`; `min-fresh` always tightens it. `only-if-cached` has no
    /// bearing on staleness.
    pub fn is_stale(&self, meta: &CacheMetadata, request: &CacheControl, now: i64) -> bool {
        self.evaluate(meta, request, now).stale
    }

    /// Returns `true` if the response must be revalidated with the origin
    /// before reuse.
    ///
    /// With `meta == None` only the request's own directives are considered.
    pub fn must_revalidate(
        &self,
        meta: Option<&CacheMetadata>,
        request: &CacheControl,
        now: i64,
    ) -> bool {
        let flags = match meta {
            Some(meta) => meta.control.flags | request.flags,
            None => request.flags,
        };

        if flags.intersects(NO_REUSE | Directives::MISMATCH) {
            return true;
        }
        if self.shared && flags.contains(Directives::PRIVATE) {
            return true;
        }
        if !self.mindlessly_cache_vary && flags.contains(Directives::VARY) {
            return true;
        }
        if self.dont_cache_cookies && flags.contains(Directives::COOKIE) {
            return true;
        }

        let Some(meta) = meta else {
            return false;
        };

        // RFC 2616 §14.8: authorized responses are reusable by a shared cache
        // only when the origin explicitly allowed it.
        if self.shared
            && flags.contains(Directives::AUTHORIZATION)
            && !flags.intersects(Directives::PUBLIC | Directives::MUST_REVALIDATE)
            && meta.control.s_maxage.is_none()
        {
            return true;
        }

        self.is_stale(meta, request, now)
    }
}
