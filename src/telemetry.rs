//! Telemetry metric name constants.
//!
//! Centralised metric names for fanart operations. Deployments install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `fanart_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `kind`: what was looked up: "response" (upstream HTTP) or "fanart"
//! - `status`: upstream outcome: an HTTP status code or "error"
//! - `outcome`: resolution result: "confirmed", "best_effort", "pending",
//!   "not_found" or "error"

/// Total cache hits.
///
/// Labels: `kind`.
pub const CACHE_HITS_TOTAL: &str = "fanart_cache_hits_total";

/// Total cache misses.
///
/// Labels: `kind`.
pub const CACHE_MISSES_TOTAL: &str = "fanart_cache_misses_total";

/// Total upstream requests actually sent on the network.
///
/// Labels: `status`.
pub const UPSTREAM_REQUESTS_TOTAL: &str = "fanart_upstream_requests_total";

/// Total requests that joined an already in-flight upstream fetch instead of
/// sending their own.
pub const COALESCED_REQUESTS_TOTAL: &str = "fanart_coalesced_requests_total";

/// Total resolutions by outcome.
///
/// Labels: `outcome`.
pub const RESOLUTIONS_TOTAL: &str = "fanart_resolutions_total";
