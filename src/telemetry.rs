//! Telemetry metric name constants.
//!
//! Centralised metric names for the fetch gate. Consumers install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `astral_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `source`: where a fetch response came from: "cache", "network",
//!   "offline" or "passthrough"
//! - `status`: outcome of a cache write: "ok" or "error"
//! - `task`: label of a best-effort background task

/// Total fetch events resolved by the worker.
///
/// Labels: `source` ("cache" | "network" | "offline" | "passthrough").
pub const FETCH_TOTAL: &str = "astral_fetch_total";

/// Total cache hits for intercepted GET requests.
pub const CACHE_HITS_TOTAL: &str = "astral_cache_hits_total";

/// Total cache misses for intercepted GET requests.
pub const CACHE_MISSES_TOTAL: &str = "astral_cache_misses_total";

/// Total cache writes attempted after a successful network response.
///
/// Labels: `status` ("ok" | "error").
pub const CACHE_WRITES_TOTAL: &str = "astral_cache_writes_total";

/// Total network fetches that failed (rejected, not non-ok status).
pub const NETWORK_FAILURES_TOTAL: &str = "astral_network_failures_total";

/// Total best-effort background tasks that ended in an error.
///
/// Labels: `task`.
pub const BACKGROUND_FAILURES_TOTAL: &str = "astral_background_failures_total";
