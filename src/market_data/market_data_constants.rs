/// Provider type identifiers for the built-in adapters
pub const PROVIDER_TYPE_SPARK_FEED: &str = "SPARK_FEED";
pub const PROVIDER_TYPE_MANUAL: &str = "MANUAL";

/// Default timeout applied to every outbound adapter call
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;

/// How long a requested symbol stays in the recently-requested set
pub const RECENT_REQUEST_WINDOW_SECS: i64 = 900;

/// Success-rate nudge applied per routing outcome
pub const SUCCESS_RATE_STEP: f64 = 0.1;
