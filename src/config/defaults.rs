//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery. Every value here is also the
//! serde default of the matching config field.

// ============================================================================
// Adaptive polling
// ============================================================================

/// Interval while an activity boost is running (ms).
pub const FAST_INTERVAL_MS: u64 = 1_000;

/// Interval during peak hours (ms).
pub const NORMAL_INTERVAL_MS: u64 = 5_000;

/// Interval outside peak hours (ms).
pub const SLOW_INTERVAL_MS: u64 = 12_000;

/// How long a signalled activity keeps the poller in fast mode (ms).
pub const ACTIVITY_BOOST_MS: u64 = 30_000;

/// Re-evaluation period that catches peak-hour transitions (seconds).
pub const RECHECK_INTERVAL_SECS: u64 = 60;

/// Default peak windows as `[start, end)` local hours.
pub const PEAK_HOURS: [(u8, u8); 2] = [(7, 9), (17, 19)];

// ============================================================================
// Poller
// ============================================================================

/// Fixed tick used when adaptive mode is off (ms).
pub const FALLBACK_POLL_INTERVAL_MS: u64 = 1_500;

/// Delay before the out-of-band fetch that follows `clear_latest_detection` (ms).
pub const CLEAR_REFETCH_DELAY_MS: u64 = 100;

// ============================================================================
// Backend client
// ============================================================================

/// Parking backend API root.
pub const BACKEND_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Per-request timeout for backend calls (seconds).
pub const BACKEND_REQUEST_TIMEOUT_SECS: u64 = 20;

// ============================================================================
// Operator API
// ============================================================================

/// Bind address of the local operator API.
pub const SERVER_ADDR: &str = "127.0.0.1:8090";
