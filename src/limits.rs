//! Hard limits on inputs. Violations surface as `EngineError::LimitExceeded`
//! before any state is touched.

use crate::model::Ms;

const DAY_MS: Ms = 86_400_000;

/// Earliest accepted timestamp (Unix epoch).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// Latest accepted timestamp (2100-01-01T00:00:00Z).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Widest single interval: two years.
pub const MAX_SPAN_DURATION_MS: Ms = 2 * 366 * DAY_MS;

/// Widest availability query window: one year.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * DAY_MS;

/// Largest per-unit rate in minor currency units.
pub const MAX_RATE_MINOR_UNITS: i64 = 1_000_000_000;

pub const MAX_PROPERTIES: usize = 100_000;
pub const MAX_BLOCKS_PER_PROPERTY: usize = 4_096;
pub const MAX_BOOKINGS_PER_PROPERTY: usize = 65_536;
pub const MAX_REVIEWS_PER_PROPERTY: usize = 65_536;
pub const MAX_REPORTS_PER_REVIEW: usize = 64;

pub const MAX_REASON_LEN: usize = 512;
pub const MAX_COMMENT_LEN: usize = 4_096;
pub const MAX_RESPONSE_LEN: usize = 4_096;

/// Renters may cancel a confirmed booking only while `now` is at least this
/// far before the booking starts.
pub const CANCELLATION_WINDOW_MS: Ms = 48 * 3_600_000;
