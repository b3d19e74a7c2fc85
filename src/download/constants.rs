//! Constants for the download module (rate limiting, transfer staging).

use std::time::Duration;

/// Warning threshold for cumulative rate limit delay per host (30 seconds).
pub const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Suffix of the staging file a body is streamed into before it is renamed
/// onto the destination.
pub const PART_FILE_SUFFIX: &str = ".part";
