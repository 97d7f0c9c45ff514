//! Common time helpers for autopress_core.

use std::time::Duration;

/// Longest single sleep while waiting for a deadline, so a stop request is
/// noticed promptly even with long intervals.
pub const STOP_POLL: Duration = Duration::from_millis(10);

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
#[inline]
pub fn millis_u64(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_truncates_and_saturates() {
        assert_eq!(millis_u64(Duration::from_micros(20_999)), 20);
        assert_eq!(millis_u64(Duration::MAX), u64::MAX);
    }
}
