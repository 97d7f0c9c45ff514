use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Poll `probe` until it yields a value or `timeout` expires.
///
/// `probe` returns `Ok(None)` while the device is not ready. Sleeps
/// `poll_interval` between attempts to avoid spinning the CPU. Errors from the
/// probe abort the wait immediately.
pub fn poll_until<T>(
    mut probe: impl FnMut() -> Result<Option<T>>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<T> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(v) = probe()? {
            return Ok(v);
        }
        if Instant::now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        std::thread::sleep(poll_interval);
    }
}

/// Time left until `deadline`, or `HwError::Timeout` once it has passed.
pub fn remaining(deadline: Instant) -> Result<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        Err(HwError::Timeout)
    } else {
        Ok(left)
    }
}
