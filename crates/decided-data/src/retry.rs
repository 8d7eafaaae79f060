use std::time::Duration;

use crate::DataResult;

/// Bounded exponential backoff around a closure that may fail transiently
/// (serialization failure, deadlock, pool exhaustion) — spec §4.1's store
/// retry helper. Non-transient errors return immediately.
pub fn retry_transient<T>(max_attempts: u32, mut f: impl FnMut() -> DataResult<T>) -> DataResult<T> {
    let mut attempt = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                let backoff = Duration::from_millis(20 * 2u64.pow(attempt));
                tracing::warn!(attempt, ?backoff, error = %err, "retrying transient store error");
                std::thread::sleep(backoff);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
