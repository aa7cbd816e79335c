//! Time-related utilities

use std::sync::OnceLock;
use std::time::Instant;

static MONOTONIC_BASE: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed since the first call in this process.
///
/// Never goes backwards, but two calls on different threads may return the
/// same value; consumers pairing records by timestamp must tolerate duplicates.
pub fn monotonic_nanos() -> u64 {
    let base = MONOTONIC_BASE.get_or_init(Instant::now);
    base.elapsed().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_never_decreases() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(b >= a);
    }
}
