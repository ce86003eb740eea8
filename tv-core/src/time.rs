//! Monotonic timestamps for frames and scheduler bookkeeping.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

pub const NSEC_PER_USEC: u64 = 1_000;
pub const NSEC_PER_MSEC: u64 = 1_000_000;
pub const USEC_PER_MSEC: u64 = 1_000;
pub const MSEC_PER_SEC: u64 = 1_000;

/// A point in monotonic time, relative to an unspecified process-wide epoch.
/// Two `Timestamp`s are only meaningfully comparable within the same
/// process; this is sufficient for the scheduler's "did the frame change"
/// and "how long did this cycle take" questions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Timestamp(Duration);

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

impl Timestamp {
    /// Capture the current monotonic time.
    pub fn now() -> Self {
        Timestamp(epoch().elapsed())
    }

    /// A timestamp of zero, before any real frame has been stamped. Useful
    /// as a sentinel that never compares equal to a `now()` value.
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    pub fn as_millis(&self) -> u64 {
        self.0.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_monotonic() {
        let a = Timestamp::now();
        std::thread::sleep(Duration::from_millis(1));
        let b = Timestamp::now();
        assert!(b >= a);
        assert!(b.duration_since(a) >= Duration::from_millis(1));
    }

    #[test]
    fn zero_precedes_now() {
        assert!(Timestamp::now() >= Timestamp::ZERO);
    }
}
