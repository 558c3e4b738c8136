//! Fixed-window state for a single caller key.

use std::time::{Duration, Instant};

/// Longest window a limiter may use (ten years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Outcome of a successful consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumed {
    /// Points left in the current window after this consume
    pub remaining_points: u32,
    /// Milliseconds until the current window resets
    pub ms_before_next: u64,
}

/// Rejection returned when a key has exhausted its quota.
///
/// This is a "try again later" signal, not a failure of the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    /// Milliseconds until the window resets and the key may consume again
    pub ms_before_next: u64,
}

impl RateLimited {
    /// Whole seconds to wait before retrying, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        self.ms_before_next.div_ceil(1000)
    }
}

impl std::fmt::Display for RateLimited {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rate limited, retry in {}ms", self.ms_before_next)
    }
}

/// The stored state of one key within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    /// Points left in this window; never negative
    pub remaining_points: u32,
    /// When this window ends
    pub reset_time: Instant,
}

impl WindowEntry {
    /// Open a new window, charging the first point immediately.
    ///
    /// Windows longer than [`MAX_DURATION_SECS`] are shortened to it.
    pub fn start(points: u32, duration: Duration, now: Instant) -> Self {
        let duration = duration.min(Duration::from_secs(MAX_DURATION_SECS));
        let reset_time = now.checked_add(duration).unwrap_or(now);

        Self {
            remaining_points: points.saturating_sub(1),
            reset_time,
        }
    }

    /// Whether the window has ended at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_time
    }

    /// Time left in the window at `now`, zero once expired.
    pub fn time_until_reset(&self, now: Instant) -> Duration {
        self.reset_time.saturating_duration_since(now)
    }

    /// Charge one point against an unexpired window.
    ///
    /// The entry is left untouched when the quota is exhausted.
    pub fn take(&mut self, now: Instant) -> Result<Consumed, RateLimited> {
        let ms_before_next = duration_ms(self.time_until_reset(now));

        if self.remaining_points == 0 {
            return Err(RateLimited { ms_before_next });
        }

        self.remaining_points -= 1;
        Ok(Consumed {
            remaining_points: self.remaining_points,
            ms_before_next,
        })
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_charges_first_point() {
        let now = Instant::now();
        let entry = WindowEntry::start(3, Duration::from_secs(60), now);

        assert_eq!(entry.remaining_points, 2);
        assert_eq!(entry.reset_time, now + Duration::from_secs(60));
    }

    #[test]
    fn test_start_with_single_point_is_immediately_exhausted() {
        let now = Instant::now();
        let mut entry = WindowEntry::start(1, Duration::from_secs(10), now);

        assert_eq!(entry.remaining_points, 0);
        assert!(entry.take(now).is_err());
    }

    #[test]
    fn test_take_decrements_until_exhausted() {
        let now = Instant::now();
        let mut entry = WindowEntry::start(3, Duration::from_secs(60), now);

        assert_eq!(entry.take(now).unwrap().remaining_points, 1);
        assert_eq!(entry.take(now).unwrap().remaining_points, 0);

        let rejected = entry.take(now + Duration::from_secs(15)).unwrap_err();
        assert_eq!(rejected.ms_before_next, 45_000);
        assert_eq!(entry.remaining_points, 0);
    }

    #[test]
    fn test_start_with_huge_duration_is_clamped() {
        let now = Instant::now();
        let entry = WindowEntry::start(1, Duration::MAX, now);

        assert_eq!(entry.reset_time, now + Duration::from_secs(MAX_DURATION_SECS));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Instant::now();
        let entry = WindowEntry::start(5, Duration::from_secs(1), now);

        assert!(!entry.is_expired(now + Duration::from_millis(999)));
        assert!(entry.is_expired(now + Duration::from_secs(1)));
        assert_eq!(entry.time_until_reset(now + Duration::from_secs(2)), Duration::ZERO);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(RateLimited { ms_before_next: 1 }.retry_after_secs(), 1);
        assert_eq!(RateLimited { ms_before_next: 1000 }.retry_after_secs(), 1);
        assert_eq!(RateLimited { ms_before_next: 1001 }.retry_after_secs(), 2);
        assert_eq!(RateLimited { ms_before_next: 0 }.retry_after_secs(), 0);
    }
}
