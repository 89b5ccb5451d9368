//! Per-writer monotonic timestamp source.
//!
//! Wall-clock readings can repeat or step backwards. The clock hands out
//! strictly increasing UTC instants so records from one writer sort in
//! the order they were emitted.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

#[derive(Debug)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.next_after(Utc::now())
    }

    fn next_after(&self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let next = match *last {
            Some(prev) if wall <= prev => prev + Duration::microseconds(1),
            _ => wall,
        };
        *last = Some(next);
        next
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_strictly_increase() {
        let clock = MonotonicClock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn backwards_wall_clock_is_absorbed() {
        let clock = MonotonicClock::new();
        let t0 = Utc::now();
        let a = clock.next_after(t0);
        let b = clock.next_after(t0 - Duration::seconds(5));
        let c = clock.next_after(t0);
        assert_eq!(a, t0);
        assert!(b > a);
        assert!(c > b);
    }
}
