//! Leaky bucket restart limiter
//!
//! The bucket fills with elapsed time up to its capacity. Every launch
//! takes `cost` out of it; when there is not enough, the caller sleeps for
//! the difference and the bucket is left empty. In steady state that is one
//! launch per `cost`, with bursts of up to `capacity / cost` launches after
//! a quiet period.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::BucketConfig;

/// Time source for the bucket
pub trait Clock {
    fn now(&self) -> Instant;
    /// Sleep for the whole of `duration`, resuming after interruptions.
    fn sleep(&self, duration: Duration);
}

/// The real clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
    fn sleep(&self, duration: Duration) {
        // std retries on EINTR with the remaining time
        thread::sleep(duration)
    }
}

#[derive(Debug)]
pub struct LeakyBucket<C: Clock = SystemClock> {
    clock: C,
    capacity: Duration,
    cost: Duration,
    level: Duration,
    last_refill: Instant,
}

impl LeakyBucket<SystemClock> {
    pub fn new(config: &BucketConfig) -> LeakyBucket<SystemClock> {
        LeakyBucket::with_clock(config, SystemClock)
    }
}

impl<C: Clock> LeakyBucket<C> {
    /// A bucket that starts full, so the first `capacity / cost` launches
    /// go through without delay.
    pub fn with_clock(config: &BucketConfig, clock: C) -> LeakyBucket<C> {
        let now = clock.now();
        LeakyBucket {
            clock: clock,
            capacity: config.capacity,
            cost: config.cost,
            level: config.capacity,
            last_refill: now,
        }
    }

    pub fn level(&self) -> Duration {
        self.level
    }

    /// Pay for one attempt, sleeping until there is enough credit.
    ///
    /// Returns how long the call slept.
    pub fn acquire(&mut self) -> Duration {
        let elapsed = self.clock.now().saturating_duration_since(self.last_refill);
        self.level = (self.level + elapsed).min(self.capacity);

        let slept = if self.level >= self.cost {
            self.level -= self.cost;
            Duration::ZERO
        } else {
            let wait = self.cost - self.level;
            self.clock.sleep(wait);
            self.level = Duration::ZERO;
            wait
        };
        self.last_refill = self.clock.now();
        slept
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    struct ManualClock {
        start: Instant,
        offset: Cell<Duration>,
        sleeps: RefCell<Vec<Duration>>,
    }

    impl ManualClock {
        fn new() -> ManualClock {
            ManualClock {
                start: Instant::now(),
                offset: Cell::new(Duration::ZERO),
                sleeps: RefCell::new(Vec::new()),
            }
        }
    }

    impl<'a> Clock for &'a ManualClock {
        fn now(&self) -> Instant {
            self.start + self.offset.get()
        }
        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
            self.advance(duration);
        }
    }

    impl ManualClock {
        fn advance(&self, by: Duration) {
            self.offset.set(self.offset.get() + by);
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn config(capacity: u64, cost: u64) -> BucketConfig {
        BucketConfig { capacity: secs(capacity), cost: secs(cost) }
    }

    #[test]
    fn burst_then_throttle() {
        let clock = ManualClock::new();
        let mut bucket = LeakyBucket::with_clock(&config(20, 10), &clock);
        assert_eq!(bucket.acquire(), Duration::ZERO);
        assert_eq!(bucket.acquire(), Duration::ZERO);
        assert_eq!(bucket.acquire(), secs(10));
        assert_eq!(bucket.acquire(), secs(10));
        assert_eq!(*clock.sleeps.borrow(), vec![secs(10), secs(10)]);
        assert_eq!(bucket.level(), Duration::ZERO);
    }

    #[test]
    fn credit_is_capped() {
        let clock = ManualClock::new();
        let mut bucket = LeakyBucket::with_clock(&config(20, 10), &clock);
        bucket.acquire();
        bucket.acquire();
        clock.advance(secs(3600));
        assert_eq!(bucket.acquire(), Duration::ZERO);
        assert_eq!(bucket.level(), secs(10));
        assert_eq!(bucket.acquire(), Duration::ZERO);
        assert_eq!(bucket.acquire(), secs(10));
    }

    #[test]
    fn partial_credit_shortens_the_wait() {
        let clock = ManualClock::new();
        let mut bucket = LeakyBucket::with_clock(&config(20, 10), &clock);
        bucket.acquire();
        bucket.acquire();
        clock.advance(secs(4));
        assert_eq!(bucket.acquire(), secs(6));
        assert_eq!(bucket.level(), Duration::ZERO);
    }

    #[test]
    fn spacing_never_exceeds_cost() {
        let clock = ManualClock::new();
        let mut bucket = LeakyBucket::with_clock(&config(20, 10), &clock);
        let mut last = (&clock).now();
        let mut exhausted = false;
        for i in 0..20 {
            // a child that lives a varying while before crashing
            clock.advance(Duration::from_millis(i * 700));
            let before = (&clock).now();
            let slept = bucket.acquire();
            assert!(slept <= secs(10));
            let now = (&clock).now();
            assert_eq!(now - before, slept);
            if exhausted {
                assert!(now - last >= secs(10));
            }
            exhausted = bucket.level() == Duration::ZERO;
            last = now;
        }
    }

    #[test]
    fn capacity_below_cost_always_waits() {
        let clock = ManualClock::new();
        let mut bucket = LeakyBucket::with_clock(&config(5, 10), &clock);
        assert_eq!(bucket.acquire(), secs(5));
        clock.advance(secs(60));
        assert_eq!(bucket.acquire(), secs(5));
    }
}
