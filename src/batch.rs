//! Adaptive batch sizing for the reconciler
//!
//! The scheduler feeds each pass's response time back into an adjuster, which
//! grows the batch while the store keeps up and shrinks it when passes drag.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{KuryrError, Result};

/// Turns an observed response time into the next batch size.
pub trait BatchAdjuster: Send {
    fn adjust(&mut self, resp_time: Duration) -> usize;
}

/// Fixed-step adjuster: grow below the fast threshold, shrink above the slow
/// one, never adjust twice within the minimum interval.
pub struct FixedStepAdjuster {
    min_size: usize,
    max_size: usize,
    curr_size: usize,
    step: usize,

    last_adjust_millis: Option<u64>,
    min_adjust_interval: Duration,

    fast_threshold: Duration,
    slow_threshold: Duration,

    clock: Arc<dyn Clock>,
}

impl FixedStepAdjuster {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        init_size: usize,
        min_size: usize,
        max_size: usize,
        step: usize,
        min_adjust_interval: Duration,
        fast_threshold: Duration,
        slow_threshold: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            min_size,
            max_size,
            curr_size: init_size.clamp(min_size, max_size),
            step,
            last_adjust_millis: None,
            min_adjust_interval,
            fast_threshold,
            slow_threshold,
            clock,
        }
    }

    fn interval_elapsed(&self) -> bool {
        match self.last_adjust_millis {
            None => true,
            Some(last) => {
                self.clock.now_millis().saturating_sub(last)
                    >= self.min_adjust_interval.as_millis() as u64
            }
        }
    }
}

impl BatchAdjuster for FixedStepAdjuster {
    fn adjust(&mut self, resp_time: Duration) -> usize {
        if !self.interval_elapsed() {
            return self.curr_size;
        }

        if resp_time < self.fast_threshold {
            if self.curr_size < self.max_size {
                self.curr_size = (self.curr_size + self.step).min(self.max_size);
                self.last_adjust_millis = Some(self.clock.now_millis());
            }
        } else if resp_time > self.slow_threshold && self.curr_size > self.min_size {
            self.curr_size = self.curr_size.saturating_sub(self.step).max(self.min_size);
            self.last_adjust_millis = Some(self.clock.now_millis());
        }

        self.curr_size
    }
}

/// Fixed-size ring of recent durations with a running sum.
pub struct DurationRing {
    buf: Vec<Duration>,
    size: usize,
    count: usize,
    write_pos: usize,
    sum: Duration,
}

impl DurationRing {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(KuryrError::invalid_param("ring size must be greater than 0"));
        }
        Ok(Self { buf: vec![Duration::ZERO; size], size, count: 0, write_pos: 0, sum: Duration::ZERO })
    }

    pub fn add(&mut self, d: Duration) {
        if self.count == self.size {
            self.sum -= self.buf[self.write_pos];
        } else {
            self.count += 1;
        }
        self.buf[self.write_pos] = d;
        self.sum += d;
        self.write_pos = (self.write_pos + 1) % self.size;
    }

    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.sum / self.count as u32
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_full(&self) -> bool {
        self.count == self.size
    }
}

/// Sliding-window adjuster: compare each pass against the window average.
pub struct SlideWindowAdjuster {
    min_size: usize,
    max_size: usize,
    curr_size: usize,
    step: usize,

    last_adjust_millis: Option<u64>,
    min_adjust_interval: Duration,

    ring: DurationRing,
    clock: Arc<dyn Clock>,
}

impl SlideWindowAdjuster {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        window: usize,
        init_size: usize,
        min_size: usize,
        max_size: usize,
        step: usize,
        min_adjust_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            min_size,
            max_size,
            curr_size: init_size.clamp(min_size, max_size),
            step,
            last_adjust_millis: None,
            min_adjust_interval,
            ring: DurationRing::new(window)?,
            clock,
        })
    }

    fn interval_elapsed(&self) -> bool {
        match self.last_adjust_millis {
            None => true,
            Some(last) => {
                self.clock.now_millis().saturating_sub(last)
                    >= self.min_adjust_interval.as_millis() as u64
            }
        }
    }
}

impl BatchAdjuster for SlideWindowAdjuster {
    fn adjust(&mut self, resp_time: Duration) -> usize {
        self.ring.add(resp_time);

        // No adjustments until the window has filled.
        if !self.ring.is_full() {
            return self.curr_size;
        }
        if !self.interval_elapsed() {
            return self.curr_size;
        }

        let avg = self.ring.avg();
        if resp_time < avg {
            if self.curr_size < self.max_size {
                self.curr_size = (self.curr_size + self.step).min(self.max_size);
                self.last_adjust_millis = Some(self.clock.now_millis());
            }
        } else if resp_time > avg && self.curr_size > self.min_size {
            self.curr_size = self.curr_size.saturating_sub(self.step).max(self.min_size);
            self.last_adjust_millis = Some(self.clock.now_millis());
        }

        self.curr_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn fixed(clock: Arc<ManualClock>) -> FixedStepAdjuster {
        FixedStepAdjuster::new(
            100,
            10,
            200,
            20,
            Duration::from_secs(1),
            Duration::from_millis(50),
            Duration::from_millis(500),
            clock,
        )
    }

    #[test]
    fn fast_responses_grow_the_batch() {
        let clock = Arc::new(ManualClock::new(0));
        let mut adjuster = fixed(clock.clone());

        assert_eq!(adjuster.adjust(Duration::from_millis(10)), 120);
        clock.advance(1_000);
        assert_eq!(adjuster.adjust(Duration::from_millis(10)), 140);
    }

    #[test]
    fn slow_responses_shrink_the_batch() {
        let clock = Arc::new(ManualClock::new(0));
        let mut adjuster = fixed(clock.clone());

        assert_eq!(adjuster.adjust(Duration::from_secs(1)), 80);
        clock.advance(1_000);
        assert_eq!(adjuster.adjust(Duration::from_secs(1)), 60);
    }

    #[test]
    fn normal_responses_keep_the_size() {
        let clock = Arc::new(ManualClock::new(0));
        let mut adjuster = fixed(clock);
        assert_eq!(adjuster.adjust(Duration::from_millis(200)), 100);
    }

    #[test]
    fn adjustments_respect_the_minimum_interval() {
        let clock = Arc::new(ManualClock::new(0));
        let mut adjuster = fixed(clock.clone());

        assert_eq!(adjuster.adjust(Duration::from_millis(10)), 120);
        // Too soon: no further change.
        assert_eq!(adjuster.adjust(Duration::from_millis(10)), 120);
        clock.advance(999);
        assert_eq!(adjuster.adjust(Duration::from_millis(10)), 120);
        clock.advance(1);
        assert_eq!(adjuster.adjust(Duration::from_millis(10)), 140);
    }

    #[test]
    fn sizes_are_clamped_to_bounds() {
        let clock = Arc::new(ManualClock::new(0));
        let mut adjuster = FixedStepAdjuster::new(
            195,
            10,
            200,
            20,
            Duration::ZERO,
            Duration::from_millis(50),
            Duration::from_millis(500),
            clock.clone(),
        );
        assert_eq!(adjuster.adjust(Duration::from_millis(1)), 200);
        assert_eq!(adjuster.adjust(Duration::from_millis(1)), 200);

        let mut adjuster = FixedStepAdjuster::new(
            15,
            10,
            200,
            20,
            Duration::ZERO,
            Duration::from_millis(50),
            Duration::from_millis(500),
            clock,
        );
        assert_eq!(adjuster.adjust(Duration::from_secs(1)), 10);
        assert_eq!(adjuster.adjust(Duration::from_secs(1)), 10);
    }

    #[test]
    fn init_size_is_clamped_into_range() {
        let clock = Arc::new(ManualClock::new(0));
        let adjuster = FixedStepAdjuster::new(
            5,
            10,
            200,
            20,
            Duration::ZERO,
            Duration::from_millis(50),
            Duration::from_millis(500),
            clock,
        );
        assert_eq!(adjuster.curr_size, 10);
    }

    #[test]
    fn ring_keeps_a_running_average() {
        let mut ring = DurationRing::new(3).unwrap();
        assert_eq!(ring.avg(), Duration::ZERO);

        ring.add(Duration::from_millis(100));
        ring.add(Duration::from_millis(200));
        assert_eq!(ring.count(), 2);
        assert!(!ring.is_full());
        assert_eq!(ring.avg(), Duration::from_millis(150));

        ring.add(Duration::from_millis(300));
        assert!(ring.is_full());
        assert_eq!(ring.avg(), Duration::from_millis(200));

        // Oldest sample rolls off: (200 + 300 + 500) / 3.
        ring.add(Duration::from_millis(500));
        assert_eq!(ring.avg(), Duration::from_millis(1_000) / 3);
    }

    #[test]
    fn ring_rejects_zero_size() {
        assert!(DurationRing::new(0).is_err());
    }

    #[test]
    fn window_adjuster_waits_for_a_full_window() {
        let clock = Arc::new(ManualClock::new(0));
        let mut adjuster = SlideWindowAdjuster::new(
            3,
            100,
            10,
            200,
            20,
            Duration::ZERO,
            clock,
        )
        .unwrap();

        assert_eq!(adjuster.adjust(Duration::from_millis(100)), 100);
        assert_eq!(adjuster.adjust(Duration::from_millis(100)), 100);
        // Window full now; an under-average pass grows the batch.
        assert_eq!(adjuster.adjust(Duration::from_millis(10)), 120);
    }

    #[test]
    fn window_adjuster_shrinks_on_over_average_passes() {
        let clock = Arc::new(ManualClock::new(0));
        let mut adjuster = SlideWindowAdjuster::new(
            3,
            100,
            10,
            200,
            20,
            Duration::ZERO,
            clock,
        )
        .unwrap();

        adjuster.adjust(Duration::from_millis(100));
        adjuster.adjust(Duration::from_millis(100));
        assert_eq!(adjuster.adjust(Duration::from_millis(900)), 80);
    }
}
