// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

/// Exponential reconnect delay with jitter.
///
/// Each call to [`next_delay`](Self::next_delay) produces
/// `min(initial * multiplier^attempt, max)` jittered by a uniform factor
/// in [0.9, 1.1], clamped back into that band and never below 1 ms.
#[derive(Debug)]
pub struct BackoffCalculator {
    initial_delay_ms: u32,
    max_delay_ms: u32,
    multiplier: f64,
    attempt_count: u32,
    rng: StdRng,
    jitter: Uniform<f64>,
}

impl BackoffCalculator {
    #[must_use]
    pub fn new(initial_delay_ms: u32, max_delay_ms: u32, multiplier: f64) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
            attempt_count: 0,
            rng: StdRng::from_entropy(),
            jitter: Uniform::new_inclusive(0.9, 1.1),
        }
    }

    /// Produce the delay before the next reconnect attempt and advance the
    /// attempt counter.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    pub fn next_delay(&mut self) -> Duration {
        let mut base = f64::from(self.initial_delay_ms);
        if self.attempt_count > 0 {
            base *= self.multiplier.powi(self.attempt_count as i32);
        }
        base = base.min(f64::from(self.max_delay_ms));

        let jittered = self.apply_jitter(base);
        self.attempt_count += 1;

        Duration::from_millis(u64::from(jittered))
    }

    /// Zero the attempt counter.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    fn apply_jitter(&mut self, base_ms: f64) -> u32 {
        let factor = self.jitter.sample(&mut self.rng);
        let raw = (base_ms * factor).round() as u32;

        let min_ms = (base_ms * 0.9).floor() as u32;
        let max_ms = (base_ms * 1.1).ceil() as u32;
        raw.clamp(min_ms, max_ms).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_exponentially_within_jitter() {
        let mut calc = BackoffCalculator::new(100, 1000, 2.0);
        let expected_bases = [100u64, 200, 400, 800, 1000, 1000];
        for base in expected_bases {
            let delay = calc.next_delay().as_millis() as u64;
            let min = base * 9 / 10;
            let max = base * 11 / 10 + 1;
            assert!(
                (min..=max).contains(&delay),
                "delay {delay} out of [{min}, {max}] for base {base}"
            );
        }
    }

    #[test]
    fn test_reset_restarts_from_initial() {
        let mut calc = BackoffCalculator::new(100, 1000, 2.0);
        let _first = calc.next_delay();
        let _second = calc.next_delay();
        calc.reset();
        assert_eq!(calc.attempt_count(), 0);
        let delay = calc.next_delay().as_millis() as u64;
        assert!((90..=111).contains(&delay));
    }

    #[test]
    fn test_delay_never_zero() {
        let mut calc = BackoffCalculator::new(0, 0, 2.0);
        assert!(calc.next_delay() >= Duration::from_millis(1));
    }
}
