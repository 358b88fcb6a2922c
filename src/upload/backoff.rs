//! Jittered exponential backoff between retry attempts

use std::time::Duration;

use rand::rngs::ThreadRng;
use rand::{Rng, RngCore};

/// Exponent ceiling so the upper bound always fits in a `Duration`
const MAX_EXPONENT: u32 = 62;

/// Chooses how long to wait before the next attempt
pub trait Backoff {
    /// `attempt` is the retry counter after the failure, starting at 1
    fn delay(&mut self, attempt: u32) -> Duration;
}

/// Blocks between attempts
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Uniform delay in `[0, 2^attempt)` seconds
#[derive(Debug, Clone)]
pub struct ExponentialJitter<R = ThreadRng> {
    rng: R,
}

impl ExponentialJitter<ThreadRng> {
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }
}

impl Default for ExponentialJitter<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore> ExponentialJitter<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Exclusive upper bound of the delay for `attempt`, in seconds
    pub fn upper_bound(attempt: u32) -> f64 {
        2f64.powi(attempt.min(MAX_EXPONENT) as i32)
    }
}

impl<R: RngCore> Backoff for ExponentialJitter<R> {
    fn delay(&mut self, attempt: u32) -> Duration {
        let bound = Duration::from_secs(1u64 << attempt.min(MAX_EXPONENT));
        let unit: f64 = self.rng.gen();
        let delay = Duration::from_secs_f64(unit * bound.as_secs_f64());
        // Rounding to whole nanoseconds can land on the bound itself
        delay.min(bound - Duration::from_nanos(1))
    }
}

/// Sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
