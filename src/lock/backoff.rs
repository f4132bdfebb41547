use std::fmt;
use std::time::Duration;

/// When to make the next acquisition attempt after live contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Yield to the scheduler and retry on its next turn.
    NextTick,
    /// Retry once pending I/O has been serviced.
    NextIoBoundary,
    After(Duration),
}

/// Maps a retry index (0 for the first retry) to a [`Delay`].
pub trait BackoffPolicy: Send + Sync + fmt::Debug {
    fn delay(&self, attempt: u32) -> Delay;
}

const GROWTH_EXPONENT: f64 = 1.2945;

/// The first two retries are immediate, later ones wait `n^1.2945` ms capped
/// at `interval`.
///
/// With 128 retries and a 500 ms cap the whole curve spans about 30 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub interval: Duration,
}

impl ExponentialBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Delay {
        match attempt {
            0 => Delay::NextTick,
            1 => Delay::NextIoBoundary,
            n => {
                let micros = (f64::from(n).powf(GROWTH_EXPONENT) * 1000.0) as u64;
                Delay::After(Duration::from_micros(micros).min(self.interval))
            }
        }
    }
}
