//! Wall clock and the channel's coarse, strictly increasing timestamps.

/// Millisecond wall clock.
pub trait Clock: Send {
    /// Unix time in milliseconds.
    fn now_millis(&self) -> i64;
}

/// [`Clock`] backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Granularity timestamps are floored to.
pub const TIMESTAMP_GRANULARITY_MS: i64 = 100;

/// Issues timestamps floored to [`TIMESTAMP_GRANULARITY_MS`] and forced
/// strictly above the previous one.
#[derive(Debug, Default)]
pub struct Timestamper {
    last: Option<i64>,
}

impl Timestamper {
    /// Timestamper that has not issued a stamp yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp for `now_millis`: floored to the granularity, and always past the previous stamp.
    pub fn next(&mut self, now_millis: i64) -> i64 {
        let coarse = now_millis - now_millis.rem_euclid(TIMESTAMP_GRANULARITY_MS);
        let stamp = match self.last {
            Some(last) if coarse <= last => last + 1,
            _ => coarse,
        };
        self.last = Some(stamp);
        stamp
    }
}
