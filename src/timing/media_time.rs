//! Rational media timestamps
//!
//! Presentation times are kept as an integer count of ticks over an integer
//! timescale so that long assets do not accumulate floating-point drift.
//! Conversion to wall-clock durations happens only at the pacing boundary.

use std::cmp::Ordering;
use std::ops::Sub;
use std::time::Duration;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// A rational presentation timestamp: `value / timescale` seconds.
///
/// Two timestamps with different timescales compare by their rational value,
/// so `1/1` equals `1000/1000`.
#[derive(Debug, Clone, Copy)]
pub struct MediaTime {
    value: i64,
    timescale: u32,
}

impl MediaTime {
    /// Timestamp zero.
    pub const ZERO: MediaTime = MediaTime {
        value: 0,
        timescale: 1,
    };

    /// Create a timestamp of `value` ticks at `timescale` ticks per second.
    ///
    /// A zero timescale is nonsensical and is clamped to 1.
    pub const fn new(value: i64, timescale: u32) -> Self {
        let timescale = if timescale == 0 { 1 } else { timescale };
        Self { value, timescale }
    }

    /// Create a timestamp from whole milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self::new(millis, 1_000)
    }

    /// Create a timestamp from seconds, rounded to the given timescale.
    pub fn from_seconds(seconds: f64, timescale: u32) -> Self {
        let timescale = timescale.max(1);
        Self {
            value: (seconds * timescale as f64).round() as i64,
            timescale,
        }
    }

    /// Tick count.
    pub const fn value(&self) -> i64 {
        self.value
    }

    /// Ticks per second.
    pub const fn timescale(&self) -> u32 {
        self.timescale
    }

    /// Timestamp as (possibly lossy) seconds. Used for progress reporting and
    /// logging, never for pacing arithmetic.
    pub fn as_seconds(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Timestamp as exact nanoseconds.
    pub fn as_nanos(&self) -> i128 {
        self.value as i128 * NANOS_PER_SEC / self.timescale as i128
    }

    /// Non-negative timestamp as a `Duration`; `None` when negative.
    pub fn to_duration(&self) -> Option<Duration> {
        let nanos = self.as_nanos();
        if nanos < 0 {
            return None;
        }
        Some(Duration::from_nanos(nanos as u64))
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    pub fn is_negative(&self) -> bool {
        self.value < 0
    }

    /// Difference in `self`'s timescale. The result can be negative, e.g. a
    /// pre-roll sample decoded before the requested start offset.
    pub fn delta(&self, earlier: MediaTime) -> MediaTime {
        let other_rescaled =
            earlier.value as i128 * self.timescale as i128 / earlier.timescale as i128;
        MediaTime {
            value: (self.value as i128 - other_rescaled) as i64,
            timescale: self.timescale,
        }
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        self.delta(rhs)
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.value as i128 * other.timescale as i128;
        let rhs = other.value as i128 * self.timescale as i128;
        lhs.cmp(&rhs)
    }
}

impl std::fmt::Display for MediaTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.as_seconds())
    }
}
