//! Frame pacing policies
//!
//! Decides, unit by unit, whether the read loop should emit immediately,
//! block until a unit's presentation instant, or drop the unit to stay on
//! schedule.

use std::thread;
use std::time::{Duration, Instant};

use super::MediaTime;

/// Delivery pacing policy, selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacingMode {
    /// Emit every unit immediately. Used for offline re-encoding; delivery
    /// rate is bounded only by downstream processing.
    #[default]
    Unthrottled,
    /// Match emission to a wall clock anchored at the first emitted unit.
    /// Late units are dropped rather than delivered behind schedule.
    RealTime,
    /// Pacing is delegated entirely to the synchronization gate; no
    /// wall-clock computation happens here.
    Synchronized,
}

/// Outcome of pacing one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceDecision {
    /// Deliver the unit now (any required wait has already elapsed).
    Emit,
    /// The unit is past due; discard it without advancing the anchor.
    Drop,
}

/// Per-session pacing state.
///
/// In real-time mode the first paced unit records the wall-clock anchor that
/// corresponds to normalized timestamp zero. The anchor is never moved
/// afterwards: a loop that falls behind sheds late units instead of letting
/// the whole timeline drift.
#[derive(Debug)]
pub struct FramePacer {
    mode: PacingMode,
    anchor: Option<Instant>,
}

impl FramePacer {
    pub fn new(mode: PacingMode) -> Self {
        Self { mode, anchor: None }
    }

    pub fn mode(&self) -> PacingMode {
        self.mode
    }

    /// Wall-clock instant of normalized timestamp zero, once the first unit
    /// has been paced in real-time mode.
    pub fn anchor(&self) -> Option<Instant> {
        self.anchor
    }

    /// Pace one unit with the given normalized timestamp.
    ///
    /// Blocks the calling loop until the unit's presentation instant in
    /// real-time mode; returns immediately in the other modes. Coarse
    /// `thread::sleep` granularity is sufficient here.
    pub fn pace(&mut self, pts: MediaTime) -> PaceDecision {
        if self.mode != PacingMode::RealTime {
            return PaceDecision::Emit;
        }

        let now = Instant::now();
        let anchor = *self.anchor.get_or_insert(now);

        let target_nanos = pts.as_nanos();
        let elapsed_nanos = now.duration_since(anchor).as_nanos() as i128;
        let delay_nanos = target_nanos - elapsed_nanos;

        if delay_nanos > 0 {
            thread::sleep(Duration::from_nanos(delay_nanos as u64));
            PaceDecision::Emit
        } else if delay_nanos == 0 {
            PaceDecision::Emit
        } else {
            // The loop was not given enough processing time for this unit.
            // Delivering it late would push every following unit off its
            // timeline, so it is shed instead.
            PaceDecision::Drop
        }
    }
}
