//! Timestamps and pacing
//!
//! Rational presentation times plus the policy that maps them onto the wall
//! clock for real-time playback.

mod media_time;
mod pacer;

pub use media_time::MediaTime;
pub use pacer::{FramePacer, PaceDecision, PacingMode};
