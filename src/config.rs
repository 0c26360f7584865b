//! Player configuration

use serde::{Deserialize, Serialize};

/// Playback behavior, fixed per run.
///
/// Attaching a synchronized writer overrides `play_at_actual_speed` and
/// `loop_playback` for the run: the writer's backpressure paces reading and
/// the asset plays through exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlayerOptions {
    /// Restart from timestamp zero after the tracks run out.
    #[serde(default)]
    pub loop_playback: bool,
    /// Pace delivery against the wall clock instead of running unthrottled.
    /// Late frames are shed, never delivered behind schedule.
    #[serde(default)]
    pub play_at_actual_speed: bool,
    /// Ask the platform for elevated scheduling on the read-loop thread.
    /// Best-effort; ignored where unsupported.
    #[serde(default)]
    pub use_realtime_scheduling: bool,
}
