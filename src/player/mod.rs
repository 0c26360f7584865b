//! Playback engine and its synchronization primitives

mod engine;
mod gate;
mod priority;
mod session;

pub use engine::{MoviePlayer, PlayerState};
pub use gate::ReadGate;
pub use priority::{elevate_read_loop_priority, PriorityGuard};
pub use session::PlaybackSession;
