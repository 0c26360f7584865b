//! Cadence Player
//!
//! A clock-paced media playback engine. It reads a container's video and
//! audio tracks on a dedicated background thread and delivers timed units to
//! downstream consumers (a render pipeline and/or an encoder) in one of
//! three delivery modes: unthrottled (offline re-encoding), real-time
//! (wall-clock matched, shedding late frames), or synchronized (throttled by
//! a downstream writer's backpressure).
//!
//! The decoder, the GPU conversion step and the consumers all live behind
//! trait boundaries; this crate owns the read/pace/dispatch/synchronize core
//! that drives them.

pub mod config;
pub mod pipeline;
pub mod player;
pub mod sink;
pub mod source;
pub mod telemetry;
pub mod timing;

pub use config::PlayerOptions;
pub use pipeline::{FramePipeline, PipelineError, ProcessedFrame, ProcessedImage, ProcessingContext};
pub use player::{MoviePlayer, PlayerState, ReadGate};
pub use sink::{FrameSink, ReadinessObserver, SampleSink, SynchronizedWriter};
pub use source::{
    AudioChunk, MediaSource, MediaUnit, PixelBuffer, SampleBuffer, SourceError, SourceReader,
    SourceStatus, SyntheticSource, TrackKind, VideoFrame,
};
pub use timing::{FramePacer, MediaTime, PaceDecision, PacingMode};
