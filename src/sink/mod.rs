//! Downstream consumer boundaries
//!
//! The engine pushes processed frames and audio chunks into sinks and never
//! learns what happens after that (render, encode, discard). Sinks signal
//! backpressure through readiness; a synchronized writer additionally
//! publishes readiness transitions so the engine's gate can throttle reading.
//!
//! Lifetime contract: the engine holds non-owning handles conceptually. A
//! sink that is about to be torn down must first be detached from the engine
//! (cancel playback or clear the writer) so no delivery lands in a destroyed
//! consumer.

use std::sync::Arc;

use crate::pipeline::ProcessedFrame;
use crate::source::AudioChunk;
use crate::timing::MediaTime;

/// Consumer of processed video frames (render surface or encoder input).
pub trait FrameSink: Send {
    /// Whether the sink can take another frame right now.
    fn is_ready_for_more(&self) -> bool {
        true
    }

    /// Deliver one processed frame with its normalized timestamp.
    fn accept(&mut self, frame: ProcessedFrame, pts: MediaTime);

    /// No further frames will arrive. Fired at most once, on video-track EOF.
    fn mark_finished(&mut self);
}

/// Consumer of decoded audio (typically an encoder input).
pub trait SampleSink: Send {
    /// Whether the sink can take more samples right now. The read loop skips
    /// the audio track while this is false.
    fn is_ready_for_more(&self) -> bool {
        true
    }

    /// Deliver one audio chunk with its normalized timestamp.
    fn accept(&mut self, chunk: AudioChunk);

    /// No further samples will arrive. Fired at most once, on audio-track EOF.
    fn mark_finished(&mut self);
}

/// Callback invoked by a synchronized writer whenever either of its input
/// channels transitions readiness.
pub type ReadinessObserver = Arc<dyn Fn() + Send + Sync>;

/// A multi-track writer that paces the read loop through backpressure.
///
/// The writer exposes per-channel readiness and a single observer slot. The
/// engine subscribes on attach and unsubscribes on detach; the observer holds
/// only weak references back, so the writer's lifetime is never extended by
/// the subscription.
pub trait SynchronizedWriter: Send + Sync {
    /// Whether the writer's video input can accept more data.
    fn video_input_ready(&self) -> bool;

    /// Whether the writer's audio input can accept more data; `None` when the
    /// writer has no audio input at all.
    fn audio_input_ready(&self) -> Option<bool>;

    /// Install or clear the readiness observer. The writer must invoke the
    /// observer on every readiness transition of either channel.
    fn set_readiness_observer(&self, observer: Option<ReadinessObserver>);
}
