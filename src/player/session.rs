//! Per-run playback state
//!
//! One session spans a single pass over the asset. Loop restarts and resumes
//! build a fresh session; diagnostics are logged when the session ends.

use std::time::Duration;

use crate::pipeline::ProcessedFrame;
use crate::timing::MediaTime;

#[derive(Debug)]
pub struct PlaybackSession {
    /// Resolved start timestamp for this run, when playback begins mid-asset.
    start_offset: Option<MediaTime>,
    /// Full asset duration (progress reporting only).
    duration: MediaTime,
    frames_emitted: u64,
    frames_dropped: u64,
    processing_time: Duration,
    /// The single in-flight processed frame. Released before a replacement is
    /// acquired so downstream image resources stay bounded to one frame.
    current_frame: Option<ProcessedFrame>,
}

impl PlaybackSession {
    pub fn new(start_offset: Option<MediaTime>, duration: MediaTime) -> Self {
        Self {
            start_offset,
            duration,
            frames_emitted: 0,
            frames_dropped: 0,
            processing_time: Duration::ZERO,
            current_frame: None,
        }
    }

    /// Rebase a raw track timestamp so the requested start reads as zero.
    pub fn normalize(&self, pts: MediaTime) -> MediaTime {
        match self.start_offset {
            Some(start) => pts - start,
            None => pts,
        }
    }

    /// Fraction of the asset played through, in [0, 1].
    pub fn progress_fraction(&self, normalized_pts: MediaTime) -> f64 {
        let total = match self.start_offset {
            Some(start) => self.duration - start,
            None => self.duration,
        };
        let total_secs = total.as_seconds();
        if total_secs <= 0.0 {
            return 0.0;
        }
        (normalized_pts.as_seconds() / total_secs).clamp(0.0, 1.0)
    }

    /// Drop the currently held processed frame, if any.
    pub fn release_current(&mut self) {
        self.current_frame = None;
    }

    pub fn note_emitted(&mut self, frame: ProcessedFrame, cost: Duration) {
        self.current_frame = Some(frame);
        self.frames_emitted += 1;
        self.processing_time += cost;
    }

    pub fn note_dropped(&mut self) {
        self.frames_dropped += 1;
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Log end-of-session diagnostics.
    pub fn report(&self) {
        let average_ms = if self.frames_emitted > 0 {
            self.processing_time.as_secs_f64() * 1_000.0 / self.frames_emitted as f64
        } else {
            0.0
        };
        tracing::debug!(
            frames_emitted = self.frames_emitted,
            frames_dropped = self.frames_dropped,
            average_frame_ms = format_args!("{average_ms:.2}"),
            "playback session ended"
        );
    }
}
