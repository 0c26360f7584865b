//! Media source boundary
//!
//! The demux/decode library behind this boundary is a black box: it produces
//! decoded, timestamped units and reports a per-run status. The engine only
//! ever pulls. A source is re-openable: every read-loop run (including loop
//! restarts) opens a fresh reader, optionally at a start offset.

mod synthetic;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegMediaSource;
pub use synthetic::SyntheticSource;

use std::sync::Arc;

use thiserror::Error;

use crate::timing::MediaTime;

/// Errors crossing the source boundary.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The reader could not be constructed; the run does not start and no
    /// units are emitted.
    #[error("failed to open media source: {0}")]
    Open(String),
    /// The container reported a read failure mid-run.
    #[error("media source read failed: {0}")]
    Read(String),
}

/// Status reported by an open reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// Units may still be pulled.
    Reading,
    /// All tracks are exhausted.
    Completed,
    /// A terminal decode/demux failure occurred; no further units.
    Failed,
    /// `abort()` was called.
    Cancelled,
}

/// The two track kinds a container can carry here: at most one video track
/// and at most one optional audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Decoded video pixels ready for pipeline upload.
///
/// Tightly packed RGBA, 4 bytes per pixel.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PixelBuffer {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self { data, width, height }
    }

    /// Expected data size for the dimensions (width * height * 4).
    pub fn expected_size(width: u32, height: u32) -> usize {
        (width as usize) * (height as usize) * 4
    }

    /// Check that the pixel data has the correct size.
    pub fn is_valid(&self) -> bool {
        self.data.len() == Self::expected_size(self.width, self.height)
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        (self.width as usize) * 4
    }
}

/// Decoded audio samples, interleaved f32.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Duration covered by the buffered samples.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate * self.channels) as f32
    }
}

/// One decoded video frame with its presentation timestamp.
///
/// The payload is reference-counted and opaque to the engine; it is consumed
/// exactly once by a sink or released when the unit is dropped.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pixels: Arc<PixelBuffer>,
    pub pts: MediaTime,
}

/// One decoded audio chunk with its presentation timestamp.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Arc<SampleBuffer>,
    pub pts: MediaTime,
}

/// One decoded, timestamped piece of media.
#[derive(Debug, Clone)]
pub enum MediaUnit {
    Video(VideoFrame),
    Audio(AudioChunk),
}

impl MediaUnit {
    pub fn kind(&self) -> TrackKind {
        match self {
            MediaUnit::Video(_) => TrackKind::Video,
            MediaUnit::Audio(_) => TrackKind::Audio,
        }
    }

    pub fn pts(&self) -> MediaTime {
        match self {
            MediaUnit::Video(frame) => frame.pts,
            MediaUnit::Audio(chunk) => chunk.pts,
        }
    }
}

/// An open, single-run reader over a container's tracks.
///
/// Pulls are non-blocking with respect to pacing; whatever the decoder does
/// internally (I/O, CPU) is opaque cost. Within a track, pulled units arrive
/// in non-decreasing timestamp order. End of track is per track: `None` from
/// one pull method says nothing about the other track.
pub trait SourceReader: Send {
    /// Current run status. Reading continues only while this is `Reading`.
    fn status(&self) -> SourceStatus;

    /// Whether the container carries an audio track.
    fn has_audio(&self) -> bool;

    /// Pull the next video frame; `None` once the video track is exhausted.
    fn pull_video(&mut self) -> Option<VideoFrame>;

    /// Pull the next audio chunk; `None` once the audio track is exhausted.
    fn pull_audio(&mut self) -> Option<AudioChunk>;

    /// Stop reading and release decoder resources. Subsequent `status()`
    /// reports `Cancelled` unless the reader already ended.
    fn abort(&mut self);
}

/// A re-openable media asset.
pub trait MediaSource: Send {
    /// Total asset duration, used for progress reporting. Accuracy is not
    /// critical.
    fn duration(&self) -> MediaTime;

    /// Open a fresh reader, optionally starting mid-asset. Units with
    /// timestamps before the offset are not delivered.
    fn open(&mut self, start_offset: Option<MediaTime>)
        -> Result<Box<dyn SourceReader>, SourceError>;
}
