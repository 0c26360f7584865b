//! Synthetic in-memory media source
//!
//! Generates solid-shade frames and ramp audio at a fixed cadence, standing
//! in for a real container during tests, benchmarks and demos.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::timing::MediaTime;

use super::{
    AudioChunk, MediaSource, MediaUnit, PixelBuffer, SampleBuffer, SourceError, SourceReader,
    SourceStatus, VideoFrame,
};

const DEFAULT_WIDTH: u32 = 64;
const DEFAULT_HEIGHT: u32 = 36;

/// Counters shared between a [`SyntheticSource`] and its observers.
///
/// The source is usually moved into the engine; cloning the stats handle
/// first keeps the open/pull history observable from outside.
#[derive(Debug, Default)]
pub struct SourceStats {
    opens: AtomicU32,
    video_pulls: AtomicU32,
    audio_pulls: AtomicU32,
    last_start_offset: Mutex<Option<MediaTime>>,
}

impl SourceStats {
    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::Acquire)
    }

    pub fn video_pulls(&self) -> u32 {
        self.video_pulls.load(Ordering::Acquire)
    }

    pub fn audio_pulls(&self) -> u32 {
        self.audio_pulls.load(Ordering::Acquire)
    }

    pub fn last_start_offset(&self) -> Option<MediaTime> {
        *self.last_start_offset.lock().unwrap()
    }
}

/// A generated asset with one video track and an optional audio track.
#[derive(Debug)]
pub struct SyntheticSource {
    frame_count: u32,
    frame_interval: MediaTime,
    width: u32,
    height: u32,
    audio_chunk_count: u32,
    audio_chunk_interval: MediaTime,
    fail_after_video_frames: Option<u32>,
    stats: Arc<SourceStats>,
}

impl SyntheticSource {
    /// An asset of `frame_count` frames at `fps` frames per second.
    pub fn new(frame_count: u32, fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            frame_count,
            frame_interval: MediaTime::new(1, fps),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            audio_chunk_count: 0,
            audio_chunk_interval: MediaTime::from_millis(20),
            fail_after_video_frames: None,
            stats: Arc::new(SourceStats::default()),
        }
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Add an audio track of `chunk_count` chunks at `chunks_per_sec`.
    pub fn with_audio(mut self, chunk_count: u32, chunks_per_sec: u32) -> Self {
        self.audio_chunk_count = chunk_count;
        self.audio_chunk_interval = MediaTime::new(1, chunks_per_sec.max(1));
        self
    }

    /// Report a terminal read failure after `frames` video frames have been
    /// pulled successfully.
    pub fn fail_after_video_frames(mut self, frames: u32) -> Self {
        self.fail_after_video_frames = Some(frames);
        self
    }

    /// Shared open/pull counters for observing the source from outside.
    pub fn stats(&self) -> Arc<SourceStats> {
        Arc::clone(&self.stats)
    }

    fn frame_pts(&self, index: u32) -> MediaTime {
        MediaTime::new(
            self.frame_interval.value() * index as i64,
            self.frame_interval.timescale(),
        )
    }

    fn chunk_pts(&self, index: u32) -> MediaTime {
        MediaTime::new(
            self.audio_chunk_interval.value() * index as i64,
            self.audio_chunk_interval.timescale(),
        )
    }

    fn build_units(&self, start_offset: Option<MediaTime>) -> VecDeque<MediaUnit> {
        let cutoff = start_offset.unwrap_or(MediaTime::ZERO);
        let mut units: Vec<MediaUnit> = Vec::new();

        for index in 0..self.frame_count {
            let pts = self.frame_pts(index);
            if pts < cutoff {
                continue;
            }
            let shade = ((index as usize * 29) % 256) as u8;
            let data = vec![shade; PixelBuffer::expected_size(self.width, self.height)];
            units.push(MediaUnit::Video(VideoFrame {
                pixels: Arc::new(PixelBuffer::new(data, self.width, self.height)),
                pts,
            }));
        }

        for index in 0..self.audio_chunk_count {
            let pts = self.chunk_pts(index);
            if pts < cutoff {
                continue;
            }
            let samples: Vec<f32> = (0..960).map(|i| (i % 96) as f32 / 96.0 - 0.5).collect();
            units.push(MediaUnit::Audio(AudioChunk {
                samples: Arc::new(SampleBuffer::new(samples, 48_000, 2)),
                pts,
            }));
        }

        units.sort_by_key(|unit| unit.pts());
        units.into()
    }
}

impl MediaSource for SyntheticSource {
    fn duration(&self) -> MediaTime {
        self.frame_pts(self.frame_count)
    }

    fn open(
        &mut self,
        start_offset: Option<MediaTime>,
    ) -> Result<Box<dyn SourceReader>, SourceError> {
        self.stats.opens.fetch_add(1, Ordering::AcqRel);
        *self.stats.last_start_offset.lock().unwrap() = start_offset;

        Ok(Box::new(SyntheticReader {
            units: self.build_units(start_offset),
            has_audio: self.audio_chunk_count > 0,
            status: SourceStatus::Reading,
            video_eof_seen: false,
            audio_eof_seen: false,
            fail_after_video_frames: self.fail_after_video_frames,
            video_frames_pulled: 0,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct SyntheticReader {
    units: VecDeque<MediaUnit>,
    has_audio: bool,
    status: SourceStatus,
    video_eof_seen: bool,
    audio_eof_seen: bool,
    fail_after_video_frames: Option<u32>,
    video_frames_pulled: u32,
    stats: Arc<SourceStats>,
}

impl SyntheticReader {
    fn take_next(&mut self, want_video: bool) -> Option<MediaUnit> {
        let position = self.units.iter().position(|unit| {
            matches!(unit, MediaUnit::Video(_)) == want_video
        })?;
        self.units.remove(position)
    }

    fn note_track_drained(&mut self) {
        let audio_drained = self.audio_eof_seen || !self.has_audio;
        if self.status == SourceStatus::Reading && self.video_eof_seen && audio_drained {
            self.status = SourceStatus::Completed;
        }
    }
}

impl SourceReader for SyntheticReader {
    fn status(&self) -> SourceStatus {
        self.status
    }

    fn has_audio(&self) -> bool {
        self.has_audio
    }

    fn pull_video(&mut self) -> Option<VideoFrame> {
        if self.status != SourceStatus::Reading {
            return None;
        }
        match self.take_next(true) {
            Some(MediaUnit::Video(frame)) => {
                self.stats.video_pulls.fetch_add(1, Ordering::AcqRel);
                self.video_frames_pulled += 1;
                if self.fail_after_video_frames == Some(self.video_frames_pulled) {
                    self.status = SourceStatus::Failed;
                }
                Some(frame)
            }
            _ => {
                self.video_eof_seen = true;
                self.note_track_drained();
                None
            }
        }
    }

    fn pull_audio(&mut self) -> Option<AudioChunk> {
        if self.status != SourceStatus::Reading {
            return None;
        }
        match self.take_next(false) {
            Some(MediaUnit::Audio(chunk)) => {
                self.stats.audio_pulls.fetch_add(1, Ordering::AcqRel);
                Some(chunk)
            }
            _ => {
                self.audio_eof_seen = true;
                self.note_track_drained();
                None
            }
        }
    }

    fn abort(&mut self) {
        if self.status == SourceStatus::Reading {
            self.status = SourceStatus::Cancelled;
        }
        self.units.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_units_in_timestamp_order() {
        let mut source = SyntheticSource::new(5, 25);
        let mut reader = source.open(None).unwrap();

        let mut last = None;
        for _ in 0..5 {
            let frame = reader.pull_video().expect("frame");
            if let Some(previous) = last {
                assert!(frame.pts >= previous);
            }
            last = Some(frame.pts);
        }
        assert!(reader.pull_video().is_none());
        assert_eq!(reader.status(), SourceStatus::Completed);
    }

    #[test]
    fn test_tracks_exhaust_independently() {
        let mut source = SyntheticSource::new(2, 25).with_audio(4, 50);
        let mut reader = source.open(None).unwrap();
        assert!(reader.has_audio());

        assert!(reader.pull_video().is_some());
        assert!(reader.pull_video().is_some());
        assert!(reader.pull_video().is_none());
        // Video EOF alone does not end the run.
        assert_eq!(reader.status(), SourceStatus::Reading);

        for _ in 0..4 {
            assert!(reader.pull_audio().is_some());
        }
        assert!(reader.pull_audio().is_none());
        assert_eq!(reader.status(), SourceStatus::Completed);
    }

    #[test]
    fn test_start_offset_skips_earlier_units() {
        let mut source = SyntheticSource::new(10, 10); // one frame every 100ms
        let mut reader = source.open(Some(MediaTime::from_millis(450))).unwrap();

        let first = reader.pull_video().expect("frame");
        assert_eq!(first.pts, MediaTime::from_millis(500));
        assert_eq!(source.stats().last_start_offset(), Some(MediaTime::from_millis(450)));
    }

    #[test]
    fn test_failure_is_terminal_without_eof() {
        let mut source = SyntheticSource::new(10, 25).fail_after_video_frames(3);
        let mut reader = source.open(None).unwrap();

        for _ in 0..3 {
            assert!(reader.pull_video().is_some());
        }
        assert_eq!(reader.status(), SourceStatus::Failed);
        assert!(reader.pull_video().is_none());
        assert_eq!(reader.status(), SourceStatus::Failed);
    }

    #[test]
    fn test_abort_reports_cancelled() {
        let mut source = SyntheticSource::new(4, 25);
        let mut reader = source.open(None).unwrap();
        assert!(reader.pull_video().is_some());
        reader.abort();
        assert_eq!(reader.status(), SourceStatus::Cancelled);
        assert!(reader.pull_video().is_none());
    }

    #[test]
    fn test_open_counts_are_tracked() {
        let mut source = SyntheticSource::new(1, 25);
        let stats = source.stats();
        source.open(None).unwrap();
        source.open(None).unwrap();
        assert_eq!(stats.opens(), 2);
    }
}
