//! FFmpeg-backed media source
//!
//! Demuxes and decodes a container through the `ffmpeg-next` crate: video
//! frames are scaled to tightly packed RGBA, audio is converted to
//! interleaved f32. Timestamps come straight from the stream time bases as
//! rational [`MediaTime`] values, so nothing is rounded through floats.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::timing::MediaTime;

use super::{
    AudioChunk, MediaSource, PixelBuffer, SampleBuffer, SourceError, SourceReader, SourceStatus,
    VideoFrame,
};

/// Decoded-but-unpulled audio is bounded so a run that never drains the
/// audio track cannot grow without limit.
const MAX_PENDING_AUDIO: usize = 256;

/// A container on disk, re-openable once per playback run.
pub struct FfmpegMediaSource {
    path: PathBuf,
    duration: MediaTime,
}

impl FfmpegMediaSource {
    /// Probe a media file. Fails when the container cannot be opened or has
    /// no video stream.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        ffmpeg_next::init().map_err(|e| SourceError::Open(e.to_string()))?;

        let path = path.as_ref().to_path_buf();
        let input = ffmpeg_next::format::input(&path)
            .map_err(|_| SourceError::Open(format!("cannot open {}", path.display())))?;
        input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| SourceError::Open(format!("no video stream in {}", path.display())))?;

        // Container duration is reported in AV_TIME_BASE ticks. Accuracy only
        // matters for progress reporting.
        let duration = if input.duration() > 0 {
            MediaTime::new(input.duration(), ffmpeg_next::ffi::AV_TIME_BASE as u32)
        } else {
            MediaTime::ZERO
        };

        Ok(Self { path, duration })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MediaSource for FfmpegMediaSource {
    fn duration(&self) -> MediaTime {
        self.duration
    }

    fn open(
        &mut self,
        start_offset: Option<MediaTime>,
    ) -> Result<Box<dyn SourceReader>, SourceError> {
        let reader = FfmpegReader::open(&self.path, start_offset)
            .map_err(|e| SourceError::Open(e.to_string()))?;
        Ok(Box::new(reader))
    }
}

struct AudioState {
    stream_index: usize,
    decoder: ffmpeg_next::decoder::Audio,
    resampler: ffmpeg_next::software::resampling::Context,
    time_base: ffmpeg_next::Rational,
    pending: VecDeque<AudioChunk>,
    eof: bool,
    eof_seen: bool,
}

struct FfmpegReader {
    input: ffmpeg_next::format::context::Input,
    video_stream_index: usize,
    video_decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    video_time_base: ffmpeg_next::Rational,
    width: u32,
    height: u32,
    audio: Option<AudioState>,
    start_cutoff: Option<MediaTime>,
    video_pending: VecDeque<VideoFrame>,
    input_eof: bool,
    video_eof: bool,
    video_eof_seen: bool,
    status: SourceStatus,
}

impl FfmpegReader {
    fn open(path: &Path, start_offset: Option<MediaTime>) -> Result<Self, ffmpeg_next::Error> {
        ffmpeg_next::init()?;
        let mut input = ffmpeg_next::format::input(&path)?;

        let video_stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or(ffmpeg_next::Error::StreamNotFound)?;
        let video_stream_index = video_stream.index();
        let video_time_base = video_stream.time_base();

        let context =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())?;
        let video_decoder = context.decoder().video()?;
        let width = video_decoder.width();
        let height = video_decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            video_decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGBA,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        let audio = match input.streams().best(ffmpeg_next::media::Type::Audio) {
            Some(stream) => {
                let stream_index = stream.index();
                let time_base = stream.time_base();
                let context =
                    ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
                let decoder = context.decoder().audio()?;
                let resampler = ffmpeg_next::software::resampling::Context::get(
                    decoder.format(),
                    decoder.channel_layout(),
                    decoder.rate(),
                    ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Packed),
                    decoder.channel_layout(),
                    decoder.rate(),
                )?;
                Some(AudioState {
                    stream_index,
                    decoder,
                    resampler,
                    time_base,
                    pending: VecDeque::new(),
                    eof: false,
                    eof_seen: false,
                })
            }
            None => None,
        };

        if let Some(offset) = start_offset {
            let micros = (offset.as_nanos() / 1_000) as i64;
            input.seek(micros, ..micros)?;
        }

        tracing::info!(
            "opened media source: {}x{}, audio: {}, start offset: {}",
            width,
            height,
            audio.is_some(),
            start_offset.map_or_else(|| "none".to_string(), |t| t.to_string()),
        );

        Ok(Self {
            input,
            video_stream_index,
            video_decoder,
            scaler,
            video_time_base,
            width,
            height,
            audio,
            start_cutoff: start_offset,
            video_pending: VecDeque::new(),
            input_eof: false,
            video_eof: false,
            video_eof_seen: false,
            status: SourceStatus::Reading,
        })
    }

    fn media_time(pts: i64, time_base: ffmpeg_next::Rational) -> MediaTime {
        MediaTime::new(
            pts * time_base.numerator() as i64,
            time_base.denominator() as u32,
        )
    }

    fn before_cutoff(&self, pts: MediaTime) -> bool {
        self.start_cutoff.map(|cutoff| pts < cutoff).unwrap_or(false)
    }

    /// Feed one packet to its decoder, or flush both decoders once the
    /// container is exhausted. Returns false when no packet was available.
    fn pump_packets_once(&mut self) -> Result<bool, ffmpeg_next::Error> {
        if self.input_eof {
            return Ok(false);
        }

        let mut fed_video = false;
        let mut fed_audio = false;
        let mut reached_end = false;
        match self.input.packets().next() {
            Some((stream, packet)) => {
                if stream.index() == self.video_stream_index {
                    self.video_decoder.send_packet(&packet)?;
                    fed_video = true;
                } else if self
                    .audio
                    .as_ref()
                    .is_some_and(|audio| audio.stream_index == stream.index())
                {
                    if let Some(audio) = &mut self.audio {
                        audio.decoder.send_packet(&packet)?;
                    }
                    fed_audio = true;
                }
            }
            None => reached_end = true,
        }

        if reached_end {
            self.input_eof = true;
            self.video_decoder.send_eof()?;
            self.drain_video()?;
            if let Some(audio) = &mut self.audio {
                audio.decoder.send_eof()?;
            }
            self.drain_audio()?;
            return Ok(false);
        }
        if fed_video {
            self.drain_video()?;
        }
        if fed_audio {
            self.drain_audio()?;
        }
        Ok(true)
    }

    fn drain_video(&mut self) -> Result<(), ffmpeg_next::Error> {
        let mut decoded = ffmpeg_next::frame::Video::empty();
        loop {
            match self.video_decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let pts = Self::media_time(decoded.pts().unwrap_or(0), self.video_time_base);
                    if self.before_cutoff(pts) {
                        continue;
                    }

                    // The stream's pixel format can change mid-file; rebuild
                    // the scaler when it does.
                    if decoded.format() != self.scaler.input().format {
                        self.scaler = ffmpeg_next::software::scaling::Context::get(
                            decoded.format(),
                            self.width,
                            self.height,
                            ffmpeg_next::format::Pixel::RGBA,
                            self.width,
                            self.height,
                            ffmpeg_next::software::scaling::Flags::BILINEAR,
                        )?;
                    }

                    let mut rgba = ffmpeg_next::frame::Video::empty();
                    self.scaler.run(&decoded, &mut rgba)?;

                    let data = rgba.data(0);
                    let stride = rgba.stride(0);
                    let row_bytes = (self.width as usize) * 4;
                    let expected = PixelBuffer::expected_size(self.width, self.height);
                    let pixels = if stride == row_bytes {
                        data[..expected].to_vec()
                    } else {
                        let mut packed = Vec::with_capacity(expected);
                        for row in 0..self.height as usize {
                            let start = row * stride;
                            packed.extend_from_slice(&data[start..start + row_bytes]);
                        }
                        packed
                    };

                    self.video_pending.push_back(VideoFrame {
                        pixels: Arc::new(PixelBuffer::new(pixels, self.width, self.height)),
                        pts,
                    });
                }
                Err(ffmpeg_next::Error::Other {
                    errno: ffmpeg_next::error::EAGAIN,
                }) => return Ok(()),
                Err(ffmpeg_next::Error::Eof) => {
                    self.video_eof = true;
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn drain_audio(&mut self) -> Result<(), ffmpeg_next::Error> {
        let Some(audio) = &mut self.audio else {
            return Ok(());
        };
        let start_cutoff = self.start_cutoff;

        let mut decoded = ffmpeg_next::frame::Audio::empty();
        loop {
            match audio.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let pts = Self::media_time(decoded.pts().unwrap_or(0), audio.time_base);
                    if start_cutoff.map(|cutoff| pts < cutoff).unwrap_or(false) {
                        continue;
                    }

                    let mut converted = ffmpeg_next::frame::Audio::empty();
                    audio.resampler.run(&decoded, &mut converted)?;

                    let channels = converted.channels() as usize;
                    let sample_count = converted.samples() * channels;
                    let bytes = converted.data(0);
                    let mut samples = Vec::with_capacity(sample_count);
                    for chunk in bytes.chunks_exact(4).take(sample_count) {
                        samples.push(f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
                    }

                    audio.pending.push_back(AudioChunk {
                        samples: Arc::new(SampleBuffer::new(
                            samples,
                            converted.rate(),
                            channels as u32,
                        )),
                        pts,
                    });
                    if audio.pending.len() > MAX_PENDING_AUDIO {
                        audio.pending.pop_front();
                    }
                }
                Err(ffmpeg_next::Error::Other {
                    errno: ffmpeg_next::error::EAGAIN,
                }) => return Ok(()),
                Err(ffmpeg_next::Error::Eof) => {
                    audio.eof = true;
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn note_track_drained(&mut self) {
        let audio_drained = self
            .audio
            .as_ref()
            .map(|audio| audio.eof_seen)
            .unwrap_or(true);
        if self.status == SourceStatus::Reading && self.video_eof_seen && audio_drained {
            self.status = SourceStatus::Completed;
        }
    }

    fn fail(&mut self, err: ffmpeg_next::Error) {
        tracing::error!("media source read failed: {err}");
        self.status = SourceStatus::Failed;
    }
}

impl SourceReader for FfmpegReader {
    fn status(&self) -> SourceStatus {
        self.status
    }

    fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    fn pull_video(&mut self) -> Option<VideoFrame> {
        if self.status != SourceStatus::Reading {
            return None;
        }
        loop {
            if let Some(frame) = self.video_pending.pop_front() {
                return Some(frame);
            }
            if self.video_eof {
                self.video_eof_seen = true;
                self.note_track_drained();
                return None;
            }
            match self.pump_packets_once() {
                Ok(_) => continue,
                Err(err) => {
                    self.fail(err);
                    return None;
                }
            }
        }
    }

    fn pull_audio(&mut self) -> Option<AudioChunk> {
        if self.status != SourceStatus::Reading {
            return None;
        }
        loop {
            if let Some(chunk) = self.audio.as_mut()?.pending.pop_front() {
                return Some(chunk);
            }
            if self.audio.as_ref()?.eof {
                if let Some(audio) = &mut self.audio {
                    audio.eof_seen = true;
                }
                self.note_track_drained();
                return None;
            }
            match self.pump_packets_once() {
                Ok(_) => continue,
                Err(err) => {
                    self.fail(err);
                    return None;
                }
            }
        }
    }

    fn abort(&mut self) {
        if self.status == SourceStatus::Reading {
            self.status = SourceStatus::Cancelled;
        }
        self.video_pending.clear();
        if let Some(audio) = &mut self.audio {
            audio.pending.clear();
        }
    }
}
