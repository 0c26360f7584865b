//! Playback engine
//!
//! Owns the background read-loop thread and orchestrates the source reader,
//! the pacer and the gate. The loop interleaves video and audio reads,
//! readiness-driven, and pushes units into the attached sinks. Frame
//! processing happens synchronously on the serial processing context, so
//! GPU/encoder cost feeds straight back into the read rate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::PlayerOptions;
use crate::pipeline::{FramePipeline, ProcessingContext};
use crate::sink::{FrameSink, ReadinessObserver, SampleSink, SynchronizedWriter};
use crate::source::{AudioChunk, MediaSource, MediaUnit, SourceReader, SourceStatus, VideoFrame};
use crate::timing::{FramePacer, MediaTime, PaceDecision, PacingMode};

use super::gate::ReadGate;
use super::priority;
use super::session::PlaybackSession;

/// Pause between loop iterations that moved no data, so a stalled channel
/// does not spin the thread hot.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    /// No read loop exists.
    #[default]
    Idle,
    /// The read loop is delivering units.
    Running,
    /// The last run ended naturally (or on source failure).
    Finished,
    /// The last run was stopped by `cancel()`.
    Cancelled,
}

/// Why one pass over the asset ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Completed,
    Cancelled,
    Failed,
}

type ProgressFn = dyn Fn(f64) + Send + Sync;
type NotifyFn = dyn Fn() + Send + Sync;

/// State shared between the engine handle and the read-loop thread.
struct LoopShared {
    source: Mutex<Box<dyn MediaSource>>,
    pipeline: Arc<dyn FramePipeline>,
    context: Arc<ProcessingContext>,
    video_sink: Arc<Mutex<dyn FrameSink>>,
    audio_sink: Mutex<Option<Arc<Mutex<dyn SampleSink>>>>,
    writer: Mutex<Option<Arc<dyn SynchronizedWriter>>>,
    gate: ReadGate,
    options: Mutex<PlayerOptions>,
    /// Start offset consumed by the next session.
    requested_start: Mutex<Option<MediaTime>>,
    /// Raw timestamp of the last video frame seen by the loop.
    current_time: Mutex<Option<MediaTime>>,
    state: Mutex<PlayerState>,
    progress: Mutex<Option<Arc<ProgressFn>>>,
    finished: Mutex<Option<Arc<NotifyFn>>>,
    completion: Mutex<Option<Arc<NotifyFn>>>,
}

/// Identity of one spawned read loop.
struct RunToken {
    cancelled: AtomicBool,
    active: AtomicBool,
}

/// Reads a media asset on a dedicated background thread and delivers timed
/// units to the attached sinks.
///
/// At most one read loop exists per player: `start()` while running is a
/// no-op, and `cancel()` always stops the current loop before a new one may
/// start.
pub struct MoviePlayer {
    shared: Arc<LoopShared>,
    run: Option<(Arc<RunToken>, JoinHandle<()>)>,
}

impl MoviePlayer {
    pub fn new(
        source: Box<dyn MediaSource>,
        pipeline: Arc<dyn FramePipeline>,
        context: Arc<ProcessingContext>,
        video_sink: Arc<Mutex<dyn FrameSink>>,
        options: PlayerOptions,
    ) -> Self {
        Self {
            shared: Arc::new(LoopShared {
                source: Mutex::new(source),
                pipeline,
                context,
                video_sink,
                audio_sink: Mutex::new(None),
                writer: Mutex::new(None),
                gate: ReadGate::new(),
                options: Mutex::new(options),
                requested_start: Mutex::new(None),
                current_time: Mutex::new(None),
                state: Mutex::new(PlayerState::Idle),
                progress: Mutex::new(None),
                finished: Mutex::new(None),
                completion: Mutex::new(None),
            }),
            run: None,
        }
    }

    /// Attach the audio consumer. Takes effect at the next `start()`.
    pub fn set_audio_sink(&self, sink: Arc<Mutex<dyn SampleSink>>) {
        *self.shared.audio_sink.lock().unwrap() = Some(sink);
    }

    /// Attach a synchronized writer. Reading is then throttled by the
    /// writer's backpressure instead of the wall clock, and looping is
    /// disabled. The engine subscribes to readiness transitions; the observer
    /// holds only weak references back, so the writer must be detached (or
    /// playback cancelled) before the writer is torn down.
    pub fn set_synchronized_writer(&self, writer: Arc<dyn SynchronizedWriter>) {
        let weak_shared = Arc::downgrade(&self.shared);
        let weak_writer = Arc::downgrade(&writer);
        let observer: ReadinessObserver = Arc::new(move || {
            let (Some(shared), Some(writer)) = (weak_shared.upgrade(), weak_writer.upgrade())
            else {
                return;
            };
            // Blocked only while neither input can accept data; either input
            // becoming ready releases the loop.
            let ready =
                writer.video_input_ready() || writer.audio_input_ready().unwrap_or(false);
            shared.gate.set_blocked(!ready);
        });

        writer.set_readiness_observer(Some(Arc::clone(&observer)));
        *self.shared.writer.lock().unwrap() = Some(writer);
        // Seed the gate from the writer's current readiness.
        observer();
        tracing::info!("synchronized writer attached; wall-clock pacing and looping disabled");
    }

    /// Detach the synchronized writer and release the gate.
    pub fn clear_synchronized_writer(&self) {
        if let Some(writer) = self.shared.writer.lock().unwrap().take() {
            writer.set_readiness_observer(None);
        }
        self.shared.gate.set_blocked(false);
    }

    /// Progress callback, invoked after each delivered video frame with the
    /// played fraction in [0, 1]. Called from the read-loop thread; it must
    /// not block for long.
    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        *self.shared.progress.lock().unwrap() = Some(Arc::new(callback));
    }

    /// Finish notification, fired once when a run ends naturally or on source
    /// failure. Not fired on `cancel()`.
    pub fn on_finished<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.finished.lock().unwrap() = Some(Arc::new(callback));
    }

    /// Completion callback with the same firing rules as the finish
    /// notification.
    pub fn on_completion<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.completion.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn set_options(&self, options: PlayerOptions) {
        *self.shared.options.lock().unwrap() = options;
    }

    pub fn state(&self) -> PlayerState {
        *self.shared.state.lock().unwrap()
    }

    /// Raw timestamp of the last video frame the loop has seen.
    pub fn current_time(&self) -> Option<MediaTime> {
        *self.shared.current_time.lock().unwrap()
    }

    /// Spawn the read loop. No-op while a loop is already running.
    pub fn start(&mut self) {
        if let Some((token, _)) = &self.run {
            if token.active.load(Ordering::Acquire) && !token.cancelled.load(Ordering::Acquire) {
                tracing::debug!("start ignored: read loop already running");
                return;
            }
        }
        // Reap whatever loop came before, just in case one is still winding
        // down.
        self.stop_current_loop();

        let token = Arc::new(RunToken {
            cancelled: AtomicBool::new(false),
            active: AtomicBool::new(true),
        });
        *self.shared.state.lock().unwrap() = PlayerState::Running;

        let shared = Arc::clone(&self.shared);
        let loop_token = Arc::clone(&token);
        let handle = thread::Builder::new()
            .name("media-read-loop".into())
            .spawn(move || read_loop(shared, loop_token))
            .expect("failed to spawn read loop thread");

        self.run = Some((token, handle));
    }

    /// Set the start offset for the next run, then start.
    pub fn start_at(&mut self, offset: MediaTime) {
        *self.shared.requested_start.lock().unwrap() = Some(offset);
        self.start();
    }

    /// Remember the current position and stop. A later `start()` resumes
    /// from the captured timestamp.
    pub fn pause(&mut self) {
        self.cancel();
        let resume_at = *self.shared.current_time.lock().unwrap();
        *self.shared.requested_start.lock().unwrap() = resume_at;
        tracing::debug!(
            "paused at {}",
            resume_at.map_or_else(|| "start".to_string(), |t| t.to_string())
        );
    }

    /// Stop the read loop at its next checkpoint and release it. In-flight
    /// decode or processing of the current unit is never interrupted. Finish
    /// and completion callbacks are suppressed.
    pub fn cancel(&mut self) {
        self.stop_current_loop();
        *self.shared.state.lock().unwrap() = PlayerState::Idle;
    }

    /// Block until the active run ends on its own. Returns immediately when
    /// idle.
    pub fn wait(&mut self) {
        if let Some((_token, handle)) = self.run.take() {
            if handle.join().is_err() {
                tracing::warn!("read loop thread panicked");
            }
        }
    }

    fn stop_current_loop(&mut self) {
        if let Some((token, handle)) = self.run.take() {
            token.cancelled.store(true, Ordering::Release);
            // A loop parked in the gate must observe the flag.
            self.shared.gate.wake_all();
            if handle.join().is_err() {
                tracing::warn!("read loop thread panicked");
            }
        }
    }
}

impl Drop for MoviePlayer {
    fn drop(&mut self) {
        self.stop_current_loop();
        self.clear_synchronized_writer();
    }
}

/// Entry point of the read-loop thread.
fn read_loop(shared: Arc<LoopShared>, token: Arc<RunToken>) {
    let options = shared.options.lock().unwrap().clone();
    let writer = shared.writer.lock().unwrap().clone();
    let synchronized = writer.is_some();

    let _priority = if options.use_realtime_scheduling {
        priority::elevate_read_loop_priority()
    } else {
        None
    };

    // Synchronized encoding rules: the writer's backpressure replaces the
    // wall clock, and the asset plays through exactly once.
    let mode = if synchronized {
        PacingMode::Synchronized
    } else if options.play_at_actual_speed {
        PacingMode::RealTime
    } else {
        PacingMode::Unthrottled
    };
    let looping = options.loop_playback && !synchronized;

    let mut driver = LoopDriver {
        shared: &shared,
        token: &token,
        writer,
        mode,
        looping,
    };

    let mut end;
    loop {
        end = driver.run_session();
        if end == SessionEnd::Completed
            && looping
            && !token.cancelled.load(Ordering::Acquire)
        {
            tracing::debug!("end of tracks reached; restarting from zero");
            continue;
        }
        break;
    }

    if token.cancelled.load(Ordering::Acquire) {
        end = SessionEnd::Cancelled;
    }
    token.active.store(false, Ordering::Release);

    match end {
        SessionEnd::Cancelled => {
            *shared.state.lock().unwrap() = PlayerState::Cancelled;
            tracing::debug!("read loop cancelled");
        }
        SessionEnd::Completed | SessionEnd::Failed => {
            *shared.state.lock().unwrap() = PlayerState::Finished;
            let finished = shared.finished.lock().unwrap().clone();
            let completion = shared.completion.lock().unwrap().clone();
            if let Some(callback) = finished {
                callback();
            }
            if let Some(callback) = completion {
                callback();
            }
            tracing::debug!("read loop finished");
        }
    }
}

struct LoopDriver<'a> {
    shared: &'a LoopShared,
    token: &'a RunToken,
    writer: Option<Arc<dyn SynchronizedWriter>>,
    mode: PacingMode,
    looping: bool,
}

/// Mutable state of one pass over the asset.
struct ActiveSession {
    reader: Box<dyn SourceReader>,
    session: PlaybackSession,
    pacer: FramePacer,
    audio_sink: Option<Arc<Mutex<dyn SampleSink>>>,
    video_done: bool,
    audio_done: bool,
    video_finalized: bool,
    audio_finalized: bool,
}

impl LoopDriver<'_> {
    fn cancelled(&self) -> bool {
        self.token.cancelled.load(Ordering::Acquire)
    }

    fn run_session(&mut self) -> SessionEnd {
        let start_offset = self.shared.requested_start.lock().unwrap().take();
        *self.shared.current_time.lock().unwrap() = None;

        let (duration, reader) = {
            let mut source = self.shared.source.lock().unwrap();
            let duration = source.duration();
            match source.open(start_offset) {
                Ok(reader) => (duration, reader),
                Err(err) => {
                    tracing::error!("unable to open media source: {err}");
                    return SessionEnd::Failed;
                }
            }
        };

        let audio_sink = self.shared.audio_sink.lock().unwrap().clone();
        let has_audio = reader.has_audio() && audio_sink.is_some();
        let mut active = ActiveSession {
            reader,
            session: PlaybackSession::new(start_offset, duration),
            pacer: FramePacer::new(self.mode),
            audio_sink,
            video_done: false,
            audio_done: !has_audio,
            video_finalized: false,
            audio_finalized: false,
        };

        let end = self.pump(&mut active);
        active.reader.abort();
        active.session.report();
        end
    }

    /// The interleaved, readiness-driven read loop of one session.
    fn pump(&mut self, active: &mut ActiveSession) -> SessionEnd {
        while active.reader.status() == SourceStatus::Reading {
            if self.cancelled() {
                return SessionEnd::Cancelled;
            }

            let mut moved = false;
            if let Some(writer) = self.writer.clone() {
                self.shared.gate.await_unblocked_while(|| !self.cancelled());
                if self.cancelled() {
                    return SessionEnd::Cancelled;
                }

                // The gate only prevents a total stall; which tracks get read
                // this pass still follows each channel's own readiness.
                if writer.video_input_ready() && !active.video_done {
                    self.read_next_video(active);
                    moved = true;
                }
                if writer.audio_input_ready().unwrap_or(false) && !active.audio_done {
                    self.read_next_audio(active);
                    moved = true;
                }
            } else {
                if !active.video_done {
                    self.read_next_video(active);
                    moved = true;
                }
                if !active.audio_done && self.audio_sink_ready(active) {
                    self.read_next_audio(active);
                    moved = true;
                }
            }

            if active.video_done && active.audio_done {
                break;
            }
            if !moved {
                thread::sleep(IDLE_BACKOFF);
            }
        }

        match active.reader.status() {
            SourceStatus::Failed => {
                tracing::error!("media source reported a read failure; stopping playback");
                SessionEnd::Failed
            }
            _ => SessionEnd::Completed,
        }
    }

    fn audio_sink_ready(&self, active: &ActiveSession) -> bool {
        active
            .audio_sink
            .as_ref()
            .map(|sink| sink.lock().unwrap().is_ready_for_more())
            .unwrap_or(false)
    }

    fn read_next_video(&mut self, active: &mut ActiveSession) {
        match active.reader.pull_video() {
            Some(frame) => self.dispatch(MediaUnit::Video(frame), active),
            None => {
                active.video_done = true;
                if active.reader.status() == SourceStatus::Failed {
                    return;
                }
                // A looping run re-delivers the track, so the sink is only
                // finalized when this session is terminal.
                if !active.video_finalized && !self.looping {
                    active.video_finalized = true;
                    // An exhausted input must be finalized promptly, or a
                    // writer interleaving both tracks would wait on it
                    // forever.
                    self.shared.video_sink.lock().unwrap().mark_finished();
                    tracing::debug!("video track finished");
                }
            }
        }
    }

    fn read_next_audio(&mut self, active: &mut ActiveSession) {
        match active.reader.pull_audio() {
            Some(chunk) => self.dispatch(MediaUnit::Audio(chunk), active),
            None => {
                active.audio_done = true;
                if active.reader.status() == SourceStatus::Failed {
                    return;
                }
                if !active.audio_finalized && !self.looping {
                    active.audio_finalized = true;
                    if let Some(sink) = &active.audio_sink {
                        sink.lock().unwrap().mark_finished();
                    }
                    tracing::debug!("audio track finished");
                }
            }
        }
    }

    fn dispatch(&mut self, unit: MediaUnit, active: &mut ActiveSession) {
        match unit {
            MediaUnit::Video(frame) => self.dispatch_video(frame, active),
            MediaUnit::Audio(chunk) => self.dispatch_audio(chunk, active),
        }
    }

    fn dispatch_video(&mut self, frame: VideoFrame, active: &mut ActiveSession) {
        *self.shared.current_time.lock().unwrap() = Some(frame.pts);
        let pts = active.session.normalize(frame.pts);

        if active.pacer.pace(pts) == PaceDecision::Drop {
            active.session.note_dropped();
            tracing::trace!("dropping frame at {pts} to stay on schedule");
            return;
        }

        let progress = self.shared.progress.lock().unwrap().clone();
        if let Some(callback) = progress {
            callback(active.session.progress_fraction(pts));
        }

        // Release the previous frame before acquiring the next one; image
        // resources stay bounded to a single in-flight frame.
        active.session.release_current();

        let started = Instant::now();
        let pipeline = Arc::clone(&self.shared.pipeline);
        let pixels = Arc::clone(&frame.pixels);
        match self
            .shared
            .context
            .run_sync(move || pipeline.process(&pixels, pts))
        {
            Some(Ok(processed)) => {
                self.shared
                    .video_sink
                    .lock()
                    .unwrap()
                    .accept(processed.clone(), pts);
                active.session.note_emitted(processed, started.elapsed());
            }
            Some(Err(err)) => {
                tracing::warn!("skipping frame at {pts}: {err}");
            }
            None => {
                tracing::error!("processing context unavailable; skipping frame at {pts}");
            }
        }
    }

    fn dispatch_audio(&mut self, chunk: AudioChunk, active: &mut ActiveSession) {
        let pts = active.session.normalize(chunk.pts);
        if let Some(sink) = &active.audio_sink {
            sink.lock().unwrap().accept(AudioChunk {
                samples: chunk.samples,
                pts,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineError, ProcessedFrame, ProcessedImage};
    use crate::source::{PixelBuffer, SyntheticSource};
    use std::sync::atomic::{AtomicU32, AtomicU64};

    struct TestImage {
        width: u32,
        height: u32,
    }

    impl ProcessedImage for TestImage {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }
    }

    #[derive(Default)]
    struct TestPipeline {
        per_frame: Duration,
        stall_first: Option<Duration>,
        fail_on_call: Option<u64>,
        calls: AtomicU64,
    }

    impl FramePipeline for TestPipeline {
        fn process(
            &self,
            pixels: &PixelBuffer,
            pts: MediaTime,
        ) -> Result<ProcessedFrame, PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                if let Some(stall) = self.stall_first {
                    thread::sleep(stall);
                }
            }
            if !self.per_frame.is_zero() {
                thread::sleep(self.per_frame);
            }
            if self.fail_on_call == Some(call) {
                return Err(PipelineError("synthetic allocation failure".into()));
            }
            Ok(ProcessedFrame {
                image: Arc::new(TestImage {
                    width: pixels.width,
                    height: pixels.height,
                }),
                pts,
            })
        }
    }

    #[derive(Default)]
    struct RecordingFrameSink {
        frames: Vec<MediaTime>,
        arrival_offsets: Vec<Duration>,
        created: Option<Instant>,
        finished: u32,
    }

    impl RecordingFrameSink {
        fn with_clock() -> Self {
            Self {
                created: Some(Instant::now()),
                ..Default::default()
            }
        }
    }

    impl FrameSink for RecordingFrameSink {
        fn accept(&mut self, _frame: ProcessedFrame, pts: MediaTime) {
            self.frames.push(pts);
            if let Some(created) = self.created {
                self.arrival_offsets.push(created.elapsed());
            }
        }

        fn mark_finished(&mut self) {
            self.finished += 1;
        }
    }

    #[derive(Default)]
    struct RecordingSampleSink {
        chunks: Vec<MediaTime>,
        finished: u32,
        ready: bool,
    }

    impl SampleSink for RecordingSampleSink {
        fn is_ready_for_more(&self) -> bool {
            self.ready
        }

        fn accept(&mut self, chunk: AudioChunk) {
            self.chunks.push(chunk.pts);
        }

        fn mark_finished(&mut self) {
            self.finished += 1;
        }
    }

    #[derive(Default)]
    struct FakeWriter {
        video_ready: AtomicBool,
        audio_ready: Mutex<Option<bool>>,
        observer: Mutex<Option<ReadinessObserver>>,
    }

    impl FakeWriter {
        fn set_video_ready(&self, ready: bool) {
            self.video_ready.store(ready, Ordering::Release);
            self.notify();
        }

        fn set_audio_ready(&self, ready: Option<bool>) {
            *self.audio_ready.lock().unwrap() = ready;
            self.notify();
        }

        fn notify(&self) {
            let observer = self.observer.lock().unwrap().clone();
            if let Some(observer) = observer {
                observer();
            }
        }
    }

    impl SynchronizedWriter for FakeWriter {
        fn video_input_ready(&self) -> bool {
            self.video_ready.load(Ordering::Acquire)
        }

        fn audio_input_ready(&self) -> Option<bool> {
            *self.audio_ready.lock().unwrap()
        }

        fn set_readiness_observer(&self, observer: Option<ReadinessObserver>) {
            *self.observer.lock().unwrap() = observer;
        }
    }

    struct Harness {
        player: MoviePlayer,
        sink: Arc<Mutex<RecordingFrameSink>>,
        completions: Arc<AtomicU32>,
        finishes: Arc<AtomicU32>,
    }

    fn build_player(
        source: SyntheticSource,
        pipeline: TestPipeline,
        options: PlayerOptions,
    ) -> Harness {
        let sink = Arc::new(Mutex::new(RecordingFrameSink::with_clock()));
        let dyn_sink: Arc<Mutex<dyn FrameSink>> = sink.clone();
        let context = Arc::new(ProcessingContext::new("test-processing"));
        let player = MoviePlayer::new(
            Box::new(source),
            Arc::new(pipeline),
            context,
            dyn_sink,
            options,
        );

        let completions = Arc::new(AtomicU32::new(0));
        let finishes = Arc::new(AtomicU32::new(0));
        let completions_hook = Arc::clone(&completions);
        let finishes_hook = Arc::clone(&finishes);
        player.on_completion(move || {
            completions_hook.fetch_add(1, Ordering::SeqCst);
        });
        player.on_finished(move || {
            finishes_hook.fetch_add(1, Ordering::SeqCst);
        });

        Harness {
            player,
            sink,
            completions,
            finishes,
        }
    }

    fn wait_until<F>(timeout: Duration, mut predicate: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        predicate()
    }

    #[test]
    fn test_unthrottled_delivers_every_frame_in_order() {
        let source = SyntheticSource::new(10, 25);
        let mut harness = build_player(source, TestPipeline::default(), PlayerOptions::default());

        let started = Instant::now();
        harness.player.start();
        harness.player.wait();

        // 10 frames spanning 360ms of media must arrive much faster than
        // real time when nothing throttles the loop.
        assert!(started.elapsed() < Duration::from_millis(250));

        let sink = harness.sink.lock().unwrap();
        assert_eq!(sink.frames.len(), 10);
        assert!(sink.frames.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(sink.finished, 1);
        assert_eq!(harness.completions.load(Ordering::SeqCst), 1);
        assert_eq!(harness.finishes.load(Ordering::SeqCst), 1);
        assert_eq!(harness.player.state(), PlayerState::Finished);
    }

    #[test]
    fn test_realtime_matches_wall_clock() {
        let source = SyntheticSource::new(4, 25); // 0, 40, 80, 120ms
        let options = PlayerOptions {
            play_at_actual_speed: true,
            ..Default::default()
        };
        let mut harness = build_player(source, TestPipeline::default(), options);

        harness.player.start();
        harness.player.wait();

        let sink = harness.sink.lock().unwrap();
        assert_eq!(sink.frames.len(), 4);
        for (index, offset) in sink.arrival_offsets.iter().enumerate() {
            let target = Duration::from_millis(index as u64 * 40);
            assert!(*offset >= target, "frame {index} early: {offset:?}");
            assert!(
                *offset < target + Duration::from_millis(50),
                "frame {index} late: {offset:?}"
            );
        }
    }

    #[test]
    fn test_realtime_sheds_frames_after_stall() {
        let source = SyntheticSource::new(4, 25); // 0, 40, 80, 120ms
        let pipeline = TestPipeline {
            stall_first: Some(Duration::from_millis(90)),
            ..Default::default()
        };
        let options = PlayerOptions {
            play_at_actual_speed: true,
            ..Default::default()
        };
        let mut harness = build_player(source, pipeline, options);

        let started = Instant::now();
        harness.player.start();
        harness.player.wait();

        // Frames due at 40ms and 80ms fall inside the stall and are shed;
        // the 120ms frame is paced off its own timestamp, so no backlog.
        let sink = harness.sink.lock().unwrap();
        assert_eq!(sink.frames.len(), 2);
        assert_eq!(sink.frames[0], MediaTime::ZERO);
        assert_eq!(sink.frames[1], MediaTime::from_millis(120));
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn test_pipeline_failure_skips_unit_and_continues() {
        let source = SyntheticSource::new(5, 25);
        let pipeline = TestPipeline {
            fail_on_call: Some(2),
            ..Default::default()
        };
        let mut harness = build_player(source, pipeline, PlayerOptions::default());

        harness.player.start();
        harness.player.wait();

        let sink = harness.sink.lock().unwrap();
        assert_eq!(sink.frames.len(), 4);
        assert_eq!(sink.finished, 1);
        assert_eq!(harness.completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_synchronized_gate_blocks_until_either_channel_ready() {
        let source = SyntheticSource::new(5, 25);
        let stats = source.stats();
        let mut harness = build_player(source, TestPipeline::default(), PlayerOptions::default());

        let writer = Arc::new(FakeWriter::default());
        writer.set_video_ready(false);
        writer.set_audio_ready(None);
        let dyn_writer: Arc<dyn SynchronizedWriter> = writer.clone();
        harness.player.set_synchronized_writer(dyn_writer);

        harness.player.start();
        thread::sleep(Duration::from_millis(80));
        // Blocked from the first iteration: nothing may be pulled.
        assert_eq!(stats.video_pulls(), 0);
        assert!(harness.sink.lock().unwrap().frames.is_empty());

        writer.set_video_ready(true);
        harness.player.wait();

        let sink = harness.sink.lock().unwrap();
        assert_eq!(sink.frames.len(), 5);
        assert_eq!(sink.finished, 1);
        assert_eq!(harness.player.state(), PlayerState::Finished);
    }

    #[test]
    fn test_start_twice_keeps_single_loop() {
        let source = SyntheticSource::new(30, 25);
        let stats = source.stats();
        let options = PlayerOptions {
            play_at_actual_speed: true,
            ..Default::default()
        };
        let mut harness = build_player(source, TestPipeline::default(), options);

        harness.player.start();
        harness.player.start();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(stats.opens(), 1);
        harness.player.cancel();
    }

    #[test]
    fn test_cancel_suppresses_callbacks_and_allows_restart() {
        let source = SyntheticSource::new(50, 25);
        let stats = source.stats();
        let options = PlayerOptions {
            play_at_actual_speed: true,
            ..Default::default()
        };
        let mut harness = build_player(source, TestPipeline::default(), options);

        harness.player.start();
        thread::sleep(Duration::from_millis(60));
        harness.player.cancel();

        assert_eq!(harness.player.state(), PlayerState::Idle);
        assert_eq!(harness.completions.load(Ordering::SeqCst), 0);
        assert_eq!(harness.finishes.load(Ordering::SeqCst), 0);
        assert_eq!(harness.sink.lock().unwrap().finished, 0);

        // A fresh start after cancel produces exactly one new loop.
        harness.player.set_options(PlayerOptions::default());
        harness.player.start();
        harness.player.wait();
        assert_eq!(stats.opens(), 2);
        assert_eq!(harness.player.state(), PlayerState::Finished);
        assert_eq!(harness.completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_looping_restarts_rebased_without_callbacks() {
        let source = SyntheticSource::new(3, 25); // 0, 40, 80ms per pass
        let options = PlayerOptions {
            loop_playback: true,
            ..Default::default()
        };
        let mut harness = build_player(source, TestPipeline::default(), options);

        harness.player.start();
        let sink_handle = Arc::clone(&harness.sink);
        assert!(wait_until(Duration::from_secs(2), move || {
            sink_handle.lock().unwrap().frames.len() >= 9
        }));
        harness.player.cancel();

        let sink = harness.sink.lock().unwrap();
        let expected = [
            MediaTime::ZERO,
            MediaTime::from_millis(40),
            MediaTime::from_millis(80),
        ];
        for (index, pts) in sink.frames.iter().take(9).enumerate() {
            assert_eq!(*pts, expected[index % 3], "frame {index}");
        }
        // Neither the loop boundary nor the final cancel fires callbacks.
        assert_eq!(harness.completions.load(Ordering::SeqCst), 0);
        assert_eq!(harness.finishes.load(Ordering::SeqCst), 0);
        assert_eq!(sink.finished, 0);
    }

    #[test]
    fn test_pause_resumes_from_captured_position() {
        let source = SyntheticSource::new(10, 25);
        let stats = source.stats();
        let options = PlayerOptions {
            play_at_actual_speed: true,
            ..Default::default()
        };
        let mut harness = build_player(source, TestPipeline::default(), options);

        harness.player.start();
        thread::sleep(Duration::from_millis(130));
        harness.player.pause();

        let captured = harness.player.current_time().expect("position captured");
        assert!(captured >= MediaTime::from_millis(40));

        harness.player.start();
        harness.player.wait();

        // The resumed reader opened at the captured position, so only the
        // units at or past it are delivered again (rebased to zero).
        assert_eq!(stats.last_start_offset(), Some(captured));
        let sink = harness.sink.lock().unwrap();
        let resumed = (10.0 - captured.as_seconds() * 25.0).round() as i64;
        let first_run = sink.frames.len() as i64 - resumed;
        assert!(
            (1..=10).contains(&first_run),
            "unexpected frame split: {} total, {resumed} resumed",
            sink.frames.len()
        );
        assert_eq!(harness.player.state(), PlayerState::Finished);
    }

    #[test]
    fn test_source_failure_stops_without_restart() {
        let source = SyntheticSource::new(10, 25).fail_after_video_frames(2);
        let stats = source.stats();
        let options = PlayerOptions {
            loop_playback: true,
            ..Default::default()
        };
        let mut harness = build_player(source, TestPipeline::default(), options);

        harness.player.start();
        harness.player.wait();

        let sink = harness.sink.lock().unwrap();
        assert_eq!(sink.frames.len(), 2);
        // Failure is not end-of-track: no finalization signal.
        assert_eq!(sink.finished, 0);
        // Looping does not restart after a failure, but the finish
        // notification still fires.
        assert_eq!(stats.opens(), 1);
        assert_eq!(harness.finishes.load(Ordering::SeqCst), 1);
        assert_eq!(harness.completions.load(Ordering::SeqCst), 1);
        assert_eq!(harness.player.state(), PlayerState::Finished);
    }

    #[test]
    fn test_audio_routed_when_sink_ready() {
        let source = SyntheticSource::new(5, 25).with_audio(3, 50);
        let mut harness = build_player(source, TestPipeline::default(), PlayerOptions::default());

        let audio = Arc::new(Mutex::new(RecordingSampleSink {
            ready: true,
            ..Default::default()
        }));
        harness.player.set_audio_sink(audio.clone());

        harness.player.start();
        harness.player.wait();

        let audio = audio.lock().unwrap();
        assert_eq!(audio.chunks.len(), 3);
        assert!(audio.chunks.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(audio.finished, 1);
    }

    #[test]
    fn test_audio_skipped_while_sink_not_ready() {
        let source = SyntheticSource::new(5, 25).with_audio(3, 50);
        let stats = source.stats();
        let mut harness = build_player(source, TestPipeline::default(), PlayerOptions::default());

        let audio = Arc::new(Mutex::new(RecordingSampleSink::default()));
        harness.player.set_audio_sink(audio.clone());

        harness.player.start();
        // Video drains, audio stays untouched while the sink reports full.
        thread::sleep(Duration::from_millis(120));
        assert_eq!(stats.video_pulls(), 5);
        assert_eq!(stats.audio_pulls(), 0);
        assert!(audio.lock().unwrap().chunks.is_empty());
        harness.player.cancel();
    }

    #[test]
    fn test_wait_on_idle_player_returns() {
        let source = SyntheticSource::new(1, 25);
        let mut harness = build_player(source, TestPipeline::default(), PlayerOptions::default());
        harness.player.wait();
        assert_eq!(harness.player.state(), PlayerState::Idle);
    }
}
