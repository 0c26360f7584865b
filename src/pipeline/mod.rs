//! Frame processing boundary and serial execution context
//!
//! Color-space conversion and texture upload live behind [`FramePipeline`];
//! the engine only sees an opaque processed-image handle. All pipeline work
//! runs on a [`ProcessingContext`], a single worker thread that serializes
//! access to GPU/shared resources. The context is constructor-injected into
//! every component that needs it; there is no global singleton.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::source::PixelBuffer;
use crate::timing::MediaTime;

/// A downstream resource (texture, framebuffer) could not be created for the
/// current unit. The unit is skipped; the loop continues.
#[derive(Error, Debug)]
#[error("failed to create frame resources: {0}")]
pub struct PipelineError(pub String);

/// Call contract of a pipeline-processed image. The concrete representation
/// (GPU texture, staging buffer) stays inside the pipeline implementation.
pub trait ProcessedImage: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// Reference-counted handle to one processed frame.
///
/// The engine holds at most one of these between production and sink
/// hand-off, releasing it before the next frame is processed.
#[derive(Clone)]
pub struct ProcessedFrame {
    pub image: Arc<dyn ProcessedImage>,
    pub pts: MediaTime,
}

impl std::fmt::Debug for ProcessedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedFrame")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("pts", &self.pts)
            .finish()
    }
}

/// Converts one decoded frame into a processed-image handle.
pub trait FramePipeline: Send + Sync {
    fn process(&self, pixels: &PixelBuffer, pts: MediaTime)
        -> Result<ProcessedFrame, PipelineError>;
}

type Job = Box<dyn FnOnce() + Send>;

/// A named worker thread executing submitted jobs strictly in order.
pub struct ProcessingContext {
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ProcessingContext {
    pub fn new(name: &str) -> Self {
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })
            .expect("failed to spawn processing context thread");

        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// Run a job on the context and block until it finishes, returning its
    /// value. `None` when the context has already shut down.
    pub fn run_sync<R, F>(&self, job: F) -> Option<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let sender = self.sender.as_ref()?;
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let wrapped: Job = Box::new(move || {
            let _ = done_tx.send(job());
        });
        sender.send(wrapped).ok()?;
        done_rx.recv().ok()
    }

    /// Queue a job without waiting for it.
    pub fn run_async<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for ProcessingContext {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain remaining jobs and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("processing context worker panicked");
            }
        }
    }
}
