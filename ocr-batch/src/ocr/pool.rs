use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{OcrBatchError, Result};

use super::OcrEngine;

/// Jobs buffered per worker before `recognize` callers wait for room.
const QUEUE_DEPTH_PER_WORKER: usize = 4;

struct Job {
    image: PathBuf,
    reply: oneshot::Sender<Result<String>>,
}

type JobQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Fixed-size pool of OCR workers sharing one job queue.
///
/// Each worker owns its own engine and processes one job at a time, so at
/// most `size` recognitions run concurrently. Results travel back to the
/// submitter on a per-job channel.
///
/// Dropping the pool cancels it: workers finish the job they are running and
/// exit, and queued jobs fail with [`OcrBatchError::Cancelled`]. Call
/// [`WorkerPool::terminate`] to drain the queue and wait for the workers.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Create `size` engines with `factory` and start one worker per engine.
    ///
    /// Fails without starting any worker if `size` is zero or any engine
    /// cannot be created.
    pub fn start<F>(size: usize, mut factory: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<Arc<dyn OcrEngine>>,
    {
        if size == 0 {
            return Err(OcrBatchError::Pool(
                "worker pool needs at least one worker".to_string(),
            ));
        }

        let engines = (0..size).map(&mut factory).collect::<Result<Vec<_>>>()?;

        let (sender, receiver) = mpsc::channel(size * QUEUE_DEPTH_PER_WORKER);
        let queue: JobQueue = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();

        let workers = engines
            .into_iter()
            .enumerate()
            .map(|(id, engine)| {
                tokio::spawn(run_worker(id, engine, Arc::clone(&queue), cancel.clone()))
            })
            .collect();

        info!(workers = size, "OCR worker pool started");

        Ok(Self {
            sender: Some(sender),
            workers,
            cancel,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Token that stops the pool when cancelled. Queued jobs are failed,
    /// running ones complete.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queue `image` for recognition and wait for its raw text.
    pub async fn recognize(&self, image: &Path) -> Result<String> {
        if self.cancel.is_cancelled() {
            return Err(OcrBatchError::Cancelled);
        }

        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| OcrBatchError::Pool("worker pool is terminated".to_string()))?;

        let (reply, response) = oneshot::channel();
        let job = Job {
            image: image.to_path_buf(),
            reply,
        };

        if sender.send(job).await.is_err() {
            return Err(self.stopped_error());
        }

        response.await.map_err(|_| self.stopped_error())?
    }

    fn stopped_error(&self) -> OcrBatchError {
        if self.cancel.is_cancelled() {
            OcrBatchError::Cancelled
        } else {
            OcrBatchError::Pool("worker stopped before replying".to_string())
        }
    }

    /// Stop accepting jobs, let workers drain the queue, and wait for them to exit.
    pub async fn terminate(mut self) {
        drop(self.sender.take());

        let workers = std::mem::take(&mut self.workers);
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                warn!("OCR worker exited abnormally: {}", e);
            }
        }

        info!("OCR worker pool terminated");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            debug!("OCR worker pool dropped without terminate, cancelling workers");
            self.cancel.cancel();
        }
    }
}

async fn run_worker(
    id: usize,
    engine: Arc<dyn OcrEngine>,
    queue: JobQueue,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut jobs = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = jobs.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };

        debug!(worker = id, image = %job.image.display(), "Recognizing image");
        let result = engine.recognize(&job.image).await;
        // The submitter may have gone away; nothing to report then.
        let _ = job.reply.send(result);
    }

    debug!(worker = id, "OCR worker stopped");
}
