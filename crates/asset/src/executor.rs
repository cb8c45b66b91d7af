use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::AssetError;

type BoxedWork = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// One unit of queued work.
pub struct Job {
    work: BoxedWork,
    abandon: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Job {
    pub fn new(work: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            work: Box::pin(work),
            abandon: None,
        }
    }

    /// Runs `hook` if the job is dropped without having been started.
    pub fn on_abandon(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.abandon = Some(Box::new(hook));
        self
    }

    fn abandon(mut self) {
        if let Some(hook) = self.abandon.take() {
            hook();
        }
    }
}

/// Single-worker FIFO queue.
///
/// Jobs run one at a time in submission order on a dedicated task, so the
/// submitting thread never waits for them.
pub struct TransferExecutor {
    jobs: mpsc::UnboundedSender<Job>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TransferExecutor {
    /// Starts the worker on the current tokio runtime.
    pub fn start() -> Self {
        let (jobs, queue) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run(queue, cancel.clone()));
        Self {
            jobs,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queues `job`. Fails once the executor is shut down.
    pub fn submit(&self, job: Job) -> Result<(), AssetError> {
        if self.cancel.is_cancelled() {
            job.abandon();
            return Err(AssetError::Cancelled);
        }
        self.jobs.send(job).map_err(|rejected| {
            rejected.0.abandon();
            AssetError::Cancelled
        })
    }

    /// Stops after the running job; queued jobs are abandoned.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            tracing::error!(error = %e, "transfer executor worker failed");
        }
    }
}

impl Drop for TransferExecutor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(mut queue: mpsc::UnboundedReceiver<Job>, cancel: CancellationToken) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = queue.recv() => job,
        };
        let Some(mut job) = job else {
            break;
        };
        job.abandon = None;
        job.work.await;
    }

    queue.close();
    let mut abandoned = 0usize;
    while let Ok(job) = queue.try_recv() {
        job.abandon();
        abandoned += 1;
    }
    tracing::debug!(abandoned, "transfer executor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::oneshot;

    #[tokio::test]
    async fn jobs_run_in_submission_order_one_at_a_time() {
        let executor = TransferExecutor::start();
        let log = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = oneshot::channel();

        for i in 0..5 {
            let log = Arc::clone(&log);
            let running = Arc::clone(&running);
            executor
                .submit(Job::new(async move {
                    assert_eq!(running.fetch_add(1, Ordering::SeqCst), 0);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    log.lock().unwrap().push(i);
                    running.fetch_sub(1, Ordering::SeqCst);
                }))
                .unwrap();
        }
        executor
            .submit(Job::new(async move {
                let _ = done_tx.send(());
            }))
            .unwrap();

        done_rx.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn queued_jobs_are_abandoned_on_shutdown() {
        let executor = TransferExecutor::start();
        let abandoned = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        executor
            .submit(Job::new(async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
            }))
            .unwrap();
        for _ in 0..3 {
            let abandoned = Arc::clone(&abandoned);
            executor
                .submit(Job::new(async {}).on_abandon(move || {
                    abandoned.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        started_rx.await.unwrap();
        let shutdown = executor.shutdown();
        tokio::pin!(shutdown);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), &mut shutdown)
                .await
                .is_err()
        );
        release_tx.send(()).unwrap();
        shutdown.await;
        assert_eq!(abandoned.load(Ordering::SeqCst), 3);

        let late = Arc::clone(&abandoned);
        let rejected = executor.submit(Job::new(async {}).on_abandon(move || {
            late.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(matches!(rejected, Err(AssetError::Cancelled)));
        assert_eq!(abandoned.load(Ordering::SeqCst), 4);
    }
}
