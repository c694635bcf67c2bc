use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info};

use super::capture::{CaptureReport, CaptureTask, capture_pod};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("log capture pool is shut down")]
    Closed,
}

struct Job {
    task: CaptureTask,
    done: oneshot::Sender<CaptureReport>,
}

/// Resolves to the report of one submitted task.
#[derive(Debug)]
pub struct CaptureTicket {
    done: oneshot::Receiver<CaptureReport>,
}

impl CaptureTicket {
    /// Waits for the task. A task dropped without running reports as
    /// cancelled.
    pub async fn wait(self) -> CaptureReport {
        self.done.await.unwrap_or_else(|_| CaptureReport {
            cancelled: true,
            ..CaptureReport::default()
        })
    }
}

/// Fixed set of workers draining a bounded queue of [`CaptureTask`]s.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: TaskTracker,
    completed: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawns `workers` workers on the current runtime. The queue holds as
    /// many tasks as there are workers; further submissions wait.
    #[must_use]
    pub fn start(workers: usize, timeout: Duration, cancel: CancellationToken) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(workers);
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let completed = Arc::new(AtomicUsize::new(0));
        let tracker = TaskTracker::new();

        for worker in 0..workers {
            let receiver = Arc::clone(&receiver);
            let completed = Arc::clone(&completed);
            let cancel = cancel.clone();
            tracker.spawn(async move {
                loop {
                    let job = receiver.lock().await.recv().await;
                    let Some(Job { task, done }) = job else {
                        break;
                    };
                    let report = capture_pod(&task, timeout, &cancel).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    let _ = done.send(report);
                }
                debug!(worker, "log capture worker exiting");
            });
        }
        tracker.close();
        info!(workers, "log capture pool started");

        Self {
            sender: Mutex::new(Some(sender)),
            workers: tracker,
            completed,
        }
    }

    /// Enqueues a task, waiting while the queue is full.
    pub async fn submit(&self, task: CaptureTask) -> Result<CaptureTicket, PoolError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PoolError::Closed)?;

        let (done, ticket) = oneshot::channel();
        sender
            .send(Job { task, done })
            .await
            .map_err(|_| PoolError::Closed)?;
        Ok(CaptureTicket { done: ticket })
    }

    /// Number of tasks that ran to completion (including cancelled ones).
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Rejects further submissions. Queued tasks are still drained.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Closes the pool and waits for every worker to exit.
    pub async fn join(&self) {
        self.close();
        self.workers.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use futures::future::join_all;

    use super::*;
    use crate::{artifacts::LogVariant, fake::FakeCluster, infrastructure::cluster::ClusterHandle};

    fn tasks(count: usize, root: &std::path::Path) -> Vec<CaptureTask> {
        let fake = Arc::new(FakeCluster::new());
        let cluster = ClusterHandle::new(0, PathBuf::from("/kubeconfig"), fake.clone());
        (0..count)
            .map(|i| {
                let pod = fake.add_pod("ns-a", &format!("pod-{i}"), &["app"], &[]);
                fake.set_logs(&pod.pod, "app", LogVariant::Current, "line\n");
                CaptureTask {
                    cluster: cluster.clone(),
                    pod,
                    since: None,
                    dir: root.to_path_buf(),
                }
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_submitted_task_completes_once() {
        let root = tempfile::tempdir().unwrap();
        for workers in [1, 3, 8] {
            let pool = WorkerPool::start(workers, Duration::from_secs(1), CancellationToken::new());
            let count = 25;

            let mut tickets = Vec::new();
            for task in tasks(count, root.path()) {
                tickets.push(pool.submit(task).await.unwrap());
            }
            let reports = join_all(tickets.into_iter().map(CaptureTicket::wait)).await;
            pool.join().await;

            assert_eq!(pool.completed(), count, "workers={workers}");
            assert!(reports.iter().all(|r| r.files_written == 1 && !r.cancelled));
        }
    }

    #[tokio::test]
    async fn submit_after_close_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let pool = WorkerPool::start(2, Duration::from_secs(1), CancellationToken::new());
        pool.close();

        let task = tasks(1, root.path()).remove(0);
        assert_eq!(pool.submit(task).await.unwrap_err(), PoolError::Closed);
        pool.join().await;
    }

    #[tokio::test]
    async fn cancelled_pool_drains_without_fetching() {
        let root = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = WorkerPool::start(2, Duration::from_secs(1), cancel);

        let mut tickets = Vec::new();
        for task in tasks(4, root.path()) {
            tickets.push(pool.submit(task).await.unwrap());
        }
        let reports = join_all(tickets.into_iter().map(CaptureTicket::wait)).await;
        pool.join().await;

        assert_eq!(pool.completed(), 4);
        assert!(reports.iter().all(|r| r.cancelled));
    }
}
