use std::{path::PathBuf, time::Duration};

use futures::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    artifacts::save_artifact,
    infrastructure::cluster::{ClusterHandle, LogLines, PodRef, with_timeout},
};

/// Follow-mode tail of one container, written to `path` when it stops.
pub struct ContainerStream {
    pub cluster: ClusterHandle,
    pub pod: PodRef,
    pub container: String,
    pub path: PathBuf,
    pub open_timeout: Duration,
    pub retry_interval: Duration,
}

/// How a container stream ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Cancelled before a stream could be opened; nothing was written.
    NeverOpened,
    /// Buffered lines were written to the artifact file.
    Flushed { lines: usize },
    /// Buffered lines were lost because the write failed.
    WriteFailed,
}

impl ContainerStream {
    /// Opens the stream, retrying until `cancel` fires, then buffers lines
    /// until cancellation or end of stream and flushes them once.
    pub async fn run(self, cancel: CancellationToken) -> StreamOutcome {
        let Some(mut lines) = self.open(&cancel).await else {
            return StreamOutcome::NeverOpened;
        };

        let mut buffer = String::new();
        let mut count = 0;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = lines.next() => match next {
                    Some(Ok(line)) => {
                        buffer.push_str(&line);
                        buffer.push('\n');
                        count += 1;
                    }
                    Some(Err(err)) => {
                        warn!(pod = %self.pod, container = %self.container, error = ?err, "log stream broke");
                        break;
                    }
                    None => break,
                },
            }
        }
        drop(lines);

        self.flush(buffer, count).await
    }

    async fn open(&self, cancel: &CancellationToken) -> Option<LogLines> {
        loop {
            let attempt = with_timeout(
                "log stream open",
                self.open_timeout,
                self.cluster.api().follow_logs(&self.pod, &self.container),
            );
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                result = attempt => result,
            };

            match result {
                Ok(lines) => return Some(lines),
                Err(err) => {
                    debug!(pod = %self.pod, container = %self.container, error = ?err, "log stream not ready, retrying");
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }

    async fn flush(self, buffer: String, lines: usize) -> StreamOutcome {
        match save_artifact(self.path.clone(), buffer.into_bytes()).await {
            Ok(()) => {
                debug!(pod = %self.pod, container = %self.container, path = %self.path.display(), lines, "log stream flushed");
                StreamOutcome::Flushed { lines }
            }
            Err(err) => {
                warn!(pod = %self.pod, container = %self.container, error = ?err, "failed to flush log stream");
                StreamOutcome::WriteFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use super::*;
    use crate::fake::FakeCluster;

    fn stream(fake: &Arc<FakeCluster>, pod: &PodRef, path: PathBuf) -> ContainerStream {
        ContainerStream {
            cluster: ClusterHandle::new(0, PathBuf::from("/kubeconfig"), fake.clone()),
            pod: pod.clone(),
            container: "app".to_owned(),
            path,
            open_timeout: Duration::from_secs(1),
            retry_interval: Duration::from_millis(300),
        }
    }

    #[tokio::test]
    async fn finished_stream_is_flushed() {
        let root = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCluster::new());
        let pod = PodRef::new("ns-a", "web");
        fake.set_follow_lines(&pod, "app", &["one", "two"], false);
        let path = root.path().join("web-app.log");

        let outcome = stream(&fake, &pod, path.clone())
            .run(CancellationToken::new())
            .await;

        assert_eq!(outcome, StreamOutcome::Flushed { lines: 2 });
        assert_eq!(fs::read_to_string(path).unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn cancelled_open_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCluster::new());
        let pod = PodRef::new("ns-a", "web");
        let path = root.path().join("web-app.log");
        let cancel = CancellationToken::new();

        let task = tokio::spawn(stream(&fake, &pod, path.clone()).run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), StreamOutcome::NeverOpened);
        assert!(!path.exists());
        assert!(fake.follow_opens(&pod) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_is_retried_until_it_succeeds() {
        let root = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCluster::new());
        let pod = PodRef::new("ns-a", "web");
        fake.fail_follow_opens(&pod, 3);
        fake.set_follow_lines(&pod, "app", &["late"], false);
        let path = root.path().join("web-app.log");

        let outcome = stream(&fake, &pod, path.clone())
            .run(CancellationToken::new())
            .await;

        assert_eq!(outcome, StreamOutcome::Flushed { lines: 1 });
        assert_eq!(fake.follow_opens(&pod), 4);
    }

    #[tokio::test]
    async fn cancelled_open_stream_flushes_buffered_lines() {
        let root = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCluster::new());
        let pod = PodRef::new("ns-a", "web");
        fake.set_follow_lines(&pod, "app", &["kept"], true);
        let path = root.path().join("web-app.log");
        let cancel = CancellationToken::new();

        let task = tokio::spawn(stream(&fake, &pod, path.clone()).run(cancel.clone()));
        while fake.follow_opens(&pod) == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), StreamOutcome::Flushed { lines: 1 });
        assert_eq!(fs::read_to_string(path).unwrap(), "kept\n");
    }
}
