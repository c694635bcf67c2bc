use std::{
    path::PathBuf,
    time::{Duration, SystemTime},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    artifacts::{LogVariant, log_file_name, save_artifact},
    infrastructure::cluster::{ClusterHandle, LogRequest, PodInfo, with_timeout},
};

/// Snapshot log capture for one pod, consumed exactly once by a pool worker.
#[derive(Clone, Debug)]
pub struct CaptureTask {
    pub cluster: ClusterHandle,
    pub pod: PodInfo,
    /// Only lines written at or after this instant are kept.
    pub since: Option<SystemTime>,
    /// Directory the pod's log files are written to.
    pub dir: PathBuf,
}

/// What happened to one [`CaptureTask`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub files_written: usize,
    pub fetch_failures: usize,
    pub write_failures: usize,
    /// Shutdown was requested before the task finished.
    pub cancelled: bool,
}

/// One container log to fetch, with the filename suffix it is stored under.
struct Target<'a> {
    container: &'a str,
    suffix: Option<&'a str>,
}

/// Regular containers first, then init containers. The container name is
/// part of the filename for init containers and for pods with more than one
/// regular container.
fn targets(pod: &PodInfo) -> Vec<Target<'_>> {
    let multi = pod.containers.len() > 1;
    let regular = pod.containers.iter().map(|container| Target {
        container,
        suffix: multi.then_some(container.as_str()),
    });
    let init = pod.init_containers.iter().map(|container| Target {
        container,
        suffix: Some(container.as_str()),
    });
    regular.chain(init).collect()
}

/// Fetches current then previous logs of every container and writes them
/// below the task directory. Failures are logged and skipped.
pub async fn capture_pod(
    task: &CaptureTask,
    timeout: Duration,
    cancel: &CancellationToken,
) -> CaptureReport {
    let mut report = CaptureReport::default();
    let pod = &task.pod.pod;
    let cluster = task.cluster.ordinal();

    for target in targets(&task.pod) {
        for variant in LogVariant::ALL {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return report;
            }

            let request = LogRequest {
                container: target.container,
                variant,
                since: task.since,
            };
            let fetch = with_timeout(
                "pod log fetch",
                timeout,
                task.cluster.api().pod_logs(pod, request),
            )
            .await;

            let logs = match fetch {
                Ok(logs) => logs,
                Err(err) if variant.is_previous() => {
                    debug!(cluster, %pod, container = target.container, error = ?err, "no previous logs");
                    report.fetch_failures += 1;
                    continue;
                }
                Err(err) => {
                    warn!(cluster, %pod, container = target.container, error = ?err, "failed to fetch pod logs");
                    report.fetch_failures += 1;
                    continue;
                }
            };

            let path = task
                .dir
                .join(log_file_name(&pod.name, target.suffix, variant));
            match save_artifact(path.clone(), logs.into_bytes()).await {
                Ok(()) => report.files_written += 1,
                Err(err) => {
                    warn!(cluster, %pod, path = %path.display(), error = ?err, "failed to save pod logs");
                    report.write_failures += 1;
                }
            }
        }
    }

    report
}
