//! Process-wide log collection context and its entry points.
//!
//! [`initialize`] builds the [`LogCollector`] once per process from the
//! environment. Every entry point is a no-op when collection is disabled or no
//! cluster is reachable, so test outcomes never depend on it.

use std::{io, sync::Arc, time::SystemTime};

use futures::future::join_all;
use testing_framework_config::{CollectionConfig, ConfigError, constants::STREAM_RETRY_INTERVAL};
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    artifacts::ArtifactPaths,
    infrastructure::{
        cluster::{ClusterHandle, with_timeout},
        dump_tool::{DumpTool, KubectlDumpTool},
        kube_api::KubeClientFactory,
        registry::{connect_clusters, kubeconfig_candidates},
    },
    lifecycle::{
        capture::{CaptureReport, CaptureTask},
        dump::{DumpCoordinator, DumpReport},
        monitor::NamespaceMonitor,
        pool::{CaptureTicket, WorkerPool},
    },
    namespaces::{ClassifierError, NamespaceClassifier},
};

static COLLECTOR: OnceCell<Arc<LogCollector>> = OnceCell::const_new();

/// Fatal problems building the collector.
#[derive(Debug, Error)]
pub enum CollectorInitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Returns the process-wide collector, building it from the environment on
/// first use.
pub async fn initialize() -> Result<Arc<LogCollector>, CollectorInitError> {
    COLLECTOR
        .get_or_try_init(|| async { LogCollector::from_env().await.map(Arc::new) })
        .await
        .cloned()
}

/// Starts a capture on the process-wide collector.
pub async fn capture(label: &str) -> Result<Capture, CollectorInitError> {
    Ok(initialize().await?.capture(label))
}

/// Dumps every cluster on the process-wide collector.
pub async fn cluster_dump(label: &str) -> Result<Vec<DumpReport>, CollectorInitError> {
    Ok(initialize().await?.cluster_dump(label).await)
}

/// Starts namespace monitoring on the process-wide collector.
pub async fn monitor_namespaces(
    token: CancellationToken,
    label: &str,
) -> Result<MonitorHandle, CollectorInitError> {
    Ok(initialize().await?.monitor_namespaces(token, label))
}

/// Wires the registry, classifier, worker pool, dump coordinator and monitors
/// together. Immutable once built.
pub struct LogCollector {
    config: CollectionConfig,
    classifier: Arc<NamespaceClassifier>,
    paths: ArtifactPaths,
    clusters: Vec<ClusterHandle>,
    pool: Option<WorkerPool>,
    dumps: DumpCoordinator,
    shutdown: CancellationToken,
}

impl LogCollector {
    /// Loads the configuration, connects to every configured cluster and
    /// installs the shutdown signal listener.
    pub async fn from_env() -> Result<Self, CollectorInitError> {
        let config = CollectionConfig::from_env()?;
        info!(config = %config, "log collection configured");

        if !config.enabled {
            info!("log collection disabled by LOGS_ENABLED");
            let tool = Arc::new(KubectlDumpTool::new(config.dump_timeout));
            return Self::new(config, Vec::new(), tool);
        }

        let factory = KubeClientFactory::new(
            config.timeout,
            config.requests_per_second(),
            config.request_burst(),
        );
        let candidates = kubeconfig_candidates(config.max_kube_configs);
        let clusters = connect_clusters(&factory, &candidates).await;
        let tool = Arc::new(KubectlDumpTool::new(config.dump_timeout));

        let collector = Self::new(config, clusters, tool)?;
        spawn_signal_listener(collector.shutdown.clone());
        Ok(collector)
    }

    /// Builds a collector over already connected clusters. Must be called
    /// within a tokio runtime.
    pub fn new(
        config: CollectionConfig,
        clusters: Vec<ClusterHandle>,
        tool: Arc<dyn DumpTool>,
    ) -> Result<Self, CollectorInitError> {
        let classifier = Arc::new(NamespaceClassifier::from_config(&config)?);
        let paths = ArtifactPaths::new(&config.artifacts_dir);
        let shutdown = CancellationToken::new();

        if config.enabled && clusters.is_empty() {
            warn!("no reachable cluster, log collection disabled");
        }
        let enabled = config.enabled && !clusters.is_empty();

        let pool = enabled.then(|| {
            WorkerPool::start(config.worker_count, config.timeout, shutdown.clone())
        });
        let dumps = DumpCoordinator::new(
            &clusters,
            tool,
            Arc::clone(&classifier),
            paths.clone(),
            config.timeout,
        );

        Ok(Self {
            config,
            classifier,
            paths,
            clusters,
            pool,
            dumps,
            shutdown,
        })
    }

    #[must_use]
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    #[must_use]
    pub fn clusters(&self) -> &[ClusterHandle] {
        &self.clusters
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    /// Cancelled on a termination signal or [`LogCollector::shutdown`].
    #[must_use]
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Marks the start of a capture window; see [`Capture::finalize`].
    #[must_use]
    pub fn capture(self: &Arc<Self>, label: &str) -> Capture {
        Capture {
            collector: Arc::clone(self),
            label: label.to_owned(),
            since: SystemTime::now(),
        }
    }

    pub async fn cluster_dump(&self, label: &str) -> Vec<DumpReport> {
        if !self.is_enabled() {
            return Vec::new();
        }
        self.dumps.cluster_dump(label).await
    }

    /// Streams logs of test namespace pods on every cluster until `token` is
    /// cancelled, the collector shuts down, or the handle is stopped.
    #[must_use]
    pub fn monitor_namespaces(&self, token: CancellationToken, label: &str) -> MonitorHandle {
        let stop = self.shutdown.child_token();
        let tasks = TaskTracker::new();
        if !self.is_enabled() {
            tasks.close();
            return MonitorHandle { stop, tasks };
        }

        for cluster in &self.clusters {
            let monitor = NamespaceMonitor::new(
                cluster.clone(),
                Arc::clone(&self.classifier),
                self.paths.clone(),
                label,
                self.config.timeout,
                STREAM_RETRY_INTERVAL,
            );
            let token = token.clone();
            let stop = stop.child_token();
            tasks.spawn(async move {
                let run = monitor.run(stop.clone());
                tokio::pin!(run);
                tokio::select! {
                    () = &mut run => return,
                    () = token.cancelled() => stop.cancel(),
                }
                run.await;
            });
        }
        tasks.close();

        MonitorHandle { stop, tasks }
    }

    /// Cancels in-flight work and waits for the worker pool to drain.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(pool) = &self.pool {
            pool.join().await;
        }
    }

    async fn collect_pod_logs(&self, label: &str, since: SystemTime) -> Vec<CaptureReport> {
        let Some(pool) = &self.pool else {
            return Vec::new();
        };

        let mut tickets: Vec<CaptureTicket> = Vec::new();
        'clusters: for cluster in &self.clusters {
            let ordinal = cluster.ordinal();
            let pods = match with_timeout("pod list", self.config.timeout, cluster.api().list_pods())
                .await
            {
                Ok(pods) => pods,
                Err(err) => {
                    warn!(cluster = ordinal, error = ?err, "failed to list pods for capture");
                    continue;
                }
            };

            let dir = self.paths.label_dir(ordinal, label);
            for pod in pods
                .into_iter()
                .filter(|pod| self.classifier.matches_any(&pod.pod.namespace))
            {
                let task = CaptureTask {
                    cluster: cluster.clone(),
                    pod,
                    since: Some(since),
                    dir: dir.clone(),
                };
                match pool.submit(task).await {
                    Ok(ticket) => tickets.push(ticket),
                    Err(err) => {
                        debug!(cluster = ordinal, error = ?err, "capture stopped early");
                        break 'clusters;
                    }
                }
            }
        }

        join_all(tickets.into_iter().map(CaptureTicket::wait)).await
    }
}

/// An open capture window for one label.
pub struct Capture {
    collector: Arc<LogCollector>,
    label: String,
    since: SystemTime,
}

/// Everything a finalized capture produced.
#[derive(Clone, Debug, Default)]
pub struct CaptureSummary {
    pub dumps: Vec<DumpReport>,
    pub pods: Vec<CaptureReport>,
}

impl Capture {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Dumps every cluster under the capture label and saves the logs every
    /// in-scope pod wrote since the capture started.
    pub async fn finalize(self) -> CaptureSummary {
        let collector = &self.collector;
        if !collector.is_enabled() {
            return CaptureSummary::default();
        }

        let (dumps, pods) = tokio::join!(
            collector.cluster_dump(&self.label),
            collector.collect_pod_logs(&self.label, self.since),
        );
        info!(
            label = %self.label,
            dumps = dumps.len(),
            pods = pods.len(),
            "capture finalized"
        );
        CaptureSummary { dumps, pods }
    }
}

/// Running namespace monitors.
pub struct MonitorHandle {
    stop: CancellationToken,
    tasks: TaskTracker,
}

impl MonitorHandle {
    /// Stops every monitor and waits for their streams to flush.
    pub async fn stop(self) {
        self.stop.cancel();
        self.tasks.wait().await;
    }

    /// Waits until the monitors stop on their own.
    pub async fn wait(&self) {
        self.tasks.wait().await;
    }
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            signal = termination_signal() => match signal {
                Ok(name) => {
                    info!(signal = name, "termination signal received, stopping log collection");
                    shutdown.cancel();
                }
                Err(err) => warn!(error = ?err, "failed to install signal handlers"),
            },
            () = shutdown.cancelled() => {}
        }
    });
}

#[cfg(unix)]
async fn termination_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
        _ = quit.recv() => "SIGQUIT",
    })
}

#[cfg(not(unix))]
async fn termination_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf, time::Duration};

    use super::*;
    use crate::{
        artifacts::LogVariant,
        fake::{FakeCluster, RecordingDumpTool},
        infrastructure::cluster::PodEvent,
    };

    fn config(root: &std::path::Path) -> CollectionConfig {
        CollectionConfig {
            artifacts_dir: root.to_path_buf(),
            timeout: Duration::from_secs(1),
            dump_timeout: Duration::from_secs(1),
            worker_count: 2,
            ..CollectionConfig::default()
        }
    }

    fn collector(
        root: &std::path::Path,
        fake: &Arc<FakeCluster>,
        tool: &Arc<RecordingDumpTool>,
    ) -> Arc<LogCollector> {
        let cluster = ClusterHandle::new(0, PathBuf::from("/kubeconfig"), fake.clone());
        Arc::new(LogCollector::new(config(root), vec![cluster], tool.clone()).unwrap())
    }

    #[tokio::test]
    async fn finalized_capture_dumps_and_saves_pod_logs() {
        let root = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCluster::new());
        fake.add_namespace("ns-a", true);
        let pod = fake.add_pod("ns-a", "nsc-1", &["nsc"], &[]);
        fake.set_logs(&pod.pod, "nsc", LogVariant::Current, "ready\n");
        fake.add_pod("default", "unrelated", &["app"], &[]);
        let tool = Arc::new(RecordingDumpTool::new());
        let collector = collector(root.path(), &fake, &tool);

        let summary = collector.capture("basic").finalize().await;

        assert_eq!(summary.dumps.len(), 1);
        assert_eq!(summary.pods.len(), 1);
        let label_dir = root.path().join("cluster0").join("basic");
        assert_eq!(
            fs::read_to_string(label_dir.join("nsc-1.log")).unwrap(),
            "ready\n"
        );
        assert!(label_dir.join("describe-ns-a.log").exists());
        collector.shutdown().await;
    }

    #[tokio::test]
    async fn no_clusters_means_disabled() {
        let root = tempfile::tempdir().unwrap();
        let tool: Arc<dyn DumpTool> = Arc::new(RecordingDumpTool::new());
        let collector = Arc::new(LogCollector::new(config(root.path()), Vec::new(), tool).unwrap());

        assert!(!collector.is_enabled());
        let summary = collector.capture("basic").finalize().await;
        assert!(summary.dumps.is_empty() && summary.pods.is_empty());
        assert!(collector.cluster_dump("basic").await.is_empty());
        collector
            .monitor_namespaces(CancellationToken::new(), "suite")
            .stop()
            .await;
    }

    #[tokio::test]
    async fn disabled_config_skips_all_work() {
        let root = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCluster::new());
        fake.add_namespace("ns-a", true);
        let tool = Arc::new(RecordingDumpTool::new());
        let cluster = ClusterHandle::new(0, PathBuf::from("/kubeconfig"), fake.clone());
        let config = CollectionConfig {
            enabled: false,
            ..config(root.path())
        };
        let collector = Arc::new(LogCollector::new(config, vec![cluster], tool.clone()).unwrap());

        assert!(collector.cluster_dump("basic").await.is_empty());
        assert!(tool.dump_calls().is_empty());
    }

    #[tokio::test]
    async fn monitor_stops_when_caller_token_fires() {
        let root = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCluster::new());
        let web = fake.add_pod("ns-a", "web", &["app"], &[]);
        fake.set_follow_lines(&web.pod, "app", &["streamed"], true);
        let tool = Arc::new(RecordingDumpTool::new());
        let collector = collector(root.path(), &fake, &tool);

        let token = CancellationToken::new();
        let handle = collector.monitor_namespaces(token.clone(), "suite");
        fake.emit(PodEvent::Added(web));
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.wait().await;

        let path = root
            .path()
            .join("cluster0")
            .join("suite")
            .join("ns-a")
            .join("web-app.log");
        assert_eq!(fs::read_to_string(path).unwrap(), "streamed\n");
    }

    #[tokio::test]
    async fn invalid_pattern_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let config = CollectionConfig {
            test_namespaces: "ns-(".to_owned(),
            ..config(root.path())
        };
        let tool: Arc<dyn DumpTool> = Arc::new(RecordingDumpTool::new());

        let err = LogCollector::new(config, Vec::new(), tool).err().unwrap();

        assert!(matches!(err, CollectorInitError::Classifier(_)));
    }
}
