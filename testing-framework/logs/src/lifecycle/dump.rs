use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::join_all;
use tracing::{info, warn};

use crate::{
    artifacts::{ArtifactPaths, save_artifact},
    infrastructure::{
        cluster::{ClusterHandle, with_timeout},
        dump_tool::DumpTool,
    },
    namespaces::{NamespaceClass, NamespaceClassifier},
    single_flight::SingleFlight,
};

/// Outcome of one cluster dump run, shared with every caller that joined it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DumpReport {
    pub cluster: usize,
    /// Label of the call that started the run.
    pub label: String,
    pub test_namespaces: Vec<String>,
    pub system_namespaces: Vec<String>,
    pub tool_invocations: usize,
    pub failures: usize,
}

/// Dumps one cluster. Concurrent calls collapse into the running dump.
struct ClusterDumper {
    cluster: ClusterHandle,
    tool: Arc<dyn DumpTool>,
    classifier: Arc<NamespaceClassifier>,
    paths: ArtifactPaths,
    timeout: Duration,
    system_dumps: AtomicUsize,
    flight: SingleFlight<DumpReport>,
}

impl ClusterDumper {
    async fn dump(self: &Arc<Self>, label: &str) -> Option<DumpReport> {
        let dumper = Arc::clone(self);
        let owned = label.to_owned();
        match self.flight.run(|| async move { dumper.run(owned).await }).await {
            Ok(report) => {
                if report.label != label {
                    info!(
                        cluster = self.cluster.ordinal(),
                        label,
                        dumped_under = %report.label,
                        "joined in-flight cluster dump started under another label"
                    );
                }
                Some(report)
            }
            Err(err) => {
                warn!(cluster = self.cluster.ordinal(), error = ?err, "cluster dump aborted");
                None
            }
        }
    }

    async fn run(&self, label: String) -> DumpReport {
        let ordinal = self.cluster.ordinal();
        let mut report = DumpReport {
            cluster: ordinal,
            label,
            ..DumpReport::default()
        };

        let namespaces = match with_timeout(
            "namespace list",
            self.timeout,
            self.cluster.api().list_namespaces(),
        )
        .await
        {
            Ok(namespaces) => namespaces,
            Err(err) => {
                warn!(cluster = ordinal, error = ?err, "failed to list namespaces for dump");
                report.failures += 1;
                return report;
            }
        };

        for namespace in namespaces.into_iter().filter(|ns| ns.active) {
            match self.classifier.classify(&namespace.name) {
                Some(NamespaceClass::Test) => report.test_namespaces.push(namespace.name),
                Some(NamespaceClass::System) => report.system_namespaces.push(namespace.name),
                None => {}
            }
        }

        if !report.test_namespaces.is_empty() {
            let dir = self.paths.label_dir(ordinal, &report.label);
            let namespaces = report.test_namespaces.clone();
            self.dump_namespaces(&namespaces, &dir, &mut report).await;
        }
        if !report.system_namespaces.is_empty() {
            let occurrence = self.system_dumps.fetch_add(1, Ordering::SeqCst);
            let dir = self
                .paths
                .system_dump_dir(ordinal, &report.label, occurrence);
            let namespaces = report.system_namespaces.clone();
            self.dump_namespaces(&namespaces, &dir, &mut report).await;
        }

        info!(
            cluster = ordinal,
            label = %report.label,
            test_namespaces = report.test_namespaces.len(),
            system_namespaces = report.system_namespaces.len(),
            failures = report.failures,
            "cluster dump finished"
        );
        report
    }

    async fn dump_namespaces(&self, namespaces: &[String], dir: &Path, report: &mut DumpReport) {
        let ordinal = self.cluster.ordinal();
        let kubeconfig = self.cluster.kubeconfig();

        report.tool_invocations += 1;
        if let Err(err) = self
            .tool
            .cluster_info_dump(kubeconfig, namespaces, dir)
            .await
        {
            warn!(cluster = ordinal, dir = %dir.display(), error = ?err, "cluster-info dump failed");
            report.failures += 1;
        }

        for namespace in namespaces {
            report.tool_invocations += 1;
            let describe = match self.tool.describe_pods(kubeconfig, namespace).await {
                Ok(describe) => describe,
                Err(err) => {
                    warn!(cluster = ordinal, namespace, error = ?err, "describe pods failed");
                    report.failures += 1;
                    continue;
                }
            };
            let path = self.paths.describe_log(dir, namespace);
            if let Err(err) = save_artifact(path.clone(), describe).await {
                warn!(cluster = ordinal, path = %path.display(), error = ?err, "failed to save describe output");
                report.failures += 1;
            }
        }
    }
}

/// Runs cluster dumps across every registered cluster concurrently.
pub struct DumpCoordinator {
    dumpers: Vec<Arc<ClusterDumper>>,
}

impl DumpCoordinator {
    #[must_use]
    pub fn new(
        clusters: &[ClusterHandle],
        tool: Arc<dyn DumpTool>,
        classifier: Arc<NamespaceClassifier>,
        paths: ArtifactPaths,
        timeout: Duration,
    ) -> Self {
        let dumpers = clusters
            .iter()
            .map(|cluster| {
                Arc::new(ClusterDumper {
                    cluster: cluster.clone(),
                    tool: Arc::clone(&tool),
                    classifier: Arc::clone(&classifier),
                    paths: paths.clone(),
                    timeout,
                    system_dumps: AtomicUsize::new(0),
                    flight: SingleFlight::new(),
                })
            })
            .collect();
        Self { dumpers }
    }

    /// Dumps every cluster under `label`, returning one report per cluster
    /// whose dump completed.
    pub async fn cluster_dump(&self, label: &str) -> Vec<DumpReport> {
        join_all(self.dumpers.iter().map(|dumper| dumper.dump(label)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}
