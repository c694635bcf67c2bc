//! Shared fixtures for the workspace integration tests: a log collector wired
//! to in-memory clusters and a recording dump tool, writing below a temporary
//! artifact root.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tempfile::TempDir;
use testing_framework_config::CollectionConfig;
use testing_framework_logs::{
    ClusterHandle, LogCollector,
    fake::{FakeCluster, RecordingDumpTool},
};

pub struct Fixture {
    pub root: TempDir,
    pub clusters: Vec<Arc<FakeCluster>>,
    pub tool: Arc<RecordingDumpTool>,
    pub collector: Arc<LogCollector>,
}

impl Fixture {
    /// Builds a collector over `clusters` fake clusters. Must be called
    /// within a tokio runtime.
    pub fn new(clusters: usize) -> Self {
        let root = tempfile::tempdir().expect("temporary artifact root");
        let fakes: Vec<_> = (0..clusters).map(|_| Arc::new(FakeCluster::new())).collect();
        let handles = fakes
            .iter()
            .enumerate()
            .map(|(ordinal, fake)| {
                ClusterHandle::new(
                    ordinal,
                    PathBuf::from(format!("/kubeconfig{ordinal}")),
                    fake.clone(),
                )
            })
            .collect();
        let tool = Arc::new(RecordingDumpTool::new());
        let config = CollectionConfig {
            artifacts_dir: root.path().to_path_buf(),
            timeout: Duration::from_secs(2),
            dump_timeout: Duration::from_secs(2),
            worker_count: 4,
            ..CollectionConfig::default()
        };
        let collector = LogCollector::new(config, handles, tool.clone())
            .expect("default namespace patterns compile");

        Self {
            root,
            clusters: fakes,
            tool,
            collector: Arc::new(collector),
        }
    }

    /// `<root>/cluster<N>/<label>`.
    pub fn label_dir(&self, cluster: usize, label: &str) -> PathBuf {
        self.root
            .path()
            .join(format!("cluster{cluster}"))
            .join(label)
    }
}
