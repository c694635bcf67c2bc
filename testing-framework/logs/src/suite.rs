use std::sync::Arc;

use async_trait::async_trait;
use testing_framework_core::{
    DynError,
    suite::{
        AfterTestHook, BeforeTestHook, SetupHook, SuiteComponent, TearDownHook, TestInfo,
        TestOutcome,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collector::{self, Capture, LogCollector, MonitorHandle};

/// Suite component collecting logs for a whole suite: namespaces are
/// monitored from setup to teardown, and a failed test gets a cluster dump
/// plus the pod logs written while it ran.
#[derive(Default)]
pub struct LogsSuite {
    collector: Option<Arc<LogCollector>>,
    monitor: Option<MonitorHandle>,
    capture: Option<Capture>,
}

impl LogsSuite {
    /// Uses the process-wide collector, built on suite setup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an already built collector instead of the process-wide one.
    #[must_use]
    pub fn with_collector(collector: Arc<LogCollector>) -> Self {
        Self {
            collector: Some(collector),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SetupHook for LogsSuite {
    async fn setup_suite(&mut self, suite: &str) -> Result<(), DynError> {
        let collector = match &self.collector {
            Some(collector) => Arc::clone(collector),
            None => collector::initialize().await?,
        };
        info!(
            suite,
            artifacts_dir = %collector.config().artifacts_dir.display(),
            clusters = collector.clusters().len(),
            enabled = collector.is_enabled(),
            "log collection ready"
        );

        self.monitor = Some(collector.monitor_namespaces(CancellationToken::new(), suite));
        self.collector = Some(collector);
        Ok(())
    }
}

#[async_trait]
impl BeforeTestHook for LogsSuite {
    async fn before_test(&mut self, test: TestInfo<'_>) {
        if let Some(collector) = &self.collector {
            self.capture = Some(collector.capture(&test.label()));
        }
    }
}

#[async_trait]
impl AfterTestHook for LogsSuite {
    async fn after_test(&mut self, test: TestInfo<'_>, outcome: TestOutcome) {
        let capture = self.capture.take();
        if !outcome.failed() {
            return;
        }
        let Some(collector) = &self.collector else {
            return;
        };

        let label = test.label();
        info!(label = %label, "test failed, collecting diagnostics");
        match capture {
            Some(capture) => {
                capture.finalize().await;
            }
            None => {
                collector.cluster_dump(&label).await;
            }
        }
    }
}

#[async_trait]
impl TearDownHook for LogsSuite {
    async fn tear_down_suite(&mut self, suite: &str) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop().await;
            info!(suite, "namespace monitoring stopped");
        }
    }
}

impl SuiteComponent for LogsSuite {
    fn name(&self) -> &str {
        "logs"
    }

    fn setup_hook(&mut self) -> Option<&mut dyn SetupHook> {
        Some(self)
    }

    fn before_test_hook(&mut self) -> Option<&mut dyn BeforeTestHook> {
        Some(self)
    }

    fn after_test_hook(&mut self) -> Option<&mut dyn AfterTestHook> {
        Some(self)
    }

    fn tear_down_hook(&mut self) -> Option<&mut dyn TearDownHook> {
        Some(self)
    }
}
