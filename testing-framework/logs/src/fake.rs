//! In-memory stand-ins for a cluster and the diagnostics tool, used by unit
//! tests and, through the `testing` feature, by workspace integration tests.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use futures::{StreamExt as _, channel::mpsc, stream};

use crate::{
    artifacts::LogVariant,
    infrastructure::{
        cluster::{
            ClusterApi, ClusterError, LogLines, LogRequest, NamespaceInfo, PodEvent, PodEvents,
            PodInfo, PodRef,
        },
        dump_tool::{DumpTool, DumpToolError},
    },
};

type WatchItem = Result<PodEvent, ClusterError>;

#[derive(Default)]
struct FakeState {
    namespaces: Vec<NamespaceInfo>,
    fail_namespaces: bool,
    pods: Vec<PodInfo>,
    logs: HashMap<(PodRef, String, bool), String>,
    log_requests: HashMap<PodRef, usize>,
    follow: HashMap<(PodRef, String), (Vec<String>, bool)>,
    follow_failures: HashMap<PodRef, usize>,
    follow_opens: HashMap<PodRef, usize>,
}

/// Scriptable [`ClusterApi`]. Pod events pushed with [`FakeCluster::emit`]
/// are delivered to the first caller of `watch_pods`.
pub struct FakeCluster {
    state: Mutex<FakeState>,
    events: Mutex<Option<mpsc::UnboundedSender<WatchItem>>>,
    watch: Mutex<Option<mpsc::UnboundedReceiver<WatchItem>>>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    #[must_use]
    pub fn new() -> Self {
        let (events, watch) = mpsc::unbounded();
        Self {
            state: Mutex::new(FakeState::default()),
            events: Mutex::new(Some(events)),
            watch: Mutex::new(Some(watch)),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        lock(&self.state)
    }

    pub fn add_namespace(&self, name: &str, active: bool) {
        self.state().namespaces.push(NamespaceInfo {
            name: name.to_owned(),
            active,
        });
    }

    /// Makes every namespace listing fail.
    pub fn fail_namespace_listing(&self) {
        self.state().fail_namespaces = true;
    }

    pub fn add_pod(
        &self,
        namespace: &str,
        name: &str,
        containers: &[&str],
        init_containers: &[&str],
    ) -> PodInfo {
        let pod = PodInfo {
            pod: PodRef::new(namespace, name),
            containers: containers.iter().map(|c| (*c).to_owned()).collect(),
            init_containers: init_containers.iter().map(|c| (*c).to_owned()).collect(),
        };
        self.state().pods.push(pod.clone());
        pod
    }

    /// Snapshot logs served for one container. Unset logs fail to fetch.
    pub fn set_logs(
        &self,
        pod: &PodRef,
        container: &str,
        variant: LogVariant,
        logs: impl Into<String>,
    ) {
        self.state().logs.insert(
            (pod.clone(), container.to_owned(), variant.is_previous()),
            logs.into(),
        );
    }

    #[must_use]
    pub fn log_requests(&self, pod: &PodRef) -> usize {
        self.state().log_requests.get(pod).copied().unwrap_or(0)
    }

    /// Lines a follow stream yields. With `keep_open` the stream stays open
    /// after the last line instead of ending.
    pub fn set_follow_lines(&self, pod: &PodRef, container: &str, lines: &[&str], keep_open: bool) {
        self.state().follow.insert(
            (pod.clone(), container.to_owned()),
            (lines.iter().map(|l| (*l).to_owned()).collect(), keep_open),
        );
    }

    /// Fails the next `attempts` stream opens for a pod.
    pub fn fail_follow_opens(&self, pod: &PodRef, attempts: usize) {
        self.state().follow_failures.insert(pod.clone(), attempts);
    }

    #[must_use]
    pub fn follow_opens(&self, pod: &PodRef) -> usize {
        self.state().follow_opens.get(pod).copied().unwrap_or(0)
    }

    pub fn emit(&self, event: PodEvent) {
        if let Some(events) = lock(&self.events).as_ref() {
            let _ = events.unbounded_send(Ok(event));
        }
    }

    pub fn emit_error(&self, message: &str) {
        if let Some(events) = lock(&self.events).as_ref() {
            let _ = events.unbounded_send(Err(unavailable(message)));
        }
    }

    /// Ends the watch stream once queued events are consumed.
    pub fn end_watch(&self) {
        lock(&self.events).take();
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, ClusterError> {
        let state = self.state();
        if state.fail_namespaces {
            return Err(unavailable("namespace listing disabled"));
        }
        Ok(state.namespaces.clone())
    }

    async fn list_pods(&self) -> Result<Vec<PodInfo>, ClusterError> {
        Ok(self.state().pods.clone())
    }

    async fn pod_logs(
        &self,
        pod: &PodRef,
        request: LogRequest<'_>,
    ) -> Result<String, ClusterError> {
        let mut state = self.state();
        *state.log_requests.entry(pod.clone()).or_default() += 1;
        let key = (
            pod.clone(),
            request.container.to_owned(),
            request.variant.is_previous(),
        );
        state
            .logs
            .get(&key)
            .cloned()
            .ok_or_else(|| unavailable("no logs recorded"))
    }

    async fn follow_logs(&self, pod: &PodRef, container: &str) -> Result<LogLines, ClusterError> {
        let mut state = self.state();
        *state.follow_opens.entry(pod.clone()).or_default() += 1;

        if let Some(remaining) = state.follow_failures.get_mut(pod)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(unavailable("container not started"));
        }

        let Some((lines, keep_open)) = state
            .follow
            .get(&(pod.clone(), container.to_owned()))
            .cloned()
        else {
            return Err(unavailable("container not started"));
        };

        let lines = stream::iter(lines.into_iter().map(Ok::<_, ClusterError>));
        Ok(if keep_open {
            lines.chain(stream::pending()).boxed()
        } else {
            lines.boxed()
        })
    }

    fn watch_pods(&self) -> PodEvents {
        match lock(&self.watch).take() {
            Some(watch) => watch.boxed(),
            None => stream::pending().boxed(),
        }
    }
}

/// One `cluster_info_dump` call seen by [`RecordingDumpTool`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpCall {
    pub kubeconfig: PathBuf,
    pub namespaces: Vec<String>,
    pub output_dir: PathBuf,
}

/// [`DumpTool`] that records invocations and writes small placeholder
/// artifacts instead of running `kubectl`.
#[derive(Default)]
pub struct RecordingDumpTool {
    delay: Duration,
    dumps: Mutex<Vec<DumpCall>>,
    describes: Mutex<Vec<String>>,
}

impl RecordingDumpTool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds each cluster-info dump for `delay` before returning.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn dump_calls(&self) -> Vec<DumpCall> {
        lock(&self.dumps).clone()
    }

    #[must_use]
    pub fn describe_calls(&self) -> Vec<String> {
        lock(&self.describes).clone()
    }
}

#[async_trait]
impl DumpTool for RecordingDumpTool {
    async fn cluster_info_dump(
        &self,
        kubeconfig: &Path,
        namespaces: &[String],
        output_dir: &Path,
    ) -> Result<(), DumpToolError> {
        lock(&self.dumps).push(DumpCall {
            kubeconfig: kubeconfig.to_path_buf(),
            namespaces: namespaces.to_vec(),
            output_dir: output_dir.to_path_buf(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let command = "fake cluster-info dump".to_owned();
        fs::create_dir_all(output_dir)
            .and_then(|()| fs::write(output_dir.join("cluster-info.txt"), namespaces.join("\n")))
            .map_err(|source| DumpToolError::Spawn { command, source })
    }

    async fn describe_pods(
        &self,
        _kubeconfig: &Path,
        namespace: &str,
    ) -> Result<Vec<u8>, DumpToolError> {
        lock(&self.describes).push(namespace.to_owned());
        Ok(format!("describe {namespace}\n").into_bytes())
    }
}

fn unavailable(message: &str) -> ClusterError {
    ClusterError::Unavailable {
        message: message.to_owned(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
