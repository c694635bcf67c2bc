use std::{collections::HashSet, sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::StreamExt as _;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use super::stream::ContainerStream;
use crate::{
    artifacts::{ArtifactPaths, LogVariant},
    infrastructure::cluster::{ClusterHandle, PodEvent, PodInfo, PodRef},
    namespaces::{NamespaceClass, NamespaceClassifier},
};

/// Watches one cluster's pods and keeps a follow-mode log stream running for
/// every container of every pod in a test namespace.
pub struct NamespaceMonitor {
    cluster: ClusterHandle,
    classifier: Arc<NamespaceClassifier>,
    paths: ArtifactPaths,
    label: String,
    open_timeout: Duration,
    retry_interval: Duration,
    tracked: DashMap<PodRef, CancellationToken>,
    streams: TaskTracker,
}

impl NamespaceMonitor {
    #[must_use]
    pub fn new(
        cluster: ClusterHandle,
        classifier: Arc<NamespaceClassifier>,
        paths: ArtifactPaths,
        label: impl Into<String>,
        open_timeout: Duration,
        retry_interval: Duration,
    ) -> Self {
        Self {
            cluster,
            classifier,
            paths,
            label: label.into(),
            open_timeout,
            retry_interval,
            tracked: DashMap::new(),
            streams: TaskTracker::new(),
        }
    }

    /// Number of pods with live streams.
    #[must_use]
    pub fn tracked_pods(&self) -> usize {
        self.tracked.len()
    }

    /// Processes watch events until `shutdown` fires or the watch ends, then
    /// cancels every stream and waits for them to flush.
    pub async fn run(&self, shutdown: CancellationToken) {
        let cluster = self.cluster.ordinal();
        info!(cluster, label = %self.label, "monitoring namespaces");
        let mut events = self.cluster.api().watch_pods();

        loop {
            let event = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                event = events.next() => event,
            };
            match event {
                Some(Ok(PodEvent::Added(pod))) => self.track(&pod, &shutdown),
                Some(Ok(PodEvent::Deleted(pod))) => self.untrack(&pod.pod),
                Some(Ok(PodEvent::Resynced(pods))) => self.resync(&pods, &shutdown),
                Some(Err(err)) => warn!(cluster, error = ?err, "pod watch error"),
                None => {
                    debug!(cluster, "pod watch ended");
                    break;
                }
            }
        }
        drop(events);

        self.stop().await;
        info!(cluster, label = %self.label, "namespace monitoring stopped");
    }

    /// Starts streams for a pod unless it is already tracked or outside the
    /// test namespaces.
    fn track(&self, pod: &PodInfo, shutdown: &CancellationToken) {
        if !self
            .classifier
            .matches(&pod.pod.namespace, NamespaceClass::Test)
        {
            return;
        }

        let Entry::Vacant(slot) = self.tracked.entry(pod.pod.clone()) else {
            return;
        };
        let token = shutdown.child_token();
        slot.insert(token.clone());
        debug!(cluster = self.cluster.ordinal(), pod = %pod.pod, "tracking pod");

        for container in &pod.containers {
            let stream = ContainerStream {
                cluster: self.cluster.clone(),
                pod: pod.pod.clone(),
                container: container.clone(),
                path: self.paths.pod_log(
                    self.cluster.ordinal(),
                    &self.label,
                    Some(&pod.pod.namespace),
                    &pod.pod.name,
                    Some(container),
                    LogVariant::Current,
                ),
                open_timeout: self.open_timeout,
                retry_interval: self.retry_interval,
            };
            self.streams.spawn(stream.run(token.clone()));
        }
    }

    fn untrack(&self, pod: &PodRef) {
        if let Some((_, token)) = self.tracked.remove(pod) {
            debug!(cluster = self.cluster.ordinal(), %pod, "untracking pod");
            token.cancel();
        }
    }

    /// Tracks every listed pod and drops the ones that disappeared.
    fn resync(&self, pods: &[PodInfo], shutdown: &CancellationToken) {
        let present: HashSet<&PodRef> = pods.iter().map(|pod| &pod.pod).collect();
        let gone: Vec<PodRef> = self
            .tracked
            .iter()
            .filter(|entry| !present.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        for pod in &gone {
            self.untrack(pod);
        }
        for pod in pods {
            self.track(pod, shutdown);
        }
    }

    async fn stop(&self) {
        let pods: Vec<PodRef> = self.tracked.iter().map(|e| e.key().clone()).collect();
        for pod in &pods {
            self.untrack(pod);
        }
        self.streams.close();
        self.streams.wait().await;
    }
}
