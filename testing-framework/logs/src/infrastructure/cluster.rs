use std::{
    fmt,
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::artifacts::LogVariant;

/// Failures talking to one cluster. Always recoverable: callers log and move
/// on to the remaining work.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("kubernetes API request failed: {source}")]
    Api {
        #[source]
        source: kube::Error,
    },
    #[error("pod watch failed: {source}")]
    Watch {
        #[source]
        source: kube::runtime::watcher::Error,
    },
    #[error("reading log stream failed: {source}")]
    Stream {
        #[source]
        source: io::Error,
    },
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("{message}")]
    Unavailable { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub name: String,
    /// False while the namespace is terminating.
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

impl PodRef {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodInfo {
    pub pod: PodRef,
    pub containers: Vec<String>,
    pub init_containers: Vec<String>,
}

/// Snapshot log query for one container.
#[derive(Clone, Copy, Debug)]
pub struct LogRequest<'a> {
    pub container: &'a str,
    pub variant: LogVariant,
    /// Only return lines written at or after this instant.
    pub since: Option<SystemTime>,
}

#[derive(Clone, Debug)]
pub enum PodEvent {
    Added(PodInfo),
    Deleted(PodInfo),
    /// The watch relisted; carries every pod that currently exists.
    Resynced(Vec<PodInfo>),
}

pub type LogLines = BoxStream<'static, Result<String, ClusterError>>;
pub type PodEvents = BoxStream<'static, Result<PodEvent, ClusterError>>;

/// The slice of the Kubernetes API log collection needs.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, ClusterError>;

    async fn list_pods(&self) -> Result<Vec<PodInfo>, ClusterError>;

    async fn pod_logs(&self, pod: &PodRef, request: LogRequest<'_>)
    -> Result<String, ClusterError>;

    /// Opens a follow-mode stream of log lines for one container.
    async fn follow_logs(&self, pod: &PodRef, container: &str) -> Result<LogLines, ClusterError>;

    fn watch_pods(&self) -> PodEvents;
}

/// One reachable cluster. Immutable once the registry has built it.
#[derive(Clone)]
pub struct ClusterHandle {
    ordinal: usize,
    kubeconfig: PathBuf,
    api: Arc<dyn ClusterApi>,
}

impl ClusterHandle {
    #[must_use]
    pub fn new(ordinal: usize, kubeconfig: PathBuf, api: Arc<dyn ClusterApi>) -> Self {
        Self {
            ordinal,
            kubeconfig,
            api,
        }
    }

    /// Stable index used in artifact paths (`cluster<N>`).
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    #[must_use]
    pub fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }

    #[must_use]
    pub fn api(&self) -> &dyn ClusterApi {
        self.api.as_ref()
    }
}

impl fmt::Debug for ClusterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterHandle")
            .field("ordinal", &self.ordinal)
            .field("kubeconfig", &self.kubeconfig)
            .finish_non_exhaustive()
    }
}

/// Bounds a cluster call, turning expiry into a recoverable error.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, ClusterError>
where
    F: Future<Output = Result<T, ClusterError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ClusterError::Timeout { operation, timeout })?
}
