pub mod artifacts;
pub mod collector;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod infrastructure;
pub mod lifecycle;
pub mod namespaces;
pub mod single_flight;
mod suite;

pub use artifacts::{ArtifactPaths, LogVariant};
pub use collector::{
    Capture, CaptureSummary, CollectorInitError, LogCollector, MonitorHandle, capture,
    cluster_dump, initialize, monitor_namespaces,
};
pub use infrastructure::cluster::{ClusterApi, ClusterError, ClusterHandle, PodEvent, PodInfo, PodRef};
pub use lifecycle::dump::DumpReport;
pub use namespaces::{NamespaceClass, NamespaceClassifier};
pub use suite::LogsSuite;
