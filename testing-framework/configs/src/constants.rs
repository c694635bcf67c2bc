use std::time::Duration;

/// Default artifact root, relative to the working directory.
pub const DEFAULT_ARTIFACTS_DIR: &str = "logs";

/// Default timeout applied to every Kubernetes query.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a single dump tool invocation.
pub const DEFAULT_DUMP_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of log collector workers.
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// Default number of numbered kubeconfigs (`KUBECONFIG1..N`) considered.
pub const DEFAULT_MAX_KUBE_CONFIGS: usize = 3;

/// Default pattern for ephemeral test namespaces.
pub const DEFAULT_TEST_NAMESPACES: &str = "(ns-.*)";

/// Default pattern for persistent system namespaces.
pub const DEFAULT_SYSTEM_NAMESPACES: &str = "(nsm-system)|(spire)|(observability)";

/// Requests per second granted to each worker when sizing a cluster's
/// request budget.
pub const REQUESTS_PER_WORKER: u32 = 500;

/// Burst allowance as a multiple of the steady request rate.
pub const REQUEST_BURST_MULTIPLIER: u32 = 2;

/// Delay between attempts to open a follow-mode log stream.
pub const STREAM_RETRY_INTERVAL: Duration = Duration::from_millis(300);

/// Client authentication API versions tried, in order, for `exec` credentials.
pub const CLIENT_AUTH_API_VERSIONS: [&str; 3] = [
    "client.authentication.k8s.io/v1",
    "client.authentication.k8s.io/v1beta1",
    "client.authentication.k8s.io/v1alpha1",
];
