use std::{env, path::PathBuf};

#[must_use]
pub fn slow_test_env() -> bool {
    env::var("SLOW_TEST_ENV").is_ok_and(|s| s == "true")
}

#[must_use]
pub fn artifacts_dir() -> Option<String> {
    non_empty("ARTIFACTS_DIR")
}

#[must_use]
pub fn logs_timeout() -> Option<String> {
    non_empty("LOGS_TIMEOUT")
}

#[must_use]
pub fn logs_dump_timeout() -> Option<String> {
    non_empty("LOGS_DUMP_TIMEOUT")
}

#[must_use]
pub fn logs_worker_count() -> Option<String> {
    non_empty("LOGS_WORKER_COUNT")
}

#[must_use]
pub fn logs_max_kube_configs() -> Option<String> {
    non_empty("LOGS_MAX_KUBE_CONFIGS")
}

#[must_use]
pub fn logs_allowed_namespaces() -> Option<String> {
    non_empty("LOGS_ALLOWED_NAMESPACES")
}

/// Unlike the other accessors an empty value is returned as-is: it switches
/// the system namespace class off.
#[must_use]
pub fn logs_system_namespaces() -> Option<String> {
    env::var("LOGS_SYSTEM_NAMESPACES").ok()
}

#[must_use]
pub fn logs_enabled() -> Option<String> {
    non_empty("LOGS_ENABLED")
}

#[must_use]
pub fn kubeconfig() -> Option<PathBuf> {
    non_empty("KUBECONFIG").map(PathBuf::from)
}

/// `KUBECONFIG1`, `KUBECONFIG2`, ...
#[must_use]
pub fn numbered_kubeconfig(index: usize) -> Option<PathBuf> {
    non_empty(&format!("KUBECONFIG{index}")).map(PathBuf::from)
}

#[must_use]
pub fn home_dir() -> Option<PathBuf> {
    non_empty("HOME").map(PathBuf::from)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
