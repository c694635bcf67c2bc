use std::{env, time::Duration};

use serial_test::serial;
use testing_framework_logs::{CollectorInitError, LogCollector};

const KEYS: [&str; 5] = [
    "ARTIFACTS_DIR",
    "LOGS_ENABLED",
    "LOGS_TIMEOUT",
    "LOGS_WORKER_COUNT",
    "LOGS_SYSTEM_NAMESPACES",
];

/// Sets the given variables for the duration of a test and clears every
/// collection variable afterwards.
struct EnvGuard;

impl EnvGuard {
    fn set(vars: &[(&str, &str)]) -> Self {
        clear();
        for (key, value) in vars {
            // SAFETY: tests touching the environment are serialized.
            unsafe { env::set_var(key, value) };
        }
        Self
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        clear();
    }
}

fn clear() {
    for key in KEYS {
        // SAFETY: tests touching the environment are serialized.
        unsafe { env::remove_var(key) };
    }
}

#[tokio::test]
#[serial]
async fn disabled_collection_never_touches_clusters() {
    let _env = EnvGuard::set(&[("LOGS_ENABLED", "false"), ("ARTIFACTS_DIR", "artifacts")]);

    let collector = LogCollector::from_env().await.unwrap();

    assert!(!collector.is_enabled());
    assert!(collector.clusters().is_empty());
    assert!(collector.cluster_dump("suite").await.is_empty());
    let expected = env::current_dir().unwrap().join("artifacts");
    assert_eq!(collector.config().artifacts_dir, expected);
}

#[tokio::test]
#[serial]
async fn environment_overrides_are_applied() {
    let _env = EnvGuard::set(&[
        ("LOGS_ENABLED", "false"),
        ("LOGS_TIMEOUT", "1m30s"),
        ("LOGS_WORKER_COUNT", "2"),
        ("LOGS_SYSTEM_NAMESPACES", ""),
    ]);

    let collector = LogCollector::from_env().await.unwrap();
    let config = collector.config();

    assert_eq!(config.worker_count, 2);
    assert!(config.system_namespaces.is_none());
    assert!(config.timeout >= Duration::from_secs(90));
}

#[tokio::test]
#[serial]
async fn malformed_setting_is_fatal() {
    let _env = EnvGuard::set(&[("LOGS_TIMEOUT", "soon")]);

    let err = LogCollector::from_env().await.err().unwrap();

    assert!(matches!(err, CollectorInitError::Config(_)), "{err}");
}
