use std::{
    fmt, io,
    path::{Path, PathBuf},
    time::Duration,
};

use testing_framework_env as tf_env;
use thiserror::Error;

use crate::{
    adjust_timeout,
    constants::{
        DEFAULT_ARTIFACTS_DIR, DEFAULT_DUMP_TIMEOUT, DEFAULT_MAX_KUBE_CONFIGS,
        DEFAULT_OPERATION_TIMEOUT, DEFAULT_SYSTEM_NAMESPACES, DEFAULT_TEST_NAMESPACES,
        DEFAULT_WORKER_COUNT, REQUEST_BURST_MULTIPLIER, REQUESTS_PER_WORKER,
    },
    timeouts::{DurationParseError, parse_duration},
};

/// Failures while reading the collection settings. All of them are fatal at
/// initialization.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a valid duration: {source}")]
    Duration {
        key: &'static str,
        value: String,
        #[source]
        source: DurationParseError,
    },
    #[error("{key}={value:?} is not a valid number")]
    Number { key: &'static str, value: String },
    #[error("{key}={value:?} is not a boolean (expected true/false/1/0)")]
    Bool { key: &'static str, value: String },
    #[error("LOGS_WORKER_COUNT must be at least 1")]
    NoWorkers,
    #[error("failed to resolve working directory for ARTIFACTS_DIR: {source}")]
    WorkingDir {
        #[source]
        source: io::Error,
    },
}

/// Unparsed settings exactly as found in the environment.
#[derive(Clone, Debug, Default)]
pub struct RawSettings {
    pub artifacts_dir: Option<String>,
    pub timeout: Option<String>,
    pub dump_timeout: Option<String>,
    pub worker_count: Option<String>,
    pub max_kube_configs: Option<String>,
    pub test_namespaces: Option<String>,
    pub system_namespaces: Option<String>,
    pub enabled: Option<String>,
}

impl RawSettings {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            artifacts_dir: tf_env::artifacts_dir(),
            timeout: tf_env::logs_timeout(),
            dump_timeout: tf_env::logs_dump_timeout(),
            worker_count: tf_env::logs_worker_count(),
            max_kube_configs: tf_env::logs_max_kube_configs(),
            test_namespaces: tf_env::logs_allowed_namespaces(),
            system_namespaces: tf_env::logs_system_namespaces(),
            enabled: tf_env::logs_enabled(),
        }
    }
}

/// Process-wide log collection settings. Loaded once, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Absolute artifact root.
    pub artifacts_dir: PathBuf,
    /// Bound on every Kubernetes query.
    pub timeout: Duration,
    /// Bound on each dump tool invocation.
    pub dump_timeout: Duration,
    pub worker_count: usize,
    pub max_kube_configs: usize,
    /// Regex selecting ephemeral test namespaces.
    pub test_namespaces: String,
    /// Regex selecting persistent system namespaces; `None` disables the class.
    pub system_namespaces: Option<String>,
    pub enabled: bool,
}

impl CollectionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(|source| ConfigError::WorkingDir { source })?;
        Self::from_raw(RawSettings::from_env(), &cwd)
    }

    /// Applies defaults and validation; a relative artifact directory is
    /// resolved against `working_dir`.
    pub fn from_raw(raw: RawSettings, working_dir: &Path) -> Result<Self, ConfigError> {
        let artifacts_dir = PathBuf::from(
            raw.artifacts_dir
                .unwrap_or_else(|| DEFAULT_ARTIFACTS_DIR.to_owned()),
        );
        let artifacts_dir = if artifacts_dir.is_absolute() {
            artifacts_dir
        } else {
            working_dir.join(artifacts_dir)
        };

        let worker_count = parse_number("LOGS_WORKER_COUNT", raw.worker_count, DEFAULT_WORKER_COUNT)?;
        if worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }

        let system_namespaces = match raw.system_namespaces {
            Some(pattern) if pattern.trim().is_empty() => None,
            Some(pattern) => Some(pattern),
            None => Some(DEFAULT_SYSTEM_NAMESPACES.to_owned()),
        };

        Ok(Self {
            artifacts_dir,
            timeout: adjust_timeout(parse_timeout(
                "LOGS_TIMEOUT",
                raw.timeout,
                DEFAULT_OPERATION_TIMEOUT,
            )?),
            dump_timeout: adjust_timeout(parse_timeout(
                "LOGS_DUMP_TIMEOUT",
                raw.dump_timeout,
                DEFAULT_DUMP_TIMEOUT,
            )?),
            worker_count,
            max_kube_configs: parse_number(
                "LOGS_MAX_KUBE_CONFIGS",
                raw.max_kube_configs,
                DEFAULT_MAX_KUBE_CONFIGS,
            )?,
            test_namespaces: raw
                .test_namespaces
                .unwrap_or_else(|| DEFAULT_TEST_NAMESPACES.to_owned()),
            system_namespaces,
            enabled: parse_bool("LOGS_ENABLED", raw.enabled, true)?,
        })
    }

    /// Steady request rate granted to each cluster client.
    #[must_use]
    pub fn requests_per_second(&self) -> u32 {
        u32::try_from(self.worker_count)
            .unwrap_or(u32::MAX)
            .saturating_mul(REQUESTS_PER_WORKER)
    }

    #[must_use]
    pub fn request_burst(&self) -> u32 {
        self.requests_per_second()
            .saturating_mul(REQUEST_BURST_MULTIPLIER)
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            timeout: DEFAULT_OPERATION_TIMEOUT,
            dump_timeout: DEFAULT_DUMP_TIMEOUT,
            worker_count: DEFAULT_WORKER_COUNT,
            max_kube_configs: DEFAULT_MAX_KUBE_CONFIGS,
            test_namespaces: DEFAULT_TEST_NAMESPACES.to_owned(),
            system_namespaces: Some(DEFAULT_SYSTEM_NAMESPACES.to_owned()),
            enabled: true,
        }
    }
}

impl fmt::Display for CollectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "artifacts_dir={} timeout={:?} dump_timeout={:?} workers={} max_kube_configs={} \
             test_namespaces={} system_namespaces={} enabled={}",
            self.artifacts_dir.display(),
            self.timeout,
            self.dump_timeout,
            self.worker_count,
            self.max_kube_configs,
            self.test_namespaces,
            self.system_namespaces.as_deref().unwrap_or("<disabled>"),
            self.enabled,
        )
    }
}

fn parse_timeout(
    key: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => parse_duration(&value).map_err(|source| ConfigError::Duration {
            key,
            value,
            source,
        }),
        None => Ok(default),
    }
}

fn parse_number(key: &'static str, value: Option<String>, default: usize) -> Result<usize, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Number { key, value }),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Bool { key, value }),
    }
}
