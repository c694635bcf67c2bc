use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use futures::future::join_all;
use testing_framework_config::constants::CLIENT_AUTH_API_VERSIONS;
use testing_framework_env as tf_env;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cluster::{ClusterApi, ClusterError, ClusterHandle};

/// Why one kubeconfig could not be turned into a usable client.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read kubeconfig {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("kubeconfig {} is not valid YAML: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("kubeconfig {} rejected: {source}", .path.display())]
    Kubeconfig {
        path: PathBuf,
        #[source]
        source: kube::config::KubeconfigError,
    },
    #[error("failed to build client for {}: {source}", .path.display())]
    Client {
        path: PathBuf,
        #[source]
        source: kube::Error,
    },
    #[error("cluster behind {} did not answer: {source}", .path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: ClusterError,
    },
    #[error("kubeconfig {} has no exec credentials to retarget", .path.display())]
    NoExecAuth { path: PathBuf },
}

impl RegistryError {
    /// True when retrying with another auth API version cannot help.
    #[must_use]
    pub const fn is_version_independent(&self) -> bool {
        matches!(
            self,
            Self::Read { .. } | Self::Yaml { .. } | Self::NoExecAuth { .. }
        )
    }
}

/// Builds a verified API client for one kubeconfig and auth API version.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(
        &self,
        kubeconfig: &Path,
        auth_api_version: &str,
    ) -> Result<Arc<dyn ClusterApi>, RegistryError>;
}

/// Kubeconfig paths from the environment: `KUBECONFIG` (else
/// `$HOME/.kube/config`), then `KUBECONFIG1..=max`.
#[must_use]
pub fn kubeconfig_candidates(max_numbered: usize) -> Vec<PathBuf> {
    let primary = tf_env::kubeconfig()
        .or_else(|| tf_env::home_dir().map(|home| home.join(".kube").join("config")));
    resolve_candidates(primary, max_numbered, tf_env::numbered_kubeconfig)
}

fn resolve_candidates(
    primary: Option<PathBuf>,
    max_numbered: usize,
    numbered: impl Fn(usize) -> Option<PathBuf>,
) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    let all = primary
        .into_iter()
        .chain((1..=max_numbered).filter_map(numbered));
    for path in all {
        if candidates.contains(&path) {
            debug!(path = %path.display(), "skipping duplicate kubeconfig");
            continue;
        }
        candidates.push(path);
    }
    candidates
}

/// Connects to every candidate concurrently. Candidates that fail under every
/// auth API version are dropped; the survivors keep their candidate index as
/// ordinal.
pub async fn connect_clusters(
    factory: &dyn ClientFactory,
    candidates: &[PathBuf],
) -> Vec<ClusterHandle> {
    let attempts = candidates
        .iter()
        .enumerate()
        .map(|(ordinal, path)| async move {
            match connect_any_version(factory, path).await {
                Ok(api) => {
                    info!(cluster = ordinal, kubeconfig = %path.display(), "cluster registered");
                    Some(ClusterHandle::new(ordinal, path.clone(), api))
                }
                Err(err) => {
                    warn!(
                        cluster = ordinal,
                        kubeconfig = %path.display(),
                        error = ?err,
                        "dropping cluster"
                    );
                    None
                }
            }
        });

    join_all(attempts).await.into_iter().flatten().collect()
}

async fn connect_any_version(
    factory: &dyn ClientFactory,
    path: &Path,
) -> Result<Arc<dyn ClusterApi>, RegistryError> {
    let mut last_err = None;
    for version in CLIENT_AUTH_API_VERSIONS {
        match factory.connect(path, version).await {
            Ok(api) => return Ok(api),
            Err(err) if err.is_version_independent() => {
                // NoExecAuth only follows a failed first attempt; report that one.
                return Err(last_err.unwrap_or(err));
            }
            Err(err) => {
                debug!(kubeconfig = %path.display(), version, error = ?err, "auth version rejected");
                last_err = Some(err);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| RegistryError::NoExecAuth {
        path: path.to_path_buf(),
    }))
}
