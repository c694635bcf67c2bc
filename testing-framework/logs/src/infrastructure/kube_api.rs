use std::{
    path::Path,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use futures::{AsyncBufReadExt as _, StreamExt as _, TryStreamExt as _};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::{
    Api, Client, Config,
    api::{ListParams, LogParams},
    config::{KubeConfigOptions, Kubeconfig},
    runtime::{WatchStreamExt as _, watcher},
};
use serde_yaml::Value;
use testing_framework_config::constants::CLIENT_AUTH_API_VERSIONS;
use tracing::debug;

use super::{
    budget::RequestBudget,
    cluster::{
        ClusterApi, ClusterError, LogLines, LogRequest, NamespaceInfo, PodEvent, PodEvents,
        PodInfo, PodRef, with_timeout,
    },
    registry::{ClientFactory, RegistryError},
};

const NAMESPACE_ACTIVE: &str = "Active";

/// [`ClusterApi`] backed by a kube client, throttled by a [`RequestBudget`].
pub struct KubeCluster {
    client: Client,
    budget: RequestBudget,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client, budget: RequestBudget) -> Self {
        Self { client, budget }
    }

    async fn probe(&self) -> Result<(), ClusterError> {
        self.budget.acquire().await;
        let info = self
            .client
            .apiserver_version()
            .await
            .map_err(|source| ClusterError::Api { source })?;
        debug!(version = %info.git_version, "cluster reachable");
        Ok(())
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, ClusterError> {
        self.budget.acquire().await;
        let list = Api::<Namespace>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(|source| ClusterError::Api { source })?;

        Ok(list
            .into_iter()
            .filter_map(|ns| {
                let active = ns
                    .status
                    .as_ref()
                    .and_then(|status| status.phase.as_deref())
                    .is_some_and(|phase| phase == NAMESPACE_ACTIVE);
                ns.metadata.name.map(|name| NamespaceInfo { name, active })
            })
            .collect())
    }

    async fn list_pods(&self) -> Result<Vec<PodInfo>, ClusterError> {
        self.budget.acquire().await;
        let list = Api::<Pod>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(|source| ClusterError::Api { source })?;

        Ok(list.iter().filter_map(pod_info).collect())
    }

    async fn pod_logs(
        &self,
        pod: &PodRef,
        request: LogRequest<'_>,
    ) -> Result<String, ClusterError> {
        let params = LogParams {
            container: Some(request.container.to_owned()),
            previous: request.variant.is_previous(),
            since_seconds: request.since.map(since_seconds),
            ..LogParams::default()
        };

        self.budget.acquire().await;
        self.pods(&pod.namespace)
            .logs(&pod.name, &params)
            .await
            .map_err(|source| ClusterError::Api { source })
    }

    async fn follow_logs(&self, pod: &PodRef, container: &str) -> Result<LogLines, ClusterError> {
        let params = LogParams {
            container: Some(container.to_owned()),
            follow: true,
            ..LogParams::default()
        };

        self.budget.acquire().await;
        let reader = self
            .pods(&pod.namespace)
            .log_stream(&pod.name, &params)
            .await
            .map_err(|source| ClusterError::Api { source })?;

        Ok(reader
            .lines()
            .map_err(|source| ClusterError::Stream { source })
            .boxed())
    }

    fn watch_pods(&self) -> PodEvents {
        let pods: Api<Pod> = Api::all(self.client.clone());
        watcher(pods, watcher::Config::default())
            .default_backoff()
            .map(|event| match event {
                Ok(watcher::Event::Applied(pod)) => pod_info(&pod)
                    .map(PodEvent::Added)
                    .ok_or_else(unnamed_pod),
                Ok(watcher::Event::Deleted(pod)) => pod_info(&pod)
                    .map(PodEvent::Deleted)
                    .ok_or_else(unnamed_pod),
                Ok(watcher::Event::Restarted(pods)) => Ok(PodEvent::Resynced(
                    pods.iter().filter_map(pod_info).collect(),
                )),
                Err(source) => Err(ClusterError::Watch { source }),
            })
            .boxed()
    }
}

fn unnamed_pod() -> ClusterError {
    ClusterError::Unavailable {
        message: "watch delivered a pod without namespace or name".to_owned(),
    }
}

fn pod_info(pod: &Pod) -> Option<PodInfo> {
    let namespace = pod.metadata.namespace.clone()?;
    let name = pod.metadata.name.clone()?;
    let spec = pod.spec.as_ref();

    let containers = spec
        .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();
    let init_containers = spec
        .and_then(|spec| spec.init_containers.as_ref())
        .map(|containers| containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();

    Some(PodInfo {
        pod: PodRef { namespace, name },
        containers,
        init_containers,
    })
}

/// Whole seconds elapsed since `since`, rounded up and at least one, as the
/// logs endpoint expects.
fn since_seconds(since: SystemTime) -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(since)
        .unwrap_or(Duration::ZERO);
    let secs = elapsed.as_secs() + u64::from(elapsed.subsec_nanos() > 0);
    i64::try_from(secs.max(1)).unwrap_or(i64::MAX)
}

/// Builds kube clients from kubeconfig files, rewriting `exec` credential
/// plugins to the requested client authentication API version.
pub struct KubeClientFactory {
    probe_timeout: Duration,
    requests_per_second: u32,
    burst: u32,
}

impl KubeClientFactory {
    #[must_use]
    pub fn new(probe_timeout: Duration, requests_per_second: u32, burst: u32) -> Self {
        Self {
            probe_timeout,
            requests_per_second,
            burst,
        }
    }
}

#[async_trait]
impl ClientFactory for KubeClientFactory {
    async fn connect(
        &self,
        kubeconfig: &Path,
        auth_api_version: &str,
    ) -> Result<Arc<dyn ClusterApi>, RegistryError> {
        let path = kubeconfig.to_path_buf();
        let raw = tokio::fs::read_to_string(kubeconfig)
            .await
            .map_err(|source| RegistryError::Read {
                path: path.clone(),
                source,
            })?;
        let mut document: Value =
            serde_yaml::from_str(&raw).map_err(|source| RegistryError::Yaml {
                path: path.clone(),
                source,
            })?;

        let rewritten = set_exec_api_version(&mut document, auth_api_version);
        if rewritten == 0 && auth_api_version != CLIENT_AUTH_API_VERSIONS[0] {
            return Err(RegistryError::NoExecAuth { path });
        }

        let text = serde_yaml::to_string(&document).map_err(|source| RegistryError::Yaml {
            path: path.clone(),
            source,
        })?;
        let parsed = Kubeconfig::from_yaml(&text).map_err(|source| RegistryError::Kubeconfig {
            path: path.clone(),
            source,
        })?;
        let config = Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
            .await
            .map_err(|source| RegistryError::Kubeconfig {
                path: path.clone(),
                source,
            })?;
        let client = Client::try_from(config).map_err(|source| RegistryError::Client {
            path: path.clone(),
            source,
        })?;

        let cluster = KubeCluster::new(
            client,
            RequestBudget::new(self.requests_per_second, self.burst),
        );
        with_timeout("apiserver probe", self.probe_timeout, cluster.probe())
            .await
            .map_err(|source| RegistryError::Probe { path, source })?;

        Ok(Arc::new(cluster))
    }
}

/// Sets `apiVersion` on every `users[].user.exec` entry and returns how many
/// entries were changed.
fn set_exec_api_version(document: &mut Value, api_version: &str) -> usize {
    let Some(users) = document
        .get_mut("users")
        .and_then(Value::as_sequence_mut)
    else {
        return 0;
    };

    let mut rewritten = 0;
    for user in users {
        let Some(exec) = user
            .get_mut("user")
            .and_then(|user| user.get_mut("exec"))
            .and_then(Value::as_mapping_mut)
        else {
            continue;
        };
        exec.insert(
            Value::from("apiVersion"),
            Value::from(api_version.to_owned()),
        );
        rewritten += 1;
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXEC_KUBECONFIG: &str = r"
apiVersion: v1
kind: Config
users:
  - name: eks
    user:
      exec:
        apiVersion: client.authentication.k8s.io/v1alpha1
        command: aws
  - name: static
    user:
      token: abc
";

    #[test]
    fn rewrites_only_exec_users() {
        let mut document: Value = serde_yaml::from_str(EXEC_KUBECONFIG).unwrap();

        let rewritten = set_exec_api_version(&mut document, CLIENT_AUTH_API_VERSIONS[1]);

        assert_eq!(rewritten, 1);
        assert_eq!(
            document["users"][0]["user"]["exec"]["apiVersion"].as_str(),
            Some(CLIENT_AUTH_API_VERSIONS[1])
        );
        assert!(document["users"][1]["user"].get("exec").is_none());
    }

    #[test]
    fn since_seconds_rounds_up_to_at_least_one() {
        assert_eq!(since_seconds(SystemTime::now()), 1);
        let earlier = SystemTime::now() - Duration::from_millis(2500);
        assert_eq!(since_seconds(earlier), 3);
    }

    #[tokio::test]
    async fn invalid_kubeconfig_is_rejected_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "users: [unclosed").unwrap();
        let factory = KubeClientFactory::new(Duration::from_secs(1), 10, 20);

        let err = factory
            .connect(&path, CLIENT_AUTH_API_VERSIONS[0])
            .await
            .err()
            .unwrap();

        assert!(matches!(err, RegistryError::Yaml { .. }));
    }
}
