use std::{
    fs, io,
    io::Write as _,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

/// Which incarnation of a container a log belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogVariant {
    Current,
    Previous,
}

impl LogVariant {
    pub const ALL: [Self; 2] = [Self::Current, Self::Previous];

    #[must_use]
    pub const fn is_previous(self) -> bool {
        matches!(self, Self::Previous)
    }
}

/// Derives artifact locations below the configured root:
/// `<root>/cluster<N>/<label>/[<namespace>/]<pod>[-<container>][-previous].log`.
#[derive(Clone, Debug)]
pub struct ArtifactPaths {
    root: PathBuf,
}

impl ArtifactPaths {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn cluster_dir(&self, cluster: usize) -> PathBuf {
        self.root.join(format!("cluster{cluster}"))
    }

    #[must_use]
    pub fn label_dir(&self, cluster: usize, label: &str) -> PathBuf {
        self.cluster_dir(cluster).join(label)
    }

    #[must_use]
    pub fn pod_log(
        &self,
        cluster: usize,
        label: &str,
        namespace: Option<&str>,
        pod: &str,
        container: Option<&str>,
        variant: LogVariant,
    ) -> PathBuf {
        let mut dir = self.label_dir(cluster, label);
        if let Some(namespace) = namespace {
            dir.push(namespace);
        }
        dir.join(log_file_name(pod, container, variant))
    }

    #[must_use]
    pub fn describe_log(&self, dir: &Path, namespace: &str) -> PathBuf {
        dir.join(format!("describe-{namespace}.log"))
    }

    /// Directory for the `occurrence`-th system namespace dump of a label.
    #[must_use]
    pub fn system_dump_dir(&self, cluster: usize, label: &str, occurrence: usize) -> PathBuf {
        self.label_dir(cluster, label)
            .join(format!("system-{occurrence}"))
    }
}

#[must_use]
pub fn log_file_name(pod: &str, container: Option<&str>, variant: LogVariant) -> String {
    let mut name = pod.to_owned();
    if let Some(container) = container.filter(|c| !c.is_empty()) {
        name.push('-');
        name.push_str(container);
    }
    if variant.is_previous() {
        name.push_str("-previous");
    }
    name.push_str(".log");
    name
}

/// Writes `data` to `path`, creating parent directories on demand. The content
/// lands in a temporary sibling first and is renamed into place, so readers
/// see either the complete file or none.
pub fn write_artifact(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(data)?;
    file.flush()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// [`write_artifact`] on the blocking pool, for callers on runtime threads.
pub async fn save_artifact(path: PathBuf, data: Vec<u8>) -> io::Result<()> {
    tokio::task::spawn_blocking(move || write_artifact(&path, &data))
        .await
        .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_log_paths_follow_layout() {
        let paths = ArtifactPaths::new("/artifacts");

        assert_eq!(
            paths.pod_log(0, "basic", None, "nsc-1", None, LogVariant::Current),
            PathBuf::from("/artifacts/cluster0/basic/nsc-1.log")
        );
        assert_eq!(
            paths.pod_log(0, "basic", None, "nsc-1", Some("nsc"), LogVariant::Previous),
            PathBuf::from("/artifacts/cluster0/basic/nsc-1-nsc-previous.log")
        );
        assert_eq!(
            paths.pod_log(
                2,
                "suite",
                Some("ns-a"),
                "nse-0",
                Some("nse"),
                LogVariant::Current
            ),
            PathBuf::from("/artifacts/cluster2/suite/ns-a/nse-0-nse.log")
        );
    }

    #[test]
    fn empty_container_name_adds_no_suffix() {
        assert_eq!(log_file_name("pod", Some(""), LogVariant::Current), "pod.log");
    }

    #[test]
    fn dump_paths_are_distinct_per_occurrence() {
        let paths = ArtifactPaths::new("/a");
        let first = paths.system_dump_dir(1, "t", 0);
        let second = paths.system_dump_dir(1, "t", 1);

        assert_ne!(first, second);
        assert_eq!(
            paths.describe_log(&paths.label_dir(1, "t"), "ns-x"),
            PathBuf::from("/a/cluster1/t/describe-ns-x.log")
        );
    }

    #[test]
    fn write_artifact_creates_dirs_and_reuses_existing() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("cluster0/basic/pod.log");

        write_artifact(&path, b"first").unwrap();
        write_artifact(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(leftovers.len(), 1, "temporary files must not linger");
    }

    #[tokio::test]
    async fn save_artifact_writes_from_async_context() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("cluster0/basic/describe-ns-a.log");

        save_artifact(path.clone(), b"describe ns-a\n".to_vec())
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "describe ns-a\n");
    }
}
