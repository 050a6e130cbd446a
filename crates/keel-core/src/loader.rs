//! Project discovery and cluster specification loading
//!
//! Convention based: a project root is any directory holding `cluster.yaml`
//! (or `.keel/cluster.yaml`), found by walking up from the current
//! directory or taken from the `KEEL_PROJECT_ROOT` environment variable.

use crate::cluster::Cluster;
use crate::error::{CoreError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Cluster specification file name.
pub const CLUSTER_FILE: &str = "cluster.yaml";

/// Project-local directory for specs, scripts and state.
pub const PROJECT_DIR: &str = ".keel";

/// Locate the project root.
///
/// Search order:
/// 1. `KEEL_PROJECT_ROOT` environment variable
/// 2. Upward from the current directory, looking for
///    `cluster.yaml` or `.keel/cluster.yaml`
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("KEEL_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking KEEL_PROJECT_ROOT");
        if has_cluster_file(&path) {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    let start_dir = std::env::current_dir().map_err(|e| CoreError::Io {
        path: PathBuf::from("."),
        message: e.to_string(),
    })?;
    let mut current = start_dir.clone();
    debug!(start_dir = %start_dir.display(), "Searching for project root");

    loop {
        if has_cluster_file(&current) {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(CoreError::ProjectRootNotFound(start_dir))
}

fn has_cluster_file(dir: &Path) -> bool {
    dir.join(CLUSTER_FILE).exists() || dir.join(PROJECT_DIR).join(CLUSTER_FILE).exists()
}

/// Resolve the cluster file under a project root. A top-level
/// `cluster.yaml` wins over `.keel/cluster.yaml`.
pub fn find_cluster_file(project_root: &Path) -> Result<PathBuf> {
    let top = project_root.join(CLUSTER_FILE);
    if top.exists() {
        return Ok(top);
    }
    let nested = project_root.join(PROJECT_DIR).join(CLUSTER_FILE);
    if nested.exists() {
        return Ok(nested);
    }
    Err(CoreError::ClusterFileNotFound(project_root.to_path_buf()))
}

/// Directory holding bootstrap script templates for a project.
pub fn scripts_dir(project_root: &Path) -> PathBuf {
    project_root.join("scripts")
}

/// Load a cluster specification from a YAML file.
///
/// SSH public key material is resolved eagerly: when `public_key_data` is
/// empty and `public_key_path` is set, the key file is read here (with `~`
/// expansion, relative paths anchored at the cluster file's directory) so
/// everything downstream can treat the snapshot as self-contained.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_cluster(path: &Path) -> Result<Cluster> {
    let content = std::fs::read_to_string(path).map_err(|e| CoreError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut cluster: Cluster = serde_yaml::from_str(&content)?;
    debug!(cluster = %cluster.name, cloud = %cluster.cloud, "Parsed cluster spec");

    let base = path.parent().unwrap_or(Path::new("."));
    resolve_ssh_key(&mut cluster, base)?;

    Ok(cluster)
}

fn resolve_ssh_key(cluster: &mut Cluster, base: &Path) -> Result<()> {
    if !cluster.ssh.public_key_data.is_empty() || cluster.ssh.public_key_path.is_empty() {
        return Ok(());
    }

    let key_path = expand_tilde(&cluster.ssh.public_key_path);
    let key_path = if key_path.is_absolute() {
        key_path
    } else {
        base.join(key_path)
    };

    let data = std::fs::read_to_string(&key_path).map_err(|e| CoreError::SshKey {
        path: key_path.clone(),
        message: e.to_string(),
    })?;
    cluster.ssh.public_key_data = data.trim_end().to_string();
    debug!(key_path = %key_path.display(), "Read SSH public key");
    Ok(())
}

/// Expand a leading `~` or `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Find the project root and load its cluster specification.
pub fn load_project() -> Result<(PathBuf, Cluster)> {
    let root = find_project_root()?;
    let file = find_cluster_file(&root)?;
    let cluster = load_cluster(&file)?;
    Ok((root, cluster))
}
