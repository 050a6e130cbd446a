//! Cluster state persistence
//!
//! Manages the `.keel/state.json` file which records the last snapshot
//! the reconciler confirmed against the cloud. The snapshot is the
//! whole cluster, identifiers included; `Cluster::adopting` merges it
//! back into a freshly loaded spec before the next run.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use keel_core::cluster::Cluster;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".keel";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Versioned envelope around the persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub cluster: Cluster,
}

impl StateFile {
    pub fn new(cluster: Cluster) -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            cluster,
        }
    }
}

/// Reads and writes the state file under the project root.
pub struct StateStore {
    project_root: PathBuf,
}

impl StateStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!(dir = %dir.display(), "Created state directory");
        }
        Ok(())
    }

    /// Load the last confirmed snapshot, or `None` when no run has
    /// saved one yet.
    pub async fn load(&self) -> Result<Option<Cluster>> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateFile = serde_json::from_str(&content)
            .map_err(|e| CloudError::State(format!("{}: {}", path.display(), e)))?;

        if state.version > STATE_VERSION {
            return Err(CloudError::State(format!(
                "state file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(cluster = %state.cluster.name, updated_at = %state.updated_at, "Loaded state");
        Ok(Some(state.cluster))
    }

    /// Save a snapshot, rotating the previous file to `.backup` first.
    pub async fn save(&self, cluster: &Cluster) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Rotated previous state to backup");
        }

        let state = StateFile::new(cluster.clone());
        let content = serde_json::to_string_pretty(&state)?;
        fs::write(&path, content).await?;

        tracing::debug!(cluster = %cluster.name, "Saved state");
        Ok(())
    }

    /// Remove the state file, keeping the backup.
    pub async fn clear(&self) -> Result<()> {
        let path = self.state_path();
        if path.exists() {
            let backup = self.backup_path();
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Cleared state, previous snapshot kept as backup");
        }
        Ok(())
    }

    /// Take the exclusive lock for a mutating run.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)
                .map_err(|e| CloudError::State(format!("{}: {}", lock_path.display(), e)))?;

            // Locks older than an hour are presumed dead.
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::Lock(format!(
                    "held by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!(holder = %lock_info.holder, "Removing stale state lock");
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock.
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            // Sweep the lock file when release() was never awaited.
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::cluster::{Cluster, Network};
    use tempfile::tempdir;

    fn snapshot() -> Cluster {
        Cluster::new("persisted", keel_core::cluster::Cloud::Mock, "local")
            .with_network(Network {
                cidr: "10.0.0.0/16".into(),
                identifier: "net-1".into(),
                internet_gateway_identifier: "igw-1".into(),
            })
            .with_value("master_ip", "10.0.0.11")
    }

    #[tokio::test]
    async fn save_then_load_round_trips_identifiers() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());

        store.save(&snapshot()).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.name, "persisted");
        assert_eq!(loaded.network.identifier, "net-1");
        assert_eq!(loaded.value("master_ip"), Some("10.0.0.11"));
    }

    #[tokio::test]
    async fn load_without_state_file_is_none() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());

        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_save_rotates_backup() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());

        store.save(&snapshot()).await.unwrap();
        let mut changed = snapshot();
        changed.network.identifier = "net-2".into();
        store.save(&changed).await.unwrap();

        let backup = temp_dir.path().join(".keel").join("state.json.backup");
        assert!(backup.exists());
        let previous: StateFile =
            serde_json::from_str(&std::fs::read_to_string(&backup).unwrap()).unwrap();
        assert_eq!(previous.cluster.network.identifier, "net-1");
        assert_eq!(
            store.load().await.unwrap().unwrap().network.identifier,
            "net-2"
        );
    }

    #[tokio::test]
    async fn newer_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());

        store.save(&snapshot()).await.unwrap();
        let path = temp_dir.path().join(".keel").join("state.json");
        let mut state: StateFile =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        state.version = STATE_VERSION + 1;
        std::fs::write(&path, serde_json::to_string(&state).unwrap()).unwrap();

        assert!(matches!(
            store.load().await,
            Err(CloudError::State(message)) if message.contains("newer")
        ));
    }

    #[tokio::test]
    async fn lock_blocks_second_acquire() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());

        let lock = store.acquire_lock().await.unwrap();
        assert!(matches!(
            store.acquire_lock().await,
            Err(CloudError::Lock(_))
        ));
        lock.release().await.unwrap();
        let lock = store.acquire_lock().await.unwrap();
        lock.release().await.unwrap();
    }

    #[tokio::test]
    async fn clear_keeps_a_backup() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());

        store.save(&snapshot()).await.unwrap();
        store.clear().await.unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert!(
            temp_dir
                .path()
                .join(".keel")
                .join("state.json.backup")
                .exists()
        );
    }
}
