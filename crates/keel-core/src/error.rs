use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("invalid cluster spec: {0}")]
    InvalidSpec(String),

    #[error(
        "project root not found\nsearched upward from: {0}\nhint: run `keel init`, or set KEEL_PROJECT_ROOT to a directory containing cluster.yaml"
    )]
    ProjectRootNotFound(PathBuf),

    #[error("no cluster file under {0} (expected cluster.yaml or .keel/cluster.yaml)")]
    ClusterFileNotFound(PathBuf),

    #[error("ssh public key unreadable: {path}: {message}")]
    SshKey { path: PathBuf, message: String },

    #[error("bootstrap script '{script}': {message}")]
    Template { script: String, message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
