//! Keel cluster model
//!
//! This crate holds everything the reconciliation engine treats as data:
//! the `Cluster` snapshot type and its render helpers, YAML specification
//! loading with project discovery, validation, and bootstrap script
//! templating.
//!
//! # Snapshot discipline
//!
//! A `Cluster` is never mutated in place. Code that learns something from
//! the cloud builds a refined copy through the `with_*` helpers:
//!
//! ```
//! use keel_core::cluster::{Cluster, Network};
//!
//! let cluster = Cluster {
//!     name: "c1".to_string(),
//!     ..Default::default()
//! };
//! let mut network = Network { cidr: "10.0.0.0/16".to_string(), ..Default::default() };
//! network.identifier = "net-1".to_string();
//! let refined = cluster.with_network(network).with_value("master_ip", "10.0.0.11");
//! assert_eq!(refined.value("master_ip"), Some("10.0.0.11"));
//! ```

pub mod cluster;
pub mod error;
pub mod loader;
pub mod script;
pub mod validate;

// Re-exports
pub use cluster::{
    ApiLoadBalancer, Cloud, Cluster, Firewall, IamRole, InstanceProfile, KubernetesApi, Network,
    PoolRole, Rule, ServerPool, SshConfig, Subnet,
};
pub use error::{CoreError, Result};
pub use loader::{find_cluster_file, find_project_root, load_cluster, load_project};
pub use script::BootstrapRenderer;
pub use validate::validate_cluster;
