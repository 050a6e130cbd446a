//! Resource implementations
//!
//! One module per infrastructure kind. All follow the same shape: an
//! `expected_*` helper deriving the desired state purely from a snapshot
//! (unit-testable without an adapter), and the `Resource` impl wiring
//! that state through the adapter.

mod firewall;
mod gateway;
mod instance_profile;
mod keypair;
mod load_balancer;
mod network;
mod pool;
mod route_table;
mod subnet;

// Re-exports
pub use firewall::FirewallResource;
pub use gateway::GatewayResource;
pub use instance_profile::InstanceProfileResource;
pub use keypair::KeypairResource;
pub use load_balancer::LoadBalancerResource;
pub use network::NetworkResource;
pub use pool::PoolResource;
pub use route_table::RouteTableResource;
pub use subnet::SubnetResource;

use crate::error::{CloudError, Result};
use crate::resource::{ResourceKind, ResourceState};
use keel_core::cluster::{Cluster, Firewall, ServerPool, Subnet};

/// Tag key carrying the resource name.
pub const NAME_TAG: &str = "Name";

/// Tag key linking every resource back to its cluster.
pub const CLUSTER_TAG: &str = "keel/cluster";

/// A handler was given a state of another kind. Engine invariant, not a
/// user-facing condition.
pub(crate) fn unexpected_state(kind: ResourceKind, got: &ResourceState) -> CloudError {
    CloudError::Precondition(format!("{} handler received a {} state", kind, got.kind()))
}

pub(crate) fn require_pool<'a>(cluster: &'a Cluster, name: &str) -> Result<&'a ServerPool> {
    cluster
        .pool(name)
        .ok_or_else(|| CloudError::Precondition(format!("pool '{}' missing from snapshot", name)))
}

pub(crate) fn require_subnet<'a>(pool: &'a ServerPool, name: &str) -> Result<&'a Subnet> {
    pool.subnets.iter().find(|s| s.name == name).ok_or_else(|| {
        CloudError::Precondition(format!(
            "subnet '{}' missing from pool '{}'",
            name, pool.name
        ))
    })
}

pub(crate) fn require_firewall<'a>(pool: &'a ServerPool, name: &str) -> Result<&'a Firewall> {
    pool.firewalls.iter().find(|f| f.name == name).ok_or_else(|| {
        CloudError::Precondition(format!(
            "firewall '{}' missing from pool '{}'",
            name, pool.name
        ))
    })
}
