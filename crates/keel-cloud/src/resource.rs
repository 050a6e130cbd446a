//! The resource contract
//!
//! Every piece of cluster infrastructure implements `Resource`: four
//! operations against an immutable cluster snapshot, each returning a
//! refined snapshot plus the resource's state as seen from that side.
//! The reconciler drives these; resources never call each other.

use crate::adapter::CloudAdapter;
use crate::error::Result;
use crate::retry::{RetryPolicy, WaitPolicy};
use crate::script::ScriptBuilder;
use async_trait::async_trait;
use keel_core::cluster::{Cluster, Rule};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Resource kinds, in model order. The enum order documents the
/// dependency chain but the `Model` list is what the reconciler walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Keypair,
    Network,
    Gateway,
    Subnet,
    RouteTable,
    Firewall,
    InstanceProfile,
    Pool,
    LoadBalancer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Keypair => "keypair",
            ResourceKind::Network => "network",
            ResourceKind::Gateway => "gateway",
            ResourceKind::Subnet => "subnet",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::Firewall => "firewall",
            ResourceKind::InstanceProfile => "instance-profile",
            ResourceKind::Pool => "pool",
            ResourceKind::LoadBalancer => "load-balancer",
        };
        write!(f, "{}", name)
    }
}

/// State of an imported SSH key pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeypairState {
    pub name: String,
    pub identifier: String,
    pub fingerprint: String,
    pub public_key_data: String,
}

/// State of the cluster network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub name: String,
    pub identifier: String,
    pub cidr: String,
}

/// State of the internet gateway attached to the network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayState {
    pub name: String,
    pub identifier: String,
    pub network_identifier: String,
}

/// State of one pool subnet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubnetState {
    pub name: String,
    pub identifier: String,
    pub cidr: String,
    pub zone: String,
    pub network_identifier: String,
}

/// State of the route table serving one subnet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteTableState {
    pub name: String,
    pub identifier: String,
    pub subnet_identifier: String,
    pub gateway_identifier: String,
}

/// State of one pool firewall.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirewallState {
    pub name: String,
    pub identifier: String,
    pub network_identifier: String,
    pub ingress_rules: Vec<Rule>,
    pub egress_rules: Vec<Rule>,
}

/// State of an instance profile and its role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceProfileState {
    pub name: String,
    pub identifier: String,
    pub role_name: String,
    pub policies: Vec<String>,
}

/// State of a compute pool. The rendered bootstrap payload is not part
/// of this state: it is produced from the run's own snapshot inside
/// `apply`, which the expected side can never observe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolState {
    pub name: String,
    pub identifier: String,
    pub image: String,
    pub size: String,
    pub min_count: u32,
    pub max_count: u32,
    pub subnet_identifiers: Vec<String>,
    pub firewall_identifiers: Vec<String>,
    pub instance_profile_identifier: String,
}

/// State of the API load balancer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerState {
    pub name: String,
    pub identifier: String,
    pub port: u16,
    pub address: String,
    pub pool_identifier: String,
}

/// Tagged union over every resource state type. Each kind has its own
/// dedicated zero value: a state whose fields are all empty/default,
/// meaning "does not exist".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceState {
    Keypair(KeypairState),
    Network(NetworkState),
    Gateway(GatewayState),
    Subnet(SubnetState),
    RouteTable(RouteTableState),
    Firewall(FirewallState),
    InstanceProfile(InstanceProfileState),
    Pool(PoolState),
    LoadBalancer(LoadBalancerState),
}

impl ResourceState {
    /// The zero value for a kind.
    pub fn zero(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Keypair => ResourceState::Keypair(KeypairState::default()),
            ResourceKind::Network => ResourceState::Network(NetworkState::default()),
            ResourceKind::Gateway => ResourceState::Gateway(GatewayState::default()),
            ResourceKind::Subnet => ResourceState::Subnet(SubnetState::default()),
            ResourceKind::RouteTable => ResourceState::RouteTable(RouteTableState::default()),
            ResourceKind::Firewall => ResourceState::Firewall(FirewallState::default()),
            ResourceKind::InstanceProfile => {
                ResourceState::InstanceProfile(InstanceProfileState::default())
            }
            ResourceKind::Pool => ResourceState::Pool(PoolState::default()),
            ResourceKind::LoadBalancer => ResourceState::LoadBalancer(LoadBalancerState::default()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceState::Keypair(_) => ResourceKind::Keypair,
            ResourceState::Network(_) => ResourceKind::Network,
            ResourceState::Gateway(_) => ResourceKind::Gateway,
            ResourceState::Subnet(_) => ResourceKind::Subnet,
            ResourceState::RouteTable(_) => ResourceKind::RouteTable,
            ResourceState::Firewall(_) => ResourceKind::Firewall,
            ResourceState::InstanceProfile(_) => ResourceKind::InstanceProfile,
            ResourceState::Pool(_) => ResourceKind::Pool,
            ResourceState::LoadBalancer(_) => ResourceKind::LoadBalancer,
        }
    }

    /// The cloud identifier carried by this state, if any.
    pub fn identifier(&self) -> &str {
        match self {
            ResourceState::Keypair(s) => &s.identifier,
            ResourceState::Network(s) => &s.identifier,
            ResourceState::Gateway(s) => &s.identifier,
            ResourceState::Subnet(s) => &s.identifier,
            ResourceState::RouteTable(s) => &s.identifier,
            ResourceState::Firewall(s) => &s.identifier,
            ResourceState::InstanceProfile(s) => &s.identifier,
            ResourceState::Pool(s) => &s.identifier,
            ResourceState::LoadBalancer(s) => &s.identifier,
        }
    }

    /// A state with an identifier describes something that exists.
    pub fn exists(&self) -> bool {
        !self.identifier().is_empty()
    }
}

/// Everything a resource may touch during one reconciliation run: the
/// injected cloud adapter, the bootstrap script builder, and the retry
/// and wait policies. One session per run, shared read-only.
#[derive(Clone)]
pub struct Session {
    pub adapter: Arc<dyn CloudAdapter>,
    pub scripts: Arc<dyn ScriptBuilder>,
    pub retry: RetryPolicy,
    pub wait: WaitPolicy,
}

impl Session {
    pub fn new(adapter: Arc<dyn CloudAdapter>, scripts: Arc<dyn ScriptBuilder>) -> Self {
        Self {
            adapter,
            scripts,
            retry: RetryPolicy::default(),
            wait: WaitPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("retry", &self.retry)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

/// The contract every infrastructure resource implements.
///
/// `actual` and `expected` are read-only: they query the cloud (or the
/// snapshot) and must not create, mutate or delete anything. `apply`
/// and `delete` converge the cloud toward the expected or absent state.
/// All four return a refined copy of the snapshot they were given.
#[async_trait]
pub trait Resource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Stable name within the cluster, used for tagging and matching.
    fn name(&self) -> &str;

    /// Observe the resource as the cloud reports it. Missing resources
    /// yield the kind's zero state.
    async fn actual(&self, session: &Session, known: &Cluster)
    -> Result<(Cluster, ResourceState)>;

    /// Derive the desired state from the snapshot. Known identifiers are
    /// carried into the expectation so an unchanged resource compares
    /// equal to its actual state.
    async fn expected(
        &self,
        session: &Session,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)>;

    /// Converge the cloud toward `expected`. Equal states are a no-op;
    /// otherwise create or update, wait for a terminal provisioning
    /// state, tag, and merge learned fields into the returned snapshot.
    async fn apply(
        &self,
        session: &Session,
        actual: &ResourceState,
        expected: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)>;

    /// Remove the resource. A state with no identifier means there is
    /// nothing to do: the unchanged snapshot and the zero state come
    /// back. The returned snapshot has the resource's fields cleared.
    async fn delete(
        &self,
        session: &Session,
        actual: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)>;
}
