//! Cluster model
//!
//! The `Cluster` is the root aggregate threaded through every step of a
//! reconciliation run. It is passed by value and never mutated in place:
//! each step that learns something from the cloud (an identifier, an IP)
//! produces a new snapshot via the `with_*` render helpers below, leaving
//! all fields it does not own untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cloud provider tag. Selects which adapter drives a reconciliation
/// session; only `mock` ships with this workspace, the rest resolve to a
/// descriptive error until an adapter crate is linked in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cloud {
    #[default]
    Mock,
    Amazon,
    Azure,
    Google,
    Digitalocean,
    Openstack,
    Packet,
}

impl fmt::Display for Cloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cloud::Mock => "mock",
            Cloud::Amazon => "amazon",
            Cloud::Azure => "azure",
            Cloud::Google => "google",
            Cloud::Digitalocean => "digitalocean",
            Cloud::Openstack => "openstack",
            Cloud::Packet => "packet",
        };
        write!(f, "{}", name)
    }
}

/// Role of a server pool within the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolRole {
    /// Runs the control plane.
    Master,
    /// Runs workloads only.
    #[default]
    Node,
    /// Single machine acting as both.
    Hybrid,
}

impl PoolRole {
    /// Whether this pool hosts the Kubernetes API.
    pub fn is_master(&self) -> bool {
        matches!(self, PoolRole::Master | PoolRole::Hybrid)
    }
}

impl fmt::Display for PoolRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolRole::Master => write!(f, "master"),
            PoolRole::Node => write!(f, "node"),
            PoolRole::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// A single ingress or egress firewall rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Protocol name ("tcp", "udp", "icmp", or "-1" for all).
    pub protocol: String,

    /// Start of the port range.
    pub from_port: u16,

    /// End of the port range (inclusive).
    pub to_port: u16,

    /// Source/destination CIDR the rule applies to.
    pub source: String,
}

/// A subnet carved out of the cluster network for one server pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub name: String,

    /// Subnet CIDR; must sit inside the cluster network CIDR.
    pub cidr: String,

    /// Availability zone, where the provider has them.
    #[serde(default)]
    pub zone: String,

    /// Cloud-assigned identifier, empty until the subnet is applied.
    #[serde(default)]
    pub identifier: String,

    /// Identifier of the route table associated with this subnet.
    #[serde(default)]
    pub route_table_identifier: String,
}

/// A firewall (security group) protecting one server pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Firewall {
    pub name: String,

    #[serde(default)]
    pub ingress_rules: Vec<Rule>,

    #[serde(default)]
    pub egress_rules: Vec<Rule>,

    /// Cloud-assigned identifier, empty until applied.
    #[serde(default)]
    pub identifier: String,
}

/// IAM-style role attached to a pool's instance profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IamRole {
    pub name: String,

    /// Policy documents (or policy names, provider-dependent).
    #[serde(default)]
    pub policies: Vec<String>,
}

/// Optional instance profile giving a pool's machines cloud credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceProfile {
    pub name: String,

    pub role: IamRole,

    #[serde(default)]
    pub identifier: String,
}

/// A named group of homogeneous compute instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerPool {
    pub name: String,

    #[serde(default)]
    pub role: PoolRole,

    /// Minimum instance count.
    pub min_count: u32,

    /// Maximum instance count.
    pub max_count: u32,

    /// Machine image name or identifier.
    pub image: String,

    /// Machine size/flavor (e.g. "t2.medium").
    pub size: String,

    /// Bootstrap script names, rendered and concatenated in order.
    #[serde(default)]
    pub bootstrap_scripts: Vec<String>,

    #[serde(default)]
    pub subnets: Vec<Subnet>,

    #[serde(default)]
    pub firewalls: Vec<Firewall>,

    #[serde(default)]
    pub instance_profile: Option<InstanceProfile>,

    /// Cloud-assigned identifier of the compute group, empty until applied.
    #[serde(default)]
    pub identifier: String,
}

impl ServerPool {
    /// Replace the subnet with the same name; unknown names are ignored.
    pub fn with_subnet(mut self, subnet: Subnet) -> Self {
        if let Some(existing) = self.subnets.iter_mut().find(|s| s.name == subnet.name) {
            *existing = subnet;
        }
        self
    }

    /// Replace the firewall with the same name; unknown names are ignored.
    pub fn with_firewall(mut self, firewall: Firewall) -> Self {
        if let Some(existing) = self.firewalls.iter_mut().find(|f| f.name == firewall.name) {
            *existing = firewall;
        }
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_instance_profile(mut self, profile: InstanceProfile) -> Self {
        self.instance_profile = Some(profile);
        self
    }
}

/// The cluster-wide network (VPC).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Network CIDR every pool subnet must fall inside.
    pub cidr: String,

    /// Cloud-assigned network identifier, empty until applied.
    #[serde(default)]
    pub identifier: String,

    /// Identifier of the internet gateway attached to this network.
    #[serde(default)]
    pub internet_gateway_identifier: String,
}

/// SSH key material used to reach cluster machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshConfig {
    /// Login user on provisioned machines.
    #[serde(default = "default_ssh_user")]
    pub user: String,

    /// Path to the public key file; `~` is expanded at load time.
    #[serde(default)]
    pub public_key_path: String,

    /// Raw public key contents, read from `public_key_path` when empty.
    #[serde(default)]
    pub public_key_data: String,

    /// Provider-computed fingerprint, empty until the key pair is applied.
    #[serde(default)]
    pub fingerprint: String,

    /// Cloud-assigned key pair identifier, empty until applied.
    #[serde(default)]
    pub identifier: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            public_key_path: String::new(),
            public_key_data: String::new(),
            fingerprint: String::new(),
            identifier: String::new(),
            port: default_ssh_port(),
        }
    }
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

/// Where the Kubernetes API of this cluster is reachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesApi {
    /// Host or address; empty until a master pool has been applied.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for KubernetesApi {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            port: default_api_port(),
        }
    }
}

fn default_api_port() -> u16 {
    6443
}

/// Optional load balancer fronting the Kubernetes API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiLoadBalancer {
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Cloud-assigned identifier, empty until applied.
    #[serde(default)]
    pub identifier: String,

    /// Provider-assigned address, empty until applied.
    #[serde(default)]
    pub address: String,
}

impl Default for ApiLoadBalancer {
    fn default() -> Self {
        Self {
            name: String::new(),
            port: default_api_port(),
            identifier: String::new(),
            address: String::new(),
        }
    }
}

/// The cluster snapshot: identity, network, key material, server pools,
/// API endpoint and the free-form values map used to hand runtime-resolved
/// data (e.g. the master's IP) to bootstrap scripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,

    #[serde(default)]
    pub cloud: Cloud,

    /// Provider region/location (e.g. "us-west-2").
    #[serde(default)]
    pub location: String,

    pub network: Network,

    #[serde(default)]
    pub ssh: SshConfig,

    pub server_pools: Vec<ServerPool>,

    #[serde(default)]
    pub kubernetes_api: KubernetesApi,

    #[serde(default)]
    pub api_load_balancer: Option<ApiLoadBalancer>,

    /// Runtime-resolved values injected into bootstrap templates.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, cloud: Cloud, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cloud,
            location: location.into(),
            ..Default::default()
        }
    }

    /// Replace the network, leaving everything else untouched.
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Replace the SSH configuration.
    pub fn with_ssh(mut self, ssh: SshConfig) -> Self {
        self.ssh = ssh;
        self
    }

    /// Replace the server pool with the same name; unknown names are
    /// ignored so a stale render cannot grow the pool list.
    pub fn with_pool(mut self, pool: ServerPool) -> Self {
        if let Some(existing) = self.server_pools.iter_mut().find(|p| p.name == pool.name) {
            *existing = pool;
        }
        self
    }

    /// Replace the Kubernetes API block.
    pub fn with_api(mut self, api: KubernetesApi) -> Self {
        self.kubernetes_api = api;
        self
    }

    /// Point the Kubernetes API at a new endpoint, keeping the port.
    pub fn with_api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.kubernetes_api.endpoint = endpoint.into();
        self
    }

    /// Replace the API load balancer block.
    pub fn with_load_balancer(mut self, lb: ApiLoadBalancer) -> Self {
        self.api_load_balancer = Some(lb);
        self
    }

    /// Insert one runtime value. Inserts are additive: the values map is
    /// filled cooperatively by several resources over a run.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn pool(&self, name: &str) -> Option<&ServerPool> {
        self.server_pools.iter().find(|p| p.name == name)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Pools in apply order: masters (and hybrids) first, then nodes,
    /// original order preserved within each group.
    pub fn pools_masters_first(&self) -> Vec<&ServerPool> {
        let mut pools: Vec<&ServerPool> = self.server_pools.iter().collect();
        pools.sort_by_key(|p| if p.role.is_master() { 0 } else { 1 });
        pools
    }

    /// Carry cloud-assigned fields over from a previously persisted
    /// snapshot into this freshly loaded specification. Matching is by
    /// name, so renaming a pool or subnet deliberately orphans its old
    /// identifiers.
    pub fn adopting(mut self, known: &Cluster) -> Self {
        self.network.identifier = known.network.identifier.clone();
        self.network.internet_gateway_identifier =
            known.network.internet_gateway_identifier.clone();

        self.ssh.identifier = known.ssh.identifier.clone();
        self.ssh.fingerprint = known.ssh.fingerprint.clone();

        self.kubernetes_api.endpoint = known.kubernetes_api.endpoint.clone();

        if let (Some(lb), Some(known_lb)) = (self.api_load_balancer.as_mut(), &known.api_load_balancer)
        {
            lb.identifier = known_lb.identifier.clone();
            lb.address = known_lb.address.clone();
        }

        for pool in &mut self.server_pools {
            let Some(known_pool) = known.pool(&pool.name) else {
                continue;
            };
            pool.identifier = known_pool.identifier.clone();

            for subnet in &mut pool.subnets {
                if let Some(known_subnet) =
                    known_pool.subnets.iter().find(|s| s.name == subnet.name)
                {
                    subnet.identifier = known_subnet.identifier.clone();
                    subnet.route_table_identifier = known_subnet.route_table_identifier.clone();
                }
            }

            for firewall in &mut pool.firewalls {
                if let Some(known_firewall) =
                    known_pool.firewalls.iter().find(|f| f.name == firewall.name)
                {
                    firewall.identifier = known_firewall.identifier.clone();
                }
            }

            if let (Some(profile), Some(known_profile)) =
                (pool.instance_profile.as_mut(), &known_pool.instance_profile)
                && profile.name == known_profile.name
            {
                profile.identifier = known_profile.identifier.clone();
            }
        }

        // Runtime values: keep everything learned previously, but let the
        // specification win for keys it sets explicitly.
        let mut values = known.values.clone();
        values.extend(std::mem::take(&mut self.values));
        self.values = values;

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_pool_cluster() -> Cluster {
        Cluster {
            name: "c1".to_string(),
            network: Network {
                cidr: "10.0.0.0/16".to_string(),
                ..Default::default()
            },
            server_pools: vec![
                ServerPool {
                    name: "c1-node".to_string(),
                    role: PoolRole::Node,
                    min_count: 2,
                    max_count: 2,
                    image: "ubuntu-24.04".to_string(),
                    size: "m3.medium".to_string(),
                    subnets: vec![Subnet {
                        name: "c1-node".to_string(),
                        cidr: "10.0.1.0/24".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                ServerPool {
                    name: "c1-master".to_string(),
                    role: PoolRole::Master,
                    min_count: 1,
                    max_count: 1,
                    image: "ubuntu-24.04".to_string(),
                    size: "m3.large".to_string(),
                    subnets: vec![Subnet {
                        name: "c1-master".to_string(),
                        cidr: "10.0.0.0/24".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn with_pool_replaces_by_name() {
        let cluster = two_pool_cluster();
        let updated = cluster
            .pool("c1-master")
            .cloned()
            .unwrap()
            .with_identifier("pool-7");

        let cluster = cluster.with_pool(updated);
        assert_eq!(cluster.pool("c1-master").unwrap().identifier, "pool-7");
        assert_eq!(cluster.pool("c1-node").unwrap().identifier, "");
        assert_eq!(cluster.server_pools.len(), 2);
    }

    #[test]
    fn with_pool_ignores_unknown_name() {
        let cluster = two_pool_cluster();
        let stray = ServerPool {
            name: "no-such-pool".to_string(),
            ..Default::default()
        };
        let cluster = cluster.with_pool(stray);
        assert_eq!(cluster.server_pools.len(), 2);
    }

    #[test]
    fn masters_sort_before_nodes() {
        let cluster = two_pool_cluster();
        let ordered = cluster.pools_masters_first();
        assert_eq!(ordered[0].name, "c1-master");
        assert_eq!(ordered[1].name, "c1-node");
    }

    #[test]
    fn render_helpers_leave_unrelated_fields_alone() {
        let cluster = two_pool_cluster().with_value("master_ip", "10.0.0.11");
        let before_pools = cluster.server_pools.clone();

        let mut network = cluster.network.clone();
        network.identifier = "net-1".to_string();
        let cluster = cluster.with_network(network);

        assert_eq!(cluster.network.identifier, "net-1");
        assert_eq!(cluster.server_pools, before_pools);
        assert_eq!(cluster.value("master_ip"), Some("10.0.0.11"));
    }

    #[test]
    fn adopting_copies_identifiers_by_name() {
        let mut known = two_pool_cluster();
        known.network.identifier = "net-1".to_string();
        known.network.internet_gateway_identifier = "igw-1".to_string();
        known.ssh.identifier = "key-1".to_string();
        known.kubernetes_api.endpoint = "10.0.0.11".to_string();
        known.server_pools[1].identifier = "pool-1".to_string();
        known.server_pools[1].subnets[0].identifier = "sub-1".to_string();
        known.server_pools[1].subnets[0].route_table_identifier = "rtb-1".to_string();
        known
            .values
            .insert("master_ip".to_string(), "10.0.0.11".to_string());

        let fresh = two_pool_cluster().adopting(&known);

        assert_eq!(fresh.network.identifier, "net-1");
        assert_eq!(fresh.network.internet_gateway_identifier, "igw-1");
        assert_eq!(fresh.ssh.identifier, "key-1");
        assert_eq!(fresh.kubernetes_api.endpoint, "10.0.0.11");
        assert_eq!(fresh.pool("c1-master").unwrap().identifier, "pool-1");
        assert_eq!(fresh.pool("c1-master").unwrap().subnets[0].identifier, "sub-1");
        assert_eq!(
            fresh.pool("c1-master").unwrap().subnets[0].route_table_identifier,
            "rtb-1"
        );
        assert_eq!(fresh.value("master_ip"), Some("10.0.0.11"));
    }

    #[test]
    fn adopting_skips_renamed_pools() {
        let mut known = two_pool_cluster();
        known.server_pools[1].identifier = "pool-1".to_string();

        let mut fresh = two_pool_cluster();
        fresh.server_pools[1].name = "c1-control".to_string();
        let fresh = fresh.adopting(&known);

        assert_eq!(fresh.pool("c1-control").unwrap().identifier, "");
    }

    #[test]
    fn minimal_yaml_spec_fills_defaults() {
        let yaml = r#"
name: c1
network:
  cidr: 10.0.0.0/16
server_pools:
  - name: c1-master
    role: master
    min_count: 1
    max_count: 1
    image: ubuntu-24.04
    size: m3.large
    subnets:
      - name: c1-master
        cidr: 10.0.0.0/24
"#;
        let cluster: Cluster = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cluster.cloud, Cloud::Mock);
        assert_eq!(cluster.kubernetes_api.port, 6443);
        assert_eq!(cluster.ssh.user, "root");
        assert_eq!(cluster.network.identifier, "");
        assert!(cluster.server_pools[0].role.is_master());
    }
}
