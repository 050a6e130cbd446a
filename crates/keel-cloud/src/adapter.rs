//! Cloud adapter trait definition
//!
//! The single seam between the reconciliation engine and a real cloud.
//! Adapters translate these calls into provider SDK/API requests; the
//! engine never sees anything more specific than the record structs
//! below. Every call must be idempotent or safely re-queryable, and
//! provider failures must come back as `CloudError::Provider` with the
//! code and message verbatim so the retry classifier can see them.

use crate::error::Result;
use async_trait::async_trait;
use keel_core::cluster::Rule;

/// Key pair as the cloud reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeypairRecord {
    pub identifier: String,
    pub fingerprint: String,
    pub public_key_data: String,
}

/// Network (VPC) as the cloud reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkRecord {
    pub identifier: String,
    pub cidr: String,
}

/// Internet gateway as the cloud reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayRecord {
    pub identifier: String,
    /// Empty while the gateway is detached.
    pub network_identifier: String,
}

/// Subnet as the cloud reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubnetRecord {
    pub identifier: String,
    pub cidr: String,
    pub zone: String,
    pub network_identifier: String,
}

/// Route table as the cloud reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTableRecord {
    pub identifier: String,
    /// Empty while unassociated.
    pub subnet_identifier: String,
    /// Gateway of the default route, empty while the table has none.
    pub gateway_identifier: String,
}

/// Firewall (security group) as the cloud reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FirewallRecord {
    pub identifier: String,
    pub network_identifier: String,
    pub ingress_rules: Vec<Rule>,
    pub egress_rules: Vec<Rule>,
}

/// Instance profile as the cloud reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceProfileRecord {
    pub identifier: String,
    pub role_name: String,
    pub policies: Vec<String>,
}

/// Compute pool as the cloud reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolRecord {
    pub identifier: String,
    pub image: String,
    pub size: String,
    pub min_count: u32,
    pub max_count: u32,
    pub subnet_identifiers: Vec<String>,
    pub firewall_identifiers: Vec<String>,
    pub instance_profile_identifier: String,
    /// Addresses of running instances, in launch order.
    pub instance_addresses: Vec<String>,
    /// Whether the pool has reached its minimum running count.
    pub ready: bool,
}

/// Load balancer as the cloud reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadBalancerRecord {
    pub identifier: String,
    pub port: u16,
    pub address: String,
    pub pool_identifier: String,
}

/// Everything a compute pool needs at launch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreatePoolRequest {
    pub name: String,
    pub image: String,
    pub size: String,
    pub min_count: u32,
    pub max_count: u32,
    pub subnet_identifiers: Vec<String>,
    pub firewall_identifiers: Vec<String>,
    pub instance_profile_identifier: String,
    pub keypair_identifier: String,
    /// Base64-encoded bootstrap payload.
    pub user_data: String,
}

/// Cloud provider abstraction.
///
/// `find_*` calls take both the known identifier and the resource name:
/// lookup is by identifier when one is recorded, by name tag otherwise,
/// and `None` means the resource does not exist (which is not an error).
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    /// Provider name for logs and errors (e.g. "mock", "amazon").
    fn name(&self) -> &str;

    async fn find_keypair(&self, identifier: &str, name: &str) -> Result<Option<KeypairRecord>>;
    async fn import_keypair(&self, name: &str, public_key_data: &str) -> Result<KeypairRecord>;
    async fn delete_keypair(&self, identifier: &str) -> Result<()>;

    async fn find_network(&self, identifier: &str, name: &str) -> Result<Option<NetworkRecord>>;
    async fn create_network(&self, name: &str, cidr: &str) -> Result<NetworkRecord>;
    async fn delete_network(&self, identifier: &str) -> Result<()>;

    async fn find_gateway(&self, identifier: &str, name: &str) -> Result<Option<GatewayRecord>>;
    async fn create_gateway(&self, name: &str) -> Result<GatewayRecord>;
    async fn attach_gateway(&self, identifier: &str, network_identifier: &str) -> Result<()>;
    async fn detach_gateway(&self, identifier: &str, network_identifier: &str) -> Result<()>;
    async fn delete_gateway(&self, identifier: &str) -> Result<()>;

    async fn find_subnet(&self, identifier: &str, name: &str) -> Result<Option<SubnetRecord>>;
    async fn create_subnet(
        &self,
        name: &str,
        cidr: &str,
        zone: &str,
        network_identifier: &str,
    ) -> Result<SubnetRecord>;
    async fn delete_subnet(&self, identifier: &str) -> Result<()>;

    async fn find_route_table(
        &self,
        identifier: &str,
        name: &str,
    ) -> Result<Option<RouteTableRecord>>;
    async fn create_route_table(
        &self,
        name: &str,
        network_identifier: &str,
    ) -> Result<RouteTableRecord>;
    /// Install the default route (0.0.0.0/0) via a gateway.
    async fn create_default_route(
        &self,
        identifier: &str,
        gateway_identifier: &str,
    ) -> Result<()>;
    async fn associate_route_table(
        &self,
        identifier: &str,
        subnet_identifier: &str,
    ) -> Result<()>;
    async fn delete_route_table(&self, identifier: &str) -> Result<()>;

    async fn find_firewall(&self, identifier: &str, name: &str) -> Result<Option<FirewallRecord>>;
    async fn create_firewall(&self, name: &str, network_identifier: &str)
    -> Result<FirewallRecord>;
    /// Replace the firewall's rule set wholesale.
    async fn set_firewall_rules(
        &self,
        identifier: &str,
        ingress_rules: &[Rule],
        egress_rules: &[Rule],
    ) -> Result<()>;
    async fn delete_firewall(&self, identifier: &str) -> Result<()>;

    async fn find_instance_profile(
        &self,
        identifier: &str,
        name: &str,
    ) -> Result<Option<InstanceProfileRecord>>;
    async fn create_instance_profile(
        &self,
        name: &str,
        role_name: &str,
        policies: &[String],
    ) -> Result<InstanceProfileRecord>;
    async fn delete_instance_profile(&self, identifier: &str) -> Result<()>;

    async fn find_pool(&self, identifier: &str, name: &str) -> Result<Option<PoolRecord>>;
    async fn create_pool(&self, request: &CreatePoolRequest) -> Result<PoolRecord>;
    /// Adjust the instance count bounds of an existing pool.
    async fn resize_pool(&self, identifier: &str, min_count: u32, max_count: u32) -> Result<()>;
    async fn delete_pool(&self, identifier: &str) -> Result<()>;

    async fn find_load_balancer(
        &self,
        identifier: &str,
        name: &str,
    ) -> Result<Option<LoadBalancerRecord>>;
    async fn create_load_balancer(
        &self,
        name: &str,
        port: u16,
        pool_identifier: &str,
    ) -> Result<LoadBalancerRecord>;
    async fn delete_load_balancer(&self, identifier: &str) -> Result<()>;

    /// Tag any resource by identifier.
    async fn tag_resource(&self, identifier: &str, tags: &[(&str, &str)]) -> Result<()>;
}
