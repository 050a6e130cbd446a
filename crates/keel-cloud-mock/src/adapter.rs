//! In-memory cloud adapter
//!
//! Holds every record family in a mutex-guarded table keyed by resource
//! name. Identifiers are handed out sequentially per family (`net-1`,
//! `sub-2`, ...) so tests can assert on them literally. Deletes enforce
//! the same dependency rules a real provider would, surfacing
//! `DependencyViolation` when something still references the target.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use keel_cloud::adapter::{
    CloudAdapter, CreatePoolRequest, FirewallRecord, GatewayRecord, InstanceProfileRecord,
    KeypairRecord, LoadBalancerRecord, NetworkRecord, PoolRecord, RouteTableRecord, SubnetRecord,
};
use keel_cloud::error::{CloudError, Result};
use keel_core::cluster::Rule;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct MockState {
    counters: HashMap<&'static str, u32>,
    instance_counter: u32,
    keypairs: HashMap<String, KeypairRecord>,
    networks: HashMap<String, NetworkRecord>,
    gateways: HashMap<String, GatewayRecord>,
    subnets: HashMap<String, SubnetRecord>,
    route_tables: HashMap<String, RouteTableRecord>,
    firewalls: HashMap<String, FirewallRecord>,
    instance_profiles: HashMap<String, InstanceProfileRecord>,
    pools: HashMap<String, PoolRecord>,
    load_balancers: HashMap<String, LoadBalancerRecord>,
    tags: HashMap<String, BTreeMap<String, String>>,
    user_data: HashMap<String, String>,
    call_log: Vec<String>,
    mutations: u32,
    failures: HashMap<String, VecDeque<(String, String)>>,
}

/// In-memory cloud. Cheap to clone behind an `Arc` and share between a
/// `Session` and the test that inspects it afterwards.
#[derive(Debug, Default)]
pub struct MockCloud {
    inner: Mutex<MockState>,
}

impl MockCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log the call, serve any scripted failure, count the mutation.
    fn begin(&self, op: &'static str, mutating: bool) -> Result<()> {
        let mut state = self.state();
        state.call_log.push(op.to_string());
        if let Some(queue) = state.failures.get_mut(op)
            && let Some((code, message)) = queue.pop_front()
        {
            debug!(op, code = %code, "Mock serving scripted failure");
            return Err(CloudError::Provider { code, message });
        }
        if mutating {
            state.mutations += 1;
        }
        Ok(())
    }

    /// Script the next call to `op` to fail with a provider error.
    pub fn fail_once(&self, op: &str, code: &str, message: &str) {
        self.fail_times(op, 1, code, message);
    }

    /// Script the next `times` calls to `op` to fail.
    pub fn fail_times(&self, op: &str, times: usize, code: &str, message: &str) {
        let mut state = self.state();
        let queue = state.failures.entry(op.to_string()).or_default();
        for _ in 0..times {
            queue.push_back((code.to_string(), message.to_string()));
        }
    }

    /// Total number of create/update/delete calls served so far.
    pub fn mutation_count(&self) -> u32 {
        self.state().mutations
    }

    /// How many times `op` was called, failures included.
    pub fn calls_of(&self, op: &str) -> usize {
        self.state().call_log.iter().filter(|c| c.as_str() == op).count()
    }

    pub fn call_log(&self) -> Vec<String> {
        self.state().call_log.clone()
    }

    /// Forget the call log and mutation counter, keeping all records.
    pub fn reset_counters(&self) {
        let mut state = self.state();
        state.call_log.clear();
        state.mutations = 0;
    }

    /// Every extant record as `family:name`, sorted.
    pub fn remaining(&self) -> Vec<String> {
        let state = self.state();
        let mut all = Vec::new();
        all.extend(state.keypairs.keys().map(|n| format!("keypair:{}", n)));
        all.extend(state.networks.keys().map(|n| format!("network:{}", n)));
        all.extend(state.gateways.keys().map(|n| format!("gateway:{}", n)));
        all.extend(state.subnets.keys().map(|n| format!("subnet:{}", n)));
        all.extend(state.route_tables.keys().map(|n| format!("route-table:{}", n)));
        all.extend(state.firewalls.keys().map(|n| format!("firewall:{}", n)));
        all.extend(
            state
                .instance_profiles
                .keys()
                .map(|n| format!("instance-profile:{}", n)),
        );
        all.extend(state.pools.keys().map(|n| format!("pool:{}", n)));
        all.extend(
            state
                .load_balancers
                .keys()
                .map(|n| format!("load-balancer:{}", n)),
        );
        all.sort();
        all
    }

    /// Tags recorded for an identifier.
    pub fn tags(&self, identifier: &str) -> BTreeMap<String, String> {
        self.state().tags.get(identifier).cloned().unwrap_or_default()
    }

    /// The decoded bootstrap payload a pool was launched with.
    pub fn user_data(&self, pool_name: &str) -> Option<String> {
        self.state().user_data.get(pool_name).cloned()
    }
}

fn next_identifier(state: &mut MockState, prefix: &'static str) -> String {
    let counter = state.counters.entry(prefix).or_insert(0);
    *counter += 1;
    format!("{}-{}", prefix, counter)
}

fn next_instance_address(state: &mut MockState) -> String {
    state.instance_counter += 1;
    format!("10.0.0.{}", 10 + state.instance_counter)
}

/// Identifier match wins; fall back to the name key.
fn find_record<'a, T>(
    records: &'a HashMap<String, T>,
    identifier: &str,
    name: &str,
    id_of: fn(&T) -> &str,
) -> Option<&'a T> {
    if !identifier.is_empty()
        && let Some(found) = records.values().find(|r| id_of(r) == identifier)
    {
        return Some(found);
    }
    records.get(name)
}

fn remove_record<T>(
    records: &mut HashMap<String, T>,
    identifier: &str,
    id_of: fn(&T) -> &str,
) -> Option<T> {
    let name = records
        .iter()
        .find(|(_, r)| id_of(r) == identifier)
        .map(|(n, _)| n.clone())?;
    records.remove(&name)
}

fn not_found(what: &str, identifier: &str) -> CloudError {
    CloudError::Provider {
        code: "NotFound".to_string(),
        message: format!("{} '{}' does not exist", what, identifier),
    }
}

fn dependency_violation(message: String) -> CloudError {
    CloudError::Provider {
        code: "DependencyViolation".to_string(),
        message,
    }
}

fn key_fingerprint(public_key_data: &str) -> String {
    let mut hash: u64 = 5381;
    for b in public_key_data.bytes() {
        hash = hash.wrapping_mul(33) ^ u64::from(b);
    }
    hash.to_be_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

#[async_trait::async_trait]
impl CloudAdapter for MockCloud {
    fn name(&self) -> &str {
        "mock"
    }

    async fn find_keypair(&self, identifier: &str, name: &str) -> Result<Option<KeypairRecord>> {
        self.begin("find_keypair", false)?;
        let state = self.state();
        Ok(find_record(&state.keypairs, identifier, name, |r| &r.identifier).cloned())
    }

    async fn import_keypair(&self, name: &str, public_key_data: &str) -> Result<KeypairRecord> {
        self.begin("import_keypair", true)?;
        let mut state = self.state();
        let record = KeypairRecord {
            identifier: next_identifier(&mut state, "key"),
            fingerprint: key_fingerprint(public_key_data),
            public_key_data: public_key_data.to_string(),
        };
        state.keypairs.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn delete_keypair(&self, identifier: &str) -> Result<()> {
        self.begin("delete_keypair", true)?;
        let mut state = self.state();
        remove_record(&mut state.keypairs, identifier, |r| &r.identifier)
            .ok_or_else(|| not_found("keypair", identifier))?;
        state.tags.remove(identifier);
        Ok(())
    }

    async fn find_network(&self, identifier: &str, name: &str) -> Result<Option<NetworkRecord>> {
        self.begin("find_network", false)?;
        let state = self.state();
        Ok(find_record(&state.networks, identifier, name, |r| &r.identifier).cloned())
    }

    async fn create_network(&self, name: &str, cidr: &str) -> Result<NetworkRecord> {
        self.begin("create_network", true)?;
        let mut state = self.state();
        let record = NetworkRecord {
            identifier: next_identifier(&mut state, "net"),
            cidr: cidr.to_string(),
        };
        state.networks.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn delete_network(&self, identifier: &str) -> Result<()> {
        self.begin("delete_network", true)?;
        let mut state = self.state();
        let dependents = state
            .subnets
            .values()
            .filter(|s| s.network_identifier == identifier)
            .count()
            + state
                .firewalls
                .values()
                .filter(|f| f.network_identifier == identifier)
                .count()
            + state
                .gateways
                .values()
                .filter(|g| g.network_identifier == identifier)
                .count();
        if dependents > 0 {
            return Err(dependency_violation(format!(
                "The network '{}' has {} dependencies and cannot be deleted",
                identifier, dependents
            )));
        }
        remove_record(&mut state.networks, identifier, |r| &r.identifier)
            .ok_or_else(|| not_found("network", identifier))?;
        state.tags.remove(identifier);
        Ok(())
    }

    async fn find_gateway(&self, identifier: &str, name: &str) -> Result<Option<GatewayRecord>> {
        self.begin("find_gateway", false)?;
        let state = self.state();
        Ok(find_record(&state.gateways, identifier, name, |r| &r.identifier).cloned())
    }

    async fn create_gateway(&self, name: &str) -> Result<GatewayRecord> {
        self.begin("create_gateway", true)?;
        let mut state = self.state();
        let record = GatewayRecord {
            identifier: next_identifier(&mut state, "igw"),
            network_identifier: String::new(),
        };
        state.gateways.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn attach_gateway(&self, identifier: &str, network_identifier: &str) -> Result<()> {
        self.begin("attach_gateway", true)?;
        let mut state = self.state();
        let record = state
            .gateways
            .values_mut()
            .find(|g| g.identifier == identifier)
            .ok_or_else(|| not_found("gateway", identifier))?;
        record.network_identifier = network_identifier.to_string();
        Ok(())
    }

    async fn detach_gateway(&self, identifier: &str, _network_identifier: &str) -> Result<()> {
        self.begin("detach_gateway", true)?;
        let mut state = self.state();
        let record = state
            .gateways
            .values_mut()
            .find(|g| g.identifier == identifier)
            .ok_or_else(|| not_found("gateway", identifier))?;
        record.network_identifier.clear();
        Ok(())
    }

    async fn delete_gateway(&self, identifier: &str) -> Result<()> {
        self.begin("delete_gateway", true)?;
        let mut state = self.state();
        if let Some(record) = state.gateways.values().find(|g| g.identifier == identifier)
            && !record.network_identifier.is_empty()
        {
            return Err(dependency_violation(format!(
                "The gateway '{}' is still attached to '{}'",
                identifier, record.network_identifier
            )));
        }
        remove_record(&mut state.gateways, identifier, |r| &r.identifier)
            .ok_or_else(|| not_found("gateway", identifier))?;
        state.tags.remove(identifier);
        Ok(())
    }

    async fn find_subnet(&self, identifier: &str, name: &str) -> Result<Option<SubnetRecord>> {
        self.begin("find_subnet", false)?;
        let state = self.state();
        Ok(find_record(&state.subnets, identifier, name, |r| &r.identifier).cloned())
    }

    async fn create_subnet(
        &self,
        name: &str,
        cidr: &str,
        zone: &str,
        network_identifier: &str,
    ) -> Result<SubnetRecord> {
        self.begin("create_subnet", true)?;
        let mut state = self.state();
        if !state.networks.values().any(|n| n.identifier == network_identifier) {
            return Err(not_found("network", network_identifier));
        }
        let record = SubnetRecord {
            identifier: next_identifier(&mut state, "sub"),
            cidr: cidr.to_string(),
            zone: zone.to_string(),
            network_identifier: network_identifier.to_string(),
        };
        state.subnets.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn delete_subnet(&self, identifier: &str) -> Result<()> {
        self.begin("delete_subnet", true)?;
        let mut state = self.state();
        let dependents = state
            .pools
            .values()
            .filter(|p| p.subnet_identifiers.iter().any(|s| s == identifier))
            .count()
            + state
                .route_tables
                .values()
                .filter(|t| t.subnet_identifier == identifier)
                .count();
        if dependents > 0 {
            return Err(dependency_violation(format!(
                "The subnet '{}' has {} dependencies and cannot be deleted",
                identifier, dependents
            )));
        }
        remove_record(&mut state.subnets, identifier, |r| &r.identifier)
            .ok_or_else(|| not_found("subnet", identifier))?;
        state.tags.remove(identifier);
        Ok(())
    }

    async fn find_route_table(
        &self,
        identifier: &str,
        name: &str,
    ) -> Result<Option<RouteTableRecord>> {
        self.begin("find_route_table", false)?;
        let state = self.state();
        Ok(find_record(&state.route_tables, identifier, name, |r| &r.identifier).cloned())
    }

    async fn create_route_table(
        &self,
        name: &str,
        network_identifier: &str,
    ) -> Result<RouteTableRecord> {
        self.begin("create_route_table", true)?;
        let mut state = self.state();
        if !state.networks.values().any(|n| n.identifier == network_identifier) {
            return Err(not_found("network", network_identifier));
        }
        let record = RouteTableRecord {
            identifier: next_identifier(&mut state, "rtb"),
            subnet_identifier: String::new(),
            gateway_identifier: String::new(),
        };
        state.route_tables.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn create_default_route(
        &self,
        identifier: &str,
        gateway_identifier: &str,
    ) -> Result<()> {
        self.begin("create_default_route", true)?;
        let mut state = self.state();
        let record = state
            .route_tables
            .values_mut()
            .find(|t| t.identifier == identifier)
            .ok_or_else(|| not_found("route table", identifier))?;
        record.gateway_identifier = gateway_identifier.to_string();
        Ok(())
    }

    async fn associate_route_table(
        &self,
        identifier: &str,
        subnet_identifier: &str,
    ) -> Result<()> {
        self.begin("associate_route_table", true)?;
        let mut state = self.state();
        let record = state
            .route_tables
            .values_mut()
            .find(|t| t.identifier == identifier)
            .ok_or_else(|| not_found("route table", identifier))?;
        record.subnet_identifier = subnet_identifier.to_string();
        Ok(())
    }

    async fn delete_route_table(&self, identifier: &str) -> Result<()> {
        self.begin("delete_route_table", true)?;
        let mut state = self.state();
        remove_record(&mut state.route_tables, identifier, |r| &r.identifier)
            .ok_or_else(|| not_found("route table", identifier))?;
        state.tags.remove(identifier);
        Ok(())
    }

    async fn find_firewall(&self, identifier: &str, name: &str) -> Result<Option<FirewallRecord>> {
        self.begin("find_firewall", false)?;
        let state = self.state();
        Ok(find_record(&state.firewalls, identifier, name, |r| &r.identifier).cloned())
    }

    async fn create_firewall(
        &self,
        name: &str,
        network_identifier: &str,
    ) -> Result<FirewallRecord> {
        self.begin("create_firewall", true)?;
        let mut state = self.state();
        if !state.networks.values().any(|n| n.identifier == network_identifier) {
            return Err(not_found("network", network_identifier));
        }
        let record = FirewallRecord {
            identifier: next_identifier(&mut state, "sg"),
            network_identifier: network_identifier.to_string(),
            ingress_rules: Vec::new(),
            egress_rules: Vec::new(),
        };
        state.firewalls.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn set_firewall_rules(
        &self,
        identifier: &str,
        ingress_rules: &[Rule],
        egress_rules: &[Rule],
    ) -> Result<()> {
        self.begin("set_firewall_rules", true)?;
        let mut state = self.state();
        let record = state
            .firewalls
            .values_mut()
            .find(|f| f.identifier == identifier)
            .ok_or_else(|| not_found("firewall", identifier))?;
        record.ingress_rules = ingress_rules.to_vec();
        record.egress_rules = egress_rules.to_vec();
        Ok(())
    }

    async fn delete_firewall(&self, identifier: &str) -> Result<()> {
        self.begin("delete_firewall", true)?;
        let mut state = self.state();
        let dependents = state
            .pools
            .values()
            .filter(|p| p.firewall_identifiers.iter().any(|f| f == identifier))
            .count();
        if dependents > 0 {
            return Err(dependency_violation(format!(
                "The firewall '{}' has {} dependencies and cannot be deleted",
                identifier, dependents
            )));
        }
        remove_record(&mut state.firewalls, identifier, |r| &r.identifier)
            .ok_or_else(|| not_found("firewall", identifier))?;
        state.tags.remove(identifier);
        Ok(())
    }

    async fn find_instance_profile(
        &self,
        identifier: &str,
        name: &str,
    ) -> Result<Option<InstanceProfileRecord>> {
        self.begin("find_instance_profile", false)?;
        let state = self.state();
        Ok(find_record(&state.instance_profiles, identifier, name, |r| &r.identifier).cloned())
    }

    async fn create_instance_profile(
        &self,
        name: &str,
        role_name: &str,
        policies: &[String],
    ) -> Result<InstanceProfileRecord> {
        self.begin("create_instance_profile", true)?;
        let mut state = self.state();
        let record = InstanceProfileRecord {
            identifier: next_identifier(&mut state, "prof"),
            role_name: role_name.to_string(),
            policies: policies.to_vec(),
        };
        state.instance_profiles.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn delete_instance_profile(&self, identifier: &str) -> Result<()> {
        self.begin("delete_instance_profile", true)?;
        let mut state = self.state();
        let dependents = state
            .pools
            .values()
            .filter(|p| p.instance_profile_identifier == identifier)
            .count();
        if dependents > 0 {
            return Err(dependency_violation(format!(
                "The instance profile '{}' has {} dependencies and cannot be deleted",
                identifier, dependents
            )));
        }
        remove_record(&mut state.instance_profiles, identifier, |r| &r.identifier)
            .ok_or_else(|| not_found("instance profile", identifier))?;
        state.tags.remove(identifier);
        Ok(())
    }

    async fn find_pool(&self, identifier: &str, name: &str) -> Result<Option<PoolRecord>> {
        self.begin("find_pool", false)?;
        let state = self.state();
        Ok(find_record(&state.pools, identifier, name, |r| &r.identifier).cloned())
    }

    async fn create_pool(&self, request: &CreatePoolRequest) -> Result<PoolRecord> {
        self.begin("create_pool", true)?;
        let mut state = self.state();
        let decoded = STANDARD.decode(request.user_data.as_bytes()).map_err(|e| {
            CloudError::Provider {
                code: "InvalidUserData.Malformed".to_string(),
                message: e.to_string(),
            }
        })?;
        let payload = String::from_utf8(decoded).map_err(|e| CloudError::Provider {
            code: "InvalidUserData.Malformed".to_string(),
            message: e.to_string(),
        })?;
        state.user_data.insert(request.name.clone(), payload);

        let addresses = (0..request.min_count)
            .map(|_| next_instance_address(&mut state))
            .collect::<Vec<_>>();
        let record = PoolRecord {
            identifier: next_identifier(&mut state, "pool"),
            image: request.image.clone(),
            size: request.size.clone(),
            min_count: request.min_count,
            max_count: request.max_count,
            subnet_identifiers: request.subnet_identifiers.clone(),
            firewall_identifiers: request.firewall_identifiers.clone(),
            instance_profile_identifier: request.instance_profile_identifier.clone(),
            instance_addresses: addresses,
            ready: true,
        };
        state.pools.insert(request.name.clone(), record.clone());
        Ok(record)
    }

    async fn resize_pool(&self, identifier: &str, min_count: u32, max_count: u32) -> Result<()> {
        self.begin("resize_pool", true)?;
        let mut state = self.state();
        let running = state
            .pools
            .values()
            .find(|p| p.identifier == identifier)
            .map(|p| p.instance_addresses.len())
            .ok_or_else(|| not_found("pool", identifier))?;
        let missing = (min_count as usize).saturating_sub(running);
        let fresh = (0..missing)
            .map(|_| next_instance_address(&mut state))
            .collect::<Vec<_>>();
        if let Some(record) = state.pools.values_mut().find(|p| p.identifier == identifier) {
            record.min_count = min_count;
            record.max_count = max_count;
            record.instance_addresses.extend(fresh);
            record.instance_addresses.truncate(max_count as usize);
            record.ready = record.instance_addresses.len() >= min_count as usize;
        }
        Ok(())
    }

    async fn delete_pool(&self, identifier: &str) -> Result<()> {
        self.begin("delete_pool", true)?;
        let mut state = self.state();
        let dependents = state
            .load_balancers
            .values()
            .filter(|lb| lb.pool_identifier == identifier)
            .count();
        if dependents > 0 {
            return Err(dependency_violation(format!(
                "The pool '{}' is still behind a load balancer",
                identifier
            )));
        }
        remove_record(&mut state.pools, identifier, |r| &r.identifier)
            .ok_or_else(|| not_found("pool", identifier))?;
        state.tags.remove(identifier);
        Ok(())
    }

    async fn find_load_balancer(
        &self,
        identifier: &str,
        name: &str,
    ) -> Result<Option<LoadBalancerRecord>> {
        self.begin("find_load_balancer", false)?;
        let state = self.state();
        Ok(find_record(&state.load_balancers, identifier, name, |r| &r.identifier).cloned())
    }

    async fn create_load_balancer(
        &self,
        name: &str,
        port: u16,
        pool_identifier: &str,
    ) -> Result<LoadBalancerRecord> {
        self.begin("create_load_balancer", true)?;
        let mut state = self.state();
        if !state.pools.values().any(|p| p.identifier == pool_identifier) {
            return Err(not_found("pool", pool_identifier));
        }
        let record = LoadBalancerRecord {
            identifier: next_identifier(&mut state, "lb"),
            port,
            address: format!("{}.lb.mock.local", name),
            pool_identifier: pool_identifier.to_string(),
        };
        state.load_balancers.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn delete_load_balancer(&self, identifier: &str) -> Result<()> {
        self.begin("delete_load_balancer", true)?;
        let mut state = self.state();
        remove_record(&mut state.load_balancers, identifier, |r| &r.identifier)
            .ok_or_else(|| not_found("load balancer", identifier))?;
        state.tags.remove(identifier);
        Ok(())
    }

    async fn tag_resource(&self, identifier: &str, tags: &[(&str, &str)]) -> Result<()> {
        self.begin("tag_resource", true)?;
        let mut state = self.state();
        let exists = state.keypairs.values().any(|r| r.identifier == identifier)
            || state.networks.values().any(|r| r.identifier == identifier)
            || state.gateways.values().any(|r| r.identifier == identifier)
            || state.subnets.values().any(|r| r.identifier == identifier)
            || state.route_tables.values().any(|r| r.identifier == identifier)
            || state.firewalls.values().any(|r| r.identifier == identifier)
            || state
                .instance_profiles
                .values()
                .any(|r| r.identifier == identifier)
            || state.pools.values().any(|r| r.identifier == identifier)
            || state
                .load_balancers
                .values()
                .any(|r| r.identifier == identifier);
        if !exists {
            return Err(not_found("resource", identifier));
        }
        let entry = state.tags.entry(identifier.to_string()).or_default();
        for (key, value) in tags {
            entry.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identifiers_are_sequential_per_family() {
        let mock = MockCloud::new();
        let first = mock.create_network("a", "10.0.0.0/16").await.unwrap();
        let second = mock.create_network("b", "10.1.0.0/16").await.unwrap();
        let gateway = mock.create_gateway("a").await.unwrap();
        assert_eq!(first.identifier, "net-1");
        assert_eq!(second.identifier, "net-2");
        assert_eq!(gateway.identifier, "igw-1");
    }

    #[tokio::test]
    async fn find_prefers_identifier_and_falls_back_to_name() {
        let mock = MockCloud::new();
        let network = mock.create_network("a", "10.0.0.0/16").await.unwrap();

        let by_id = mock.find_network(&network.identifier, "wrong-name").await.unwrap();
        assert_eq!(by_id.as_ref().map(|n| n.cidr.as_str()), Some("10.0.0.0/16"));

        let by_name = mock.find_network("", "a").await.unwrap();
        assert!(by_name.is_some());

        assert!(mock.find_network("", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scripted_failure_is_served_once() {
        let mock = MockCloud::new();
        mock.fail_once("create_network", "InternalError", "boom");

        let err = mock.create_network("a", "10.0.0.0/16").await.unwrap_err();
        assert!(matches!(
            err,
            CloudError::Provider { code, .. } if code == "InternalError"
        ));
        assert!(mock.create_network("a", "10.0.0.0/16").await.is_ok());
    }

    #[tokio::test]
    async fn network_with_subnets_cannot_be_deleted() {
        let mock = MockCloud::new();
        let network = mock.create_network("a", "10.0.0.0/16").await.unwrap();
        mock.create_subnet("a-1", "10.0.10.0/24", "z1", &network.identifier)
            .await
            .unwrap();

        let err = mock.delete_network(&network.identifier).await.unwrap_err();
        assert!(matches!(
            err,
            CloudError::Provider { code, .. } if code == "DependencyViolation"
        ));
    }

    #[tokio::test]
    async fn pool_gets_instances_and_decoded_user_data() {
        let mock = MockCloud::new();
        let request = CreatePoolRequest {
            name: "workers".to_string(),
            image: "ubuntu".to_string(),
            size: "m.large".to_string(),
            min_count: 2,
            max_count: 3,
            user_data: STANDARD.encode("#!/bin/sh\necho hi\n"),
            ..Default::default()
        };

        let record = mock.create_pool(&request).await.unwrap();
        assert_eq!(record.instance_addresses, vec!["10.0.0.11", "10.0.0.12"]);
        assert!(record.ready);
        assert_eq!(
            mock.user_data("workers").as_deref(),
            Some("#!/bin/sh\necho hi\n")
        );
    }

    #[tokio::test]
    async fn resize_grows_instances_to_the_new_minimum() {
        let mock = MockCloud::new();
        let request = CreatePoolRequest {
            name: "workers".to_string(),
            min_count: 1,
            max_count: 1,
            ..Default::default()
        };
        let record = mock.create_pool(&request).await.unwrap();

        mock.resize_pool(&record.identifier, 3, 3).await.unwrap();
        let resized = mock.find_pool(&record.identifier, "workers").await.unwrap().unwrap();
        assert_eq!(resized.min_count, 3);
        assert_eq!(resized.instance_addresses.len(), 3);
        assert!(resized.ready);
    }

    #[tokio::test]
    async fn mutation_counter_ignores_lookups() {
        let mock = MockCloud::new();
        mock.create_network("a", "10.0.0.0/16").await.unwrap();
        mock.find_network("", "a").await.unwrap();
        mock.find_network("", "a").await.unwrap();
        assert_eq!(mock.mutation_count(), 1);
        assert_eq!(mock.calls_of("find_network"), 2);
    }
}
