//! The ordered resource model
//!
//! `Model::build` maps a cluster snapshot to the flat, ordered list of
//! resources the reconciler walks. List position is the only dependency
//! encoding there is: nothing here builds a graph, and the loops never
//! reorder or parallelize. Building is deterministic and touches no
//! external state.

use crate::resource::{Resource, ResourceKind};
use crate::resources::{
    FirewallResource, GatewayResource, InstanceProfileResource, KeypairResource,
    LoadBalancerResource, NetworkResource, PoolResource, RouteTableResource, SubnetResource,
};
use keel_core::cluster::Cluster;
use tracing::debug;

pub struct Model {
    resources: Vec<Box<dyn Resource>>,
}

impl Model {
    /// Build the model for a cluster.
    ///
    /// Kind order: keypair, network, gateway, subnets, route tables,
    /// firewalls, instance profiles, pools, load balancer. Pool-derived
    /// kinds are emitted kind-major (all subnets before any route
    /// table), with masters before node pools within each kind.
    pub fn build(cluster: &Cluster) -> Self {
        let mut resources: Vec<Box<dyn Resource>> = Vec::new();

        if !cluster.ssh.public_key_data.is_empty() || !cluster.ssh.public_key_path.is_empty() {
            resources.push(Box::new(KeypairResource::new(cluster)));
        }
        resources.push(Box::new(NetworkResource::new(cluster)));
        resources.push(Box::new(GatewayResource::new(cluster)));

        let pools = cluster.pools_masters_first();

        for pool in &pools {
            for subnet in &pool.subnets {
                resources.push(Box::new(SubnetResource::new(&pool.name, &subnet.name)));
            }
        }
        for pool in &pools {
            for subnet in &pool.subnets {
                resources.push(Box::new(RouteTableResource::new(&pool.name, &subnet.name)));
            }
        }
        for pool in &pools {
            for firewall in &pool.firewalls {
                resources.push(Box::new(FirewallResource::new(&pool.name, &firewall.name)));
            }
        }
        for pool in &pools {
            if let Some(profile) = &pool.instance_profile {
                resources.push(Box::new(InstanceProfileResource::new(
                    &pool.name,
                    &profile.name,
                )));
            }
        }
        for pool in &pools {
            resources.push(Box::new(PoolResource::new(pool)));
        }

        if let Some(lb) = &cluster.api_load_balancer
            && let Some(master) = pools.iter().find(|p| p.role.is_master())
        {
            resources.push(Box::new(LoadBalancerResource::new(&lb.name, &master.name)));
        }

        debug!(
            cluster = %cluster.name,
            resources = resources.len(),
            "Built resource model"
        );
        Self { resources }
    }

    pub fn resources(&self) -> &[Box<dyn Resource>] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &dyn Resource> {
        self.resources.iter().map(Box::as_ref)
    }

    /// (kind, name) pairs in model order, for plans and logs.
    pub fn describe(&self) -> Vec<(ResourceKind, String)> {
        self.iter()
            .map(|r| (r.kind(), r.name().to_string()))
            .collect()
    }
}
