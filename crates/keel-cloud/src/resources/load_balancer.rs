//! Optional load balancer fronting the Kubernetes API

use super::{CLUSTER_TAG, NAME_TAG, unexpected_state};
use crate::compare;
use crate::error::{CloudError, Result};
use crate::resource::{LoadBalancerState, Resource, ResourceKind, ResourceState, Session};
use async_trait::async_trait;
use keel_core::cluster::{ApiLoadBalancer, Cluster};
use tracing::{debug, info};

pub struct LoadBalancerResource {
    name: String,
    master_pool: String,
}

impl LoadBalancerResource {
    pub fn new(name: &str, master_pool: &str) -> Self {
        Self {
            name: name.to_string(),
            master_pool: master_pool.to_string(),
        }
    }
}

fn require_balancer<'a>(cluster: &'a Cluster, name: &str) -> Result<&'a ApiLoadBalancer> {
    match &cluster.api_load_balancer {
        Some(lb) if lb.name == name => Ok(lb),
        _ => Err(CloudError::Precondition(format!(
            "load balancer '{}' missing from snapshot",
            name
        ))),
    }
}

fn expected_balancer(cluster: &Cluster, name: &str, master_pool: &str) -> Result<LoadBalancerState> {
    let lb = require_balancer(cluster, name)?;
    let pool_identifier = cluster
        .pool(master_pool)
        .map(|p| p.identifier.clone())
        .unwrap_or_default();
    Ok(LoadBalancerState {
        name: name.to_string(),
        identifier: lb.identifier.clone(),
        port: lb.port,
        address: lb.address.clone(),
        pool_identifier,
    })
}

#[async_trait]
impl Resource for LoadBalancerResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::LoadBalancer
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn actual(
        &self,
        session: &Session,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let lb = require_balancer(known, &self.name)?;

        let state = match session
            .adapter
            .find_load_balancer(&lb.identifier, &self.name)
            .await?
        {
            Some(record) => ResourceState::LoadBalancer(LoadBalancerState {
                name: self.name.clone(),
                identifier: record.identifier,
                port: record.port,
                address: record.address,
                pool_identifier: record.pool_identifier,
            }),
            None => ResourceState::zero(self.kind()),
        };
        Ok((known.clone(), state))
    }

    async fn expected(
        &self,
        _session: &Session,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let state =
            ResourceState::LoadBalancer(expected_balancer(known, &self.name, &self.master_pool)?);
        Ok((known.clone(), state))
    }

    async fn apply(
        &self,
        session: &Session,
        actual: &ResourceState,
        expected: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        if compare::is_equal(actual, expected)? {
            debug!(load_balancer = %self.name, "Load balancer unchanged");
            let ResourceState::LoadBalancer(state) = actual.clone() else {
                return Err(unexpected_state(self.kind(), actual));
            };
            let mut lb = require_balancer(known, &self.name)?.clone();
            lb.identifier = state.identifier.clone();
            lb.address = state.address.clone();
            let cluster = if state.address.is_empty() {
                known.clone().with_load_balancer(lb)
            } else {
                known
                    .clone()
                    .with_load_balancer(lb)
                    .with_api_endpoint(state.address.clone())
            };
            return Ok((cluster, ResourceState::LoadBalancer(state)));
        }

        let pool_identifier = known
            .pool(&self.master_pool)
            .map(|p| p.identifier.clone())
            .unwrap_or_default();
        if pool_identifier.is_empty() {
            return Err(CloudError::Precondition(format!(
                "master pool not resolved before load balancer '{}'",
                self.name
            )));
        }

        let spec = require_balancer(known, &self.name)?.clone();

        // An existing balancer already pointing at the master pool on the
        // right port is adopted; its address becomes the API endpoint.
        if let ResourceState::LoadBalancer(state) = actual
            && !state.identifier.is_empty()
        {
            if state.port != spec.port || state.pool_identifier != pool_identifier {
                return Err(CloudError::Precondition(format!(
                    "load balancer '{}' cannot change port or target in place",
                    self.name
                )));
            }
            debug!(load_balancer = %self.name, identifier = %state.identifier, "Adopted existing load balancer");
            let mut lb = spec;
            lb.identifier = state.identifier.clone();
            lb.address = state.address.clone();
            let cluster = known
                .clone()
                .with_load_balancer(lb)
                .with_api_endpoint(state.address.clone());
            return Ok((cluster, ResourceState::LoadBalancer(state.clone())));
        }
        let record = session
            .adapter
            .create_load_balancer(&self.name, spec.port, &pool_identifier)
            .await?;
        session
            .adapter
            .tag_resource(
                &record.identifier,
                &[(NAME_TAG, self.name.as_str()), (CLUSTER_TAG, known.name.as_str())],
            )
            .await?;
        info!(
            load_balancer = %self.name,
            identifier = %record.identifier,
            address = %record.address,
            "Created load balancer"
        );

        let mut lb = spec;
        lb.identifier = record.identifier.clone();
        lb.address = record.address.clone();
        // The balancer becomes the cluster's API endpoint.
        let cluster = known
            .clone()
            .with_load_balancer(lb)
            .with_api_endpoint(record.address.clone());
        let state = LoadBalancerState {
            name: self.name.clone(),
            identifier: record.identifier,
            port: record.port,
            address: record.address,
            pool_identifier: record.pool_identifier,
        };
        Ok((cluster, ResourceState::LoadBalancer(state)))
    }

    async fn delete(
        &self,
        session: &Session,
        actual: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let ResourceState::LoadBalancer(state) = actual else {
            return Err(unexpected_state(self.kind(), actual));
        };
        if state.identifier.is_empty() {
            return Ok((known.clone(), ResourceState::zero(self.kind())));
        }

        session
            .adapter
            .delete_load_balancer(&state.identifier)
            .await?;
        info!(load_balancer = %self.name, identifier = %state.identifier, "Deleted load balancer");

        let mut lb = require_balancer(known, &self.name)?.clone();
        lb.identifier = String::new();
        lb.address = String::new();
        let cluster = known
            .clone()
            .with_load_balancer(lb)
            .with_api_endpoint("");
        Ok((cluster, ResourceState::zero(self.kind())))
    }
}
