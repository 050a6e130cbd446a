//! Pool subnets

use super::{CLUSTER_TAG, NAME_TAG, require_pool, require_subnet, unexpected_state};
use crate::compare;
use crate::error::{CloudError, Result};
use crate::resource::{Resource, ResourceKind, ResourceState, Session, SubnetState};
use async_trait::async_trait;
use keel_core::cluster::Cluster;
use tracing::{debug, info};

pub struct SubnetResource {
    pool_name: String,
    name: String,
}

impl SubnetResource {
    pub fn new(pool_name: &str, subnet_name: &str) -> Self {
        Self {
            pool_name: pool_name.to_string(),
            name: subnet_name.to_string(),
        }
    }
}

fn expected_subnet(cluster: &Cluster, pool_name: &str, name: &str) -> Result<SubnetState> {
    let pool = require_pool(cluster, pool_name)?;
    let subnet = require_subnet(pool, name)?;
    Ok(SubnetState {
        name: name.to_string(),
        identifier: subnet.identifier.clone(),
        cidr: subnet.cidr.clone(),
        zone: subnet.zone.clone(),
        network_identifier: cluster.network.identifier.clone(),
    })
}

#[async_trait]
impl Resource for SubnetResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Subnet
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn actual(
        &self,
        session: &Session,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let pool = require_pool(known, &self.pool_name)?;
        let subnet = require_subnet(pool, &self.name)?;

        let state = match session
            .adapter
            .find_subnet(&subnet.identifier, &self.name)
            .await?
        {
            Some(record) => ResourceState::Subnet(SubnetState {
                name: self.name.clone(),
                identifier: record.identifier,
                cidr: record.cidr,
                zone: record.zone,
                network_identifier: record.network_identifier,
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
        let state = ResourceState::Subnet(expected_subnet(known, &self.pool_name, &self.name)?);
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
            debug!(subnet = %self.name, "Subnet unchanged");
            let ResourceState::Subnet(state) = actual.clone() else {
                return Err(unexpected_state(self.kind(), actual));
            };
            let pool = require_pool(known, &self.pool_name)?;
            let mut subnet = require_subnet(pool, &self.name)?.clone();
            subnet.identifier = state.identifier.clone();
            let refined = known
                .clone()
                .with_pool(pool.clone().with_subnet(subnet));
            return Ok((refined, ResourceState::Subnet(state)));
        }

        // An existing subnet matching the declared block is adopted; a
        // changed cidr or zone needs a destroy.
        if let ResourceState::Subnet(state) = actual
            && !state.identifier.is_empty()
        {
            let pool = require_pool(known, &self.pool_name)?;
            let spec = require_subnet(pool, &self.name)?;
            if state.cidr != spec.cidr || (!spec.zone.is_empty() && state.zone != spec.zone) {
                return Err(CloudError::Precondition(format!(
                    "subnet '{}' cannot change cidr or zone in place",
                    self.name
                )));
            }
            debug!(subnet = %self.name, identifier = %state.identifier, "Adopted existing subnet");
            let mut subnet = spec.clone();
            subnet.identifier = state.identifier.clone();
            let refined = known.clone().with_pool(pool.clone().with_subnet(subnet));
            return Ok((refined, ResourceState::Subnet(state.clone())));
        }

        let network_identifier = known.network.identifier.clone();
        if network_identifier.is_empty() {
            return Err(CloudError::Precondition(format!(
                "network identifier not resolved before subnet '{}'",
                self.name
            )));
        }

        let pool = require_pool(known, &self.pool_name)?;
        let spec = require_subnet(pool, &self.name)?.clone();

        let record = session
            .adapter
            .create_subnet(&self.name, &spec.cidr, &spec.zone, &network_identifier)
            .await?;
        session
            .adapter
            .tag_resource(
                &record.identifier,
                &[(NAME_TAG, self.name.as_str()), (CLUSTER_TAG, known.name.as_str())],
            )
            .await?;
        info!(subnet = %self.name, identifier = %record.identifier, cidr = %record.cidr, "Created subnet");

        let mut subnet = spec;
        subnet.identifier = record.identifier.clone();
        let refined = known
            .clone()
            .with_pool(pool.clone().with_subnet(subnet));
        let state = SubnetState {
            name: self.name.clone(),
            identifier: record.identifier,
            cidr: record.cidr,
            zone: record.zone,
            network_identifier: record.network_identifier,
        };
        Ok((refined, ResourceState::Subnet(state)))
    }

    async fn delete(
        &self,
        session: &Session,
        actual: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let ResourceState::Subnet(state) = actual else {
            return Err(unexpected_state(self.kind(), actual));
        };
        if state.identifier.is_empty() {
            return Ok((known.clone(), ResourceState::zero(self.kind())));
        }

        session.adapter.delete_subnet(&state.identifier).await?;
        info!(subnet = %self.name, identifier = %state.identifier, "Deleted subnet");

        let pool = require_pool(known, &self.pool_name)?;
        let mut subnet = require_subnet(pool, &self.name)?.clone();
        subnet.identifier = String::new();
        let refined = known
            .clone()
            .with_pool(pool.clone().with_subnet(subnet));
        Ok((refined, ResourceState::zero(self.kind())))
    }
}
