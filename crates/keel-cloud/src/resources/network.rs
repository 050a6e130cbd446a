//! The cluster network (VPC)

use super::{CLUSTER_TAG, NAME_TAG, unexpected_state};
use crate::compare;
use crate::error::{CloudError, Result};
use crate::resource::{NetworkState, Resource, ResourceKind, ResourceState, Session};
use async_trait::async_trait;
use keel_core::cluster::Cluster;
use tracing::{debug, info};

pub struct NetworkResource {
    name: String,
}

impl NetworkResource {
    pub fn new(cluster: &Cluster) -> Self {
        Self {
            name: cluster.name.clone(),
        }
    }
}

/// Desired network state as derivable from a snapshot. The identifier
/// comes from the snapshot, so an adopted cluster expects exactly what
/// the cloud holds.
fn expected_network(cluster: &Cluster, name: &str) -> NetworkState {
    NetworkState {
        name: name.to_string(),
        identifier: cluster.network.identifier.clone(),
        cidr: cluster.network.cidr.clone(),
    }
}

#[async_trait]
impl Resource for NetworkResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Network
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn actual(
        &self,
        session: &Session,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let state = match session
            .adapter
            .find_network(&known.network.identifier, &self.name)
            .await?
        {
            Some(record) => ResourceState::Network(NetworkState {
                name: self.name.clone(),
                identifier: record.identifier,
                cidr: record.cidr,
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
        let state = ResourceState::Network(expected_network(known, &self.name));
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
            debug!(network = %self.name, "Network unchanged");
            let ResourceState::Network(state) = actual.clone() else {
                return Err(unexpected_state(self.kind(), actual));
            };
            let mut network = known.network.clone();
            network.identifier = state.identifier.clone();
            return Ok((known.clone().with_network(network), ResourceState::Network(state)));
        }

        // An existing network with the right block is adopted; only the
        // identifier was missing from the snapshot.
        if let ResourceState::Network(state) = actual
            && !state.identifier.is_empty()
        {
            if state.cidr != known.network.cidr {
                return Err(CloudError::Precondition(format!(
                    "network '{}' cannot change cidr in place",
                    self.name
                )));
            }
            debug!(network = %self.name, identifier = %state.identifier, "Adopted existing network");
            let mut network = known.network.clone();
            network.identifier = state.identifier.clone();
            return Ok((
                known.clone().with_network(network),
                ResourceState::Network(state.clone()),
            ));
        }

        let record = session
            .adapter
            .create_network(&self.name, &known.network.cidr)
            .await?;
        session
            .adapter
            .tag_resource(
                &record.identifier,
                &[(NAME_TAG, self.name.as_str()), (CLUSTER_TAG, known.name.as_str())],
            )
            .await?;
        info!(network = %self.name, identifier = %record.identifier, "Created network");

        let mut network = known.network.clone();
        network.identifier = record.identifier.clone();
        let state = NetworkState {
            name: self.name.clone(),
            identifier: record.identifier,
            cidr: record.cidr,
        };
        Ok((known.clone().with_network(network), ResourceState::Network(state)))
    }

    async fn delete(
        &self,
        session: &Session,
        actual: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let ResourceState::Network(state) = actual else {
            return Err(unexpected_state(self.kind(), actual));
        };
        if state.identifier.is_empty() {
            return Ok((known.clone(), ResourceState::zero(self.kind())));
        }

        session.adapter.delete_network(&state.identifier).await?;
        info!(network = %self.name, identifier = %state.identifier, "Deleted network");

        let mut network = known.network.clone();
        network.identifier = String::new();
        Ok((known.clone().with_network(network), ResourceState::zero(self.kind())))
    }
}
