//! Internet gateway, created then attached to the network

use super::{CLUSTER_TAG, NAME_TAG, unexpected_state};
use crate::compare;
use crate::error::{CloudError, Result};
use crate::resource::{GatewayState, Resource, ResourceKind, ResourceState, Session};
use async_trait::async_trait;
use keel_core::cluster::Cluster;
use tracing::{debug, info};

pub struct GatewayResource {
    name: String,
}

impl GatewayResource {
    pub fn new(cluster: &Cluster) -> Self {
        Self {
            name: cluster.name.clone(),
        }
    }
}

fn expected_gateway(cluster: &Cluster, name: &str) -> GatewayState {
    GatewayState {
        name: name.to_string(),
        identifier: cluster.network.internet_gateway_identifier.clone(),
        network_identifier: cluster.network.identifier.clone(),
    }
}

#[async_trait]
impl Resource for GatewayResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Gateway
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
            .find_gateway(&known.network.internet_gateway_identifier, &self.name)
            .await?
        {
            Some(record) => ResourceState::Gateway(GatewayState {
                name: self.name.clone(),
                identifier: record.identifier,
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
        let state = ResourceState::Gateway(expected_gateway(known, &self.name));
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
            debug!(gateway = %self.name, "Gateway unchanged");
            let ResourceState::Gateway(state) = actual.clone() else {
                return Err(unexpected_state(self.kind(), actual));
            };
            let mut network = known.network.clone();
            network.internet_gateway_identifier = state.identifier.clone();
            return Ok((known.clone().with_network(network), ResourceState::Gateway(state)));
        }

        let network_identifier = known.network.identifier.clone();
        if network_identifier.is_empty() {
            return Err(CloudError::Precondition(format!(
                "network identifier not resolved before gateway '{}'",
                self.name
            )));
        }

        // An existing but detached gateway only needs the attachment; an
        // attached one is adopted as-is.
        let (identifier, attached) = if let ResourceState::Gateway(state) = actual
            && !state.identifier.is_empty()
        {
            (
                state.identifier.clone(),
                state.network_identifier == network_identifier,
            )
        } else {
            let record = session.adapter.create_gateway(&self.name).await?;
            session
                .adapter
                .tag_resource(
                    &record.identifier,
                    &[(NAME_TAG, self.name.as_str()), (CLUSTER_TAG, known.name.as_str())],
                )
                .await?;
            info!(gateway = %self.name, identifier = %record.identifier, "Created gateway");
            (record.identifier, false)
        };

        if !attached {
            session
                .adapter
                .attach_gateway(&identifier, &network_identifier)
                .await?;
            debug!(gateway = %identifier, network = %network_identifier, "Attached gateway");
        }

        let mut network = known.network.clone();
        network.internet_gateway_identifier = identifier.clone();
        let state = GatewayState {
            name: self.name.clone(),
            identifier,
            network_identifier,
        };
        Ok((known.clone().with_network(network), ResourceState::Gateway(state)))
    }

    async fn delete(
        &self,
        session: &Session,
        actual: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let ResourceState::Gateway(state) = actual else {
            return Err(unexpected_state(self.kind(), actual));
        };
        if state.identifier.is_empty() {
            return Ok((known.clone(), ResourceState::zero(self.kind())));
        }

        if !state.network_identifier.is_empty() {
            session
                .adapter
                .detach_gateway(&state.identifier, &state.network_identifier)
                .await?;
        }
        session.adapter.delete_gateway(&state.identifier).await?;
        info!(gateway = %self.name, identifier = %state.identifier, "Deleted gateway");

        let mut network = known.network.clone();
        network.internet_gateway_identifier = String::new();
        Ok((known.clone().with_network(network), ResourceState::zero(self.kind())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::cluster::Network;

    #[test]
    fn expected_state_links_gateway_to_known_network() {
        let cluster = Cluster {
            name: "c1".to_string(),
            network: Network {
                cidr: "10.0.0.0/16".to_string(),
                identifier: "net-1".to_string(),
                internet_gateway_identifier: "igw-1".to_string(),
            },
            ..Default::default()
        };

        let state = expected_gateway(&cluster, "c1");
        assert_eq!(state.identifier, "igw-1");
        assert_eq!(state.network_identifier, "net-1");
    }
}
