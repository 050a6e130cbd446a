//! Per-subnet route tables with a default route via the gateway

use super::{CLUSTER_TAG, NAME_TAG, require_pool, require_subnet, unexpected_state};
use crate::compare;
use crate::error::{CloudError, Result};
use crate::resource::{Resource, ResourceKind, ResourceState, RouteTableState, Session};
use async_trait::async_trait;
use keel_core::cluster::Cluster;
use tracing::{debug, info};

pub struct RouteTableResource {
    pool_name: String,
    name: String,
}

impl RouteTableResource {
    /// Route tables are one-to-one with subnets and share their name.
    pub fn new(pool_name: &str, subnet_name: &str) -> Self {
        Self {
            pool_name: pool_name.to_string(),
            name: subnet_name.to_string(),
        }
    }
}

fn expected_route_table(cluster: &Cluster, pool_name: &str, name: &str) -> Result<RouteTableState> {
    let pool = require_pool(cluster, pool_name)?;
    let subnet = require_subnet(pool, name)?;
    Ok(RouteTableState {
        name: name.to_string(),
        identifier: subnet.route_table_identifier.clone(),
        subnet_identifier: subnet.identifier.clone(),
        gateway_identifier: cluster.network.internet_gateway_identifier.clone(),
    })
}

#[async_trait]
impl Resource for RouteTableResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::RouteTable
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
            .find_route_table(&subnet.route_table_identifier, &self.name)
            .await?
        {
            Some(record) => ResourceState::RouteTable(RouteTableState {
                name: self.name.clone(),
                identifier: record.identifier,
                subnet_identifier: record.subnet_identifier,
                gateway_identifier: record.gateway_identifier,
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
            ResourceState::RouteTable(expected_route_table(known, &self.pool_name, &self.name)?);
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
            debug!(route_table = %self.name, "Route table unchanged");
            let ResourceState::RouteTable(state) = actual.clone() else {
                return Err(unexpected_state(self.kind(), actual));
            };
            let pool = require_pool(known, &self.pool_name)?;
            let mut subnet = require_subnet(pool, &self.name)?.clone();
            subnet.route_table_identifier = state.identifier.clone();
            let refined = known.clone().with_pool(pool.clone().with_subnet(subnet));
            return Ok((refined, ResourceState::RouteTable(state)));
        }

        let gateway_identifier = known.network.internet_gateway_identifier.clone();
        if gateway_identifier.is_empty() {
            return Err(CloudError::Precondition(format!(
                "gateway identifier not resolved before route table '{}'",
                self.name
            )));
        }
        let pool = require_pool(known, &self.pool_name)?;
        let subnet_spec = require_subnet(pool, &self.name)?.clone();
        if subnet_spec.identifier.is_empty() {
            return Err(CloudError::Precondition(format!(
                "subnet identifier not resolved before route table '{}'",
                self.name
            )));
        }

        // Converge an existing table that lost its route or association.
        let (identifier, had_route, had_association) = match actual {
            ResourceState::RouteTable(state) if !state.identifier.is_empty() => (
                state.identifier.clone(),
                !state.gateway_identifier.is_empty(),
                !state.subnet_identifier.is_empty(),
            ),
            _ => {
                if known.network.identifier.is_empty() {
                    return Err(CloudError::Precondition(format!(
                        "network identifier not resolved before route table '{}'",
                        self.name
                    )));
                }
                let record = session
                    .adapter
                    .create_route_table(&self.name, &known.network.identifier)
                    .await?;
                session
                    .adapter
                    .tag_resource(
                        &record.identifier,
                        &[(NAME_TAG, self.name.as_str()), (CLUSTER_TAG, known.name.as_str())],
                    )
                    .await?;
                info!(route_table = %self.name, identifier = %record.identifier, "Created route table");
                (record.identifier, false, false)
            }
        };

        if !had_route {
            session
                .adapter
                .create_default_route(&identifier, &gateway_identifier)
                .await?;
            debug!(route_table = %identifier, gateway = %gateway_identifier, "Installed default route");
        }
        if !had_association {
            session
                .adapter
                .associate_route_table(&identifier, &subnet_spec.identifier)
                .await?;
            debug!(route_table = %identifier, subnet = %subnet_spec.identifier, "Associated route table");
        }

        let mut subnet = subnet_spec.clone();
        subnet.route_table_identifier = identifier.clone();
        let refined = known.clone().with_pool(pool.clone().with_subnet(subnet));
        let state = RouteTableState {
            name: self.name.clone(),
            identifier,
            subnet_identifier: subnet_spec.identifier,
            gateway_identifier,
        };
        Ok((refined, ResourceState::RouteTable(state)))
    }

    async fn delete(
        &self,
        session: &Session,
        actual: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let ResourceState::RouteTable(state) = actual else {
            return Err(unexpected_state(self.kind(), actual));
        };
        if state.identifier.is_empty() {
            return Ok((known.clone(), ResourceState::zero(self.kind())));
        }

        session.adapter.delete_route_table(&state.identifier).await?;
        info!(route_table = %self.name, identifier = %state.identifier, "Deleted route table");

        let pool = require_pool(known, &self.pool_name)?;
        let mut subnet = require_subnet(pool, &self.name)?.clone();
        subnet.route_table_identifier = String::new();
        let refined = known.clone().with_pool(pool.clone().with_subnet(subnet));
        Ok((refined, ResourceState::zero(self.kind())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::cluster::{Network, ServerPool, Subnet};

    #[test]
    fn expected_state_ties_subnet_and_gateway_together() {
        let cluster = Cluster {
            name: "c1".to_string(),
            network: Network {
                cidr: "10.0.0.0/16".to_string(),
                identifier: "net-1".to_string(),
                internet_gateway_identifier: "igw-1".to_string(),
            },
            server_pools: vec![ServerPool {
                name: "c1-master".to_string(),
                subnets: vec![Subnet {
                    name: "c1-master".to_string(),
                    cidr: "10.0.0.0/24".to_string(),
                    identifier: "sub-1".to_string(),
                    route_table_identifier: "rtb-1".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        let state = expected_route_table(&cluster, "c1-master", "c1-master").unwrap();
        assert_eq!(state.identifier, "rtb-1");
        assert_eq!(state.subnet_identifier, "sub-1");
        assert_eq!(state.gateway_identifier, "igw-1");
    }
}
