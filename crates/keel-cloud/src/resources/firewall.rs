//! Pool firewalls (security groups)

use super::{CLUSTER_TAG, NAME_TAG, require_firewall, require_pool, unexpected_state};
use crate::compare;
use crate::error::{CloudError, Result};
use crate::resource::{FirewallState, Resource, ResourceKind, ResourceState, Session};
use async_trait::async_trait;
use keel_core::cluster::Cluster;
use tracing::{debug, info};

pub struct FirewallResource {
    pool_name: String,
    name: String,
}

impl FirewallResource {
    pub fn new(pool_name: &str, firewall_name: &str) -> Self {
        Self {
            pool_name: pool_name.to_string(),
            name: firewall_name.to_string(),
        }
    }
}

fn expected_firewall(cluster: &Cluster, pool_name: &str, name: &str) -> Result<FirewallState> {
    let pool = require_pool(cluster, pool_name)?;
    let firewall = require_firewall(pool, name)?;
    Ok(FirewallState {
        name: name.to_string(),
        identifier: firewall.identifier.clone(),
        network_identifier: cluster.network.identifier.clone(),
        ingress_rules: firewall.ingress_rules.clone(),
        egress_rules: firewall.egress_rules.clone(),
    })
}

#[async_trait]
impl Resource for FirewallResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Firewall
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
        let firewall = require_firewall(pool, &self.name)?;

        let state = match session
            .adapter
            .find_firewall(&firewall.identifier, &self.name)
            .await?
        {
            Some(record) => ResourceState::Firewall(FirewallState {
                name: self.name.clone(),
                identifier: record.identifier,
                network_identifier: record.network_identifier,
                ingress_rules: record.ingress_rules,
                egress_rules: record.egress_rules,
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
        let state = ResourceState::Firewall(expected_firewall(known, &self.pool_name, &self.name)?);
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
            debug!(firewall = %self.name, "Firewall unchanged");
            let ResourceState::Firewall(state) = actual.clone() else {
                return Err(unexpected_state(self.kind(), actual));
            };
            let pool = require_pool(known, &self.pool_name)?;
            let mut firewall = require_firewall(pool, &self.name)?.clone();
            firewall.identifier = state.identifier.clone();
            let refined = known.clone().with_pool(pool.clone().with_firewall(firewall));
            return Ok((refined, ResourceState::Firewall(state)));
        }

        let network_identifier = known.network.identifier.clone();
        if network_identifier.is_empty() {
            return Err(CloudError::Precondition(format!(
                "network identifier not resolved before firewall '{}'",
                self.name
            )));
        }

        let pool = require_pool(known, &self.pool_name)?;
        let spec = require_firewall(pool, &self.name)?.clone();

        // Rule drift on an existing group is converged in place; only a
        // missing group is created.
        let (identifier, rules_current) = match actual {
            ResourceState::Firewall(state) if !state.identifier.is_empty() => (
                state.identifier.clone(),
                state.ingress_rules == spec.ingress_rules
                    && state.egress_rules == spec.egress_rules,
            ),
            _ => {
                let record = session
                    .adapter
                    .create_firewall(&self.name, &network_identifier)
                    .await?;
                session
                    .adapter
                    .tag_resource(
                        &record.identifier,
                        &[(NAME_TAG, self.name.as_str()), (CLUSTER_TAG, known.name.as_str())],
                    )
                    .await?;
                info!(firewall = %self.name, identifier = %record.identifier, "Created firewall");
                (record.identifier, false)
            }
        };

        if !rules_current {
            session
                .adapter
                .set_firewall_rules(&identifier, &spec.ingress_rules, &spec.egress_rules)
                .await?;
            debug!(
                firewall = %identifier,
                ingress = spec.ingress_rules.len(),
                egress = spec.egress_rules.len(),
                "Set firewall rules"
            );
        }

        let mut firewall = spec.clone();
        firewall.identifier = identifier.clone();
        let refined = known.clone().with_pool(pool.clone().with_firewall(firewall));
        let state = FirewallState {
            name: self.name.clone(),
            identifier,
            network_identifier,
            ingress_rules: spec.ingress_rules,
            egress_rules: spec.egress_rules,
        };
        Ok((refined, ResourceState::Firewall(state)))
    }

    async fn delete(
        &self,
        session: &Session,
        actual: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let ResourceState::Firewall(state) = actual else {
            return Err(unexpected_state(self.kind(), actual));
        };
        if state.identifier.is_empty() {
            return Ok((known.clone(), ResourceState::zero(self.kind())));
        }

        session.adapter.delete_firewall(&state.identifier).await?;
        info!(firewall = %self.name, identifier = %state.identifier, "Deleted firewall");

        let pool = require_pool(known, &self.pool_name)?;
        let mut firewall = require_firewall(pool, &self.name)?.clone();
        firewall.identifier = String::new();
        let refined = known.clone().with_pool(pool.clone().with_firewall(firewall));
        Ok((refined, ResourceState::zero(self.kind())))
    }
}
