//! Compute pools
//!
//! The pool resource is where the snapshot threading pays off: a master
//! pool publishes the Kubernetes API endpoint into the snapshot it
//! returns, and node pools (which the model orders after masters) render
//! their bootstrap payload from that same run's snapshot.

use super::{CLUSTER_TAG, NAME_TAG, require_pool, unexpected_state};
use crate::adapter::{CreatePoolRequest, PoolRecord};
use crate::compare;
use crate::error::{CloudError, Result};
use crate::resource::{PoolState, Resource, ResourceKind, ResourceState, Session};
use crate::retry::wait_until;
use crate::script::encode_user_data;
use async_trait::async_trait;
use keel_core::cluster::{Cluster, PoolRole, ServerPool};
use tracing::{debug, info};

/// Values-map key for the master address, read by bootstrap templates.
pub const MASTER_IP_VALUE: &str = "master_ip";

pub struct PoolResource {
    name: String,
    role: PoolRole,
}

impl PoolResource {
    pub fn new(pool: &ServerPool) -> Self {
        Self {
            name: pool.name.clone(),
            role: pool.role,
        }
    }
}

fn expected_pool(cluster: &Cluster, name: &str) -> Result<PoolState> {
    let pool = require_pool(cluster, name)?;
    Ok(PoolState {
        name: name.to_string(),
        identifier: pool.identifier.clone(),
        image: pool.image.clone(),
        size: pool.size.clone(),
        min_count: pool.min_count,
        max_count: pool.max_count,
        subnet_identifiers: pool.subnets.iter().map(|s| s.identifier.clone()).collect(),
        firewall_identifiers: pool.firewalls.iter().map(|f| f.identifier.clone()).collect(),
        instance_profile_identifier: pool
            .instance_profile
            .as_ref()
            .map(|p| p.identifier.clone())
            .unwrap_or_default(),
    })
}

fn state_from_record(name: &str, record: &PoolRecord) -> PoolState {
    PoolState {
        name: name.to_string(),
        identifier: record.identifier.clone(),
        image: record.image.clone(),
        size: record.size.clone(),
        min_count: record.min_count,
        max_count: record.max_count,
        subnet_identifiers: record.subnet_identifiers.clone(),
        firewall_identifiers: record.firewall_identifiers.clone(),
        instance_profile_identifier: record.instance_profile_identifier.clone(),
    }
}

/// Only the count bounds may differ for a resize; anything else on a
/// live pool needs a destroy.
fn only_counts_differ(actual: &PoolState, expected: &PoolState) -> bool {
    actual.image == expected.image
        && actual.size == expected.size
        && actual.subnet_identifiers == expected.subnet_identifiers
        && actual.firewall_identifiers == expected.firewall_identifiers
        && actual.instance_profile_identifier == expected.instance_profile_identifier
}

impl PoolResource {
    async fn wait_ready(&self, session: &Session, identifier: &str) -> Result<PoolRecord> {
        let what = format!("pool '{}' instances", self.name);
        wait_until(&what, &session.wait, || {
            let adapter = session.adapter.clone();
            let identifier = identifier.to_string();
            let name = self.name.clone();
            async move {
                let record = adapter.find_pool(&identifier, &name).await?;
                Ok(record.filter(|r| {
                    r.ready && r.instance_addresses.len() >= r.min_count as usize
                }))
            }
        })
        .await
    }

    /// Master pools publish their first instance address as the API
    /// endpoint and as a template value.
    fn publish_endpoint(&self, cluster: Cluster, record: &PoolRecord) -> Result<Cluster> {
        let address = record.instance_addresses.first().ok_or_else(|| {
            CloudError::Precondition(format!(
                "pool '{}' reported ready without instance addresses",
                self.name
            ))
        })?;
        info!(pool = %self.name, endpoint = %address, "Published Kubernetes API endpoint");
        Ok(cluster
            .with_api_endpoint(address.clone())
            .with_value(MASTER_IP_VALUE, address.clone()))
    }
}

#[async_trait]
impl Resource for PoolResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Pool
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn actual(
        &self,
        session: &Session,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let pool = require_pool(known, &self.name)?;

        let state = match session.adapter.find_pool(&pool.identifier, &self.name).await? {
            Some(record) => ResourceState::Pool(state_from_record(&self.name, &record)),
            None => ResourceState::zero(self.kind()),
        };
        Ok((known.clone(), state))
    }

    async fn expected(
        &self,
        _session: &Session,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let state = ResourceState::Pool(expected_pool(known, &self.name)?);
        Ok((known.clone(), state))
    }

    async fn apply(
        &self,
        session: &Session,
        actual: &ResourceState,
        expected: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        if self.role == PoolRole::Node && known.kubernetes_api.endpoint.is_empty() {
            return Err(CloudError::Precondition(format!(
                "kubernetes api endpoint not resolved before node pool '{}'",
                self.name
            )));
        }

        if compare::is_equal(actual, expected)? {
            debug!(pool = %self.name, "Pool unchanged");
            let ResourceState::Pool(state) = actual.clone() else {
                return Err(unexpected_state(self.kind(), actual));
            };
            let pool = require_pool(known, &self.name)?;
            let mut cluster = known
                .clone()
                .with_pool(pool.clone().with_identifier(&state.identifier));

            // A run starting from spec alone can meet a live master pool;
            // re-derive the endpoint it would have published.
            if self.role.is_master() && cluster.kubernetes_api.endpoint.is_empty() {
                let record = session
                    .adapter
                    .find_pool(&state.identifier, &self.name)
                    .await?
                    .ok_or_else(|| {
                        CloudError::Precondition(format!(
                            "pool '{}' vanished between observe and apply",
                            self.name
                        ))
                    })?;
                cluster = self.publish_endpoint(cluster, &record)?;
            }
            return Ok((cluster, ResourceState::Pool(state)));
        }

        // Existing pool: adopt or resize. Drift is judged against an
        // expectation refreshed from this run's snapshot; the one passed in
        // predates wiring resolution.
        if let ResourceState::Pool(actual_state) = actual
            && !actual_state.identifier.is_empty()
        {
            let refreshed = expected_pool(known, &self.name)?;
            if !only_counts_differ(actual_state, &refreshed) {
                return Err(CloudError::Precondition(format!(
                    "pool '{}' cannot change image, size or wiring in place",
                    self.name
                )));
            }

            let pool = require_pool(known, &self.name)?;
            if actual_state.min_count == refreshed.min_count
                && actual_state.max_count == refreshed.max_count
            {
                debug!(pool = %self.name, identifier = %actual_state.identifier, "Adopted existing pool");
                let mut cluster = known
                    .clone()
                    .with_pool(pool.clone().with_identifier(&actual_state.identifier));
                if self.role.is_master() && cluster.kubernetes_api.endpoint.is_empty() {
                    let record = session
                        .adapter
                        .find_pool(&actual_state.identifier, &self.name)
                        .await?
                        .ok_or_else(|| {
                            CloudError::Precondition(format!(
                                "pool '{}' vanished between observe and apply",
                                self.name
                            ))
                        })?;
                    cluster = self.publish_endpoint(cluster, &record)?;
                }
                return Ok((cluster, ResourceState::Pool(actual_state.clone())));
            }

            session
                .adapter
                .resize_pool(&actual_state.identifier, refreshed.min_count, refreshed.max_count)
                .await?;
            info!(
                pool = %self.name,
                min = refreshed.min_count,
                max = refreshed.max_count,
                "Resized pool"
            );
            let record = self.wait_ready(session, &actual_state.identifier).await?;
            let mut cluster = known
                .clone()
                .with_pool(pool.clone().with_identifier(&record.identifier));
            if self.role.is_master() && cluster.kubernetes_api.endpoint.is_empty() {
                cluster = self.publish_endpoint(cluster, &record)?;
            }
            return Ok((cluster, ResourceState::Pool(state_from_record(&self.name, &record))));
        }

        // Fresh pool.
        let pool = require_pool(known, &self.name)?.clone();
        for subnet in &pool.subnets {
            if subnet.identifier.is_empty() {
                return Err(CloudError::Precondition(format!(
                    "subnet '{}' not resolved before pool '{}'",
                    subnet.name, self.name
                )));
            }
        }
        for firewall in &pool.firewalls {
            if firewall.identifier.is_empty() {
                return Err(CloudError::Precondition(format!(
                    "firewall '{}' not resolved before pool '{}'",
                    firewall.name, self.name
                )));
            }
        }
        if let Some(profile) = &pool.instance_profile
            && profile.identifier.is_empty()
        {
            return Err(CloudError::Precondition(format!(
                "instance profile '{}' not resolved before pool '{}'",
                profile.name, self.name
            )));
        }

        let payload = session.scripts.build(known, &self.name).await?;
        let request = CreatePoolRequest {
            name: self.name.clone(),
            image: pool.image.clone(),
            size: pool.size.clone(),
            min_count: pool.min_count,
            max_count: pool.max_count,
            subnet_identifiers: pool.subnets.iter().map(|s| s.identifier.clone()).collect(),
            firewall_identifiers: pool.firewalls.iter().map(|f| f.identifier.clone()).collect(),
            instance_profile_identifier: pool
                .instance_profile
                .as_ref()
                .map(|p| p.identifier.clone())
                .unwrap_or_default(),
            keypair_identifier: known.ssh.identifier.clone(),
            user_data: encode_user_data(&payload),
        };

        let created = session.adapter.create_pool(&request).await?;
        session
            .adapter
            .tag_resource(
                &created.identifier,
                &[(NAME_TAG, self.name.as_str()), (CLUSTER_TAG, known.name.as_str())],
            )
            .await?;
        info!(pool = %self.name, identifier = %created.identifier, "Created pool");

        let record = self.wait_ready(session, &created.identifier).await?;

        let mut cluster = known
            .clone()
            .with_pool(pool.with_identifier(&record.identifier));
        if self.role.is_master() {
            cluster = self.publish_endpoint(cluster, &record)?;
        }
        Ok((cluster, ResourceState::Pool(state_from_record(&self.name, &record))))
    }

    async fn delete(
        &self,
        session: &Session,
        actual: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let ResourceState::Pool(state) = actual else {
            return Err(unexpected_state(self.kind(), actual));
        };
        if state.identifier.is_empty() {
            return Ok((known.clone(), ResourceState::zero(self.kind())));
        }

        session.adapter.delete_pool(&state.identifier).await?;
        info!(pool = %self.name, identifier = %state.identifier, "Deleted pool");

        let pool = require_pool(known, &self.name)?;
        let mut cluster = known.clone().with_pool(pool.clone().with_identifier(""));
        if self.role.is_master() {
            cluster = cluster.with_api_endpoint("");
        }
        Ok((cluster, ResourceState::zero(self.kind())))
    }
}
