//! Optional per-pool instance profiles

use super::{require_pool, unexpected_state};
use crate::compare;
use crate::error::{CloudError, Result};
use crate::resource::{InstanceProfileState, Resource, ResourceKind, ResourceState, Session};
use async_trait::async_trait;
use keel_core::cluster::{Cluster, InstanceProfile};
use tracing::{debug, info};

pub struct InstanceProfileResource {
    pool_name: String,
    name: String,
}

impl InstanceProfileResource {
    pub fn new(pool_name: &str, profile_name: &str) -> Self {
        Self {
            pool_name: pool_name.to_string(),
            name: profile_name.to_string(),
        }
    }
}

fn require_profile<'a>(
    cluster: &'a Cluster,
    pool_name: &str,
    name: &str,
) -> Result<&'a InstanceProfile> {
    let pool = require_pool(cluster, pool_name)?;
    match &pool.instance_profile {
        Some(profile) if profile.name == name => Ok(profile),
        _ => Err(CloudError::Precondition(format!(
            "instance profile '{}' missing from pool '{}'",
            name, pool_name
        ))),
    }
}

fn expected_profile(cluster: &Cluster, pool_name: &str, name: &str) -> Result<InstanceProfileState> {
    let profile = require_profile(cluster, pool_name, name)?;
    Ok(InstanceProfileState {
        name: name.to_string(),
        identifier: profile.identifier.clone(),
        role_name: profile.role.name.clone(),
        policies: profile.role.policies.clone(),
    })
}

#[async_trait]
impl Resource for InstanceProfileResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::InstanceProfile
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn actual(
        &self,
        session: &Session,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let profile = require_profile(known, &self.pool_name, &self.name)?;

        let state = match session
            .adapter
            .find_instance_profile(&profile.identifier, &self.name)
            .await?
        {
            Some(record) => ResourceState::InstanceProfile(InstanceProfileState {
                name: self.name.clone(),
                identifier: record.identifier,
                role_name: record.role_name,
                policies: record.policies,
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
            ResourceState::InstanceProfile(expected_profile(known, &self.pool_name, &self.name)?);
        Ok((known.clone(), state))
    }

    async fn apply(
        &self,
        session: &Session,
        actual: &ResourceState,
        expected: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let pool = require_pool(known, &self.pool_name)?;

        if compare::is_equal(actual, expected)? {
            debug!(profile = %self.name, "Instance profile unchanged");
            let ResourceState::InstanceProfile(state) = actual.clone() else {
                return Err(unexpected_state(self.kind(), actual));
            };
            let mut profile = require_profile(known, &self.pool_name, &self.name)?.clone();
            profile.identifier = state.identifier.clone();
            let refined = known
                .clone()
                .with_pool(pool.clone().with_instance_profile(profile));
            return Ok((refined, ResourceState::InstanceProfile(state)));
        }

        let spec = require_profile(known, &self.pool_name, &self.name)?.clone();

        // An existing profile with the expected role and policies is adopted;
        // only fields the cluster file declares are grounds for a precondition failure.
        if let ResourceState::InstanceProfile(state) = actual
            && !state.identifier.is_empty()
        {
            if state.role_name != spec.role.name || state.policies != spec.role.policies {
                return Err(CloudError::Precondition(format!(
                    "instance profile '{}' changed role or policies; delete it first",
                    self.name
                )));
            }
            debug!(profile = %self.name, identifier = %state.identifier, "Adopted existing instance profile");
            let mut profile = spec;
            profile.identifier = state.identifier.clone();
            let refined = known
                .clone()
                .with_pool(pool.clone().with_instance_profile(profile));
            return Ok((refined, ResourceState::InstanceProfile(state.clone())));
        }

        let record = session
            .adapter
            .create_instance_profile(&self.name, &spec.role.name, &spec.role.policies)
            .await?;
        info!(profile = %self.name, identifier = %record.identifier, "Created instance profile");

        let mut profile = spec;
        profile.identifier = record.identifier.clone();
        let refined = known
            .clone()
            .with_pool(pool.clone().with_instance_profile(profile));
        let state = InstanceProfileState {
            name: self.name.clone(),
            identifier: record.identifier,
            role_name: record.role_name,
            policies: record.policies,
        };
        Ok((refined, ResourceState::InstanceProfile(state)))
    }

    async fn delete(
        &self,
        session: &Session,
        actual: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let ResourceState::InstanceProfile(state) = actual else {
            return Err(unexpected_state(self.kind(), actual));
        };
        if state.identifier.is_empty() {
            return Ok((known.clone(), ResourceState::zero(self.kind())));
        }

        session
            .adapter
            .delete_instance_profile(&state.identifier)
            .await?;
        info!(profile = %self.name, identifier = %state.identifier, "Deleted instance profile");

        let pool = require_pool(known, &self.pool_name)?;
        let mut profile = require_profile(known, &self.pool_name, &self.name)?.clone();
        profile.identifier = String::new();
        let refined = known
            .clone()
            .with_pool(pool.clone().with_instance_profile(profile));
        Ok((refined, ResourceState::zero(self.kind())))
    }
}
