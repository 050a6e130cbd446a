//! SSH key pair import

use super::unexpected_state;
use crate::compare;
use crate::error::{CloudError, Result};
use crate::resource::{KeypairState, Resource, ResourceKind, ResourceState, Session};
use async_trait::async_trait;
use keel_core::cluster::Cluster;
use tracing::{debug, info};

pub struct KeypairResource {
    name: String,
}

impl KeypairResource {
    pub fn new(cluster: &Cluster) -> Self {
        Self {
            name: cluster.name.clone(),
        }
    }
}

fn expected_keypair(cluster: &Cluster, name: &str) -> KeypairState {
    KeypairState {
        name: name.to_string(),
        identifier: cluster.ssh.identifier.clone(),
        fingerprint: cluster.ssh.fingerprint.clone(),
        public_key_data: cluster.ssh.public_key_data.clone(),
    }
}

#[async_trait]
impl Resource for KeypairResource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Keypair
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
            .find_keypair(&known.ssh.identifier, &self.name)
            .await?
        {
            Some(record) => ResourceState::Keypair(KeypairState {
                name: self.name.clone(),
                identifier: record.identifier,
                fingerprint: record.fingerprint,
                public_key_data: record.public_key_data,
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
        let state = ResourceState::Keypair(expected_keypair(known, &self.name));
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
            debug!(keypair = %self.name, "Key pair unchanged");
            let ResourceState::Keypair(state) = actual.clone() else {
                return Err(unexpected_state(self.kind(), actual));
            };
            let mut ssh = known.ssh.clone();
            ssh.identifier = state.identifier.clone();
            ssh.fingerprint = state.fingerprint.clone();
            return Ok((known.clone().with_ssh(ssh), ResourceState::Keypair(state)));
        }

        // A key pair already in the cloud is adopted as long as the key
        // material matches; identifiers and fingerprints are cloud-owned.
        if let ResourceState::Keypair(state) = actual
            && !state.identifier.is_empty()
        {
            if state.public_key_data != known.ssh.public_key_data {
                return Err(CloudError::Precondition(format!(
                    "key pair '{}' exists with different key material; delete it first",
                    self.name
                )));
            }
            debug!(keypair = %self.name, identifier = %state.identifier, "Adopted existing key pair");
            let mut ssh = known.ssh.clone();
            ssh.identifier = state.identifier.clone();
            ssh.fingerprint = state.fingerprint.clone();
            return Ok((
                known.clone().with_ssh(ssh),
                ResourceState::Keypair(state.clone()),
            ));
        }

        let record = session
            .adapter
            .import_keypair(&self.name, &known.ssh.public_key_data)
            .await?;
        info!(keypair = %self.name, fingerprint = %record.fingerprint, "Imported key pair");

        let mut ssh = known.ssh.clone();
        ssh.identifier = record.identifier.clone();
        ssh.fingerprint = record.fingerprint.clone();
        let state = KeypairState {
            name: self.name.clone(),
            identifier: record.identifier,
            fingerprint: record.fingerprint,
            public_key_data: record.public_key_data,
        };
        Ok((known.clone().with_ssh(ssh), ResourceState::Keypair(state)))
    }

    async fn delete(
        &self,
        session: &Session,
        actual: &ResourceState,
        known: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let ResourceState::Keypair(state) = actual else {
            return Err(unexpected_state(self.kind(), actual));
        };
        if state.identifier.is_empty() {
            return Ok((known.clone(), ResourceState::zero(self.kind())));
        }

        session.adapter.delete_keypair(&state.identifier).await?;
        info!(keypair = %self.name, "Deleted key pair");

        let mut ssh = known.ssh.clone();
        ssh.identifier = String::new();
        ssh.fingerprint = String::new();
        Ok((known.clone().with_ssh(ssh), ResourceState::zero(self.kind())))
    }
}
