//! Bootstrap payload boundary
//!
//! The pool resource asks a `ScriptBuilder` for the bootstrap payload at
//! apply time, handing it the run's own refined snapshot. Rendering is
//! therefore always against current values (master endpoint included),
//! never against anything persisted.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use keel_core::cluster::Cluster;

/// Produces a pool's bootstrap payload from a snapshot.
#[async_trait]
pub trait ScriptBuilder: Send + Sync {
    async fn build(&self, cluster: &Cluster, pool_name: &str) -> Result<String>;
}

#[async_trait]
impl ScriptBuilder for keel_core::script::BootstrapRenderer {
    async fn build(&self, cluster: &Cluster, pool_name: &str) -> Result<String> {
        self.render_pool(cluster, pool_name)
            .map_err(|e| CloudError::Script(e.to_string()))
    }
}

/// Builder for runs that carry no bootstrap scripts (plan, destroy,
/// tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScripts;

#[async_trait]
impl ScriptBuilder for NoScripts {
    async fn build(&self, _cluster: &Cluster, _pool_name: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// Base64 encoding applied to every payload before it becomes user data.
pub fn encode_user_data(payload: &str) -> String {
    STANDARD.encode(payload.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_scripts_builds_an_empty_payload() {
        let cluster = Cluster::default();
        let payload = NoScripts.build(&cluster, "any").await.unwrap();
        assert_eq!(payload, "");
    }

    #[test]
    fn user_data_is_plain_base64() {
        assert_eq!(encode_user_data(""), "");
        assert_eq!(encode_user_data("#!/bin/bash\n"), "IyEvYmluL2Jhc2gK");
    }
}
