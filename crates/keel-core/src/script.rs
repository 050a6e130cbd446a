//! Bootstrap script rendering
//!
//! Uses Tera to expand the script templates named by a server pool's
//! `bootstrap_scripts` list. Templates see the resolved snapshot, so a
//! node pool's script can reference the master endpoint the reconciler
//! published moments earlier.
//!
//! Available template variables:
//! - `cluster_name`, `location`, `pool_name`, `pool_role`
//! - `kubernetes_api.endpoint`, `kubernetes_api.port`
//! - `ssh_user`, `ssh_port`
//! - `values.<key>` for every entry of the cluster values map

use crate::cluster::Cluster;
use crate::error::{CoreError, Result};
use std::path::PathBuf;
use tera::{Context, Tera};
use tracing::debug;

/// Renders a pool's bootstrap scripts from a template directory.
#[derive(Debug, Clone)]
pub struct BootstrapRenderer {
    scripts_dir: PathBuf,
}

impl BootstrapRenderer {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
        }
    }

    /// Render every script of `pool_name` in list order and join them
    /// with newlines. Pools without scripts render to an empty payload.
    pub fn render_pool(&self, cluster: &Cluster, pool_name: &str) -> Result<String> {
        let pool = cluster
            .pool(pool_name)
            .ok_or_else(|| CoreError::InvalidSpec(format!("no pool named '{}'", pool_name)))?;

        if pool.bootstrap_scripts.is_empty() {
            return Ok(String::new());
        }

        let context = build_context(cluster, pool_name);
        let mut result = String::new();

        for script in &pool.bootstrap_scripts {
            let path = self.scripts_dir.join(script);
            let template = std::fs::read_to_string(&path).map_err(|e| CoreError::Template {
                script: script.clone(),
                message: format!("{}: {}", path.display(), e),
            })?;

            let mut tera = Tera::default();
            let rendered =
                tera.render_str(&template, &context)
                    .map_err(|e| CoreError::Template {
                        script: script.clone(),
                        message: tera_error_detail(&e),
                    })?;

            result.push_str(&rendered);
            result.push('\n');
        }

        debug!(
            pool = %pool_name,
            scripts = pool.bootstrap_scripts.len(),
            bytes = result.len(),
            "Rendered bootstrap payload"
        );
        Ok(result)
    }
}

fn build_context(cluster: &Cluster, pool_name: &str) -> Context {
    let mut context = Context::new();
    context.insert("cluster_name", &cluster.name);
    context.insert("location", &cluster.location);
    context.insert("pool_name", pool_name);
    if let Some(pool) = cluster.pool(pool_name) {
        context.insert("pool_role", &pool.role.to_string());
    }
    context.insert("kubernetes_api", &cluster.kubernetes_api);
    context.insert("ssh_user", &cluster.ssh.user);
    context.insert("ssh_port", &cluster.ssh.port);
    context.insert("values", &cluster.values);
    context
}

/// Walk the Tera error chain and turn the usual failure modes into a
/// message a template author can act on.
fn tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    let full_error = details.join(" | ");

    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!(
            "undefined variable `{}` (define it under `values:` in the cluster spec)",
            var_name
        );
    }

    full_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Network, PoolRole, ServerPool};
    use std::fs;

    fn cluster_with_scripts(scripts: Vec<String>) -> Cluster {
        Cluster {
            name: "c1".to_string(),
            location: "us-west-2".to_string(),
            network: Network {
                cidr: "10.0.0.0/16".to_string(),
                ..Default::default()
            },
            server_pools: vec![ServerPool {
                name: "c1-node".to_string(),
                role: PoolRole::Node,
                min_count: 2,
                max_count: 2,
                image: "ubuntu-24.04".to_string(),
                size: "m3.medium".to_string(),
                bootstrap_scripts: scripts,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn renders_snapshot_values_into_scripts() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join("join.sh"),
            "#!/bin/bash\nkubeadm join {{ kubernetes_api.endpoint }}:{{ kubernetes_api.port }} --name {{ pool_name }}\n",
        )
        .unwrap();

        let cluster = cluster_with_scripts(vec!["join.sh".to_string()])
            .with_api_endpoint("10.0.0.11");

        let renderer = BootstrapRenderer::new(temp.path());
        let payload = renderer.render_pool(&cluster, "c1-node").unwrap();

        assert!(payload.contains("kubeadm join 10.0.0.11:6443"));
        assert!(payload.contains("--name c1-node"));
    }

    #[test]
    fn joins_scripts_in_list_order() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("one.sh"), "echo one").unwrap();
        fs::write(temp.path().join("two.sh"), "echo two").unwrap();

        let cluster = cluster_with_scripts(vec!["one.sh".to_string(), "two.sh".to_string()]);
        let renderer = BootstrapRenderer::new(temp.path());
        let payload = renderer.render_pool(&cluster, "c1-node").unwrap();

        assert_eq!(payload, "echo one\necho two\n");
    }

    #[test]
    fn values_map_reaches_templates() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("ip.sh"), "MASTER={{ values.master_ip }}").unwrap();

        let cluster = cluster_with_scripts(vec!["ip.sh".to_string()])
            .with_value("master_ip", "10.0.0.11");
        let renderer = BootstrapRenderer::new(temp.path());
        let payload = renderer.render_pool(&cluster, "c1-node").unwrap();

        assert_eq!(payload, "MASTER=10.0.0.11\n");
    }

    #[test]
    fn no_scripts_renders_empty_payload() {
        let temp = tempfile::tempdir().unwrap();
        let cluster = cluster_with_scripts(vec![]);
        let renderer = BootstrapRenderer::new(temp.path());
        assert_eq!(renderer.render_pool(&cluster, "c1-node").unwrap(), "");
    }

    #[test]
    fn missing_script_file_names_the_script() {
        let temp = tempfile::tempdir().unwrap();
        let cluster = cluster_with_scripts(vec!["nope.sh".to_string()]);
        let renderer = BootstrapRenderer::new(temp.path());

        let err = renderer.render_pool(&cluster, "c1-node").unwrap_err();
        assert!(matches!(err, CoreError::Template { ref script, .. } if script == "nope.sh"));
    }

    #[test]
    fn undefined_variable_is_reported_with_its_name() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("bad.sh"), "{{ values.missing_key }} {{ nonsense }}").unwrap();

        let cluster = cluster_with_scripts(vec!["bad.sh".to_string()]);
        let renderer = BootstrapRenderer::new(temp.path());

        let err = renderer.render_pool(&cluster, "c1-node").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bad.sh"));
    }
}
