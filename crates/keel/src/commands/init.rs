use anyhow::{Context, bail};
use colored::Colorize;
use std::fs;
use std::path::Path;

const CLUSTER_TEMPLATE: &str = r#"# Cluster specification for keel.
# Edit, then `keel validate`, `keel plan`, `keel up`.

name: {name}
cloud: mock
location: local-1

network:
  cidr: 10.0.0.0/16

ssh:
  user: ops
  # Uncomment to bake an SSH keypair into every machine:
  # public_key_path: ~/.ssh/id_ed25519.pub

server_pools:
  - name: {name}-master
    role: master
    min_count: 1
    max_count: 1
    image: ubuntu-24.04
    size: m3.large
    bootstrap_scripts:
      - master.sh
    subnets:
      - name: {name}-master
        cidr: 10.0.10.0/24
    firewalls:
      - name: {name}-master
        ingress_rules:
          - protocol: tcp
            from_port: 6443
            to_port: 6443
            source: 0.0.0.0/0

  - name: {name}-node
    role: node
    min_count: 2
    max_count: 3
    image: ubuntu-24.04
    size: m3.medium
    bootstrap_scripts:
      - node.sh
    subnets:
      - name: {name}-node
        cidr: 10.0.20.0/24
    firewalls:
      - name: {name}-node
        ingress_rules:
          - protocol: tcp
            from_port: 10250
            to_port: 10250
            source: 10.0.0.0/16
"#;

const MASTER_SCRIPT: &str = r#"#!/bin/sh
# Runs once on every master machine at first boot.
set -eu

echo "bootstrapping control plane for {{ cluster_name }}"
# kubeadm init --control-plane-endpoint {{ kubernetes_api.endpoint }}:{{ kubernetes_api.port }}
"#;

const NODE_SCRIPT: &str = r#"#!/bin/sh
# Runs once on every node; the master address is filled in at apply time.
set -eu

echo "joining {{ values.master_ip }}:{{ kubernetes_api.port }}"
# kubeadm join {{ values.master_ip }}:{{ kubernetes_api.port }}
"#;

pub fn handle(name: &str) -> anyhow::Result<()> {
    let root = Path::new(".");
    let spec_path = root.join(keel_core::loader::CLUSTER_FILE);
    if spec_path.exists() {
        bail!("cluster.yaml already exists in this directory");
    }

    fs::write(&spec_path, CLUSTER_TEMPLATE.replace("{name}", name))
        .with_context(|| format!("writing {}", spec_path.display()))?;

    let scripts = root.join("scripts");
    fs::create_dir_all(&scripts)?;
    fs::write(scripts.join("master.sh"), MASTER_SCRIPT)?;
    fs::write(scripts.join("node.sh"), NODE_SCRIPT)?;

    println!("{} cluster.yaml", "created".green().bold());
    println!("{} scripts/master.sh", "created".green().bold());
    println!("{} scripts/node.sh", "created".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to describe your cluster", "cluster.yaml".cyan());
    println!("  2. {} to check the specification", "keel validate".cyan());
    println!(
        "  3. {} to preview, {} to build",
        "keel plan".cyan(),
        "keel up".cyan()
    );
    Ok(())
}
