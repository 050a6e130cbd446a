use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Scratch project directory for driving the binary end to end.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_cluster(&self, yaml: &str) {
        fs::write(self.dir.path().join("cluster.yaml"), yaml).unwrap();
    }
}

/// Two-pool spec with an inline SSH key so nothing outside the scratch
/// directory is read.
pub const MOCK_SPEC: &str = r#"
name: demo
cloud: mock
location: local-1
network:
  cidr: 10.0.0.0/16
ssh:
  user: ops
  public_key_data: ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFQ7kDvOfN8cPVhYyXim9gGroz8eCyTpY3wBKdpV1fcM ops@demo
server_pools:
  - name: demo-master
    role: master
    min_count: 1
    max_count: 1
    image: ubuntu-24.04
    size: m3.large
    subnets:
      - name: demo-master
        cidr: 10.0.10.0/24
    firewalls:
      - name: demo-master
        ingress_rules:
          - protocol: tcp
            from_port: 6443
            to_port: 6443
            source: 0.0.0.0/0
  - name: demo-node
    role: node
    min_count: 2
    max_count: 2
    image: ubuntu-24.04
    size: m3.medium
    subnets:
      - name: demo-node
        cidr: 10.0.20.0/24
    firewalls:
      - name: demo-node
        ingress_rules:
          - protocol: tcp
            from_port: 10250
            to_port: 10250
            source: 10.0.0.0/16
"#;
