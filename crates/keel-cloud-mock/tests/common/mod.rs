use keel_cloud::{NoScripts, Session};
use keel_cloud_mock::MockCloud;
use keel_core::cluster::{ApiLoadBalancer, Cluster, IamRole, InstanceProfile};
use std::sync::Arc;

const CLUSTER_SPEC: &str = r#"
name: c1
cloud: mock
location: local-1
network:
  cidr: 10.0.0.0/16
ssh:
  user: ops
  public_key_data: ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFQ7kDvOfN8cPVhYyXim9gGroz8eCyTpY3wBKdpV1fcM ops@c1
server_pools:
  - name: c1-master
    role: master
    min_count: 1
    max_count: 1
    image: ubuntu-24.04
    size: m3.large
    subnets:
      - name: c1-master
        cidr: 10.0.10.0/24
        zone: local-1a
    firewalls:
      - name: c1-master
        ingress_rules:
          - protocol: tcp
            from_port: 6443
            to_port: 6443
            source: 0.0.0.0/0
  - name: c1-node
    role: node
    min_count: 2
    max_count: 2
    image: ubuntu-24.04
    size: m3.medium
    subnets:
      - name: c1-node
        cidr: 10.0.20.0/24
        zone: local-1b
    firewalls:
      - name: c1-node
        ingress_rules:
          - protocol: tcp
            from_port: 10250
            to_port: 10250
            source: 10.0.0.0/16
"#;

pub fn cluster() -> Cluster {
    serde_yaml::from_str(CLUSTER_SPEC).unwrap()
}

#[allow(dead_code)]
pub fn cluster_with_balancer() -> Cluster {
    let mut cluster = cluster();
    cluster.api_load_balancer = Some(ApiLoadBalancer {
        name: "c1-api".to_string(),
        port: 6443,
        ..Default::default()
    });
    cluster
}

#[allow(dead_code)]
pub fn cluster_with_profile() -> Cluster {
    let mut cluster = cluster();
    let master = cluster
        .server_pools
        .iter_mut()
        .find(|p| p.name == "c1-master")
        .unwrap();
    master.instance_profile = Some(InstanceProfile {
        name: "c1-master-profile".to_string(),
        role: IamRole {
            name: "c1-master-role".to_string(),
            policies: vec!["ec2-describe".to_string()],
        },
        identifier: String::new(),
    });
    cluster
}

pub fn session(cloud: &Arc<MockCloud>) -> Session {
    Session::new(cloud.clone(), Arc::new(NoScripts))
}
