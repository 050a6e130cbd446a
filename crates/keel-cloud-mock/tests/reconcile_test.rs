mod common;

use keel_cloud::{
    ActionType, CloudAdapter, CloudError, InterruptFlag, Model, Reconciler, Session,
};
use keel_cloud_mock::MockCloud;
use keel_core::script::BootstrapRenderer;
use std::sync::Arc;

#[tokio::test]
async fn first_reconcile_creates_everything_in_order() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    let creations: Vec<String> = cloud
        .call_log()
        .into_iter()
        .filter(|op| {
            op.starts_with("create_")
                || op == "import_keypair"
                || op == "attach_gateway"
                || op == "associate_route_table"
                || op == "set_firewall_rules"
        })
        .collect();
    assert_eq!(
        creations,
        vec![
            "import_keypair",
            "create_network",
            "create_gateway",
            "attach_gateway",
            "create_subnet",
            "create_subnet",
            "create_route_table",
            "create_default_route",
            "associate_route_table",
            "create_route_table",
            "create_default_route",
            "associate_route_table",
            "create_firewall",
            "set_firewall_rules",
            "create_firewall",
            "set_firewall_rules",
            "create_pool",
            "create_pool",
        ]
    );

    assert_eq!(
        cloud.remaining(),
        vec![
            "firewall:c1-master",
            "firewall:c1-node",
            "gateway:c1",
            "keypair:c1",
            "network:c1",
            "pool:c1-master",
            "pool:c1-node",
            "route-table:c1-master",
            "route-table:c1-node",
            "subnet:c1-master",
            "subnet:c1-node",
        ]
    );

    assert_eq!(converged.ssh.identifier, "key-1");
    assert!(!converged.ssh.fingerprint.is_empty());
    assert_eq!(converged.network.identifier, "net-1");
    assert_eq!(converged.network.internet_gateway_identifier, "igw-1");

    let master = converged.pool("c1-master").unwrap();
    assert_eq!(master.identifier, "pool-1");
    assert_eq!(master.subnets[0].identifier, "sub-1");
    assert_eq!(master.subnets[0].route_table_identifier, "rtb-1");
    assert_eq!(master.firewalls[0].identifier, "sg-1");
    let node = converged.pool("c1-node").unwrap();
    assert_eq!(node.identifier, "pool-2");
    assert_eq!(node.subnets[0].identifier, "sub-2");

    // The master machine came up first, so it owns the first address.
    assert_eq!(converged.kubernetes_api.endpoint, "10.0.0.11");
    assert_eq!(converged.value("master_ip"), Some("10.0.0.11"));

    let tags = cloud.tags("net-1");
    assert_eq!(tags.get("Name").map(String::as_str), Some("c1"));
    assert_eq!(tags.get("keel/cluster").map(String::as_str), Some("c1"));
    assert_eq!(
        cloud.tags("pool-1").get("Name").map(String::as_str),
        Some("c1-master")
    );
    assert!(cloud.tags("key-1").is_empty());
}

#[tokio::test]
async fn second_reconcile_is_a_no_op() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let first = reconciler.reconcile(&spec, &model).await.unwrap();

    cloud.reset_counters();
    let second = reconciler.reconcile(&first, &model).await.unwrap();

    assert_eq!(cloud.mutation_count(), 0);
    assert_eq!(second, first);
}

#[tokio::test]
async fn reconcile_adopts_existing_resources_without_state() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let populated = reconciler.reconcile(&spec, &model).await.unwrap();

    // Same specification again, with no remembered identifiers: every
    // resource is found by name and adopted without touching the cloud.
    cloud.reset_counters();
    let adopted = reconciler.reconcile(&spec, &model).await.unwrap();

    assert_eq!(cloud.mutation_count(), 0);
    assert_eq!(adopted, populated);
    assert_eq!(adopted.kubernetes_api.endpoint, "10.0.0.11");
}

#[tokio::test]
async fn node_bootstrap_sees_master_endpoint() {
    let cloud = Arc::new(MockCloud::new());
    let scripts = tempfile::tempdir().unwrap();
    std::fs::write(
        scripts.path().join("join.sh"),
        "#!/bin/sh\nkubeadm join {{ values.master_ip }}:{{ kubernetes_api.port }}\n",
    )
    .unwrap();

    let mut spec = common::cluster();
    spec.server_pools
        .iter_mut()
        .find(|p| p.name == "c1-node")
        .unwrap()
        .bootstrap_scripts = vec!["join.sh".to_string()];

    let session = Session::new(cloud.clone(), Arc::new(BootstrapRenderer::new(scripts.path())));
    let reconciler = Reconciler::new(session);
    let model = Model::build(&spec);
    reconciler.reconcile(&spec, &model).await.unwrap();

    let payload = cloud.user_data("c1-node").unwrap();
    assert!(payload.contains("kubeadm join 10.0.0.11:6443"));
    assert_eq!(cloud.user_data("c1-master").as_deref(), Some(""));
}

#[tokio::test]
async fn plan_previews_without_touching_the_cloud() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let plan = reconciler.plan(&spec, &model).await.unwrap();
    assert!(plan.has_changes);
    assert_eq!(plan.actions.len(), 11);
    assert!(plan.actions.iter().all(|a| a.action_type == ActionType::Create));
    assert_eq!(cloud.mutation_count(), 0);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();
    let plan = reconciler.plan(&converged, &model).await.unwrap();
    assert!(!plan.has_changes);
    assert_eq!(plan.summary().no_change, 11);

    let mut grown = converged.clone();
    let node = grown
        .server_pools
        .iter_mut()
        .find(|p| p.name == "c1-node")
        .unwrap();
    node.min_count = 3;
    node.max_count = 4;
    let plan = reconciler.plan(&grown, &Model::build(&grown)).await.unwrap();
    assert_eq!(plan.summary().update, 1);
    assert_eq!(plan.summary().no_change, 10);
}

#[tokio::test]
async fn failed_apply_rolls_back_created_resources() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    cloud.fail_once("create_pool", "InternalError", "mock executor out of capacity");
    let err = reconciler.reconcile(&spec, &model).await.unwrap_err();

    match err {
        CloudError::ApplyFailed { kind, name, source } => {
            assert_eq!(kind, "pool");
            assert_eq!(name, "c1-master");
            assert!(matches!(
                *source,
                CloudError::Provider { ref code, .. } if code == "InternalError"
            ));
        }
        other => panic!("expected apply failure, got {other}"),
    }

    // Everything created before the failing pool was deleted again.
    assert!(cloud.remaining().is_empty());
}

#[tokio::test]
async fn abandoned_rollback_lists_leftovers() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    cloud.fail_once("create_pool", "InternalError", "mock executor out of capacity");
    cloud.fail_once("delete_subnet", "AuthFailure", "operation not permitted");
    let err = reconciler.reconcile(&spec, &model).await.unwrap_err();

    match err {
        CloudError::RollbackAbandoned { abandoned, source } => {
            assert_eq!(abandoned.len(), 5);
            assert!(abandoned.contains(&"network 'c1' (net-1)".to_string()));
            assert!(abandoned.contains(&"subnet 'c1-node' (sub-2)".to_string()));
            assert!(matches!(*source, CloudError::ApplyFailed { .. }));
        }
        other => panic!("expected an abandoned rollback, got {other}"),
    }

    // Firewalls and route tables were cleaned before the delete failed.
    assert_eq!(
        cloud.remaining(),
        vec![
            "gateway:c1",
            "keypair:c1",
            "network:c1",
            "subnet:c1-master",
            "subnet:c1-node",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn rollback_retries_transient_delete_failures() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    cloud.fail_once("create_pool", "InternalError", "mock executor out of capacity");
    cloud.fail_once("delete_subnet", "DependencyViolation", "has a dependent object");
    let err = reconciler.reconcile(&spec, &model).await.unwrap_err();

    // The transient delete failure was retried away, so the rollback
    // completed and the original apply failure surfaces.
    assert!(matches!(err, CloudError::ApplyFailed { .. }));
    assert!(cloud.remaining().is_empty());
    assert_eq!(cloud.calls_of("delete_subnet"), 3);
}

#[tokio::test]
async fn update_resizes_pool_in_place() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    let mut grown = converged.clone();
    let node = grown
        .server_pools
        .iter_mut()
        .find(|p| p.name == "c1-node")
        .unwrap();
    node.min_count = 3;
    node.max_count = 4;

    cloud.reset_counters();
    let model = Model::build(&grown);
    let updated = reconciler.reconcile(&grown, &model).await.unwrap();

    assert_eq!(cloud.calls_of("resize_pool"), 1);
    assert_eq!(cloud.mutation_count(), 1);
    assert_eq!(
        updated.pool("c1-node").unwrap().identifier,
        converged.pool("c1-node").unwrap().identifier
    );

    cloud.reset_counters();
    reconciler.reconcile(&updated, &model).await.unwrap();
    assert_eq!(cloud.mutation_count(), 0);
}

#[tokio::test]
async fn firewall_rule_drift_is_converged() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    let mut widened = converged.clone();
    let master = widened
        .server_pools
        .iter_mut()
        .find(|p| p.name == "c1-master")
        .unwrap();
    master.firewalls[0]
        .ingress_rules
        .push(keel_core::cluster::Rule {
            protocol: "tcp".to_string(),
            from_port: 22,
            to_port: 22,
            source: "10.0.0.0/16".to_string(),
        });

    cloud.reset_counters();
    let model = Model::build(&widened);
    let updated = reconciler.reconcile(&widened, &model).await.unwrap();

    assert_eq!(cloud.calls_of("set_firewall_rules"), 1);
    assert_eq!(cloud.calls_of("create_firewall"), 0);
    assert_eq!(cloud.mutation_count(), 1);

    cloud.reset_counters();
    reconciler.reconcile(&updated, &model).await.unwrap();
    assert_eq!(cloud.mutation_count(), 0);
}

#[tokio::test]
async fn changed_network_cidr_is_rejected() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    let mut changed = converged.clone();
    changed.network.cidr = "10.1.0.0/16".to_string();

    cloud.reset_counters();
    let err = reconciler
        .reconcile(&changed, &Model::build(&changed))
        .await
        .unwrap_err();

    match err {
        CloudError::ApplyFailed { kind, source, .. } => {
            assert_eq!(kind, "network");
            assert!(matches!(*source, CloudError::Precondition(_)));
        }
        other => panic!("expected apply failure, got {other}"),
    }

    // Nothing was created this run, so nothing was rolled back.
    assert_eq!(cloud.mutation_count(), 0);
    assert_eq!(cloud.remaining().len(), 11);
}

#[tokio::test]
async fn tripped_interrupt_stops_before_any_work() {
    let cloud = Arc::new(MockCloud::new());
    let interrupt = InterruptFlag::new();
    interrupt.trip();
    let reconciler = Reconciler::new(common::session(&cloud)).with_interrupt(interrupt);
    let spec = common::cluster();
    let model = Model::build(&spec);

    let err = reconciler.reconcile(&spec, &model).await.unwrap_err();

    assert!(matches!(err, CloudError::Interrupted));
    assert!(cloud.call_log().is_empty());
    assert!(cloud.remaining().is_empty());
}

#[tokio::test]
async fn half_built_route_table_is_completed() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    // A previous run died after creating the table but before routing
    // or associating it.
    let net = cloud.create_network("c1", "10.0.0.0/16").await.unwrap();
    cloud
        .create_route_table("c1-master", &net.identifier)
        .await
        .unwrap();

    cloud.reset_counters();
    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    assert_eq!(cloud.calls_of("create_network"), 0);
    assert_eq!(cloud.calls_of("create_route_table"), 1);
    assert_eq!(cloud.calls_of("create_default_route"), 2);
    assert_eq!(cloud.calls_of("associate_route_table"), 2);
    assert_eq!(
        converged.pool("c1-master").unwrap().subnets[0].route_table_identifier,
        "rtb-1"
    );
}

#[tokio::test]
async fn detached_gateway_is_attached() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    cloud.create_network("c1", "10.0.0.0/16").await.unwrap();
    cloud.create_gateway("c1").await.unwrap();

    cloud.reset_counters();
    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    assert_eq!(cloud.calls_of("create_gateway"), 0);
    assert_eq!(cloud.calls_of("attach_gateway"), 1);
    assert_eq!(converged.network.internet_gateway_identifier, "igw-1");
}

#[tokio::test]
async fn load_balancer_fronts_the_api() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster_with_balancer();
    let model = Model::build(&spec);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    let lb = converged.api_load_balancer.as_ref().unwrap();
    assert_eq!(lb.identifier, "lb-1");
    assert_eq!(lb.address, "c1-api.lb.mock.local");
    assert_eq!(converged.kubernetes_api.endpoint, "c1-api.lb.mock.local");
    // Bootstrap still joins via the machine address, not the balancer.
    assert_eq!(converged.value("master_ip"), Some("10.0.0.11"));

    cloud.reset_counters();
    let second = reconciler.reconcile(&converged, &model).await.unwrap();
    assert_eq!(cloud.mutation_count(), 0);
    assert_eq!(second.kubernetes_api.endpoint, "c1-api.lb.mock.local");
}

#[tokio::test]
async fn instance_profile_wires_pool_credentials() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster_with_profile();
    let model = Model::build(&spec);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    let profile = converged
        .pool("c1-master")
        .unwrap()
        .instance_profile
        .as_ref()
        .unwrap();
    assert_eq!(profile.identifier, "prof-1");

    cloud.reset_counters();
    reconciler.reconcile(&converged, &model).await.unwrap();
    assert_eq!(cloud.mutation_count(), 0);

    // Role changes on a live profile are refused.
    let mut drifted = converged.clone();
    drifted
        .server_pools
        .iter_mut()
        .find(|p| p.name == "c1-master")
        .unwrap()
        .instance_profile
        .as_mut()
        .unwrap()
        .role
        .policies = vec!["ec2-describe".to_string(), "s3-read".to_string()];

    let err = reconciler
        .reconcile(&drifted, &Model::build(&drifted))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CloudError::ApplyFailed { ref kind, .. } if kind == "instance-profile"
    ));
}
