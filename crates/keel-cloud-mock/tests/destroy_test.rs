mod common;

use keel_cloud::{CloudError, InterruptFlag, Model, Reconciler, ResourceKind};
use keel_cloud_mock::MockCloud;
use std::sync::Arc;

#[tokio::test]
async fn destroy_removes_everything_in_reverse() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    cloud.reset_counters();
    let razed = reconciler.destroy(&converged, &model).await.unwrap();

    assert!(cloud.remaining().is_empty());

    let deletions: Vec<String> = cloud
        .call_log()
        .into_iter()
        .filter(|op| op.starts_with("delete_") || op == "detach_gateway")
        .collect();
    assert_eq!(
        deletions,
        vec![
            "delete_pool",
            "delete_pool",
            "delete_firewall",
            "delete_firewall",
            "delete_route_table",
            "delete_route_table",
            "delete_subnet",
            "delete_subnet",
            "detach_gateway",
            "delete_gateway",
            "delete_network",
            "delete_keypair",
        ]
    );

    assert_eq!(razed.network.identifier, "");
    assert_eq!(razed.network.internet_gateway_identifier, "");
    assert_eq!(razed.ssh.identifier, "");
    assert_eq!(razed.pool("c1-master").unwrap().identifier, "");
    assert_eq!(razed.pool("c1-master").unwrap().subnets[0].identifier, "");
    assert_eq!(razed.kubernetes_api.endpoint, "");
    // Learned values survive a destroy; they are history, not resources.
    assert_eq!(razed.value("master_ip"), Some("10.0.0.11"));
}

#[tokio::test]
async fn destroy_of_absent_cluster_is_a_no_op() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let razed = reconciler.destroy(&spec, &model).await.unwrap();

    assert_eq!(cloud.mutation_count(), 0);
    assert_eq!(razed, spec);
}

#[tokio::test(start_paused = true)]
async fn destroy_retries_dependency_violations() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    cloud.fail_times("delete_network", 2, "DependencyViolation", "vpc has dependent objects");
    cloud.reset_counters();
    reconciler.destroy(&converged, &model).await.unwrap();

    assert_eq!(cloud.calls_of("delete_network"), 3);
    assert!(cloud.remaining().is_empty());
}

#[tokio::test(start_paused = true)]
async fn destroy_retries_transient_observation_failures() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    cloud.fail_once("find_network", "DependencyViolation", "eventual consistency");
    cloud.reset_counters();
    reconciler.destroy(&converged, &model).await.unwrap();

    assert_eq!(cloud.calls_of("find_network"), 2);
    assert_eq!(cloud.calls_of("delete_network"), 1);
    assert!(cloud.remaining().is_empty());
}

#[tokio::test]
async fn destroy_aborts_on_persistent_failure() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    cloud.fail_once("delete_pool", "AuthFailure", "operation not permitted");
    let err = reconciler.destroy(&converged, &model).await.unwrap_err();

    match err {
        CloudError::DeleteFailed { kind, name, .. } => {
            assert_eq!(kind, "pool");
            assert_eq!(name, "c1-node");
        }
        other => panic!("expected delete failure, got {other}"),
    }
    assert_eq!(cloud.remaining().len(), 11);
}

#[tokio::test]
async fn destroy_plan_lists_deletes_in_reverse() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(common::session(&cloud));
    let spec = common::cluster();
    let model = Model::build(&spec);

    let converged = reconciler.reconcile(&spec, &model).await.unwrap();

    let plan = reconciler.destroy_plan(&converged, &model).await.unwrap();
    assert!(plan.has_changes);
    assert_eq!(plan.summary().delete, 11);
    assert_eq!(plan.actions[0].kind, ResourceKind::Pool);
    assert_eq!(plan.actions[0].name, "c1-node");
    assert_eq!(plan.actions.last().unwrap().kind, ResourceKind::Keypair);

    let razed = reconciler.destroy(&converged, &model).await.unwrap();
    let plan = reconciler.destroy_plan(&razed, &model).await.unwrap();
    assert!(!plan.has_changes);
    assert_eq!(plan.summary().no_change, 11);
}

#[tokio::test]
async fn tripped_interrupt_leaves_resources_alone() {
    let cloud = Arc::new(MockCloud::new());
    let spec = common::cluster();
    let model = Model::build(&spec);

    let converged = Reconciler::new(common::session(&cloud))
        .reconcile(&spec, &model)
        .await
        .unwrap();

    let interrupt = InterruptFlag::new();
    interrupt.trip();
    let reconciler = Reconciler::new(common::session(&cloud)).with_interrupt(interrupt);

    cloud.reset_counters();
    let err = reconciler.destroy(&converged, &model).await.unwrap_err();

    assert!(matches!(err, CloudError::Interrupted));
    assert_eq!(cloud.mutation_count(), 0);
    assert_eq!(cloud.remaining().len(), 11);
}
