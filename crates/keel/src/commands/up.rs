use std::sync::Arc;

use colored::Colorize;
use keel_cloud::{InterruptFlag, Model, Reconciler, Session, StateStore};
use keel_core::BootstrapRenderer;
use tracing::info;

use crate::util;

pub async fn handle(yes: bool) -> anyhow::Result<()> {
    let (root, spec) = keel_core::load_project()?;
    keel_core::validate_cluster(&spec)?;

    let store = StateStore::new(&root);
    let known = match store.load().await? {
        Some(saved) => spec.adopting(&saved),
        None => spec,
    };

    let adapter = util::adapter_for(known.cloud)?;
    let scripts = BootstrapRenderer::new(keel_core::loader::scripts_dir(&root));
    let session = Session::new(adapter, Arc::new(scripts));

    let interrupt = InterruptFlag::new();
    let reconciler = Reconciler::new(session).with_interrupt(interrupt.clone());
    let model = Model::build(&known);

    println!(
        "{} {} on {}",
        "Cluster".bold(),
        known.name.cyan(),
        known.cloud.to_string().cyan()
    );
    println!();

    let plan = reconciler.plan(&known, &model).await?;
    util::print_plan(&plan);
    if !plan.has_changes {
        println!("{}", "Nothing to do.".green());
        return Ok(());
    }
    println!();

    if !yes && !util::confirm("Apply these changes?")? {
        println!("{}", "Aborted.".yellow());
        return Ok(());
    }

    let lock = store.acquire_lock().await?;
    interrupt.watch_ctrl_c();

    let bar = util::spinner("Reconciling cluster resources");
    let result = reconciler.reconcile(&known, &model).await;
    bar.finish_and_clear();

    // A failed run rolled its own creations back; the state on disk still
    // describes the cluster as it was before this attempt.
    let cluster = result?;
    store.save(&cluster).await?;
    lock.release().await?;
    info!(cluster = %cluster.name, "State saved");

    println!("{} Cluster converged.", "✓".green().bold());
    if !cluster.kubernetes_api.endpoint.is_empty() {
        println!(
            "  API endpoint: {}",
            format!(
                "https://{}:{}",
                cluster.kubernetes_api.endpoint, cluster.kubernetes_api.port
            )
            .cyan()
        );
    }
    Ok(())
}
