use std::sync::Arc;

use colored::Colorize;
use keel_cloud::{InterruptFlag, Model, NoScripts, Reconciler, Session, StateStore};
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
    let session = Session::new(adapter, Arc::new(NoScripts));

    let interrupt = InterruptFlag::new();
    let reconciler = Reconciler::new(session).with_interrupt(interrupt.clone());
    let model = Model::build(&known);

    let plan = reconciler.destroy_plan(&known, &model).await?;
    util::print_plan(&plan);
    if !plan.has_changes {
        println!("{}", "Nothing to destroy.".green());
        return Ok(());
    }
    println!();

    if !yes
        && !util::confirm(&format!(
            "Destroy cluster '{}' and everything it owns?",
            known.name
        ))?
    {
        println!("{}", "Aborted.".yellow());
        return Ok(());
    }

    let lock = store.acquire_lock().await?;
    interrupt.watch_ctrl_c();

    let bar = util::spinner("Destroying cluster resources");
    let result = reconciler.destroy(&known, &model).await;
    bar.finish_and_clear();

    // On failure the state file keeps its identifiers; the next run finds
    // whatever survived by id or name and picks up where this one stopped.
    result?;
    store.clear().await?;
    lock.release().await?;
    info!(cluster = %known.name, "State cleared");

    println!("{} Cluster destroyed.", "✓".green().bold());
    Ok(())
}
