use std::sync::Arc;

use colored::Colorize;
use keel_cloud::{Model, NoScripts, Reconciler, Session, StateStore};

use crate::util;

pub async fn handle() -> anyhow::Result<()> {
    let (root, spec) = keel_core::load_project()?;
    keel_core::validate_cluster(&spec)?;

    let store = StateStore::new(&root);
    let known = match store.load().await? {
        Some(saved) => spec.adopting(&saved),
        None => spec,
    };

    let adapter = util::adapter_for(known.cloud)?;
    let session = Session::new(adapter, Arc::new(NoScripts));
    let reconciler = Reconciler::new(session);
    let model = Model::build(&known);

    println!(
        "{} {} on {}",
        "Plan for".bold(),
        known.name.cyan(),
        known.cloud.to_string().cyan()
    );
    println!();

    let plan = reconciler.plan(&known, &model).await?;
    util::print_plan(&plan);

    if !plan.has_changes {
        println!("{}", "Cluster matches the specification.".green());
    }
    Ok(())
}
