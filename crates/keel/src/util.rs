//! Shared helpers for command handlers.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use keel_cloud::{ActionType, CloudAdapter, Plan};
use keel_cloud_mock::MockCloud;
use keel_core::Cloud;

/// Picks the adapter for the declared cloud. Only the in-memory mock is
/// linked into this binary so far.
pub fn adapter_for(cloud: Cloud) -> anyhow::Result<Arc<dyn CloudAdapter>> {
    match cloud {
        Cloud::Mock => Ok(Arc::new(MockCloud::new())),
        other => bail!(
            "no '{other}' adapter is linked into this build; set `cloud: mock` to try keel out"
        ),
    }
}

pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", prompt.bold());
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Prints one line per planned step in model order, totals at the bottom.
pub fn print_plan(plan: &Plan) {
    for action in &plan.actions {
        let marker = match action.action_type {
            ActionType::Create => "+".green().bold(),
            ActionType::Update => "~".yellow().bold(),
            ActionType::Delete => "-".red().bold(),
            ActionType::NoOp => "·".dimmed(),
        };
        let mut line = format!("{:<17} {}", action.kind.to_string(), action.name);
        if !action.detail.is_empty() {
            line.push_str(&format!("  ({})", action.detail));
        }
        if action.action_type == ActionType::NoOp {
            println!("  {} {}", marker, line.dimmed());
        } else {
            println!("  {} {}", marker, line);
        }
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}
