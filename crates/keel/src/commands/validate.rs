use colored::Colorize;

pub fn handle() -> anyhow::Result<()> {
    let (root, cluster) = keel_core::load_project()?;
    keel_core::validate_cluster(&cluster)?;

    println!(
        "{} '{}' is a valid cluster specification",
        "✓".green().bold(),
        cluster.name.cyan()
    );
    println!("  project: {}", root.display());
    println!("  cloud: {}", cluster.cloud.to_string().cyan());
    println!("  pools: {}", cluster.server_pools.len());
    for pool in &cluster.server_pools {
        println!(
            "    - {} ({}, {}..{} x {})",
            pool.name.cyan(),
            pool.role,
            pool.min_count,
            pool.max_count,
            pool.size
        );
    }
    Ok(())
}
