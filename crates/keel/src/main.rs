mod commands;
mod util;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "keel")]
#[command(version)]
#[command(about = "Declarative Kubernetes clusters on raw cloud infrastructure", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a cluster.yaml and bootstrap scripts in this directory
    Init {
        /// Cluster name
        #[arg(default_value = "my-cluster")]
        name: String,
    },
    /// Check the cluster specification without touching the cloud
    Validate,
    /// Preview what `up` would change
    Plan,
    /// Create or converge the cluster
    Up {
        /// Apply without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Tear down every resource the cluster owns
    Down {
        /// Destroy without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Progress and plans go to stdout; diagnostics stay on stderr so the
    // output remains pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { name } => commands::init::handle(&name),
        Commands::Validate => commands::validate::handle(),
        Commands::Plan => commands::plan::handle().await,
        Commands::Up { yes } => commands::up::handle(yes).await,
        Commands::Down { yes } => commands::down::handle(yes).await,
    }
}
