use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use herald::{
    config::AppConfig, engine::RouteTree, notification::StdoutStage, supervisor::Supervisor,
};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reads alerts as JSON lines from stdin and prints grouped notifications.
    Run(ConfigArgs),
    /// Validates the routing tree and prints it.
    CheckRoutes(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Directory holding `app.yaml` and `routes.yaml`.
    #[arg(long, env = "HERALD_CONFIG_DIR", default_value = "configs")]
    config_dir: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_supervisor(&args.config_dir).await?,
        Commands::CheckRoutes(args) => check_routes(&args.config_dir)?,
    }

    Ok(())
}

async fn run_supervisor(config_dir: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!(config_dir, "Loading application configuration...");
    let config = AppConfig::new(Some(config_dir))?;
    tracing::debug!(?config, "Configuration loaded.");

    let routes = RouteTree::load(config.routes_config_path.clone())?;
    tracing::info!(routes = routes.routes().len(), "Routing tree loaded.");

    let supervisor = Supervisor::builder()
        .config(config)
        .routes(Arc::new(routes))
        .stage(Arc::new(StdoutStage::new()))
        .input(BufReader::new(tokio::io::stdin()))
        .build()?;

    tracing::info!("Supervisor initialized, reading alerts from stdin...");
    supervisor.run().await?;

    Ok(())
}

fn check_routes(config_dir: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::new(Some(config_dir))?;
    let routes = RouteTree::load(config.routes_config_path)?;
    print!("{}", routes.render());
    Ok(())
}
