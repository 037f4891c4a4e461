use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::RuntimeConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Swerve drive runtime over zenoh", long_about = None)]
struct Args {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against simulated joints instead of the motor bus
    #[arg(long)]
    sim: bool,

    /// Serial port of the motor bus
    #[arg(short, long)]
    port: Option<String>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match RuntimeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => RuntimeConfig::default(),
    };
    if let Some(port) = args.port {
        config.motors.port = port;
    }
    info!("Configuration: {:?}", config);

    if let Err(e) = swerve_zenoh_runtime::runtime::run(config, args.sim).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
