use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use herald::config::{Config, ServiceMode};

#[derive(Parser)]
#[command(name = "herald", about = "Notification delivery service", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service (ingestion loop and/or management API)
    Serve {
        /// Override HERALD_SERVICE_MODE (combined, api-only, pubsub-only)
        #[arg(long, env = "HERALD_SERVICE_MODE")]
        mode: Option<ServiceModeArg>,

        /// Override the management API port
        #[arg(long, env = "HERALD_HTTP_PORT")]
        http_port: Option<u16>,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum ServiceModeArg {
    Combined,
    ApiOnly,
    PubsubOnly,
}

impl From<ServiceModeArg> for ServiceMode {
    fn from(arg: ServiceModeArg) -> Self {
        match arg {
            ServiceModeArg::Combined => ServiceMode::Combined,
            ServiceModeArg::ApiOnly => ServiceMode::ApiOnly,
            ServiceModeArg::PubsubOnly => ServiceMode::PubsubOnly,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { mode, http_port } => {
            let mut config = Config::from_env()
                .map_err(|e| anyhow::anyhow!("startup configuration failed: {}", e))?;

            if let Some(mode) = mode {
                config.mode = mode.into();
            }
            if let Some(port) = http_port {
                config.http.port = port;
            }

            tracing::info!(mode = ?config.mode, "Herald starting");
            herald::service::run(config).await?;
        }
    }

    Ok(())
}
