use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use actions_core::config::Settings;

#[derive(Parser)]
#[command(
    name = "actions",
    about = "Record-tracking Actions service backed by an ordered key-value store",
    version,
    propagate_version = true
)]
struct Cli {
    /// Settings file (YAML); defaults apply when absent
    #[arg(long, global = true, env = "ACTIONS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080", env = "ACTIONS_PORT")]
        port: u16,

        /// Store file path (overrides the settings file)
        #[arg(long, env = "ACTIONS_STORE")]
        store: Option<PathBuf>,
    },

    /// Print service version information
    Introspect,
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    match path {
        Some(p) => Ok(Settings::load(p)?),
        None => Ok(Settings::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port, store } => {
            let mut settings = load_settings(cli.config.as_deref())?;
            if let Some(store) = store {
                settings.store_path = store;
            }
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(actions_server::serve(settings, port))
        }
        Commands::Introspect => {
            println!("actions {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
