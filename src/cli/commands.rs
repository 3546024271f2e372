use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::{CorsConfig, ServerConfig};
use crate::echo::register_demo_routes;
use crate::logging::init_logging;
use crate::router::Router;
use crate::server::Server;

/// Command-line interface for NKAPI
#[derive(Parser, Debug)]
#[command(name = "nkapi")]
#[command(about = "NKAPI development server", long_about = None, version)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the demo application until interrupted
    Serve {
        /// Interface to bind (overrides config file and NKAPI_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, 0 picks a free one (overrides config file and NKAPI_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Expose handler failure traces in 500 responses
        #[arg(long, conflicts_with = "no_debug")]
        debug: bool,

        /// Hide handler failure traces
        #[arg(long)]
        no_debug: bool,

        /// TOML configuration file
        #[arg(short, long, env = "NKAPI_CONFIG")]
        config: Option<PathBuf>,

        /// Allow cross-origin requests from ORIGIN (repeatable, `*` for any)
        #[arg(long = "cors-origin", value_name = "ORIGIN")]
        cors_origins: Vec<String>,
    },
    /// Print the demo routing table
    Routes,
}

impl Commands {
    /// Fold the `serve` flags into `config`. Other commands leave it as is.
    pub fn apply_overrides(&self, config: &mut ServerConfig) {
        let Commands::Serve {
            host,
            port,
            debug,
            no_debug,
            cors_origins,
            ..
        } = self
        else {
            return;
        };

        if let Some(host) = host {
            config.host.clone_from(host);
        }
        if let Some(port) = port {
            config.port = *port;
        }
        if *debug {
            config.debug = true;
        }
        if *no_debug {
            config.debug = false;
        }
        if !cors_origins.is_empty() {
            let cors = config.cors.get_or_insert_with(CorsConfig::default);
            cors.allowed_origins.extend(cors_origins.iter().cloned());
        }
    }
}

/// Execute the parsed command line.
///
/// # Errors
///
/// Returns an error if:
/// - The configuration file or environment cannot be loaded
/// - The CORS configuration is invalid
/// - Logging cannot be initialized
/// - The server fails to bind
pub fn run_cli(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Serve { config: path, .. } => {
            let mut config = ServerConfig::load(path.as_deref()).context("Failed to load configuration")?;
            cli.command.apply_overrides(&mut config);
            init_logging(&config.log)?;
            debug!(?config, "Resolved configuration");

            let mut server = Server::from_config(&config)?;
            register_demo_routes(server.router_mut());
            server.start()
        }
        Commands::Routes => {
            let mut router = Router::new();
            register_demo_routes(&mut router);
            for route in router.routes() {
                println!("{route}");
            }
            Ok(())
        }
    }
}
