use anyhow::{Context, Result};
use tracing::{info, Level};

use crate::config::ServerConfig;
use crate::logging::colorize;
use crate::message::{Request, Response};
use crate::middleware::CorsPolicy;
use crate::router::Router;

use super::http_server::{allocate_ephemeral_port, HttpServer, ServerHandle};
use super::service::AppService;

/// Development server: a router plus the address it is served on.
///
/// Register routes, then call [`Server::start`] (blocks until SIGINT or
/// SIGTERM) or [`Server::spawn`] (returns a handle).
#[derive(Debug)]
pub struct Server {
    host: String,
    port: u16,
    debug: bool,
    router: Router,
    cors: Option<CorsPolicy>,
}

impl Server {
    /// `port == 0` is resolved to a free port immediately.
    ///
    /// # Errors
    ///
    /// Fails if no free port can be allocated.
    pub fn new(host: impl Into<String>, port: u16, debug: bool) -> Result<Self> {
        let host = host.into();
        let port = if port == 0 {
            allocate_ephemeral_port(&host)
                .with_context(|| format!("Failed to allocate a free port on {host}"))?
        } else {
            port
        };
        Ok(Self {
            host,
            port,
            debug,
            router: Router::new().with_debug(debug),
            cors: None,
        })
    }

    /// Build from a resolved configuration.
    ///
    /// # Errors
    ///
    /// Fails on an invalid `[cors]` section or when no free port is available.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let cors = config.cors_policy().context("Invalid CORS configuration")?;
        Ok(Self::new(config.host.clone(), config.port, config.debug)?.with_cors(cors))
    }

    #[must_use]
    pub fn with_cors(mut self, cors: Option<CorsPolicy>) -> Self {
        self.cors = cors;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Shorthand for [`Router::register`].
    pub fn register<I, S, F>(&mut self, methods: I, path: &str, handler: F)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&Request) -> anyhow::Result<Response> + Send + Sync + 'static,
    {
        self.router.register(methods, path, handler);
    }

    /// Freeze the routes into a service without binding anything.
    pub fn into_service(self) -> AppService {
        AppService::new(self.router).with_cors(self.cors)
    }

    /// Bind and serve on a background thread.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound.
    pub fn spawn(self) -> Result<ServerHandle> {
        let addr = format!("{}:{}", self.host, self.port);
        HttpServer(self.into_service())
            .start(addr.as_str())
            .with_context(|| format!("Failed to bind {addr}"))
    }

    /// Print the banner, serve until SIGINT/SIGTERM, then shut down.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound or signal handlers cannot be
    /// installed.
    pub fn start(self) -> Result<()> {
        print_banner(&self.host, self.port, self.debug);
        for route in self.router.routes() {
            info!(method = %route.method, pattern = %route.pattern, "Route registered");
        }

        let handle = self.spawn()?;
        wait_for_shutdown()?;

        println!("\n* Closing the server...");
        handle.stop();
        Ok(())
    }
}

fn print_banner(host: &str, port: u16, debug: bool) {
    println!("* Serving NKAPI app");
    println!("* Debug mode: {}", if debug { "on" } else { "off" });
    if debug {
        println!(
            "{}",
            colorize(
                "* WARNING: This is a development server. Do not use it in a production deployment.",
                Level::ERROR
            )
        );
    }
    println!("* Running on http://{host}:{port}/");
    println!("{}", colorize("* Press CTRL+C to quit", Level::WARN));
}

#[cfg(unix)]
fn wait_for_shutdown() -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutdown signal received");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown() -> Result<()> {
    // No signal handling here; the process exits on CTRL+C.
    loop {
        std::thread::park();
    }
}
