//! # CLI Module
//!
//! Command line for the `nkapi` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Serve the demo application (an echo route at `/` and `/status/<code>`):
//!
//! ```bash
//! nkapi serve --host 0.0.0.0 --port 8000 --no-debug
//! nkapi serve --config nkapi.toml --cors-origin https://app.example
//! ```
//!
//! Flags win over `NKAPI_*` environment variables, which win over the
//! config file.
//!
//! ### `routes`
//!
//! Print the routing table the demo application registers:
//!
//! ```bash
//! nkapi routes
//! ```
//!
//! ## Usage from Code
//!
//! ```rust,no_run
//! use nkapi::cli::{run_cli, Cli};
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! run_cli(cli)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

mod commands;


pub use commands::{run_cli, Cli, Commands};
