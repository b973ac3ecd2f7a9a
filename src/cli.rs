// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `assetwatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetwatch",
    version,
    about = "Incremental front-end asset builds with watch mode and live reload.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML). Relative paths inside it resolve
    /// against its directory.
    #[arg(long, global = true, value_name = "PATH", default_value = "Assetwatch.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETWATCH_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Run tasks even when their outputs are up to date.
    #[arg(long, global = true)]
    pub force: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the production build pipeline.
    Build {
        /// Pipeline to run instead of `build`.
        #[arg(long, value_name = "NAME", default_value = "build")]
        pipeline: String,
    },
    /// Run the initial pipeline, then watch and serve with live reload.
    Watch {
        /// Exit after the initial pipeline.
        #[arg(long)]
        once: bool,
        /// Do not start the HTTP dev server.
        #[arg(long)]
        no_server: bool,
        /// Override `[server].port`.
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
    },
    /// Run one task or pipeline.
    Run {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Parse + validate, print tasks, pipelines and bindings; run nothing.
    List,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
