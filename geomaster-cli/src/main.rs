//! Geomaster CLI - Command-line interface
//!
//! This binary runs the location master and provides tools to inspect
//! installed providers and watch location updates.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::locate::{self, LocateArgs, OutputFormat, ResourceArg};
use commands::providers::{self, ProvidersArgs};
use geomaster::AccuracyLevel;
use runner::GlobalOptions;

#[derive(Parser)]
#[command(name = "geomaster")]
#[command(version = geomaster::VERSION)]
#[command(about = "Location provider arbitration", long_about = None)]
struct Cli {
    /// Config file (default: ~/.geomaster/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the location master until Ctrl-C
    Run {
        /// Only log to the log file
        #[arg(long)]
        quiet: bool,
    },

    /// List installed location providers
    Providers {
        /// Manifest directory (default: from config)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print location updates from the best available provider
    Locate {
        /// Minimum accuracy (none, country, region, locality, postalcode, street, detailed)
        #[arg(long, default_value = "none")]
        accuracy: AccuracyLevel,

        /// Resource providers may use (repeatable; default: all)
        #[arg(long, value_enum)]
        allow: Vec<ResourceArg>,

        /// Only use providers that send updates
        #[arg(long)]
        updates: bool,

        /// Minimum seconds between updates
        #[arg(long, default_value = "0")]
        interval: u64,

        /// Track the address as well
        #[arg(long)]
        address: bool,

        /// Backend option as KEY=VALUE (repeatable)
        #[arg(long = "option", value_parser = locate::parse_option)]
        options: Vec<(String, String)>,

        /// Print the first position and exit
        #[arg(long)]
        once: bool,

        /// Print JSON lines (default when stdout is not a terminal)
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut options = GlobalOptions {
        config: cli.config,
        debug: cli.debug,
        stdout_logging: false,
    };

    let result = match cli.command {
        Commands::Run { quiet } => {
            options.stdout_logging = !quiet;
            commands::run::run(&options)
        }
        Commands::Providers { dir, json } => providers::run(
            &options,
            ProvidersArgs {
                directory: dir,
                json,
            },
        ),
        Commands::Locate {
            accuracy,
            allow,
            updates,
            interval,
            address,
            options: backend_options,
            once,
            json,
        } => {
            let format = if json || !atty::is(atty::Stream::Stdout) {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            };
            locate::run(
                &options,
                LocateArgs {
                    min_accuracy: accuracy,
                    allow,
                    require_updates: updates,
                    interval,
                    address,
                    options: backend_options,
                    once,
                    format,
                },
            )
        }
    };

    if let Err(e) = result {
        e.exit();
    }
}
