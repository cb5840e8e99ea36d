// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! C-minus compiler command-line interface.
//!
//! This is the main entry point for the `c_minus` command.

use clap::{Parser, Subcommand};
use cminus_cli::commands;
use miette::Result;

/// C-minus: a thin module-oriented layer over C
#[derive(Debug, Parser)]
#[command(name = "c_minus")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Transpile all modules and compile them into an executable
    Build {
        /// Number of parallel compile jobs (defaults to the CPU count)
        #[arg(short = 'j', long = "jobs")]
        jobs: Option<usize>,

        /// Output binary path (defaults to the project name in the root)
        #[arg(short = 'o', long = "output")]
        output: Option<String>,

        /// Comma-separated custom build tags
        #[arg(short = 't', long = "tags", value_delimiter = ',')]
        tags: Vec<String>,

        /// Build in release mode (matches the `release` build tag)
        #[arg(long)]
        release: bool,
    },

    /// Transpile and validate the project without invoking the C compiler
    Check {
        /// Comma-separated custom build tags
        #[arg(short = 't', long = "tags", value_delimiter = ',')]
        tags: Vec<String>,

        /// Check in release mode (matches the `release` build tag)
        #[arg(long)]
        release: bool,
    },
}

fn main() -> Result<()> {
    // Initialize tracing only when RUST_LOG is explicitly set, keeping
    // stderr clean for compiler diagnostics otherwise.
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init();
    }

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))?;

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Build {
            jobs,
            output,
            tags,
            release,
        } => commands::build::build(jobs, output.as_deref(), &tags, release),
        Command::Check { tags, release } => commands::check::check(&tags, release),
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{e:?}");
            std::process::exit(1);
        }
    }
}
