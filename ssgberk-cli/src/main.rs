// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! SSGBERK CLI
//!
//! Command-line driver for the SSGBERK static site generator benchmark harness.

use clap::{Parser, Subcommand};

mod commands;

/// SSGBERK - Container-based benchmark harness for static site generators
#[derive(Parser)]
#[command(name = "ssgberk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "ssgberk.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build, run and benchmark tests
    Run {
        /// Only run these tests
        #[arg(long, num_args = 1..)]
        test: Vec<String>,

        /// Skip these tests
        #[arg(long, num_args = 1..)]
        exclude: Vec<String>,

        /// Only run tests in these `<language>/<generator>` directories
        #[arg(long = "test-dir", num_args = 1..)]
        test_dir: Vec<String>,

        /// Only run tests of these languages
        #[arg(long = "test-lang", num_args = 1..)]
        test_lang: Vec<String>,

        /// Measurement type to run (`all` for every type)
        #[arg(long = "type")]
        measurement_type: Option<String>,

        /// Re-parse the raw results of an earlier run instead of benchmarking
        #[arg(long, value_name = "TIMESTAMP")]
        parse: Option<String>,
    },

    /// List discoverable tests
    List {
        /// Write test_metadata.json into the results directory
        #[arg(short, long)]
        metadata: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// Remove harness images, keeping the baseline image
    Clean,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            test,
            exclude,
            test_dir,
            test_lang,
            measurement_type,
            parse,
        } => {
            let options = commands::run::RunOptions {
                test,
                exclude,
                test_dir,
                test_lang,
                measurement_type,
                parse,
            };
            commands::run::execute(&cli.config, options).await
        }
        Commands::List { metadata } => commands::list::execute(&cli.config, metadata).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
        Commands::Clean => commands::clean::execute(&cli.config).await,
    }
}
