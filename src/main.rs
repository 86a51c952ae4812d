mod budget;
mod classifier;
mod cli;
mod columns;
mod db;
mod error;
mod fmt;
mod importer;
mod models;
mod parser;
mod settings;
mod store;
mod validator;
mod workbook;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, LinesCommands, YearsCommands};

fn init_logging() {
    let filter = EnvFilter::try_from_env("BUDGETDESK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import { file, year } => cli::import::run(&file, year),
        Commands::Status => cli::status::run(),
        Commands::Years { command } => match command {
            YearsCommands::List => cli::years::list(),
            YearsCommands::Activate { year } => cli::years::activate(year),
        },
        Commands::Lines { command } => match command {
            LinesCommands::Engage { id, amount } => cli::lines::engage(id, amount),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
