use clap::Parser;
use std::process::ExitCode;

use docquery::cli::commands::{ask, init};
use docquery::cli::{Cli, Commands};
use docquery::config::Settings;
use docquery::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });

    logging::init_with_config(&config.logging);

    if cli.info {
        match &cli.config {
            Some(path) => eprintln!("Loaded configuration from {}", path.display()),
            None => eprintln!("Loaded configuration (defaults, .docquery/settings.toml, DQ_* env)"),
        }
    }

    match cli.command {
        Commands::Init { force } => {
            init::run_init(force);
            ExitCode::SUCCESS
        }

        Commands::Config => {
            init::run_config(&config);
            ExitCode::SUCCESS
        }

        Commands::Ask {
            url,
            questions,
            domain,
            explain,
            json,
            timeout,
        } => {
            let args = ask::AskArgs {
                url,
                questions,
                domain,
                explain,
                json,
                timeout,
            };
            match ask::run(args, &config, cli.info).await {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
