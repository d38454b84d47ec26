//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::answer::Domain;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const AFTER_HELP: &str = "Quick Start:
  $ docquery init
  $ docquery ask https://example.com/policy.pdf -q \"What is the grace period?\"
  $ docquery ask https://example.com/handbook.docx --domain hr --explain --json \\
        -q \"How many leave days do employees get?\" -q \"What is the notice period?\"

The language model API key is read from the variable named by
generation.api_key_env (HF_TOKEN by default).";

/// Ask questions about remote PDF and DOCX documents
#[derive(Parser, Debug)]
#[command(
    name = "docquery",
    version = env!("CARGO_PKG_VERSION"),
    about = "Answer questions about remote documents",
    long_about = "Fetch a PDF or DOCX document, retrieve the passages relevant to each question and answer them with a language model.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Show detailed loading information
    #[arg(long, global = true)]
    pub info: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set up .docquery directory with default settings
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Answer questions about a document
    #[command(
        about = "Answer questions about a document",
        after_help = "Examples:\n  docquery ask https://example.com/policy.pdf -q \"What is the waiting period for pre-existing diseases?\"\n  docquery ask https://example.com/contract.docx --domain legal -q \"Who may terminate?\" --json"
    )]
    Ask {
        /// URL of the PDF or DOCX document
        url: String,

        /// Question to answer (repeat for several)
        #[arg(short, long = "question", required = true)]
        questions: Vec<String>,

        /// Instruction domain: generic, insurance, legal, hr, compliance
        #[arg(short, long)]
        domain: Option<Domain>,

        /// Include supporting clauses and scores
        #[arg(short, long)]
        explain: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Request deadline in seconds (overrides config)
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from([
            "docquery",
            "ask",
            "https://example.com/policy.pdf",
            "-q",
            "What is the grace period?",
            "-q",
            "Is maternity covered?",
            "--domain",
            "insurance",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask {
                url,
                questions,
                domain,
                json,
                explain,
                ..
            } => {
                assert_eq!(url, "https://example.com/policy.pdf");
                assert_eq!(questions.len(), 2);
                assert_eq!(domain, Some(Domain::Insurance));
                assert!(json);
                assert!(!explain);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_ask_requires_question() {
        assert!(Cli::try_parse_from(["docquery", "ask", "https://example.com/a.pdf"]).is_err());
    }
}
