//! Ask command: answer questions about one document.

use anyhow::{Context, Result};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::answer::{Answer, Domain, OpenAiChatModel};
use crate::config::Settings;
use crate::error::OrchestratorError;
use crate::query::{QueryEngine, QueryOptions};
use crate::semantic::FastEmbedGenerator;

/// Exit code when the deadline cut a request short but some answers exist.
const EXIT_PARTIAL: u8 = 2;

#[derive(Serialize)]
struct AskOutput<'a> {
    document: &'a str,
    complete: bool,
    answers: &'a [Answer],
}

/// Arguments of the ask command.
pub struct AskArgs {
    pub url: String,
    pub questions: Vec<String>,
    pub domain: Option<Domain>,
    pub explain: bool,
    pub json: bool,
    pub timeout: Option<u64>,
}

pub async fn run(args: AskArgs, settings: &Settings, info: bool) -> Result<ExitCode> {
    let semantic = settings.semantic_search.clone();
    let embedder = tokio::task::spawn_blocking(move || FastEmbedGenerator::from_settings(&semantic))
        .await
        .context("embedding model initialization panicked")?
        .context("Failed to create embedding generator")?;
    if info {
        eprintln!(
            "Embedding model: {} ({} instances)",
            settings.semantic_search.model,
            embedder.pool_size()
        );
    }

    let model = OpenAiChatModel::from_settings(&settings.generation)
        .context("Failed to create language model client")?;
    if info {
        eprintln!("Language model: {} via {}", settings.generation.model, model.endpoint());
    }

    let engine = QueryEngine::builder(settings.clone())
        .embedder(Arc::new(embedder))
        .language_model(Arc::new(model))
        .build()
        .context("Failed to set up query engine")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling request...");
            on_interrupt.cancel();
        }
    });

    let options = QueryOptions {
        domain: args.domain,
        explain: args.explain,
        timeout: args.timeout.map(Duration::from_secs),
        cancel: Some(cancel),
    };

    let (answers, complete) = match engine
        .answer_questions_with(&args.url, &args.questions, &options)
        .await
    {
        Ok(answers) => (answers, true),
        Err(OrchestratorError::PartialTimeout { answers, completed }) => {
            eprintln!(
                "Warning: request timed out; {completed} of {} questions answered",
                answers.len()
            );
            (answers, false)
        }
        Err(e) => {
            let reason = e.reason();
            return Err(anyhow::Error::new(e).context(format!("Query failed [{reason}]")));
        }
    };

    if args.json {
        let output = AskOutput {
            document: &args.url,
            complete,
            answers: &answers,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_answers(&answers, args.explain);
    }

    if info {
        let stats = engine.stats();
        eprintln!(
            "Cache: {} documents, {} builds, {} hits",
            stats.cache.entries.len(),
            stats.cache.builds,
            stats.cache.hits
        );
    }

    Ok(if complete {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL)
    })
}

fn print_answers(answers: &[Answer], explain: bool) {
    for (i, answer) in answers.iter().enumerate() {
        println!("Q{}: {}", i + 1, answer.question);
        println!("A{}: {}", i + 1, answer.text);

        if explain {
            if let Some(trace) = &answer.trace {
                println!(
                    "   confidence: {} (max similarity {:.3}, {} relevant chunks)",
                    trace.confidence, trace.relevance.max_score, trace.relevance.relevant_count
                );
                let sections: Vec<String> = trace
                    .chunks
                    .iter()
                    .map(|c| format!("#{} ({:.2})", c.index + 1, c.score))
                    .collect();
                if !sections.is_empty() {
                    println!("   sections: {}", sections.join(", "));
                }
                for clause in &trace.key_clauses {
                    println!("   - \"{}\"", clause.text);
                }
            }
            if let Some(reason) = answer.fallback_reason() {
                println!("   fallback: {reason:?}");
            }
        }
        println!();
    }
}
