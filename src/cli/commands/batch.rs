//! Batch command - issue many requests through one coordinator
//!
//! Every entry runs as its own task, so identical entries exercise request
//! deduplication: they share a single compile.

use crate::build::{BuildOutcome, BuildRequest};
use crate::cli::args::{BatchArgs, OutputFormat};
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::response::BuildResponse;
use console::style;
use futures_util::future::join_all;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Batch file layout
#[derive(Debug, Default, Deserialize)]
pub struct BatchFile {
    /// Requests to issue
    #[serde(default)]
    pub request: Vec<BuildRequest>,
}

impl BatchFile {
    /// Load a batch file from disk
    pub async fn load(path: &Path) -> KilnResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| KilnError::io(format!("reading batch file {}", path.display()), e))?;
        Ok(toml::from_str(&content)?)
    }
}

/// Execute the batch command
pub async fn execute(args: BatchArgs, config: &Config) -> KilnResult<()> {
    let batch = BatchFile::load(&args.file).await?;
    if batch.request.is_empty() {
        println!("No requests in {}", args.file.display());
        return Ok(());
    }

    let coordinator = super::coordinator(config).await?;
    debug!("Issuing {} requests", batch.request.len());

    let handles = batch.request.iter().cloned().map(|request| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request(&request).await })
    });

    let mut outcomes = Vec::with_capacity(batch.request.len());
    for joined in join_all(handles).await {
        let outcome = joined
            .map_err(|e| KilnError::Internal(format!("batch task failed: {}", e)))?
            .map(|result| BuildResponse::assemble(&result, &config.server.base_url));
        outcomes.push(outcome);
    }

    let total = outcomes.len();
    let failed = outcomes.iter().filter(|o| o.is_err()).count();

    match args.format {
        OutputFormat::Table => print_table(&batch.request, &outcomes),
        OutputFormat::Json => print_json(&batch.request, &outcomes)?,
        OutputFormat::Plain => {
            for outcome in outcomes.iter().flatten() {
                println!("{}", outcome.location);
            }
        }
    }

    if failed > 0 {
        return Err(KilnError::BatchFailed { failed, total });
    }
    Ok(())
}

fn print_table(requests: &[BuildRequest], outcomes: &[KilnResult<BuildResponse>]) {
    println!(
        "{:<4} {:<28} {:<10} {:<34} {}",
        style("#").bold(),
        style("TARGET").bold(),
        style("OUTCOME").bold(),
        style("IDENTITY").bold(),
        style("ARCHIVE").bold()
    );
    println!("{}", "-".repeat(100));

    for (index, (request, outcome)) in requests.iter().zip(outcomes).enumerate() {
        let target = format!("{}/{} [{}]", request.os, request.arch, request.features);
        match outcome {
            Ok(response) => {
                let label = match response.outcome {
                    BuildOutcome::Created => style("created").green(),
                    BuildOutcome::Existing => style("existing").cyan(),
                };
                println!(
                    "{:<4} {:<28} {:<10} {:<34} {}",
                    index,
                    target,
                    label,
                    response.identity,
                    response.archive_path.display()
                );
            }
            Err(e) => {
                println!(
                    "{:<4} {:<28} {:<10} {}",
                    index,
                    target,
                    style("failed").red(),
                    e
                );
            }
        }
    }

    let created = outcomes
        .iter()
        .flatten()
        .filter(|r| r.outcome == BuildOutcome::Created)
        .count();
    println!();
    println!("Total: {} request(s), {} compile(s)", outcomes.len(), created);
}

fn print_json(
    requests: &[BuildRequest],
    outcomes: &[KilnResult<BuildResponse>],
) -> KilnResult<()> {
    let entries: Vec<serde_json::Value> = requests
        .iter()
        .zip(outcomes)
        .map(|(request, outcome)| match outcome {
            Ok(response) => serde_json::json!({
                "request": request,
                "response": response,
            }),
            Err(e) => serde_json::json!({
                "request": request,
                "error": e.to_string(),
            }),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
