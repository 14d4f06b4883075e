//! muninn: prompt quality analysis CLI
//!
//! Reads prompt records (JSON array or JSON lines) from a file or stdin,
//! runs the analysis pipeline and prints the report as JSON on stdout.
//! Logs go to stderr (`RUST_LOG` overrides the default `warn` level).
//!
//! Exit status: 0 success, 2 no backend available, 3 unrecoverable batch
//! failure, 1 anything else.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing::info;

use muninn::{Config, MuninnError, OrchestratorBuilder, Prompt, Secrets};

/// Muninn prompt quality analyser
#[derive(Parser)]
#[command(name = "muninn")]
#[command(version = muninn::PKG_VERSION, long_version = long_version())]
#[command(about = "Analyse AI assistant prompts for recurring quality problems")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "MUNINN_CONFIG")]
    config: Option<PathBuf>,

    /// Prompt records as a JSON array or JSON lines (default: stdin).
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Report date (default: today, UTC).
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Use exactly this backend (ollama, anthropic, openai).
    #[arg(short, long)]
    backend: Option<String>,

    /// Ignore cached results (fresh results are still cached).
    #[arg(long)]
    no_cache: bool,

    /// Delete every cached result and exit.
    #[arg(long)]
    clear_cache: bool,

    /// Probe every configured backend and exit.
    #[arg(long)]
    list_backends: bool,

    /// Pretty-print the JSON report.
    #[arg(long)]
    pretty: bool,
}

fn long_version() -> String {
    muninn::version_string()
}

#[tokio::main]
async fn main() {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("error: {e}");
        process::exit(e.exit_code());
    }
}

async fn run(args: Args) -> Result<(), MuninnError> {
    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;

    let mut builder = OrchestratorBuilder::from_config(&config, &secrets)?;
    if let Some(name) = args.backend {
        builder = builder.force_backend(name);
    }
    if args.no_cache {
        builder = builder.bypass_cache(true);
    }
    let orchestrator = builder.build()?;

    if args.clear_cache {
        let removed = match orchestrator.cache() {
            Some(cache) => cache.invalidate_all().await,
            None => 0,
        };
        println!("removed {removed} cached results");
        return Ok(());
    }

    if args.list_backends {
        for status in orchestrator.registry().probe_all().await {
            let state = if status.available { "available" } else { "unavailable" };
            println!("{:<10} {:<28} {state}", status.name, status.model);
        }
        return Ok(());
    }

    let prompts = read_prompts(args.input.as_deref())?;
    let date = args.date.unwrap_or_else(|| Utc::now().date_naive());
    info!(version = muninn::version_string(), prompts = prompts.len(), %date, "muninn starting");

    let run = orchestrator.run(&prompts, date).await?;
    for warning in &run.warnings {
        eprintln!(
            "warning: batch {} ({} prompts) skipped: {}",
            warning.index, warning.prompt_count, warning.error
        );
    }

    let json = if args.pretty {
        serde_json::to_string_pretty(&run)?
    } else {
        serde_json::to_string(&run)?
    };
    println!("{json}");
    Ok(())
}

/// Read prompt records from `path` or stdin.
fn read_prompts(path: Option<&Path>) -> Result<Vec<Prompt>, MuninnError> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            MuninnError::InvalidInput(format!("failed to read {}: {e}", path.display()))
        })?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| MuninnError::InvalidInput(format!("failed to read stdin: {e}")))?;
            buf
        }
    };
    parse_prompts(&content)
}

/// Accept either a JSON array or one JSON object per line.
fn parse_prompts(content: &str) -> Result<Vec<Prompt>, MuninnError> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| MuninnError::InvalidInput(format!("invalid prompt array: {e}")));
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|e| MuninnError::InvalidInput(format!("line {}: {e}", n + 1)))
        })
        .collect()
}
