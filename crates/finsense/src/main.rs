use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use finsense_models::config::FinsenseConfig;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "finsense", about = "Self-healing trade-decision pipeline")]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Stream each run's history to stderr as it is recorded
    #[arg(long)]
    trace: bool,

    /// Tickers to analyze; each runs concurrently
    #[arg(required = true)]
    tickers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let config_str = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {path}"))?;
            toml::from_str::<FinsenseConfig>(&config_str)
                .with_context(|| "Failed to parse config")?
        }
        None => FinsenseConfig::default(),
    };

    let orchestrator = Arc::new(
        finsense::build_orchestrator(&config).context("Failed to build orchestrator")?,
    );

    let mut runs = JoinSet::new();
    let mut traces = Vec::new();
    for (index, ticker) in cli.tickers.iter().enumerate() {
        let prepared = orchestrator
            .prepare(ticker)
            .with_context(|| format!("Failed to start run for {ticker}"))?;

        if cli.trace {
            let mut stream = orchestrator.subscribe(prepared.run_id())?;
            let ticker = prepared.ticker().to_string();
            traces.push(tokio::spawn(async move {
                while let Some(entry) = stream.next().await {
                    let line = serde_json::json!({ "ticker": ticker, "entry": entry });
                    eprintln!("{line}");
                }
            }));
        }

        let orchestrator = Arc::clone(&orchestrator);
        runs.spawn(async move { (index, orchestrator.execute(prepared).await) });
    }

    let mut reports = Vec::with_capacity(cli.tickers.len());
    while let Some(joined) = runs.join_next().await {
        reports.push(joined.context("Workflow task panicked")?);
    }
    reports.sort_by_key(|(index, _)| *index);
    for trace in traces {
        trace.await.context("History trace task panicked")?;
    }

    let mut failed = 0;
    for (_, report) in &reports {
        if !report.is_success() {
            failed += 1;
        }
        let output = if cli.pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };
        println!("{output}");
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} runs failed", reports.len());
    }
    Ok(())
}
