use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tcp_cc_engine::{SessionReport, scenario_runner};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless grader for congestion control scenarios")]
struct Args {
    /// Path to the scenario TOML file to execute.
    #[arg(long)]
    scenario: String,

    /// Write the session trace as JSON after the assertions pass.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("tcp-cc-eval-host starting...");

    let report = scenario_runner::run_scenario_file(&args.scenario).await?;
    log_summary(&report);

    if let Some(path) = &args.trace_out {
        let data = serde_json::to_vec_pretty(&report).context("Failed to serialize trace")?;
        fs::write(path, data)
            .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    }
    Ok(())
}

fn log_summary(report: &SessionReport) {
    let fast_retransmits: Vec<u32> = report.fast_retransmits().collect();
    info!(
        "Rounds: {} | packets sent: {} | peak cwnd: {} | fast retransmits: {:?}",
        report.rounds.len(),
        report.packets_sent(),
        report.cwnd_trace().into_iter().max().unwrap_or(0),
        fast_retransmits
    );
}
