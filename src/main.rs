use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use job_tracker::config::{RunConfig, window_from_hours};
use job_tracker::error::PipelineError;
use job_tracker::extract::LlmExtractor;
use job_tracker::llm::{LlmConfig, create_provider};
use job_tracker::mail::scan::{CONFIRMATION_PHRASES, confirmation_pattern, scan};
use job_tracker::mail::{ImapSource, MailConfig};
use job_tracker::pipeline::{RunOptions, RunOrchestrator};
use job_tracker::store::{Ledger, NotionConfig, NotionStore};
use job_tracker::tracker::Reconciler;

#[derive(Parser, Debug)]
#[command(name = "job-tracker", version, about = "Reconcile job-application emails into Notion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch recent emails, extract facts and update the tracker
    Run {
        /// How many hours back to look (overrides JOB_TRACKER_WINDOW_HOURS)
        #[arg(long)]
        window_hours: Option<u64>,

        /// Decide but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Reprocess emails the ledger already settled
        #[arg(long)]
        ignore_ledger: bool,

        /// Let later emails in the run see earlier inserts and updates
        #[arg(long)]
        apply_in_run: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Count application confirmations over a longer period (no LLM, no writes)
    Scan {
        #[arg(long, default_value_t = 60)]
        days: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut run_config = RunConfig::from_env()?;
    let _log_guard = init_tracing(run_config.log_dir.as_deref())?;

    match cli.command {
        Command::Run {
            window_hours,
            dry_run,
            ignore_ledger,
            apply_in_run,
            json,
        } => {
            if let Some(hours) = window_hours {
                run_config.window = window_from_hours("--window-hours", hours)?;
            }
            run_config.dry_run |= dry_run;
            run_config.ignore_ledger |= ignore_ledger;
            run_config.apply_in_run |= apply_in_run;
            run(run_config, json).await
        }
        Command::Scan { days } => scan_mailbox(days).await,
    }
}

async fn run(config: RunConfig, json: bool) -> anyhow::Result<()> {
    let source = Arc::new(ImapSource::new(MailConfig::from_env()?));
    let llm = create_provider(&LlmConfig::from_env()?)?;
    let extractor = Arc::new(LlmExtractor::new(llm));
    let store = Arc::new(NotionStore::new(NotionConfig::from_env()?)?);
    let ledger = Arc::new(
        Ledger::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening ledger at {}", config.db_path.display()))?,
    );

    tracing::info!(
        window_hours = config.window.as_secs() / 3600,
        policy = ?config.status_policy,
        dry_run = config.dry_run,
        "Starting run"
    );

    let orchestrator = RunOrchestrator::new(source, extractor, store, RunOptions::from(&config))
        .with_ledger(ledger)
        .with_reconciler(Reconciler::new(config.status_policy.table()));

    let report = match orchestrator.run(config.window).await {
        Ok(report) => report,
        Err(PipelineError::Interrupted { source, partial }) => {
            println!("{}", partial.summary());
            return Err(anyhow::Error::new(source).context("run interrupted by a ledger error"));
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for entry in &report.outcomes {
            println!(
                "{:<9} {}  {}",
                entry.outcome.label(),
                entry.received_at.format("%Y-%m-%d %H:%M"),
                entry.subject
            );
        }
        println!("{}", report.summary());
    }

    if let Some(reason) = &report.aborted {
        anyhow::bail!("run aborted: {reason}");
    }
    Ok(())
}

async fn scan_mailbox(days: u64) -> anyhow::Result<()> {
    let terms = CONFIRMATION_PHRASES.iter().map(|s| s.to_string()).collect();
    let source = ImapSource::new(MailConfig::from_env()?.with_subject_terms(terms));
    let hours = days
        .checked_mul(24)
        .ok_or_else(|| anyhow::anyhow!("--days {days} is too large"))?;
    let emails = source.fetch_headers(window_from_hours("--days", hours)?).await?;

    let report = scan(&emails, &confirmation_pattern(CONFIRMATION_PHRASES)?);
    for subject in &report.subjects {
        println!("  {subject}");
    }
    println!(
        "{} application confirmation(s) in the last {days} days",
        report.subjects.len()
    );
    Ok(())
}

/// Stderr always; a daily rolling file too when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "job-tracker.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}
