use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epgcrawl::config::Config;
use epgcrawl::service::ProgramGuide;
use epgcrawl::utils::format_date;

#[derive(Parser)]
#[command(
    name = "epgcrawl",
    version,
    about = "TV program guide crawler with de-duplicated, rate-limited fetching",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); defaults and EPGCRAWL_* variables otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configuration file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Program table of one station
    Query {
        /// Station name or display name
        #[arg(short, long)]
        station: String,

        /// Station classify, narrows display-name lookup
        #[arg(long)]
        classify: Option<String>,

        /// Date (yyyy-MM-dd), defaults to today
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Program tables of every crawlable station
    CrawlAll {
        /// Date (yyyy-MM-dd), defaults to today
        #[arg(short, long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::info!("epgcrawl starting");

    let shutdown = CancellationToken::new();
    let guide = ProgramGuide::from_config(&config, shutdown.clone())?;

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received, stopping (press Ctrl-C again to exit now)");
        ctrl_c.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Second interrupt, exiting");
            std::process::exit(130);
        }
    });

    let today = || format_date(Local::now().date_naive());

    let work = async {
        match cli.command {
            Commands::Query {
                station,
                classify,
                date,
            } => {
                let date = date.unwrap_or_else(today);
                tracing::info!(station = %station, classify = ?classify, date = %date, "Starting query command");
                query(&guide, &station, classify.as_deref(), &date).await
            }

            Commands::CrawlAll { date } => {
                let date = date.unwrap_or_else(today);
                tracing::info!(date = %date, "Starting crawl-all command");
                crawl_all(&guide, &date).await
            }
        }
    };

    // Dropping `work` aborts any station tasks still running.
    tokio::select! {
        result = work => result?,
        _ = shutdown.cancelled() => anyhow::bail!("Interrupted before finishing"),
    }

    tracing::info!("epgcrawl completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("epgcrawl=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("epgcrawl={level},warn")))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

async fn query(guide: &ProgramGuide, station: &str, classify: Option<&str>, date: &str) -> Result<()> {
    let entries = guide
        .query_program_table(station, classify, date)
        .await
        .with_context(|| format!("Failed to query program table of {station} at {date}"))?;

    for entry in &entries {
        println!("{}", serde_json::to_string(entry)?);
    }
    tracing::info!(count = entries.len(), "Query finished");
    Ok(())
}

async fn crawl_all(guide: &ProgramGuide, date: &str) -> Result<()> {
    let report = guide
        .crawl_all_program_tables(date)
        .await
        .with_context(|| format!("Failed to crawl program tables at {date}"))?;

    for entry in &report.entries {
        println!("{}", serde_json::to_string(entry)?);
    }
    for failure in &report.failed {
        tracing::warn!(station = %failure.station, error = %failure.error, "Station skipped");
    }
    eprintln!(
        "{date}: {} stations ok, {} failed, {} programs",
        report.succeeded.len(),
        report.failed.len(),
        report.entries.len()
    );
    Ok(())
}
