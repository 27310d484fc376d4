mod output;
mod telemetry;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracelink_core::config::Config;
use tracelink_engine::{AggregationEngine, TriggerConfig};
use tracelink_store::Store;

use crate::output::{print_batches_human, print_status_human};
use crate::telemetry::{init_cli_tracing, init_run_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "tracelink")]
#[command(about = "Batch inbound request traces into linked aggregate spans")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the ingest server and batching engine")]
    Run {
        #[arg(long)]
        db_path: Option<PathBuf>,
        #[arg(long)]
        http_addr: Option<String>,
        #[arg(long)]
        count_threshold: Option<usize>,
        #[arg(long, help = "Batch time window, e.g. 10s")]
        timeout_interval: Option<String>,
    },
    #[command(about = "List recently released batches")]
    Batches {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    #[command(about = "Show store status")]
    Status {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            db_path,
            http_addr,
            count_threshold,
            timeout_interval,
        } => run_server(db_path, http_addr, count_threshold, timeout_interval).await,
        Commands::Batches { limit, db_path } => {
            init_cli_tracing();
            let store = open_store(db_path)?;
            let batches = store.recent_batches(limit)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&batches)?);
            } else {
                print_batches_human(&batches);
            }
            Ok(())
        }
        Commands::Status { db_path } => {
            init_cli_tracing();
            let store = open_store(db_path)?;
            let status = store.status()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status_human(&status);
            }
            Ok(())
        }
    }
}

fn open_store(db_path: Option<PathBuf>) -> anyhow::Result<Store> {
    let mut cfg = Config::load()?;
    if let Some(path) = db_path {
        cfg.db_path = path;
    }
    Store::open(&cfg.db_path).context("failed to open store")
}

async fn run_server(
    db_path: Option<PathBuf>,
    http_addr: Option<String>,
    count_threshold: Option<usize>,
    timeout_interval: Option<String>,
) -> anyhow::Result<()> {
    let mut cfg = Config::load()?;
    if let Some(v) = db_path {
        cfg.db_path = v;
    }
    if let Some(v) = http_addr {
        cfg.http_addr = v;
    }
    if let Some(v) = count_threshold {
        cfg.count_threshold = v;
    }
    if let Some(v) = timeout_interval {
        cfg.timeout_interval =
            humantime::parse_duration(&v).context("bad --timeout-interval value")?;
    }
    cfg.validate()?;

    init_run_tracing();

    let addr: SocketAddr = cfg
        .http_addr
        .parse()
        .with_context(|| format!("bad http_addr {}", cfg.http_addr))?;
    let store = Store::open(&cfg.db_path)?;
    let engine = Arc::new(AggregationEngine::start(
        TriggerConfig::from(&cfg),
        Arc::new(store),
    )?);

    tracing::info!(
        count_threshold = cfg.count_threshold,
        timeout_ms = cfg.timeout_interval.as_millis() as u64,
        "starting tracelink"
    );

    let server_engine = engine.clone();
    let server =
        tokio::spawn(
            async move { tracelink_ingest::server::run_http_server(server_engine, addr).await },
        );

    tokio::select! {
        res = server => {
            res.context("http task join failed")??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    engine.shutdown().await;
    shutdown_tracing();
    Ok(())
}
