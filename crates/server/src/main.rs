//! SiltKV server binary: opens the store, serves `/db/{key}`, and shuts the
//! engine down cleanly on ctrl-c.

mod http;

use anyhow::Context;
use clap::Parser;
use engine::Db;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// SiltKV key-value store server.
#[derive(Debug, Parser)]
#[command(name = "siltkv", about = "Append-only log-structured key-value store")]
struct Args {
    /// Database directory
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Port to listen on
    #[arg(long, default_value_t = 8070)]
    port: u16,

    /// Maximum segment size in bytes before rollover
    #[arg(long)]
    segment_size: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = match args.segment_size {
        Some(size) => Db::open_sized(&args.dir, size),
        None => Db::open(&args.dir),
    }
    .with_context(|| format!("open database at {}", args.dir.display()))?;
    let db = Arc::new(db);
    info!(dir = %args.dir.display(), segments = db.segment_count(), "database started");

    let app = http::router(Arc::clone(&db));
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!(%addr, "listening");

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            if let Err(err) = result {
                error!(error = %err, "server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    tokio::task::spawn_blocking(move || db.close())
        .await
        .context("join close task")??;
    Ok(())
}
