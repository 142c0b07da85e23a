//! precache - drive an offline asset cache from the command line.
//!
//! This binary is a small host for the precache worker: it fires the install
//! and activate lifecycle events against a disk-backed cache and routes
//! single requests through the fetch interceptor, so the cache can be
//! populated and inspected without a browser.

mod config;
mod host;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use precache_core::worker::{activate, handle_fetch};
use precache_core::{
    CacheStorage, DiskCacheStorage, FetchOutcome, HttpNetwork, Request, Url, WorkerContext,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use host::{LocalHost, Registration};

const USAGE: &str = "\
Usage: precache <command>

Commands:
  init                      Write the default configuration file
  install                   Cache the asset manifest, then activate
  activate                  Delete stale cache generations
  fetch <url|path> [--navigate]
                            Serve one request through the interceptor
  status                    List cache stores and their entries

Environment:
  RUST_LOG                  Log filter (default: warn)
  PRECACHE_ORIGIN           Override the configured origin";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    match command.as_str() {
        "init" => init(),
        "install" => run_install().await,
        "activate" => run_activate().await,
        "fetch" => run_fetch(&args[1..]).await,
        "status" => status().await,
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

fn init() -> Result<()> {
    let config = Config::load()?;
    let path = config.save()?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

/// Build a worker context backed by the on-disk cache and the real network.
fn build_context(
    config: &Config,
    host: Arc<LocalHost>,
) -> Result<(WorkerContext, Arc<DiskCacheStorage>)> {
    config
        .worker
        .origin_url()
        .context("Configured origin is not a valid URL")?;

    let cache_dir = config.cache_dir()?;
    let storage = Arc::new(
        DiskCacheStorage::new(cache_dir.clone())
            .with_context(|| format!("Failed to open cache directory {}", cache_dir.display()))?,
    );
    let network = Arc::new(HttpNetwork::new().context("Failed to build HTTP client")?);
    let ctx = WorkerContext::new(config.worker.clone(), storage.clone(), network, host);
    Ok((ctx, storage))
}

async fn run_install() -> Result<()> {
    let config = Config::load()?;
    let host = Arc::new(LocalHost::new());
    let (ctx, _storage) = build_context(&config, host.clone())?;
    let mut registration = Registration::new(ctx, host);

    info!(origin = %config.worker.origin, cache = %config.worker.cache_name, "Installing");
    let run = registration
        .run()
        .await
        .context("Install failed; nothing was cached")?;

    eprintln!(
        "Cached {} assets in {} ({})",
        run.cached,
        config.worker.cache_name,
        registration.state()
    );
    if let Some(report) = run.activation {
        print_report(&report);
    }
    Ok(())
}

async fn run_activate() -> Result<()> {
    let config = Config::load()?;
    let (ctx, _storage) = build_context(&config, Arc::new(LocalHost::new()))?;
    let report = activate(&ctx).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &precache_core::ActivateReport) {
    for name in &report.deleted {
        eprintln!("Deleted stale cache {}", name);
    }
    for name in &report.failed {
        eprintln!("Could not delete {} (will retry on next activation)", name);
    }
}

async fn run_fetch(args: &[String]) -> Result<()> {
    let target = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .ok_or_else(|| anyhow::anyhow!("fetch needs a URL or path\n\n{}", USAGE))?;
    let navigate = args.iter().any(|a| a == "--navigate");

    let config = Config::load()?;
    let (ctx, _storage) = build_context(&config, Arc::new(LocalHost::new()))?;

    let url = if target.starts_with('/') {
        config.worker.resolve(target)?
    } else {
        target
            .parse::<Url>()
            .with_context(|| format!("Invalid URL: {}", target))?
    };
    let request = if navigate {
        Request::navigate(url)
    } else {
        Request::get(url)
    };

    let outcome = handle_fetch(&ctx, request).await;
    ctx.settle().await;

    match outcome? {
        FetchOutcome::Passthrough => {
            eprintln!("{} is cross-origin; not intercepted", target);
        }
        outcome => {
            let source = outcome.source();
            if let Some(response) = outcome.into_response() {
                eprintln!(
                    "{} {} ({} bytes, from {})",
                    response.status(),
                    target,
                    response.body().len(),
                    source
                );
                io::stdout().write_all(response.body())?;
            }
        }
    }
    Ok(())
}

async fn status() -> Result<()> {
    let config = Config::load()?;
    let (_ctx, storage) = build_context(&config, Arc::new(LocalHost::new()))?;

    println!("Cache directory: {}", storage.cache_dir().display());
    let names = storage.keys().await?;
    if names.is_empty() {
        println!("No cache stores");
        return Ok(());
    }

    for name in names {
        let entries = storage.entries(&name).await?;
        let created = storage
            .created_at(&name)
            .await?
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let marker = if name == config.worker.cache_name {
            " (current)"
        } else {
            ""
        };
        println!("{}{}: {} entries, created {}", name, marker, entries.len(), created);
        for key in entries {
            println!("  {}", key);
        }
    }
    Ok(())
}
