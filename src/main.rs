//! Route engine operator CLI.
//!
//! # Architecture Overview
//!
//! ```text
//!   routes.toml ──▶ config loader ──▶ validation ──▶ RouteTable ──▶ RouteTableHandle
//!        │                                                              │
//!        └── watcher (notify) ──▶ reloader ──── publish ────────────────┘
//!
//!   request (host, path, headers, seed) ──▶ RouteTableHandle::route ──▶ Route
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::broadcast;

use route_engine::config::watcher::ConfigWatcher;
use route_engine::config::{load_config, RouterConfig, TableReloader};
use route_engine::observability::{logging, metrics};
use route_engine::routing::{RequestHeaders, RequestInfo, Route, RouteTable, RouteTableHandle};
use route_engine::runtime::{InMemoryRuntime, Runtime};

#[derive(Parser)]
#[command(name = "route-engine")]
#[command(about = "Validate, query and hot-reload L7 route tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a route table
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Resolve one request and print the result as JSON
    Route {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "/")]
        path: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Request header as `name:value`, repeatable
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
        /// Random seed for runtime gates and weighted clusters
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Publish a table and hot-swap it whenever the file changes
    Watch {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| format!("expected `name:value`, got `{raw}`"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Route {
            config,
            host,
            path,
            method,
            headers,
            seed,
        } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())?;
            let mut request = RequestHeaders::new(method, host, path);
            for (name, value) in headers {
                request = request.with_header(
                    HeaderName::from_bytes(name.as_bytes())?,
                    HeaderValue::from_str(&value)?,
                );
            }
            resolve(&config, request, seed.unwrap_or_else(|| fastrand::u64(..)))
        }
        Commands::Watch { config } => watch(&config).await,
    }
}

fn compile(path: &Path) -> Result<(RouterConfig, Arc<InMemoryRuntime>, RouteTable), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let runtime = Arc::new(InMemoryRuntime::from_values(&config.runtime));
    let table = RouteTable::from_config(&config, runtime.clone() as Arc<dyn Runtime>)?;
    Ok((config, runtime, table))
}

fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (_, _, table) = compile(path)?;

    let hosts: Vec<_> = table
        .virtual_hosts()
        .iter()
        .map(|v| {
            json!({
                "name": v.name(),
                "domains": v.domains(),
                "routes": v.routes().len(),
                "virtual_clusters": v.virtual_clusters().len(),
            })
        })
        .collect();

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "valid": true,
            "virtual_hosts": hosts,
            "uses_runtime": table.uses_runtime(),
        }))?
    );
    Ok(())
}

fn resolve(path: &Path, mut request: RequestHeaders, seed: u64) -> Result<(), Box<dyn std::error::Error>> {
    let (_, _, table) = compile(path)?;
    table.strip_internal_only_headers(&mut request);

    let output = match table.route(&request, seed) {
        None => json!({ "seed": seed, "route": null }),
        Some(route) => match route.as_ref() {
            Route::Redirect(redirect) => json!({
                "seed": seed,
                "route": "redirect",
                "location": redirect.new_path(&request),
            }),
            Route::Entry(entry) => {
                let virtual_cluster = entry.virtual_cluster(&request).map(|vc| vc.name().to_string());
                let retry = entry.retry_policy();
                let mut forwarded = request.clone();
                entry.finalize_request_headers(&mut forwarded, &RequestInfo::new())?;

                json!({
                    "seed": seed,
                    "route": "entry",
                    "virtual_host": entry.virtual_host().name(),
                    "cluster": entry.cluster_name(),
                    "priority": entry.priority(),
                    "timeout_ms": entry.timeout().as_millis() as u64,
                    "retry": {
                        "retry_on": retry.retry_on().to_string(),
                        "num_retries": retry.num_retries(),
                        "per_try_timeout_ms": retry.per_try_timeout().map(|t| t.as_millis() as u64),
                    },
                    "shadow_cluster": entry.shadow_policy().cluster(),
                    "hash": entry.hash_policy().and_then(|h| h.generate_hash(&request)),
                    "virtual_cluster": virtual_cluster,
                    "decorator": entry.decorator().map(|d| d.operation()),
                    "forward": {
                        "authority": forwarded.authority(),
                        "path": forwarded.path(),
                    },
                })
            }
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn watch(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (config, runtime, table) = compile(path)?;

    logging::init(&config.observability)?;
    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let handle = Arc::new(RouteTableHandle::new(table));
    tracing::info!(
        path = %path.display(),
        virtual_hosts = config.virtual_hosts.len(),
        "Route table published"
    );

    let reloader = TableReloader::new(handle, runtime);
    let (watcher, updates) = ConfigWatcher::new(path);
    let _watcher = watcher.run()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(reloader.run(updates, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
    task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
