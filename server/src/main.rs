//! claimdex binary — thin CLI shell over the [`claimdex_server`] library crate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use tracing::{error, info, warn};

use tower_http::compression::predicate::SizeAbove;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use claimdex_server::api;
use claimdex_server::index::IndexClient;
use claimdex_server::site::SiteTable;
use claimdex_server::types::{AppContext, StateMap, COMPRESSION_MIN_SIZE};

// ---------------------------------------------------------------------------
// CLI definition (clap derive)
// ---------------------------------------------------------------------------

/// Faceted search gateway over an Elasticsearch-compatible document index.
#[derive(Parser)]
#[command(name = "claimdex", version, about, long_about = None)]
struct Cli {
    /// URL of the Elasticsearch-compatible index
    #[arg(long, default_value = "http://127.0.0.1:9200")]
    elastic: String,

    /// Index to search when no sites file is given
    #[arg(long, default_value = "docs")]
    index: String,

    /// Sites TOML file (one [[site]] table per host)
    #[arg(long)]
    sites: Option<PathBuf>,

    /// Path to the web UI dist directory
    #[arg(long)]
    dist: Option<PathBuf>,

    /// Bind to 0.0.0.0 instead of 127.0.0.1 (localhost)
    #[arg(long)]
    bind_all: bool,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8472)]
    port: u16,

    /// Skip the startup property-count refresh
    #[arg(long)]
    no_bootstrap: bool,
}

// ---------------------------------------------------------------------------
// Graceful shutdown signal
// ---------------------------------------------------------------------------

/// Resolves on SIGINT, or SIGTERM where that exists.
async fn shutdown_signal() {
    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm => {}
    }
    info!("Shutdown signal received, draining connections...");
}

/// Built-in shell used when no web UI dist directory is available.
const FALLBACK_SHELL: &str = "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>claimdex</title></head>\n<body><div id=\"app\"></div></body>\n</html>\n";

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("claimdex=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Index client
    let index = IndexClient::new(&cli.elastic).unwrap_or_else(|e| {
        error!(url = cli.elastic.as_str(), error = %e, "Invalid index URL");
        std::process::exit(1);
    });

    // Sites: from the TOML table, or a single unnamed site over --index
    let sites = if let Some(path) = &cli.sites {
        SiteTable::from_file(path).unwrap_or_else(|e| {
            error!(path = %path.display(), error = %e, "Could not load sites file");
            std::process::exit(1);
        })
    } else {
        SiteTable::single(cli.index.clone(), false)
    };
    info!(sites = sites.sites().len(), elastic = cli.elastic.as_str(), "Configured sites");

    // Bootstrap the per-site property counts used for cardinality precision
    if cli.no_bootstrap {
        warn!("--no-bootstrap: cardinality thresholds fall back to the index maximum");
    } else {
        sites.refresh_properties_total(&index).await;
    }

    // Resolve dist dir and the SPA shell
    let dist_dir = cli.dist.clone().filter(|d| d.join("index.html").exists());
    if cli.dist.is_some() && dist_dir.is_none() {
        warn!("--dist has no index.html — serving the built-in shell");
    }
    let shell = match &dist_dir {
        Some(dir) => std::fs::read_to_string(dir.join("index.html")).unwrap_or_else(|e| {
            error!(dist = %dir.display(), error = %e, "Could not read index.html");
            std::process::exit(1);
        }),
        None => FALLBACK_SHELL.to_string(),
    };

    let ctx = AppContext {
        index: Arc::new(index),
        sites: Arc::new(sites),
        states: Arc::new(StateMap::new()),
        shell: Arc::new(shell),
        start_time: Instant::now(),
    };

    // Routes: static segments win over captures, so /d/search and
    // /d/filter/* coexist with /d/{id}
    let mut app = Router::new()
        .route("/health", get(api::health))
        .route("/d", get(api::docs_html).post(api::docs_post))
        .route("/d/search", get(api::search_get).post(api::search_post))
        .route("/d/filters/{s}", get(api::filters_get))
        .route("/d/filter/{s}/rel/{prop}", get(api::rel_filter_get))
        .route("/d/filter/{s}/str/{prop}", get(api::str_filter_get))
        .route("/d/filter/{s}/index", get(api::index_filter_get))
        .route("/d/filter/{s}/amount/{prop}/{unit}", get(api::amount_filter_get))
        .route("/d/filter/{s}/time/{prop}", get(api::time_filter_get))
        .route("/d/filter/{s}/size", get(api::size_filter_get))
        .route("/d/{id}", get(api::document_html))
        .route("/d/{id}/json", get(api::document_json));

    // Static assets, with the shell as the SPA fallback
    if let Some(dir) = &dist_dir {
        let index_html = dir.join("index.html");
        app = app
            .fallback_service(ServeDir::new(dir).not_found_service(ServeFile::new(&index_html)));
        info!(dist = %dir.display(), "Serving web UI");
    }

    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new().compress_when(SizeAbove::new(COMPRESSION_MIN_SIZE)))
        .layer(CorsLayer::permissive())
        .with_state(ctx);

    let bind_addr = if cli.bind_all { "0.0.0.0" } else { "127.0.0.1" };
    let listener = tokio::net::TcpListener::bind(format!("{bind_addr}:{}", cli.port))
        .await
        .unwrap_or_else(|e| {
            error!(port = cli.port, error = %e, "Could not bind to port");
            std::process::exit(1);
        });

    let port = listener.local_addr().map(|a| a.port()).unwrap_or(cli.port);
    info!(port = port, "http://localhost:{port}/d");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.unwrap();
}
