//! FileDrop server binary.
//!
//! A minimal HTTP file-transfer service: clients upload files into a
//! server-side directory (streaming or multishot ranged transfers) and
//! download them later. The main entry point builds the axum router,
//! configures TLS, and starts the listener.

mod config;
mod error;
mod files;
mod http;
mod locking;
mod logging;
mod range;
mod storage;
mod tls;
mod upload;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{any, get};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::config::Args;
use crate::http::{build_cors_layer, resolve_client_ip};
use crate::locking::LockManager;
use crate::storage::UploadRoot;

/// Starts the FileDrop server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let args = Args::parse();
    logging::init_logging(&args.log_level, args.log_file.as_deref())?;

    let mut app = match &args.serve_dir {
        Some(dir) => {
            info!(dir, "serve-only mode: upload and cleanup disabled");
            Router::new().fallback_service(ServeDir::new(dir))
        }
        None => {
            let root = Arc::new(UploadRoot::new(PathBuf::from(&args.upload_dir)));
            root.ensure_root().await?;
            let locks = Arc::new(LockManager::new());
            Router::new()
                .route("/", any(http::server_running))
                .route(
                    "/upload/{file}",
                    any(upload::file_service).layer(DefaultBodyLimit::disable()),
                )
                .route("/cleanup", any(files::cleanup_files))
                .route("/browse", get(files::browse_root))
                .route("/browse/{*path}", get(files::browse_entry))
                .layer(Extension(root))
                .layer(Extension(locks))
        }
    };

    app = app
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        );

    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();
    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    if args.tls_enabled() {
        let tls_config =
            tls::build_rustls_config(args.tls_cert.as_deref(), args.tls_key.as_deref(), host)
                .await?;
        info!("HTTPS server starts up, serving on {}", addr);
        let server = axum_server::bind_rustls(addr, tls_config)
            .handle(handle.clone())
            .serve(service);
        tokio::select! {
            result = server => result?,
            _ = shutdown_signal(handle) => {}
        }
    } else {
        info!("HTTP server starts up, serving on {}", addr);
        let server = axum_server::bind(addr)
            .handle(handle.clone())
            .serve(service);
        tokio::select! {
            result = server => result?,
            _ = shutdown_signal(handle) => {}
        }
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
