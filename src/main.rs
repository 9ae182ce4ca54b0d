// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hrms_server::{
    api::router,
    audit::{AuditRecorder, PgAuditStore},
    auth::{
        AllowAllPermissions, HttpKeySetSource, IdentityVerifier, JwksManager, PermissionStore,
        PgPermissionStore,
    },
    config::{AppConfig, PermissionPolicy},
    db::{connect, RlsDatabase},
    ratelimit::RateLimiter,
    state::AppState,
    telemetry,
};

/// How long in-flight requests may take to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    telemetry::init(config.log_format);

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let pool = connect(&config.database_url, config.database_max_connections)
        .await
        .expect("Failed to connect to database");
    info!(max_connections = config.database_max_connections, "Database pool ready");

    let source = HttpKeySetSource::new(config.idp.jwks_url.clone())
        .expect("Failed to build identity provider client");
    let keys = Arc::new(JwksManager::new(Arc::new(source), config.idp.min_refresh_interval));
    if let Err(e) = keys.refresh().await {
        // Not fatal: the first authenticated request retries the fetch.
        warn!(error = %e, "Initial key set fetch failed");
    }
    let verifier = IdentityVerifier::new(keys)
        .with_issuer(config.idp.issuer.clone())
        .with_audience(config.idp.audience.clone());

    let permissions: Arc<dyn PermissionStore> = match config.permission_policy {
        PermissionPolicy::Database => Arc::new(PgPermissionStore::new(pool.clone())),
        PermissionPolicy::AllowAll => {
            warn!("PERMISSION_POLICY=allow-all: every permission check passes. Do not run this in production.");
            Arc::new(AllowAllPermissions)
        }
    };

    let shutdown = CancellationToken::new();
    let (recorder, workers) = AuditRecorder::start(
        Arc::new(PgAuditStore::new(pool.clone())),
        &config.audit,
        shutdown.clone(),
    );

    let state = AppState::new(
        verifier,
        permissions,
        Arc::new(RateLimiter::new(&config.rate_limits)),
        recorder,
    )
    .with_database(RlsDatabase::new(pool))
    .with_trusted_proxy(config.rate_limits.trust_proxy_headers);
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");

    let handle = Handle::new();
    tokio::spawn(watch_shutdown(handle.clone(), shutdown.clone()));

    match &config.tls {
        Some((cert, key)) => {
            let tls_config = RustlsConfig::from_pem_file(cert, key)
                .await
                .expect("Failed to load TLS certificate and key");
            info!(%addr, "HRMS server listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app)
                .await
                .expect("HTTPS server failed");
        }
        None => {
            info!(%addr, "HRMS server listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app)
                .await
                .expect("HTTP server failed");
        }
    }

    // The server has drained; let the audit workers flush the queue.
    shutdown.cancel();
    workers.join().await;
    info!("Shutdown complete");
}

async fn watch_shutdown(handle: Handle<SocketAddr>, shutdown: CancellationToken) {
    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received"),
        _ = shutdown.cancelled() => {}
    }
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
