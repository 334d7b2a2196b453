// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::env;
use std::process::ExitCode;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use oidc_proxy::auth::Interceptor;
use oidc_proxy::config::{ProxyConfig, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV};
use oidc_proxy::proxy::{router, Forwarder};
use oidc_proxy::state::AppState;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if env::var(LOG_FORMAT_ENV).is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("failed to initialize logging: {e}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("failed to install rustls crypto provider");
        return ExitCode::FAILURE;
    }

    init_tracing();

    let config = ProxyConfig::parse();
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "oidc-proxy stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let shutdown = CancellationToken::new();
    let interceptor = Interceptor::from_config(&config, shutdown.clone()).await?;
    let forwarder = Forwarder::new(config.target()?, config.tls.allow_insecure_target)?;
    info!(upstream = %forwarder.target(), "forwarding requests");
    let app = router(AppState::new(interceptor, forwarder));

    let addr = config.listen_addr()?;
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
            }
            shutdown.cancel();
        }
    });

    if config.tls.listen_enabled {
        let tls = RustlsConfig::from_pem_file(&config.tls.cert, &config.tls.key).await?;
        info!(%addr, "listening with TLS");
        serve_until(shutdown, async move {
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await
        })
        .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "listening");
        serve_plain(listener, app, shutdown).await?;
    }

    Ok(())
}

async fn serve_plain(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn serve_until<F>(shutdown: CancellationToken, server: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = server => result,
        _ = shutdown.cancelled() => Ok(()),
    }
}
