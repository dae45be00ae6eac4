//! grantd server binary.
//!
//! Loads configuration, signing keys, and directories, then serves the
//! authorization and token endpoints until Ctrl-C or SIGTERM.

use anyhow::Result;
use grantd::{
    config::Config,
    http::{AppState, build_router},
    oauth::{auth_server::AuthorizationServer, tokens::TokenIssuer},
    storage::{
        code_store::{CodeStore, log_expirations},
        directory::StaticDirectory,
    },
};
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "grantd=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();

    let version = grantd::config::version()?;

    env::args().for_each(|arg| {
        if arg == "--version" {
            println!("{version}");
            std::process::exit(0);
        }
    });

    tracing::info!(?version, "Starting grantd");

    let config = Config::new()?;

    let token_issuer = Arc::new(TokenIssuer::from_pem_files(
        &config.signing_key_private_path,
        &config.signing_key_public_path,
        config.issuer.clone(),
    )?);
    tracing::info!(issuer = %config.issuer, "signing keys loaded");

    let directory = Arc::new(StaticDirectory::load(
        &config.clients_path,
        &config.users_path,
    )?);

    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    let (code_store, expirations) = CodeStore::new(config.code_store_settings(), token.clone());
    let code_store = Arc::new(code_store);
    code_store.spawn_reaper(&tracker);
    tracker.spawn(log_expirations(expirations, token.clone()));

    let auth_server = Arc::new(AuthorizationServer::new(
        code_store,
        token_issuer,
        directory.clone(),
        directory,
        config.authorization_server_settings(),
    ));

    let app = build_router(AppState::new(auth_server));

    {
        let tracker = tracker.clone();
        let inner_token = token.clone();

        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!("failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut terminate) => {
                    terminate.recv().await;
                }
                Err(err) => {
                    tracing::error!("failed to install signal handler: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::spawn(async move {
            tokio::select! {
                () = inner_token.cancelled() => { },
                _ = terminate => {},
                _ = ctrl_c => {},
            }

            tracker.close();
            inner_token.cancel();
        });
    }

    let http_port = *config.http_port.as_ref();
    let bind_address = format!("0.0.0.0:{http_port}");
    let listener = TcpListener::bind(&bind_address).await?;

    {
        let inner_token = token.clone();
        tracker.spawn(async move {
            tracing::info!("Starting server on {bind_address}");

            let shutdown_token = inner_token.clone();
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    tracing::info!("axum graceful shutdown complete");
                })
                .await;
            if let Err(err) = result {
                tracing::error!("axum task failed: {}", err);
            }

            inner_token.cancel();
        });
    }

    tracker.wait().await;

    Ok(())
}
