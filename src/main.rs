// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nakama_server::{
    api::router,
    blockchain::{
        evm::EvmRpcClient, solana::SolanaRpcClient, ChainKind, ChainRpc, ConfirmationPoller,
        RpcRegistry,
    },
    config::{AppConfig, LogFormat},
    state::AppState,
    storage::Store,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

/// One client per configured chain family. Families whose client cannot be
/// built are skipped with a warning.
fn build_rpc_registry(config: &AppConfig) -> RpcRegistry {
    let mut registry = RpcRegistry::new();
    for (&family, url) in &config.rpc_urls {
        let client: Result<Arc<dyn ChainRpc>, _> = match family.kind() {
            ChainKind::Solana => SolanaRpcClient::new(url.clone(), config.rpc_timeout)
                .map(|c| Arc::new(c) as Arc<dyn ChainRpc>),
            ChainKind::Evm => EvmRpcClient::new(family, url, config.rpc_timeout)
                .map(|c| Arc::new(c) as Arc<dyn ChainRpc>),
        };
        match client {
            Ok(client) => {
                info!(chain = %family, "RPC client configured");
                registry.insert(client);
            }
            Err(e) => warn!(chain = %family, error = %e, "Skipping chain: RPC client unavailable"),
        }
    }
    registry
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);
    if config.ephemeral_session_secret {
        warn!("SESSION_SECRET not set; using a random secret, sessions will not survive a restart");
    }

    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.database_path();
    let store = Arc::new(Store::open(&db_path)?);
    info!(path = %db_path.display(), "Database opened");

    let rpc = Arc::new(build_rpc_registry(&config));
    let state = AppState::new(store.clone(), rpc.clone(), config.auth_config());
    let app = router(state);

    let shutdown = CancellationToken::new();
    let poller = ConfirmationPoller::new(store, rpc).with_interval(config.confirmation_poll);
    let poller_handle = tokio::spawn(poller.run(shutdown.clone()));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, domain = %config.app_domain, "NAKAMA server listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = poller_handle.await {
        warn!(error = %e, "Confirmation poller task ended abnormally");
    }
    info!("Server stopped");
    Ok(())
}
