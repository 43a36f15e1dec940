mod cli;
mod server;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use tokio::sync::watch;

use wallet_btc_core::mempool::MempoolWatcher;
use wallet_btc_core::notify::HubClient;
use wallet_btc_core::rpc::{ElectrumClient, HttpRpcClient, TxSource};
use wallet_btc_core::wallet::FeeMultipliers;

use cli::TxSourceKind;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let node = Arc::new(
        HttpRpcClient::new(
            &args.rpc_url,
            args.rpc_user.as_deref(),
            args.rpc_pass.as_deref(),
            args.rpc_cookie_file.as_deref(),
            args.rpc_requests_per_second,
            args.rpc_batch_chunk_size,
        )
        .wrap_err("configure node RPC client")?,
    );
    let electrum = Arc::new(ElectrumClient::new(
        &args.electrumx_host,
        args.electrumx_port,
        Duration::from_secs(args.electrumx_timeout),
    ));
    let source: Arc<dyn TxSource> = match args.tx_source {
        TxSourceKind::Electrumx => electrum.clone(),
        TxSourceKind::Node => node.clone(),
    };
    tracing::info!(
        rpc_url = %args.rpc_url,
        electrumx = %format!("{}:{}", args.electrumx_host, args.electrumx_port),
        tx_source = ?args.tx_source,
        "backends configured"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watcher = if args.no_watcher {
        tracing::warn!("mempool watcher disabled; no notifications will be sent");
        None
    } else {
        let hub = Arc::new(
            HubClient::new(&args.notify_url, &args.chain_id, Duration::from_secs(30))
                .wrap_err("configure notify hub client")?,
        );
        let watcher = MempoolWatcher::new(
            node,
            hub,
            source.clone(),
            Duration::from_secs(args.mempool_interval),
        );
        Some(tokio::spawn(watcher.run(shutdown_rx)))
    };

    let state = server::AppState {
        electrum,
        source,
        enrich_concurrency: args.enrich_concurrency.max(1),
        fee_blocks: args.fee_blocks,
        fee_multipliers: FeeMultipliers {
            quick: args.fee_quick,
            priority: args.fee_priority,
            normal: args.fee_normal,
        },
    };
    let router = server::build_router(state, server::cors_layer(&args.cors_origin)?);

    let bind_addr = format!("{}:{}", args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .wrap_err_with(|| format!("bind TCP listener on {bind_addr}"))?;

    tracing::info!("listening on {bind_addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("run HTTP server")?;

    // The receiver may already be gone if the watcher exited on its own.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = watcher {
        handle.await.wrap_err("join mempool watcher")?;
    }
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
