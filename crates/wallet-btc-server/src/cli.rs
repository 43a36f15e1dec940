use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// wallet-btc: Bitcoin wallet-support API and mempool notifier backed by a
/// full node and ElectrumX.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Address to bind the web server to.
    #[arg(long, default_value = "0.0.0.0", env = "WALLET_BTC_BIND")]
    pub bind: String,

    /// Port to listen on.
    #[arg(long, default_value = "8080", env = "WALLET_BTC_PORT")]
    pub port: u16,

    /// Full node RPC URL.
    #[arg(long, default_value = "http://127.0.0.1:8332", env = "WALLET_BTC_RPC_URL")]
    pub rpc_url: String,

    #[arg(long, env = "WALLET_BTC_RPC_USER")]
    pub rpc_user: Option<String>,

    #[arg(long, env = "WALLET_BTC_RPC_PASS")]
    pub rpc_pass: Option<String>,

    /// Node cookie file (`user:password`), used when no user/pass is given.
    #[arg(long, env = "WALLET_BTC_RPC_COOKIE_FILE")]
    pub rpc_cookie_file: Option<PathBuf>,

    /// Maximum outbound node RPC requests per second.
    #[arg(long, env = "WALLET_BTC_RPC_REQUESTS_PER_SECOND")]
    pub rpc_requests_per_second: Option<u32>,

    /// Calls per HTTP request when batching node RPC.
    #[arg(long, default_value = "50", env = "WALLET_BTC_RPC_BATCH_CHUNK_SIZE")]
    pub rpc_batch_chunk_size: usize,

    #[arg(long, default_value = "127.0.0.1", env = "WALLET_BTC_ELECTRUMX_HOST")]
    pub electrumx_host: String,

    #[arg(long, default_value = "50001", env = "WALLET_BTC_ELECTRUMX_PORT")]
    pub electrumx_port: u16,

    /// Timeout for one ElectrumX exchange, in seconds.
    #[arg(long, default_value = "30", env = "WALLET_BTC_ELECTRUMX_TIMEOUT")]
    pub electrumx_timeout: u64,

    /// Backend that serves transaction lookups.
    #[arg(
        long,
        value_enum,
        default_value_t = TxSourceKind::Electrumx,
        env = "WALLET_BTC_TX_SOURCE"
    )]
    pub tx_source: TxSourceKind,

    /// Notify hub base URL.
    #[arg(long, default_value = "http://127.0.0.1:9000", env = "WALLET_BTC_NOTIFY_URL")]
    pub notify_url: String,

    /// Chain id reported to the notify hub.
    #[arg(long, default_value = "mainnet", env = "WALLET_BTC_CHAIN_ID")]
    pub chain_id: String,

    /// Mempool poll interval, in seconds.
    #[arg(
        long,
        default_value = "10",
        env = "WALLET_BTC_MEMPOOL_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub mempool_interval: u64,

    /// Disable the mempool watcher and notifications.
    #[arg(long, env = "WALLET_BTC_NO_WATCHER")]
    pub no_watcher: bool,

    /// Confirmation target, in blocks, for fee estimates.
    #[arg(long, default_value = "2", env = "WALLET_BTC_FEE_BLOCKS")]
    pub fee_blocks: u32,

    #[arg(long, default_value = "2.0", env = "WALLET_BTC_FEE_QUICK")]
    pub fee_quick: f64,

    #[arg(long, default_value = "1.5", env = "WALLET_BTC_FEE_PRIORITY")]
    pub fee_priority: f64,

    #[arg(long, default_value = "1.2", env = "WALLET_BTC_FEE_NORMAL")]
    pub fee_normal: f64,

    /// Maximum concurrent lookups when resolving one transaction's inputs.
    #[arg(long, default_value = "8", env = "WALLET_BTC_ENRICH_CONCURRENCY")]
    pub enrich_concurrency: usize,

    /// Allowed CORS origins (repeatable). Any origin when omitted.
    #[arg(long, env = "WALLET_BTC_CORS_ORIGIN", value_delimiter = ',')]
    pub cors_origin: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TxSourceKind {
    Electrumx,
    Node,
}
