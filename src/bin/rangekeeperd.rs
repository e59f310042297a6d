//! RangeKeeper daemon: one engine task plus one price monitor per pool.
//!
//! The live chain driver is deployment-specific and wired in from outside
//! this crate; the daemon itself runs the full keeper loop against the
//! built-in virtual pool with `--dry-run`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use chrono::Utc;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use range_keeper::chain::virtual_pool::{VirtualPool, VirtualPoolConfig};
use range_keeper::chain::{PoolChain, PriceTick};
use range_keeper::config::{AppConfig, PoolConfig};
use range_keeper::infra::{init_logging, HealthSurface, JsonlHistory};
use range_keeper::infra::notify::TracingNotifier;
use range_keeper::persist::{FileStateStore, StateStore};
use range_keeper::{PriceMonitor, RangeKeeper};

#[derive(Parser, Debug)]
#[command(name = "rangekeeperd", about = "Autonomous seven-band liquidity keeper")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "rangekeeper.json")]
    config: PathBuf,

    /// Run every pool against an in-process virtual chain instead of a
    /// live RPC driver.
    #[arg(long)]
    dry_run: bool,

    /// Override the log directory from the config file.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// Dry-run seed inventory: 100k of each token, scaled to its decimals.
fn dry_run_balance(decimals: u8) -> U256 {
    U256::from(100_000u64) * U256::from(10u64).pow(U256::from(decimals as u64))
}

fn virtual_chain_for(pool: &PoolConfig) -> Arc<VirtualPool> {
    Arc::new(VirtualPool::new(VirtualPoolConfig {
        token0: pool.token0,
        token1: pool.token1,
        decimals0: pool.decimals0,
        decimals1: pool.decimals1,
        fee: pool.fee,
        initial_tick: 0,
        wallet: pool.owner,
        balance0: dry_run_balance(pool.decimals0),
        balance1: dry_run_balance(pool.decimals1),
        gas_price_gwei: 25.0,
    }))
}

async fn run_pool<C: PoolChain>(
    pool: PoolConfig,
    chain: Arc<C>,
    store: Arc<FileStateStore>,
    history: Arc<JsonlHistory>,
    health: Arc<HealthSurface>,
    mut shutdown: watch::Receiver<bool>,
) {
    let pool_id = pool.pool_id.clone();
    let check_interval = Duration::from_secs(pool.check_interval_seconds);

    let mut keeper = RangeKeeper::new(
        pool,
        chain.clone(),
        store,
        Arc::new(TracingNotifier),
        history,
        health,
    );
    if let Err(e) = keeper.initialize().await {
        error!(pool = %pool_id, error = %e, "initialization failed, pool not started");
        return;
    }

    let (monitor, mut prices) = PriceMonitor::new(chain, check_interval);
    let monitor_task = tokio::spawn(monitor.run());

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(pool = %pool_id, "shutdown requested");
                    keeper.stop();
                    break;
                }
            }
            changed = prices.changed() => {
                if changed.is_err() {
                    warn!(pool = %pool_id, "price monitor gone, stopping pool");
                    keeper.stop();
                    break;
                }
                let tick: Option<PriceTick> = *prices.borrow_and_update();
                if let Some(tick) = tick {
                    keeper.on_price_tick(&tick).await;
                }
            }
        }
    }

    drop(prices);
    let _ = monitor_task.await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    if args.log_dir.is_some() {
        config.log.log_dir = args.log_dir;
    }
    let _log_guard = init_logging(&config.log);

    info!(
        config = %args.config.display(),
        pools = config.pools.len(),
        dry_run = args.dry_run,
        "rangekeeperd starting"
    );

    if !args.dry_run {
        // The on-chain driver (RPC endpoints, nonce tracking, failover) is
        // wired in by the deployment around this crate's PoolChain trait.
        error!("no live chain driver configured in this build; use --dry-run");
        std::process::exit(2);
    }

    let store = Arc::new(FileStateStore::open(
        &config.state_file,
        Utc::now().to_rfc3339(),
    )?);
    let history = Arc::new(JsonlHistory::open(&config.history_file));
    let health = Arc::new(HealthSurface::new());

    // Periodic one-line status per pool, independent of the engines.
    let health_reporter = {
        let health = health.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for (pool_id, status) in health.snapshot() {
                    info!(
                        pool = %pool_id,
                        state = %status.state,
                        bands = status.band_count,
                        last_tick = ?status.last_tick,
                        errors = status.consecutive_errors,
                        "pool status"
                    );
                }
            }
        })
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();
    for pool in config.pools.clone() {
        let chain = virtual_chain_for(&pool);
        tasks.push(tokio::spawn(run_pool(
            pool,
            chain,
            store.clone(),
            history.clone(),
            health.clone(),
            shutdown_rx.clone(),
        )));
    }
    drop(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received, stopping engines at the next boundary");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        let _ = task.await;
    }
    health_reporter.abort();

    store.save();
    info!("rangekeeperd stopped");
    Ok(())
}
