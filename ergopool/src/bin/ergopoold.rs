use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use ergopool::config::Config;
use ergopool::job_manager::JobManager;
use ergopool::node::HttpNodeClient;
use ergopool::pool::{NullSuperShareStore, Pool};
use ergopool::pow::Autolykos2;
use ergopool::share::NoSuperShares;
use ergopool::stratum::StratumServer;
use ergopool::tracing::{self, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ergopool.toml"));
    let config = Config::load_or_default(&config_path)?;

    let manager = Arc::new(JobManager::new(
        config.pool_target()?,
        config.pool.extra_nonce1_size,
        config.pool.reduced_share_messages,
        Arc::new(Autolykos2::new()),
        Arc::new(NoSuperShares),
    )?);
    let node = Arc::new(HttpNodeClient::new(
        &config.node.api_url,
        config.node.api_key.clone(),
    )?);

    if config.pool.use_collateral {
        warn!("collateral mode configured but no retriever is wired in, mining solo");
    }

    let server = StratumServer::bind(
        config.listen_addr()?,
        config.connection_timeout(),
        manager.clone(),
    )
    .await?;
    let pool = Pool::new(
        node,
        manager,
        None,
        Arc::new(NullSuperShareStore),
        config.poll_interval(),
        config.pool.difficulty_multiplier,
    );

    let running = CancellationToken::new();
    let failed = Arc::new(AtomicBool::new(false));
    let tracker = TaskTracker::new();

    let shutdown = running.clone();
    let flag = failed.clone();
    tracker.spawn(async move {
        if let Err(e) = pool.run(shutdown.clone()).await {
            error!(error = %e, "pool orchestrator failed");
            flag.store(true, Ordering::SeqCst);
            shutdown.cancel();
        }
    });

    let shutdown = running.clone();
    let flag = failed.clone();
    tracker.spawn(async move {
        if let Err(e) = server.run(shutdown.clone()).await {
            error!(error = %e, "stratum server failed");
            flag.store(true, Ordering::SeqCst);
            shutdown.cancel();
        }
    });

    tracker.close();
    info!("Started.");

    let mut sigint = unix::signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm =
        unix::signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        () = running.cancelled() => {},
    }

    trace!("Shutting down.");
    running.cancel();

    tracker.wait().await;
    if failed.load(Ordering::SeqCst) {
        anyhow::bail!("a core task failed");
    }
    info!("Exiting.");
    Ok(())
}
