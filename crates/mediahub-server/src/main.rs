mod cli;
mod shutdown;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mediahub_core::Config;
use mediahub_engine::{ClientHolder, NoopMetadataStore, ObjectStore, ObjectStoreConfig, StreamProducer, UploadUseCase};

use crate::cli::Cli;
use crate::shutdown::{ShutdownController, ShutdownEvent, spawn_ctrl_c_handler};

fn init_tracing() {
    use std::io::IsTerminal;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(std::io::stdout().is_terminal())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::read(&config_path)?;
    info!(path = %config_path, "configuration loaded");

    let holder = ClientHolder::connect(&config.redis).await?;
    let (health_shutdown_tx, health_shutdown_rx) = watch::channel(false);
    let health_task = tokio::spawn(mediahub_engine::holder::run_health_loop(
        holder.clone(),
        config.redis.clone(),
        health_shutdown_rx,
    ));

    let object_store = ObjectStore::start(&config.r2, config.r2.bucket_name.clone(), ObjectStoreConfig::default());

    let producer = Arc::new(StreamProducer::new(
        holder.clone(),
        config.webp_worker.stream.clone(),
        config.webp_worker.max_len,
    ));

    let metadata_store = Arc::new(NoopMetadataStore);
    let _use_case = UploadUseCase::new(object_store.store.clone(), producer, metadata_store);

    let worker_cancellation = CancellationToken::new();
    let worker_pool_task = tokio::spawn(mediahub_engine::worker_pool::run(
        holder.clone(),
        object_store.store.clone(),
        config.webp_worker.clone(),
        worker_cancellation.clone(),
    ));

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(shutdown.clone(), shutdown_tx);

    info!("mediahub pipeline running, press Ctrl+C to stop");

    let mut immediate_exit = false;
    loop {
        match shutdown_rx.recv().await {
            Some(ShutdownEvent::Graceful) => {
                info!("stop requested, draining in-flight work (press Ctrl+C again to exit immediately)");
                worker_cancellation.cancel();
                let _ = health_shutdown_tx.send(true);
                break;
            }
            Some(ShutdownEvent::Immediate) => {
                warn!("stop requested again, exiting immediately");
                immediate_exit = true;
                break;
            }
            None => break,
        }
    }

    if immediate_exit {
        std::process::exit(130);
    }

    if let Err(err) = worker_pool_task.await {
        warn!(error = %err, "conversion worker pool task panicked");
    }
    // `_use_case` holds its own `ObjectStore` handle (and thus a sender on
    // the admission channel); it has to go before `close()` can observe
    // the channel as closed. The real HTTP handler will own this instead
    // of a dead local once it's wired in.
    drop(_use_case);
    object_store.close().await;
    let _ = health_task.await;
    holder.close();

    info!("mediahub pipeline shut down cleanly");
    Ok(())
}
