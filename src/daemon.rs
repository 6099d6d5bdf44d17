use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, parse_duration};
use crate::models::SourceType;
use crate::publish::{MediaPublisher, QueueMediaPublisher, QueueResultPublisher, ResultPublisher, delivery_options};
use crate::queue::Queue;
use crate::worker::{Collector, Worker};
use crate::{cleanup, db, server, sources};

pub async fn run(config: Config) -> Result<()> {
    let pool = db::create_pool(&config).await.context("creating database")?;
    info!(db_path = %config.db_path().display(), "database ready");

    let queue = Queue::new(pool.clone());
    let poll_interval = parse_duration("collector.poll_interval", &config.collector.poll_interval)?;
    let shutdown_timeout = parse_duration("collector.shutdown_timeout", &config.collector.shutdown_timeout)?;
    let stalled_after = parse_duration("collector.stalled_after", &config.collector.stalled_after)?;

    // Publishers are shared by every worker and closed once at shutdown.
    let options = delivery_options(&config.delivery)?;
    let results: Arc<dyn ResultPublisher> = Arc::new(QueueResultPublisher::new(
        queue.clone(),
        config.queues.fetch_results.clone(),
        options.clone(),
    ));
    let media: Arc<dyn MediaPublisher> = Arc::new(QueueMediaPublisher::new(
        queue.clone(),
        config.queues.media_upload.clone(),
        options,
    ));

    let cancel = CancellationToken::new();
    let mut worker_handles = Vec::new();

    for source_type in SourceType::ALL {
        if !config.is_enabled(source_type) {
            info!(family = %source_type, "source family disabled");
            continue;
        }

        let client = sources::build_client(&config, source_type)
            .with_context(|| format!("building {source_type} client"))?;
        let worker = Worker {
            collector: Arc::new(Collector::new(client, results.clone(), media.clone())),
            queue: queue.clone(),
            queue_name: config.queues.fetcher(source_type).to_string(),
            concurrency: config.concurrency(source_type),
            poll_interval,
        };
        worker_handles.push(tokio::spawn(worker.run(cancel.clone(), shutdown_timeout)));
    }

    if worker_handles.is_empty() {
        warn!("no source family enabled, only maintenance tasks will run");
    }

    let cleanup_handle = tokio::spawn(cleanup::stalled_jobs_loop(queue.clone(), stalled_after, cancel.clone()));

    let server_handle = match &config.collector.listen {
        Some(listen) => {
            let router = server::build_router(server::AppState { queue: queue.clone() });
            let listener = tokio::net::TcpListener::bind(listen)
                .await
                .with_context(|| format!("binding to {listen}"))?;
            info!(listen = %listen, "status server listening");

            let server_cancel = cancel.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        server_cancel.cancelled().await;
                    })
                    .await
            }))
        }
        None => None,
    };

    wait_for_shutdown().await;
    info!("shutdown signal received");

    cancel.cancel();

    // Each worker bounds its own drain by shutdown_timeout.
    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "worker task panicked");
        }
    }

    if let Err(e) = results.close().await {
        error!(error = %e, "failed to close result publisher");
    }
    if let Err(e) = media.close().await {
        error!(error = %e, "failed to close media publisher");
    }

    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = cleanup_handle.await;
        if let Some(handle) = server_handle {
            let _ = handle.await;
        }
    })
    .await;

    pool.close().await;
    info!("shutdown complete");

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler, waiting for Ctrl-C only");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
