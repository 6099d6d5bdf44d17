use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::queue::Queue;

/// Stalled-job recovery loop. Jobs left `active` by a crashed or killed
/// worker go back to `waiting` once their lock is older than `stalled_after`.
pub async fn stalled_jobs_loop(queue: Queue, stalled_after: Duration, cancel: CancellationToken) {
    info!(stalled_after = %humantime::format_duration(stalled_after), "stalled job recovery started");
    let check_every = (stalled_after / 2).max(Duration::from_secs(1));

    loop {
        match queue.requeue_stalled(stalled_after).await {
            Ok(0) => {}
            Ok(requeued) => warn!(requeued, "requeued stalled jobs"),
            Err(e) => error!(error = %e, "stalled job recovery failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("stalled job recovery shutting down");
                return;
            }
            _ = tokio::time::sleep(check_every) => {}
        }
    }
}
