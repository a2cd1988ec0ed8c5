use std::sync::Arc;

use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{query::QueryExecutionEvent, transport::HttpTransport};

use super::PROGRESS_INTERVAL;

/// Polls the server's process list for `query_id` until `finished` fires.
/// Failed or malformed polls are skipped; the next tick tries again.
pub(super) async fn poll_progress(
    transport: Arc<HttpTransport>,
    query_id: String,
    events: mpsc::Sender<QueryExecutionEvent>,
    finished: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = finished.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let polled = tokio::select! {
            biased;
            _ = finished.cancelled() => break,
            polled = transport.fetch_progress(&query_id) => polled,
        };

        match polled {
            Ok(Some(progress)) => {
                if events.send(QueryExecutionEvent::Progress(progress)).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Progress poll for {} failed: {}", query_id, e),
        }
    }

    debug!("Progress polling for {} stopped", query_id);
}
