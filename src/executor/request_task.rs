use std::{sync::Arc, time::Instant};

use http::StatusCode;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    counters::CounterFactory,
    query::{QueryExecutionError, QueryExecutionEvent, QueryStats},
    transport::{lines::LineSource, HttpTransport, PreparedQuery},
};

/// Upper bound on how much of an error body is kept as the message.
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Issues the query, streams the body as `Data` events and finishes with
/// exactly one `Done` or `Error`, unless cancelled first.
pub(super) struct RequestTask {
    pub transport: Arc<HttpTransport>,
    pub format: String,
    pub events: mpsc::Sender<QueryExecutionEvent>,
    pub cancel: CancellationToken,
    pub finished: CancellationToken,
    pub poller: Option<JoinHandle<()>>,
}

impl RequestTask {
    pub async fn run(mut self, prepared: PreparedQuery) {
        let started = Instant::now();

        let terminal = self.execute(prepared, started).await;

        // The poller must be gone before the terminal event is queued, so
        // no progress can trail it.
        self.finished.cancel();
        if let Some(poller) = self.poller.take() {
            let _ = poller.await;
        }

        if let Some(event) = terminal {
            let _ = self.events.send(event).await;
        }
    }

    async fn execute(
        &self,
        prepared: PreparedQuery,
        started: Instant,
    ) -> Option<QueryExecutionEvent> {
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            opened = self.transport.open(prepared, &self.events, started) => opened,
        };

        let (status, mut lines) = match opened {
            Ok(opened) => opened,
            Err(QueryExecutionError::Disconnected) => return None,
            Err(e) => return Some(QueryExecutionEvent::Error(e)),
        };

        if !self.emit(QueryExecutionEvent::StatusCode(status)).await {
            return None;
        }

        if !status.is_success() {
            return self.read_error(status, lines.as_mut()).await;
        }

        self.stream(lines.as_mut(), started).await
    }

    async fn stream(
        &self,
        lines: &mut dyn LineSource,
        started: Instant,
    ) -> Option<QueryExecutionEvent> {
        let mut counter = CounterFactory::create_counter(&self.format);
        let mut rows = counter.count();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                next = lines.next_line() => next,
            };

            match next {
                Ok(Some(line)) => {
                    rows = counter.consume(&String::from_utf8_lossy(&line));
                    if !self.emit(QueryExecutionEvent::Data(line)).await {
                        return None;
                    }
                }
                Ok(None) => {
                    return Some(QueryExecutionEvent::Done(QueryStats::local(
                        started.elapsed(),
                        rows,
                    )))
                }
                Err(e) => {
                    return Some(QueryExecutionEvent::Error(QueryExecutionError::ReadError(
                        e.to_string(),
                    )))
                }
            }
        }
    }

    /// Collects the body of a failed response as the error message.
    async fn read_error(
        &self,
        status: StatusCode,
        lines: &mut dyn LineSource,
    ) -> Option<QueryExecutionEvent> {
        let mut body = Vec::new();

        while body.len() < MAX_ERROR_BODY {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                next = lines.next_line() => next,
            };

            match next {
                Ok(Some(line)) => body.extend_from_slice(&line),
                Ok(None) | Err(_) => break,
            }
        }

        Some(QueryExecutionEvent::Error(QueryExecutionError::ServerError {
            status,
            message: String::from_utf8_lossy(&body).trim().to_string(),
        }))
    }

    async fn emit(&self, event: QueryExecutionEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}
