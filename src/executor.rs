use std::{
    io,
    sync::Arc,
    time::Duration,
};

use http::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    config::ProgressMode,
    output::Output,
    progress::ProgressRenderer,
    query::{
        ExecutionContext, ProgressInfo, QueryError, QueryExecutionError, QueryExecutionEvent,
        QueryStats,
    },
    transport::{HttpTransport, QueryBody},
};

mod poller;
mod request_task;

use request_task::RequestTask;

pub const EVENT_QUEUE_DEPTH: usize = 2048;
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(125);

/// How an execution ended, as seen by the consumer.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Finished {
        status: Option<StatusCode>,
        stats: QueryStats,
    },
    Failed {
        status: Option<StatusCode>,
        error: QueryExecutionError,
    },
    Cancelled {
        killed: bool,
    },
}

impl ExecutionOutcome {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ExecutionOutcome::Finished { status, .. } | ExecutionOutcome::Failed { status, .. } => {
                *status
            }
            ExecutionOutcome::Cancelled { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ExecutionOutcome::Finished { status: Some(status), .. } if status.is_success()
        )
    }
}

/// Starts user queries against one server.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    transport: Arc<HttpTransport>,
    progress: ProgressMode,
}

impl QueryExecutor {
    pub fn new(transport: Arc<HttpTransport>, progress: ProgressMode) -> Self {
        QueryExecutor {
            transport,
            progress,
        }
    }

    pub fn transport(&self) -> &Arc<HttpTransport> {
        &self.transport
    }

    pub fn progress_mode(&self) -> ProgressMode {
        self.progress
    }

    /// Spawns the request task (and the poller in poll mode) and hands
    /// back the receiving end of their event stream.
    ///
    /// Request construction errors are returned here, before anything
    /// is spawned.
    pub fn start(
        &self,
        body: QueryBody,
        ctx: &ExecutionContext,
    ) -> Result<QueryExecution, QueryError> {
        let prepared =
            self.transport
                .prepare(body, ctx, self.progress == ProgressMode::Headers)?;

        debug!(
            "Starting query {} (format {}, progress {})",
            ctx.query_id, ctx.format, self.progress
        );

        let (events, receiver) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let finished = CancellationToken::new();

        let poller = (self.progress == ProgressMode::Poll).then(|| {
            tokio::spawn(poller::poll_progress(
                self.transport.clone(),
                ctx.query_id.clone(),
                events.clone(),
                finished.clone(),
            ))
        });

        let task = RequestTask {
            transport: self.transport.clone(),
            format: ctx.format.clone(),
            events,
            cancel: ctx.cancel.clone(),
            finished: finished.clone(),
            poller,
        };
        tokio::spawn(task.run(prepared));

        Ok(QueryExecution {
            query_id: ctx.query_id.clone(),
            events: receiver,
            cancel: ctx.cancel.clone(),
            finished,
            transport: self.transport.clone(),
        })
    }
}

/// A running query. Dropping it stops the poller.
pub struct QueryExecution {
    query_id: String,
    events: mpsc::Receiver<QueryExecutionEvent>,
    cancel: CancellationToken,
    finished: CancellationToken,
    transport: Arc<HttpTransport>,
}

impl QueryExecution {
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub async fn next_event(&mut self) -> Option<QueryExecutionEvent> {
        self.events.recv().await
    }

    /// Consumes events until the terminal one, writing data to `output`
    /// and painting progress in between. A cancellation stops consuming
    /// immediately and asks the server to kill the query.
    pub async fn drive(
        mut self,
        output: &mut Output,
        progress: &mut ProgressRenderer,
    ) -> ExecutionOutcome {
        progress.reset();
        let mut status = None;
        let mut last_progress: Option<ProgressInfo> = None;

        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => return self.abort(output, progress).await,
                event = self.events.recv() => event,
            };

            match event {
                Some(QueryExecutionEvent::StatusCode(code)) => status = Some(code),
                Some(QueryExecutionEvent::Progress(info)) => {
                    paint(progress, output, &info);
                    last_progress = Some(info);
                }
                Some(QueryExecutionEvent::Data(line)) => {
                    clear(progress, output);

                    if let Err(e) = output.data().write_all(&line) {
                        if e.kind() == io::ErrorKind::BrokenPipe {
                            debug!("Output closed, cancelling query {}", self.query_id);
                            self.cancel.cancel();
                            return self.abort(output, progress).await;
                        }
                        warn!("Failed to write query output: {}", e);
                    }

                    // Repaint once the burst of data has been written.
                    if let Some(info) = &last_progress {
                        if progress.is_enabled() && self.events.is_empty() {
                            let _ = output.data().flush();
                            paint(progress, output, info);
                        }
                    }
                }
                Some(QueryExecutionEvent::Done(stats)) => {
                    self.finished.cancel();
                    clear(progress, output);
                    if let Err(e) = output.data().flush() {
                        warn!("Failed to flush query output: {}", e);
                    }
                    return ExecutionOutcome::Finished { status, stats };
                }
                Some(QueryExecutionEvent::Error(error)) => {
                    self.finished.cancel();
                    clear(progress, output);
                    return ExecutionOutcome::Failed { status, error };
                }
                None => {
                    clear(progress, output);
                    return ExecutionOutcome::Failed {
                        status,
                        error: QueryExecutionError::Disconnected,
                    };
                }
            }
        }
    }

    async fn abort(
        &mut self,
        output: &mut Output,
        progress: &mut ProgressRenderer,
    ) -> ExecutionOutcome {
        self.finished.cancel();
        clear(progress, output);

        output.service_msg(&format!("\nKilling query (id: {})... ", self.query_id));
        let killed = match self.transport.kill_query(&self.query_id).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Failed to kill query {}: {}", self.query_id, e);
                false
            }
        };
        output.service_msg(if killed { "killed!\n\n" } else { "failure!\n\n" });

        ExecutionOutcome::Cancelled { killed }
    }
}

impl Drop for QueryExecution {
    fn drop(&mut self) {
        self.finished.cancel();
    }
}

fn paint(progress: &mut ProgressRenderer, output: &mut Output, info: &ProgressInfo) {
    if let Err(e) = progress.render(
        output.service(),
        info.read_rows,
        info.read_bytes,
        info.total_rows_approx,
        info.elapsed,
    ) {
        debug!("Failed to paint progress: {}", e);
    }
}

fn clear(progress: &mut ProgressRenderer, output: &mut Output) {
    if let Err(e) = progress.clear(output.service()) {
        debug!("Failed to clear progress: {}", e);
    }
}
