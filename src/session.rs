use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cancel::InterruptGuard,
    config::ProgressMode,
    executor::{ExecutionOutcome, QueryExecutor},
    formatters::{Formatter, QuantityFormatter, SizeFormatter},
    output::Output,
    parsers::{SessionChange, Statement},
    progress::ProgressRenderer,
    query::{new_id, ExecutionContext, QueryError, QueryStats, Settings},
    transport::{QueryBody, TAB_SEPARATED},
};

pub const VERTICAL: &str = "Vertical";

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub default_format: String,
    pub interactive: bool,
    pub progress: bool,
    pub time: bool,
    pub stats: bool,
}

/// One client session: the server-side session id, the current database
/// and setting overrides, and the output every execution writes to.
/// Executions run one at a time.
pub struct Session {
    id: String,
    executor: QueryExecutor,
    database: String,
    settings: Settings,
    output: Output,
    options: SessionOptions,
}

impl Session {
    pub fn new(
        executor: QueryExecutor,
        database: &str,
        settings: Settings,
        output: Output,
        options: SessionOptions,
    ) -> Self {
        Session {
            id: new_id(),
            executor,
            database: database.to_string(),
            settings,
            output,
            options,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn default_format(&self) -> &str {
        &self.options.default_format
    }

    pub fn output(&mut self) -> &mut Output {
        &mut self.output
    }

    /// Runs a statement entered in the shell, then applies `USE` and `SET`
    /// to the session when the server accepted it.
    pub async fn run_statement(
        &mut self,
        statement: Statement,
        vertical: bool,
    ) -> Result<ExecutionOutcome, QueryError> {
        let format = match (statement.format, vertical, &statement.outfile) {
            (Some(format), _, _) => format,
            (None, true, _) => VERTICAL.to_string(),
            (None, false, Some(_)) => TAB_SEPARATED.to_string(),
            (None, false, None) => self.options.default_format.clone(),
        };

        let outcome = self
            .execute(
                QueryBody::Text(statement.query.clone()),
                &format,
                statement.outfile,
            )
            .await?;

        if outcome.is_success() {
            if let Some(change) = SessionChange::detect(&statement.query) {
                self.apply(change);
            }
        }

        Ok(outcome)
    }

    /// Runs one execution to completion and reports how it ended.
    pub async fn execute(
        &mut self,
        body: QueryBody,
        format: &str,
        outfile: Option<PathBuf>,
    ) -> Result<ExecutionOutcome, QueryError> {
        let cancel = CancellationToken::new();
        let ctx = ExecutionContext::new(
            &self.id,
            &self.database,
            format,
            self.settings.clone(),
            cancel.clone(),
        );

        let guard = match InterruptGuard::install(cancel) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("Ctrl-C will not cancel this query: {}", e);
                None
            }
        };

        let execution = self.executor.start(body, &ctx)?;

        if let Some(path) = outfile {
            self.output.set_outfile(path);
        }
        self.output.setup();

        let mut renderer = ProgressRenderer::new(
            self.options.progress
                && self.executor.progress_mode() != ProgressMode::Off
                && !self.output.is_pager(),
        );

        let outcome = execution.drive(&mut self.output, &mut renderer).await;
        drop(guard);

        if let Err(e) = self.output.release() {
            warn!("Failed to release output: {}", e);
        }

        self.report(&ctx.query_id, &outcome).await;

        Ok(outcome)
    }

    fn apply(&mut self, change: SessionChange) {
        match change {
            SessionChange::Use(database) => {
                self.output
                    .service_msg(&format!("Database changed to {}\n", database));
                self.database = database;
            }
            SessionChange::Set(settings) => {
                debug!("Session settings changed: {:?}", settings);
                self.settings.extend(settings);
            }
        }
    }

    async fn report(&mut self, query_id: &str, outcome: &ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Finished { stats, .. } => {
                if self.options.interactive || self.options.progress || self.options.time {
                    self.output.service_msg(&summary(stats, self.options.interactive));
                }
                if self.options.stats {
                    self.print_server_stats(query_id).await;
                }
            }
            ExecutionOutcome::Failed { error, .. } => {
                let msg = if self.options.interactive {
                    format!("\n{}\n\n", error)
                } else {
                    format!("{}\n", error)
                };
                self.output.service_msg(&msg);
            }
            ExecutionOutcome::Cancelled { .. } => {}
        }
    }

    async fn print_server_stats(&mut self, query_id: &str) {
        match self.executor.transport().fetch_query_stats(query_id).await {
            Ok(Some(stats)) => self.output.service_msg(&server_stats(&stats)),
            Ok(None) => self
                .output
                .service_msg("Query statistics are not in the query log yet.\n"),
            Err(e) => warn!("Failed to fetch query statistics: {}", e),
        }
    }
}

fn summary(stats: &QueryStats, interactive: bool) -> String {
    let seconds = stats.duration.as_secs_f64();
    let line = match stats.result_rows {
        Some(rows) => format!("{} row(s) in {:.3} sec.", rows, seconds),
        None => format!("Ok. Elapsed: {:.3} sec.", seconds),
    };

    if interactive {
        format!("\n{}\n\n", line)
    } else {
        format!("{}\n", line)
    }
}

fn server_stats(stats: &QueryStats) -> String {
    let quantity = QuantityFormatter;
    let size = SizeFormatter;

    let mut msg = format!(
        "Read {} rows, {}. Written {} rows, {}. Result {} rows, {}. \
         Peak memory {}. Server time {:.3} sec.\n",
        quantity.format(stats.read_rows as f64),
        size.format(stats.read_bytes as f64),
        quantity.format(stats.written_rows as f64),
        size.format(stats.written_bytes as f64),
        quantity.format(stats.result_rows.unwrap_or_default() as f64),
        size.format(stats.result_bytes as f64),
        size.format(stats.memory_usage as f64),
        stats.duration.as_secs_f64(),
    );

    if let Some(exception) = &stats.exception {
        msg.push_str(&format!("Exception: {}\n", exception));
    }
    if let Some(stack_trace) = &stats.stack_trace {
        msg.push_str(&format!("Stack trace:\n{}\n", stack_trace));
    }

    msg
}
