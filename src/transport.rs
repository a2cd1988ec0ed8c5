use std::{str::FromStr, time::Duration, time::Instant};

use http::StatusCode;
use reqwest::{Body, Client, Url};
use tokio::{io::AsyncReadExt, sync::mpsc};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{
    config::{ConnectionSettings, Protocol},
    query::{
        ExecutionContext, ProgressInfo, QueryError, QueryExecutionError, QueryExecutionEvent,
        QueryStats, Settings,
    },
};

pub mod header_progress;
pub mod lines;
pub mod request;
pub mod tab_separated;

use lines::LineSource;
use request::{kill_settings, query_settings, quote, service_settings, validate_settings};
pub use request::QueryBody;

pub const USER_AGENT: &str = concat!("houseq/", env!("CARGO_PKG_VERSION"));
pub const TAB_SEPARATED: &str = "TabSeparated";

const SERVICE_TIMEOUT: Duration = Duration::from_secs(3);

/// A user query ready to send, in one of the two progress transports.
#[derive(Debug)]
pub enum PreparedQuery {
    Streaming(reqwest::Request),
    HeaderProgress {
        request: reqwest::Request,
        body: QueryBody,
    },
}

/// HTTP access to the server: user queries plus the small service
/// queries (version, progress, stats, kill) issued next to them.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    connection: ConnectionSettings,
}

impl HttpTransport {
    pub fn new(connection: ConnectionSettings) -> Result<Self, QueryError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| QueryError::Client(e.to_string()))?;

        Ok(Self { client, connection })
    }

    pub fn connection(&self) -> &ConnectionSettings {
        &self.connection
    }

    pub fn url(
        &self,
        format: &str,
        database: &str,
        settings: &Settings,
    ) -> Result<Url, QueryError> {
        validate_settings(settings)?;

        let base = format!(
            "{}://{}:{}/",
            self.connection.protocol, self.connection.host, self.connection.port
        );
        let mut url = Url::parse(&base).map_err(|e| QueryError::InvalidEndpoint(e.to_string()))?;

        // Format and database always win over same-named settings.
        let mut params = settings.clone();
        if self.connection.stacktrace {
            params.insert("stacktrace".to_string(), "1".to_string());
        }
        params.insert("default_format".to_string(), format.to_string());
        params.insert("database".to_string(), database.to_string());

        url.query_pairs_mut().extend_pairs(params.iter());

        Ok(url)
    }

    fn build_request(&self, url: Url, body: Body) -> Result<reqwest::Request, QueryError> {
        self.client
            .post(url)
            .basic_auth(&self.connection.user, self.connection.password.as_ref())
            .body(body)
            .build()
            .map_err(|e| QueryError::Client(e.to_string()))
    }

    /// Builds the outgoing request for a user query. Nothing is sent yet;
    /// every error here is reported before any task starts.
    pub fn prepare(
        &self,
        body: QueryBody,
        ctx: &ExecutionContext,
        progress_in_headers: bool,
    ) -> Result<PreparedQuery, QueryError> {
        let mut settings = query_settings(ctx, &body);

        if !progress_in_headers {
            let url = self.url(&ctx.format, &ctx.database, &settings)?;
            let body = match body {
                QueryBody::Text(text) => Body::from(text),
                QueryBody::Piped { .. } => Body::wrap_stream(ReaderStream::new(tokio::io::stdin())),
            };

            return Ok(PreparedQuery::Streaming(self.build_request(url, body)?));
        }

        if self.connection.protocol != Protocol::Http {
            return Err(QueryError::UnsupportedTransport(
                "progress in headers needs a plain http connection".to_string(),
            ));
        }

        settings.insert(
            request::SEND_PROGRESS_IN_HTTP_HEADERS.to_string(),
            "1".to_string(),
        );
        let url = self.url(&ctx.format, &ctx.database, &settings)?;
        let request = self.build_request(url, Body::from(Vec::new()))?;

        Ok(PreparedQuery::HeaderProgress { request, body })
    }

    /// Sends a prepared query and returns its status and body lines.
    pub async fn open(
        &self,
        prepared: PreparedQuery,
        events: &mpsc::Sender<QueryExecutionEvent>,
        started: Instant,
    ) -> Result<(StatusCode, Box<dyn LineSource>), QueryExecutionError> {
        match prepared {
            PreparedQuery::Streaming(request) => {
                let response = self.client.execute(request).await?;
                Ok((response.status(), lines::from_response(response)))
            }
            PreparedQuery::HeaderProgress { request, body } => {
                let body = match body {
                    QueryBody::Text(text) => text.into_bytes(),
                    QueryBody::Piped { .. } => {
                        let mut buffer = Vec::new();
                        tokio::io::stdin()
                            .read_to_end(&mut buffer)
                            .await
                            .map_err(|e| QueryExecutionError::ReadError(e.to_string()))?;
                        buffer
                    }
                };

                header_progress::open(request, &body, events, started).await
            }
        }
    }

    /// Runs a short TabSeparated query and returns its rows.
    pub async fn service_query(
        &self,
        query: &str,
        settings: Settings,
    ) -> Result<Vec<Vec<String>>, QueryExecutionError> {
        let url = self
            .url(TAB_SEPARATED, &self.connection.database, &settings)
            .map_err(|e| QueryExecutionError::ClientError(e.to_string()))?;
        let mut request = self
            .build_request(url, Body::from(query.to_string()))
            .map_err(|e| QueryExecutionError::ClientError(e.to_string()))?;
        *request.timeout_mut() = Some(SERVICE_TIMEOUT);

        let response = self.client.execute(request).await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(QueryExecutionError::ServerError {
                status,
                message: text.trim().to_string(),
            });
        }

        Ok(tab_separated::parse(&text))
    }

    pub async fn server_version(&self) -> Result<String, QueryExecutionError> {
        let rows = self.service_query("SELECT version()", service_settings()).await?;

        rows.into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .ok_or_else(|| QueryExecutionError::MalformedResponse("empty version".to_string()))
    }

    /// Current progress of a running query, `None` once the server no
    /// longer lists it.
    pub async fn fetch_progress(
        &self,
        query_id: &str,
    ) -> Result<Option<ProgressInfo>, QueryExecutionError> {
        let query = format!(
            "SELECT elapsed, read_rows, read_bytes, total_rows_approx, \
             written_rows, written_bytes, memory_usage \
             FROM system.processes WHERE query_id = {}",
            quote(query_id)
        );
        let rows = self.service_query(&query, service_settings()).await?;

        let row = match rows.as_slice() {
            [] => return Ok(None),
            [row] if row.len() == 7 => row,
            _ => return Err(dimensions_error(&rows, 7)),
        };

        let elapsed: f64 = field(row, 0)?;
        let elapsed = Duration::try_from_secs_f64(elapsed)
            .map_err(|e| QueryExecutionError::MalformedResponse(e.to_string()))?;

        Ok(Some(ProgressInfo {
            elapsed,
            read_rows: field(row, 1)?,
            read_bytes: field(row, 2)?,
            total_rows_approx: field(row, 3)?,
            written_rows: field(row, 4)?,
            written_bytes: field(row, 5)?,
            memory_usage: field(row, 6)?,
        }))
    }

    /// Final statistics from the query log; `None` until the server has
    /// flushed the entry.
    pub async fn fetch_query_stats(
        &self,
        query_id: &str,
    ) -> Result<Option<QueryStats>, QueryExecutionError> {
        let query = format!(
            "SELECT query_duration_ms, read_rows, read_bytes, written_rows, written_bytes, \
             result_rows, result_bytes, memory_usage, exception, stack_trace \
             FROM system.query_log WHERE query_id = {} AND type != 'QueryStart' \
             ORDER BY event_time DESC LIMIT 1",
            quote(query_id)
        );
        let rows = self.service_query(&query, service_settings()).await?;

        let row = match rows.as_slice() {
            [] => return Ok(None),
            [row] if row.len() == 10 => row,
            _ => return Err(dimensions_error(&rows, 10)),
        };

        Ok(Some(QueryStats {
            duration: Duration::from_millis(field(row, 0)?),
            read_rows: field(row, 1)?,
            read_bytes: field(row, 2)?,
            written_rows: field(row, 3)?,
            written_bytes: field(row, 4)?,
            result_rows: Some(field(row, 5)?),
            result_bytes: field(row, 6)?,
            memory_usage: field(row, 7)?,
            exception: Some(row[8].clone()).filter(|s| !s.is_empty()),
            stack_trace: Some(row[9].clone()).filter(|s| !s.is_empty()),
        }))
    }

    /// Asks the server to abort whatever runs under `query_id` by
    /// replacing it with a trivial query under the same id.
    pub async fn kill_query(&self, query_id: &str) -> Result<(), QueryExecutionError> {
        debug!("Killing query {}", query_id);

        let notice = format!("query_id {} killed by replace", query_id);
        let query = format!("SELECT {}", quote(&notice));
        self.service_query(&query, kill_settings(query_id)).await?;

        Ok(())
    }
}

fn field<T: FromStr>(row: &[String], index: usize) -> Result<T, QueryExecutionError> {
    row[index].trim().parse().map_err(|_| {
        QueryExecutionError::MalformedResponse(format!(
            "column {} is not a number: {:?}",
            index, row[index]
        ))
    })
}

fn dimensions_error(rows: &[Vec<String>], columns: usize) -> QueryExecutionError {
    QueryExecutionError::MalformedResponse(format!(
        "expected one row of {} columns, got {} row(s) of {} column(s)",
        columns,
        rows.len(),
        rows.first().map(Vec::len).unwrap_or(0)
    ))
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn transport(protocol: Protocol) -> HttpTransport {
        HttpTransport::new(ConnectionSettings {
            protocol,
            host: "localhost".to_string(),
            port: 8123,
            user: "default".to_string(),
            password: Some("secret".to_string()),
            database: "default".to_string(),
            stacktrace: true,
        })
        .unwrap()
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new(
            "session-1",
            "analytics",
            "JSON",
            Settings::from([("max_threads".to_string(), "2".to_string())]),
            CancellationToken::new(),
        )
    }

    fn params(url: &Url) -> Settings {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn url_carries_format_database_and_settings() {
        let url = transport(Protocol::Http)
            .url(
                "CSV",
                "logs",
                &Settings::from([("max_threads".to_string(), "8".to_string())]),
            )
            .unwrap();

        let params = params(&url);
        assert_eq!(url.path(), "/");
        assert_eq!(params["default_format"], "CSV");
        assert_eq!(params["database"], "logs");
        assert_eq!(params["stacktrace"], "1");
        assert_eq!(params["max_threads"], "8");
    }

    #[test]
    fn settings_cannot_replace_format_or_database() {
        let settings = Settings::from([
            ("default_format".to_string(), "JSON".to_string()),
            ("database".to_string(), "other".to_string()),
        ]);

        let url = transport(Protocol::Http).url("TSV", "logs", &settings).unwrap();

        let params = params(&url);
        assert_eq!(params["default_format"], "TSV");
        assert_eq!(params["database"], "logs");
    }

    #[test]
    fn invalid_setting_is_reported_synchronously() {
        let mut ctx = context();
        ctx.settings.insert("bad key".to_string(), "1".to_string());

        let result = transport(Protocol::Http).prepare(
            QueryBody::Text("SELECT 1".to_string()),
            &ctx,
            false,
        );

        assert!(matches!(result, Err(QueryError::InvalidSetting(_))));
    }

    #[test]
    fn prepared_query_has_auth_and_required_settings() {
        let ctx = context();

        let prepared = transport(Protocol::Http)
            .prepare(QueryBody::Text("SELECT 1".to_string()), &ctx, false)
            .unwrap();

        let PreparedQuery::Streaming(request) = prepared else {
            panic!("expected a streaming request");
        };
        let params = params(request.url());
        assert_eq!(params["query_id"], ctx.query_id);
        assert_eq!(params["session_id"], "session-1");
        assert_eq!(params["log_queries"], "1");
        assert_eq!(params["database"], "analytics");
        assert_eq!(params["default_format"], "JSON");
        assert!(request.headers().contains_key(http::header::AUTHORIZATION));
        assert_eq!(
            request.body().and_then(|b| b.as_bytes()),
            Some(&b"SELECT 1"[..])
        );
    }

    #[test]
    fn header_progress_asks_for_progress_headers() {
        let prepared = transport(Protocol::Http)
            .prepare(QueryBody::Text("SELECT 1".to_string()), &context(), true)
            .unwrap();

        let PreparedQuery::HeaderProgress { request, body } = prepared else {
            panic!("expected a header progress request");
        };
        assert_eq!(params(request.url())["send_progress_in_http_headers"], "1");
        assert_eq!(body, QueryBody::Text("SELECT 1".to_string()));
    }

    #[test]
    fn header_progress_refuses_https() {
        let result = transport(Protocol::Https).prepare(
            QueryBody::Text("SELECT 1".to_string()),
            &context(),
            true,
        );

        assert!(matches!(result, Err(QueryError::UnsupportedTransport(_))));
    }
}
