use std::{collections::BTreeMap, fmt, time::Duration};

use http::StatusCode;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Extra execution settings sent as URL parameters. Keys are unique and
/// kept sorted so requests are built deterministically.
pub type Settings = BTreeMap<String, String>;

#[derive(Debug)]
pub enum QueryError {
    InvalidSetting(String),
    InvalidEndpoint(String),
    UnsupportedTransport(String),
    Client(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidSetting(key) => write!(f, "Invalid setting name: {:?}", key),
            QueryError::InvalidEndpoint(msg) => write!(f, "Invalid endpoint: {}", msg),
            QueryError::UnsupportedTransport(msg) => write!(f, "Unsupported transport: {}", msg),
            QueryError::Client(msg) => write!(f, "Client error: {}", msg),
        }
    }
}

impl std::error::Error for QueryError {}

#[derive(Debug)]
pub enum QueryExecutionError {
    QueryTimeout,
    ClientError(String),
    ServerError { status: StatusCode, message: String },
    ReadError(String),
    MalformedResponse(String),
    Disconnected,
}

impl fmt::Display for QueryExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryExecutionError::QueryTimeout => write!(f, "Request timed out"),
            QueryExecutionError::ClientError(msg) => write!(f, "Client error: {}", msg),
            QueryExecutionError::ServerError { status, message } => {
                write!(f, "Server returned {}: {}", status, message)
            }
            QueryExecutionError::ReadError(msg) => write!(f, "Failed to read response: {}", msg),
            QueryExecutionError::MalformedResponse(msg) => write!(f, "Malformed response: {}", msg),
            QueryExecutionError::Disconnected => {
                write!(f, "Query task stopped without reporting a result")
            }
        }
    }
}

impl std::error::Error for QueryExecutionError {}

impl From<reqwest::Error> for QueryExecutionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            QueryExecutionError::QueryTimeout
        } else {
            QueryExecutionError::ClientError(e.to_string())
        }
    }
}

/// Server-side throughput snapshot of a running query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressInfo {
    pub elapsed: Duration,
    pub read_rows: u64,
    pub read_bytes: u64,
    pub total_rows_approx: u64,
    pub written_rows: u64,
    pub written_bytes: u64,
    pub memory_usage: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStats {
    pub duration: Duration,
    pub read_rows: u64,
    pub read_bytes: u64,
    pub written_rows: u64,
    pub written_bytes: u64,
    /// `None` when the output format does not allow counting rows.
    pub result_rows: Option<u64>,
    pub result_bytes: u64,
    pub memory_usage: u64,
    pub exception: Option<String>,
    pub stack_trace: Option<String>,
}

impl QueryStats {
    /// Stats known to the client alone once the body has been read.
    pub fn local(duration: Duration, result_rows: Option<u64>) -> Self {
        Self {
            duration,
            result_rows,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub enum QueryExecutionEvent {
    StatusCode(StatusCode),
    /// One line of the response body, trailing newline included.
    Data(Vec<u8>),
    Progress(ProgressInfo),
    Done(QueryStats),
    Error(QueryExecutionError),
}

impl QueryExecutionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryExecutionEvent::Done(_) | QueryExecutionEvent::Error(_)
        )
    }
}

/// Everything one execution needs, built before any task starts and
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub query_id: String,
    pub session_id: String,
    pub database: String,
    pub format: String,
    pub settings: Settings,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        session_id: &str,
        database: &str,
        format: &str,
        settings: Settings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            query_id: new_id(),
            session_id: session_id.to_string(),
            database: database.to_string(),
            format: format.to_string(),
            settings,
            cancel,
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
