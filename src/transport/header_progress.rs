use std::time::{Duration, Instant};

use http::{header, StatusCode};
use serde::{Deserialize, Deserializer};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::mpsc,
};
use tracing::debug;

use crate::query::{ProgressInfo, QueryExecutionError, QueryExecutionEvent};

use super::{
    lines::{BodyLines, ChunkedLines, LineSource},
    USER_AGENT,
};

pub const PROGRESS_HEADER: &str = "X-ClickHouse-Progress";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HeaderProgress {
    #[serde(deserialize_with = "counter")]
    read_rows: u64,
    #[serde(deserialize_with = "counter")]
    read_bytes: u64,
    #[serde(deserialize_with = "counter", alias = "total_rows_to_read")]
    total_rows: u64,
    #[serde(deserialize_with = "counter")]
    written_rows: u64,
    #[serde(deserialize_with = "counter")]
    written_bytes: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Counter {
    Number(u64),
    Text(String),
}

/// The server quotes its counters.
fn counter<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Counter::deserialize(deserializer)? {
        Counter::Number(n) => Ok(n),
        Counter::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Reads a progress snapshot out of one raw header line. Any other header,
/// or a payload that does not parse, yields `None`.
pub fn parse_progress_header(line: &str, elapsed: Duration) -> Option<ProgressInfo> {
    let (name, value) = line.split_once(':')?;

    if !name.trim().eq_ignore_ascii_case(PROGRESS_HEADER) {
        return None;
    }

    match serde_json::from_str::<HeaderProgress>(value.trim()) {
        Ok(progress) => Some(ProgressInfo {
            elapsed,
            read_rows: progress.read_rows,
            read_bytes: progress.read_bytes,
            total_rows_approx: progress.total_rows,
            written_rows: progress.written_rows,
            written_bytes: progress.written_bytes,
            memory_usage: 0,
        }),
        Err(e) => {
            debug!("Ignoring malformed progress header {:?}: {}", value.trim(), e);
            None
        }
    }
}

pub fn parse_status_line(line: &str) -> Result<StatusCode, QueryExecutionError> {
    let mut parts = line.split_whitespace();

    let code = match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code,
        _ => {
            return Err(QueryExecutionError::MalformedResponse(format!(
                "bad status line {:?}",
                line.trim()
            )))
        }
    };

    code.parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| {
            QueryExecutionError::MalformedResponse(format!("bad status code {:?}", code))
        })
}

/// Serialises a built request as HTTP/1.1 for a connection we drive by
/// hand.
pub fn encode_request(request: &reqwest::Request, body: &[u8]) -> Vec<u8> {
    let url = request.url();

    let target = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };
    let host = match url.port() {
        Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
        None => url.host_str().unwrap_or_default().to_string(),
    };

    let mut head = format!("{} {} HTTP/1.1\r\n", request.method(), target);
    head.push_str(&format!("{}: {}\r\n", header::HOST, host));

    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
    }

    if !request.headers().contains_key(header::USER_AGENT) {
        head.push_str(&format!("{}: {}\r\n", header::USER_AGENT, USER_AGENT));
    }
    head.push_str(&format!("{}: {}\r\n", header::CONTENT_LENGTH, body.len()));
    head.push_str(&format!("{}: close\r\n\r\n", header::CONNECTION));

    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// Sends the request over a fresh connection and reads the response
/// head, forwarding every progress header as a `Progress` event before
/// the status is known to the caller.
pub async fn open(
    request: reqwest::Request,
    body: &[u8],
    events: &mpsc::Sender<QueryExecutionEvent>,
    started: Instant,
) -> Result<(StatusCode, Box<dyn LineSource>), QueryExecutionError> {
    let url = request.url();
    let host = url
        .host_str()
        .ok_or_else(|| QueryExecutionError::ClientError("request has no host".to_string()))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(80);
    let encoded = encode_request(&request, body);

    let mut stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|e| QueryExecutionError::ClientError(e.to_string()))?;
    stream
        .write_all(&encoded)
        .await
        .map_err(|e| QueryExecutionError::ClientError(e.to_string()))?;

    let mut reader = BufReader::new(stream);

    let status = parse_status_line(&read_head_line(&mut reader).await?)?;

    let mut chunked = false;
    let mut content_length: Option<u64> = None;

    loop {
        let line = read_head_line(&mut reader).await?;
        let line = line.trim();

        if line.is_empty() {
            break;
        }

        if let Some(progress) = parse_progress_header(line, started.elapsed()) {
            events
                .send(QueryExecutionEvent::Progress(progress))
                .await
                .map_err(|_| QueryExecutionError::Disconnected)?;
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();

        if name.eq_ignore_ascii_case(header::TRANSFER_ENCODING.as_str()) {
            chunked = value.to_ascii_lowercase().contains("chunked");
        } else if name.eq_ignore_ascii_case(header::CONTENT_LENGTH.as_str()) {
            content_length = value.trim().parse().ok();
        }
    }

    let lines: Box<dyn LineSource> = match (chunked, content_length) {
        (true, _) => Box::new(ChunkedLines::new(reader)),
        (false, Some(length)) => Box::new(BodyLines::new(reader.take(length))),
        (false, None) => Box::new(BodyLines::new(reader)),
    };

    Ok((status, lines))
}

async fn read_head_line(
    reader: &mut BufReader<TcpStream>,
) -> Result<String, QueryExecutionError> {
    let mut line = String::new();

    let read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| QueryExecutionError::ReadError(e.to_string()))?;

    if read == 0 {
        return Err(QueryExecutionError::ReadError(
            "connection closed before the response head was complete".to_string(),
        ));
    }

    Ok(line)
}
