#![allow(dead_code)]

use std::{
    collections::HashMap,
    io::{self, Write},
    sync::{Arc, Mutex},
    time::Duration,
};

use houseq::{
    config::{ConnectionSettings, Protocol},
    output::Output,
    transport::HttpTransport,
};
use reqwest::Url;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub target: String,
    pub params: HashMap<String, String>,
    pub body: String,
}

impl Recorded {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body pieces, each sent as its own chunk after its delay.
    pub chunks: Vec<(Duration, String)>,
    /// Raw bytes written instead of the closing chunk, leaving the body
    /// unfinished.
    pub cut_off: Option<String>,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Reply {
            status: 200,
            headers: Vec::new(),
            chunks: vec![(Duration::ZERO, body.to_string())],
            cut_off: None,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Reply {
            status,
            ..Reply::ok(body)
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn then(mut self, delay: Duration, body: &str) -> Self {
        self.chunks.push((delay, body.to_string()));
        self
    }

    pub fn cut_off(mut self, raw: &str) -> Self {
        self.cut_off = Some(raw.to_string());
        self
    }
}

type Handler = Arc<dyn Fn(&Recorded) -> Reply + Send + Sync>;

/// An HTTP/1.1 server on a random local port that answers every request
/// through `handler` and remembers what it was asked.
pub struct FakeServer {
    pub port: u16,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeServer {
    pub async fn start(handler: impl Fn(&Recorded) -> Reply + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, handler, recorded).await;
                });
            }
        });

        FakeServer { port, requests }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_containing(&self, needle: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.body.contains(needle))
            .collect()
    }

    pub fn connection(&self) -> ConnectionSettings {
        ConnectionSettings {
            protocol: Protocol::Http,
            host: "127.0.0.1".to_string(),
            port: self.port,
            user: "default".to_string(),
            password: None,
            database: "default".to_string(),
            stacktrace: false,
        }
    }

    pub fn transport(&self) -> Arc<HttpTransport> {
        Arc::new(HttpTransport::new(self.connection()).unwrap())
    }
}

async fn serve(
    stream: TcpStream,
    handler: Handler,
    requests: Arc<Mutex<Vec<Recorded>>>,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let target = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 || line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    let url = Url::parse(&format!("http://fake{}", target)).unwrap();
    let recorded = Recorded {
        target,
        params: url.query_pairs().into_owned().collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    requests.lock().unwrap().push(recorded.clone());

    let reply = handler(&recorded);
    let mut stream = reader.into_inner();

    let mut head = format!("HTTP/1.1 {} Fake\r\n", reply.status);
    for (name, value) in &reply.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n");
    stream.write_all(head.as_bytes()).await?;
    stream.flush().await?;

    for (delay, chunk) in reply.chunks {
        tokio::time::sleep(delay).await;
        if chunk.is_empty() {
            continue;
        }
        stream
            .write_all(format!("{:x}\r\n{}\r\n", chunk.len(), chunk).as_bytes())
            .await?;
        stream.flush().await?;
    }

    match reply.cut_off {
        Some(raw) => stream.write_all(raw.as_bytes()).await?,
        None => stream.write_all(b"0\r\n\r\n").await?,
    }
    stream.flush().await?;
    stream.shutdown().await
}

/// A writer whose contents the test can read back.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

pub fn captured_output() -> (Output, Captured, Captured) {
    let data = Captured::default();
    let service = Captured::default();
    let output = Output::with_writers(Box::new(data.clone()), Box::new(service.clone()));
    (output, data, service)
}
