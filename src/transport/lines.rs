use std::{io, pin::Pin};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio_util::io::StreamReader;

/// A response body read one line at a time.
#[async_trait]
pub trait LineSource: Send {
    /// Next line including its `\n`. A final line without one is returned
    /// as is; `None` marks a clean end of body.
    async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Lines of an already de-framed body.
pub struct BodyLines<R> {
    reader: R,
}

impl<R> BodyLines<R> {
    pub fn new(reader: R) -> Self {
        BodyLines { reader }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LineSource for BodyLines<R> {
    async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();

        if self.reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }

        Ok(Some(line))
    }
}

/// Largest chunk accepted from the server.
const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

pub fn from_response(response: reqwest::Response) -> Box<dyn LineSource> {
    let stream: ByteStream = Box::pin(
        response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
    );

    Box::new(BodyLines::new(StreamReader::new(stream)))
}

/// Lines of a `Transfer-Encoding: chunked` body read straight off the
/// socket.
pub struct ChunkedLines<R> {
    reader: R,
    pending: Vec<u8>,
    searched: usize,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin + Send> ChunkedLines<R> {
    pub fn new(reader: R) -> Self {
        ChunkedLines {
            reader,
            pending: Vec::new(),
            searched: 0,
            finished: false,
        }
    }

    async fn read_chunk(&mut self) -> io::Result<()> {
        let mut size_line = String::new();

        if self.reader.read_line(&mut size_line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside a chunked body",
            ));
        }

        let size = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size, 16)
            .ok()
            .filter(|size| *size <= MAX_CHUNK_SIZE)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bad chunk size {:?}", size),
                )
            })?;

        if size == 0 {
            loop {
                let mut trailer = String::new();
                let read = self.reader.read_line(&mut trailer).await?;
                if read == 0 || trailer.trim().is_empty() {
                    break;
                }
            }
            self.finished = true;
            return Ok(());
        }

        let start = self.pending.len();
        self.pending.resize(start + size, 0);
        self.reader.read_exact(&mut self.pending[start..]).await?;

        let mut crlf = [0u8; 2];
        self.reader.read_exact(&mut crlf).await?;

        Ok(())
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LineSource for ChunkedLines<R> {
    async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(offset) = self.pending[self.searched..]
                .iter()
                .position(|b| *b == b'\n')
            {
                let rest = self.pending.split_off(self.searched + offset + 1);
                self.searched = 0;
                return Ok(Some(std::mem::replace(&mut self.pending, rest)));
            }
            self.searched = self.pending.len();

            if self.finished {
                self.searched = 0;
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.pending)));
            }

            self.read_chunk().await?;
        }
    }
}
