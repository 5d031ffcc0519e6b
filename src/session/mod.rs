//! Per-connection transport.
//!
//! A [`Session`] owns one accepted connection for its whole lifetime. It
//! exposes the two read shapes the request handling needs (CRLF/LF
//! terminated lines for the request head, exact byte counts for bodies)
//! plus [`Session::send`], which serializes a [`Response`] and streams its
//! body.
//!
//! Reads go through a [`BufReader`], so a line read costs one system call per
//! buffer refill rather than one per byte. Body copies reuse a single bounded
//! buffer allocated with the session.

use std::io;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::http::{PROTOCOL, Response};

/// Longest request or header line accepted, terminator included.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Size of the reusable buffer used to copy request bodies.
const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// How long [`Session::close`] keeps discarding unread input.
const LINGER_TIMEOUT: Duration = Duration::from_secs(1);

/// Most unread input [`Session::close`] will discard.
const LINGER_LIMIT: u64 = 64 * 1024;

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection reset by peer: {0}")]
    Reset(#[source] io::Error),

    #[error("transport error: {0}")]
    Io(#[source] io::Error),

    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to write body to its destination: {0}")]
    Sink(#[source] io::Error),

    #[error("body source yielded {actual} of {expected} bytes")]
    Truncated { expected: u64, actual: u64 },
}

impl SessionError {
    /// Returns `true` when the peer went away mid-exchange.
    pub fn is_reset(&self) -> bool {
        matches!(self, Self::Reset(_))
    }
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Self::Reset(err),
            _ => Self::Io(err),
        }
    }
}

/// One client connection.
///
/// Dropping a session releases the reader, the writer and, with the last of
/// the two halves, the socket. [`Session::close`] additionally flushes and
/// shuts down the write side first.
pub struct Session {
    reader: BufReader<BoxedRead>,
    writer: BufWriter<BoxedWrite>,
    line: Vec<u8>,
    chunk: BytesMut,
}

impl Session {
    /// Wraps any bidirectional byte stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        Self::from_halves(Box::new(read), Box::new(write))
    }

    /// Wraps an accepted TCP connection without the shared-half lock of [`Session::new`].
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self::from_halves(Box::new(read), Box::new(write))
    }

    fn from_halves(read: BoxedRead, write: BoxedWrite) -> Self {
        Self {
            reader: BufReader::new(read),
            writer: BufWriter::new(write),
            line: Vec::with_capacity(256),
            chunk: BytesMut::with_capacity(BODY_CHUNK_SIZE),
        }
    }

    /// Reads one line, without its `\n` or `\r\n` terminator.
    ///
    /// A final line cut short by end-of-stream is returned as-is. Returns
    /// `None` only when the stream is closed before any byte is read. Invalid
    /// UTF-8 is replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// [`SessionError::LineTooLong`] when no terminator shows up within
    /// [`MAX_LINE_LENGTH`] bytes; transport errors otherwise.
    pub async fn read_line(&mut self) -> Result<Option<String>, SessionError> {
        self.line.clear();
        let read = (&mut self.reader)
            .take(MAX_LINE_LENGTH as u64)
            .read_until(b'\n', &mut self.line)
            .await?;

        if read == 0 {
            return Ok(None);
        }

        if self.line.last() == Some(&b'\n') {
            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
        } else if read == MAX_LINE_LENGTH {
            return Err(SessionError::LineTooLong {
                max: MAX_LINE_LENGTH,
            });
        }

        Ok(Some(String::from_utf8_lossy(&self.line).into_owned()))
    }

    /// Copies up to `count` bytes from the connection into `sink`.
    ///
    /// Stops early when the peer closes the stream and returns the number of
    /// bytes actually copied; a short count means the body was incomplete.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Cancelled`]: `cancel` fired while waiting for data.
    /// - [`SessionError::Sink`]: writing into `sink` failed.
    /// - any classified transport error from the read side.
    pub async fn read_exact_into<W>(
        &mut self,
        sink: &mut W,
        count: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, SessionError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut total = 0u64;

        while total < count {
            self.chunk.clear();
            let want = (count - total).min(BODY_CHUNK_SIZE as u64);
            let mut limited = (&mut self.reader).take(want);

            let read = tokio::select! {
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                read = limited.read_buf(&mut self.chunk) => read?,
            };

            if read == 0 {
                break;
            }

            sink.write_all(&self.chunk)
                .await
                .map_err(SessionError::Sink)?;
            total += read as u64;
        }

        Ok(total)
    }

    /// Serializes `response` and writes it to the peer.
    ///
    /// `Content-Type` and `Content-Length` are written only for a non-empty
    /// body. Everything written is flushed before this returns.
    pub async fn send(&mut self, response: Response) -> Result<(), SessionError> {
        let mut head = BytesMut::with_capacity(128);
        head.put(
            format!(
                "{PROTOCOL} {} {}\r\n",
                response.status().as_u16(),
                response.reason()
            )
            .as_bytes(),
        );

        let content = response.into_content().filter(|c| !c.is_empty());
        if let Some(content) = &content {
            head.put(format!("Content-Type: {}\r\n", content.content_type()).as_bytes());
            head.put(format!("Content-Length: {}\r\n", content.len()).as_bytes());
        }
        head.put(&b"\r\n"[..]);

        self.writer.write_all(&head).await?;
        if let Some(content) = content {
            content.write_to(&mut self.writer).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Flushes pending output and shuts down the write side, then drops the connection.
    ///
    /// Input the request handling left unread (headers of an unrouted
    /// request, an ignored body) is discarded for up to [`LINGER_TIMEOUT`]
    /// first, so the peer sees the response followed by an orderly close
    /// rather than a reset.
    pub async fn close(mut self) -> Result<(), SessionError> {
        self.writer.shutdown().await?;

        let mut unread = (&mut self.reader).take(LINGER_LIMIT);
        let mut discard = tokio::io::sink();
        let drain = tokio::io::copy(&mut unread, &mut discard);
        match tokio::time::timeout(LINGER_TIMEOUT, drain).await {
            Ok(Ok(discarded)) => trace!(discarded, "drained unread input"),
            Ok(Err(e)) => trace!(error = %e, "error while draining unread input"),
            Err(_) => trace!("peer kept the connection open past the linger timeout"),
        }
        Ok(())
    }
}
