//! Response bodies.
//!
//! A [`Content`] is either an in-memory text payload or an open file that is
//! streamed to the peer in bounded chunks. Both variants are consumed by
//! [`Content::write_to`]; an open file handle is closed when the content is
//! written or dropped, whichever comes first.

use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::session::SessionError;

/// Content type reported for [`TextContent`].
pub const TEXT_PLAIN: &str = "text/plain";

/// Content type reported for [`FileContent`].
pub const OCTET_STREAM: &str = "application/octet-stream";

/// An in-memory text body.
#[derive(Debug, Clone)]
pub struct TextContent {
    payload: Bytes,
}

impl TextContent {
    /// Wraps a text payload.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: Bytes::from(payload.into()),
        }
    }

    /// Returns the payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// A file body, streamed from disk when the response is written.
#[derive(Debug)]
pub struct FileContent {
    file: File,
    len: u64,
}

impl FileContent {
    /// Opens `path` for reading and records its current size.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self { file, len })
    }
}

/// A response body.
#[derive(Debug)]
pub enum Content {
    Text(TextContent),
    File(FileContent),
}

impl Content {
    /// Creates a text body.
    pub fn text(payload: impl Into<String>) -> Self {
        Self::Text(TextContent::new(payload))
    }

    /// Opens a file body.
    pub async fn file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        FileContent::open(path).await.map(Self::File)
    }

    /// Returns the value written in the `Content-Type` header.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Text(_) => TEXT_PLAIN,
            Self::File(_) => OCTET_STREAM,
        }
    }

    /// Returns the number of body bytes, as written in `Content-Length`.
    pub fn len(&self) -> u64 {
        match self {
            Self::Text(text) => text.payload.len() as u64,
            Self::File(file) => file.len,
        }
    }

    /// Returns `true` if the body has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the body to `writer`, consuming the content.
    ///
    /// File bodies flush whatever the writer has buffered (the status line
    /// and headers) before copying, and never copy more than the length
    /// recorded when the file was opened.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Truncated`] when a file yields fewer bytes than
    /// its recorded length, or the classified I/O error otherwise.
    pub async fn write_to<W>(self, writer: &mut W) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self {
            Self::Text(text) => {
                writer.write_all(&text.payload).await?;
            }
            Self::File(FileContent { file, len }) => {
                writer.flush().await?;
                let mut limited = file.take(len);
                let copied = tokio::io::copy(&mut limited, writer).await?;
                if copied != len {
                    return Err(SessionError::Truncated {
                        expected: len,
                        actual: copied,
                    });
                }
            }
        }
        Ok(())
    }
}
