//! Byte-stream transport consumed by the client engine.
//!
//! The engine only needs three primitives: read up to N bytes, write some
//! bytes, and shut down.  They are expressed as two traits so the read half
//! and the write half of a connection can be owned and locked independently.
//! A blocked write on a slow peer must never stall the reader.
//!
//! Infrastructure implementations adapt tokio streams; tests use in-memory
//! pipes.  A [`Connector`] produces both halves for a new connection.

use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tracing::trace;

use crate::application::engine::ClientError;

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying read failed.
    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    /// The underlying write failed, or made no progress.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    EndOfStream,

    /// The transport was already closed on this side.
    #[error("transport is closed")]
    Closed,
}

/// Read half of a connection.
#[async_trait]
pub trait TransportRead: Send {
    /// Reads at most `max` bytes.  Never returns an empty chunk: end of
    /// stream is reported as [`TransportError::EndOfStream`].
    async fn read_chunk(&mut self, max: usize) -> Result<Vec<u8>, TransportError>;

    fn is_closed(&self) -> bool;
}

/// Write half of a connection.
#[async_trait]
pub trait TransportWrite: Send {
    /// Writes a prefix of `buf` and returns its length.
    async fn write_some(&mut self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Flushes and shuts down the write direction.  Idempotent.
    async fn shutdown(&mut self) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool;
}

/// Both halves of a freshly established connection.
pub struct Connection {
    pub reader: Box<dyn TransportRead>,
    pub writer: Box<dyn TransportWrite>,
}

/// Establishes connections for [`AmiClient::open`].
///
/// [`AmiClient::open`]: crate::application::engine::AmiClient::open
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Connection, ClientError>;
}

/// Writes all of `bytes`, retrying partial writes until done or failed.
///
/// # Errors
///
/// Returns the first error reported by the transport, or a
/// [`io::ErrorKind::WriteZero`] write error if the transport accepts nothing.
pub async fn write_fully(
    writer: &mut (dyn TransportWrite + '_),
    bytes: &[u8],
) -> Result<(), TransportError> {
    let mut written = 0;
    while written < bytes.len() {
        let n = writer.write_some(&bytes[written..]).await?;
        if n == 0 {
            return Err(TransportError::Write(io::ErrorKind::WriteZero.into()));
        }
        written += n;
        trace!(written, total = bytes.len(), "partial write");
    }
    Ok(())
}
