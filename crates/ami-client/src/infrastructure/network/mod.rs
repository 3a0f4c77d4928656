//! Network infrastructure for the client application.
//!
//! Adapts tokio streams to the engine's transport traits and opens the TCP
//! connection to the manager interface.
//!
//! Architecture:
//! - `TcpConnector` resolves and connects `host:port` under a timeout, then
//!   splits the stream into owned halves.
//! - `StreamReader` / `StreamWriter` wrap any `AsyncRead` / `AsyncWrite`, so
//!   the same adapters serve TCP halves in production and in-memory pipes in
//!   tests.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info};

use crate::application::engine::ClientError;
use crate::application::transport::{
    Connection, Connector, TransportError, TransportRead, TransportWrite,
};
use crate::infrastructure::config::ConnectionConfig;

/// The only transport scheme implemented.
pub const TCP_SCHEME: &str = "tcp";

/// Opens plain TCP connections to `host:port`.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    scheme: String,
    address: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            scheme: config.scheme.clone(),
            address: config.address(),
            connect_timeout: config.connect_timeout(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Connection, ClientError> {
        if !self.scheme.eq_ignore_ascii_case(TCP_SCHEME) {
            return Err(ClientError::UnsupportedScheme(self.scheme.clone()));
        }

        debug!(address = %self.address, "connecting");
        let connecting = TcpStream::connect(&self.address);
        let stream = match time::timeout(self.connect_timeout, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ClientError::ConnectFailed {
                    addr: self.address.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(ClientError::ConnectTimeout {
                    addr: self.address.clone(),
                    timeout: self.connect_timeout,
                })
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {e}");
        }
        info!(address = %self.address, "connected to manager interface");

        let (read_half, write_half) = stream.into_split();
        Ok(Connection {
            reader: Box::new(StreamReader::new(read_half)),
            writer: Box::new(StreamWriter::new(write_half)),
        })
    }
}

// ── tokio stream adapters ─────────────────────────────────────────────────────

/// [`TransportRead`] over any tokio reader.
#[derive(Debug)]
pub struct StreamReader<R> {
    inner: R,
    closed: bool,
}

impl<R> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            closed: false,
        }
    }
}

#[async_trait]
impl<R> TransportRead for StreamReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_chunk(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut buf = vec![0u8; max.max(1)];
        match self.inner.read(&mut buf).await {
            Ok(0) => {
                self.closed = true;
                Err(TransportError::EndOfStream)
            }
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) => {
                self.closed = true;
                Err(TransportError::Read(e))
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// [`TransportWrite`] over any tokio writer.
#[derive(Debug)]
pub struct StreamWriter<W> {
    inner: W,
    closed: bool,
}

impl<W> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            closed: false,
        }
    }
}

#[async_trait]
impl<W> TransportWrite for StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_some(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.inner.write(buf).await {
            Ok(0) if !buf.is_empty() => {
                self.closed = true;
                Err(TransportError::Write(io::ErrorKind::WriteZero.into()))
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(TransportError::Write(e))
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.shutdown().await.map_err(TransportError::Write)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
