//! # Transport
//!
//! How a connection gets its byte stream.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: A dialer knows nothing about frames or calls. It hands back
//!   one ordered, bidirectional stream and gets out of the way.
//! - **Owned**: The stream it returns belongs to exactly one connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::DuplexStream;
use tokio::net::TcpSocket;
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::RemoteIdentity;
use crate::error::Error;
use crate::error::Result;

/// Any ordered byte stream a connection can own.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub type BoxStream = Box<dyn Stream>;

/// Opens the byte stream for a remote identity.
///
/// This trait is designed to be object-safe (`Arc<dyn Dialer>`).
#[async_trait::async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, identity: &RemoteIdentity) -> Result<BoxStream>;
}

/// Dials plain TCP, applying the identity's no-delay and keep-alive options.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl TcpDialer {
    async fn resolve(address: &str) -> io::Result<SocketAddr> {
        tokio::net::lookup_host(address).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} resolved to no addresses", address))
        })
    }

    async fn connect(identity: &RemoteIdentity) -> io::Result<TcpStream> {
        let addr = Self::resolve(identity.address()).await?;
        let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        socket.set_keepalive(identity.is_keep_alive())?;
        socket.set_nodelay(identity.is_no_delay())?;
        socket.connect(addr).await
    }
}

#[async_trait::async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, identity: &RemoteIdentity) -> Result<BoxStream> {
        let stream = Self::connect(identity)
            .await
            .map_err(|e| Error::Transport(format!("connecting to {}: {}", identity.address(), e)))?;
        debug!(
            address = identity.address(),
            no_delay = identity.is_no_delay(),
            keep_alive = identity.is_keep_alive(),
            "tcp stream established"
        );
        Ok(Box::new(stream))
    }
}

/// Hands out pre-built in-memory streams, one per dial.
///
/// The far ends are returned by [`MemoryDialer::new`] so a test can act as the server.
#[derive(Debug)]
pub struct MemoryDialer {
    streams: Mutex<Vec<DuplexStream>>,
}

impl MemoryDialer {
    /// Creates a dialer good for `n` dials, plus the server side of each stream.
    pub fn new(n: usize) -> (Self, Vec<DuplexStream>) {
        let mut client = Vec::with_capacity(n);
        let mut server = Vec::with_capacity(n);
        for _ in 0..n {
            let (c, s) = tokio::io::duplex(64 * 1024);
            client.push(c);
            server.push(s);
        }
        client.reverse();
        (Self { streams: Mutex::new(client) }, server)
    }
}

#[async_trait::async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, _identity: &RemoteIdentity) -> Result<BoxStream> {
        let next = self
            .streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        match next {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(Error::Transport("memory dialer exhausted".into())),
        }
    }
}
