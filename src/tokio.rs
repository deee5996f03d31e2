//! The `tokio`-backed [`crate::engine::Transport`] adapter: the concrete
//! socket/TLS implementation spec §1 keeps as an external collaborator and
//! spec §6 only names as a byte-stream contract.
//!
//! Grounded in `zero-mysql`'s `tokio/stream.rs` (`Stream::{Tcp, Tls, Unix}`,
//! `upgrade_to_tls` swapping the TCP variant for a TLS one in place) —
//! reshaped so `ssl_handshake`/`ssl_shutdown` satisfy [`crate::engine::Transport`]
//! instead of being free methods the caller must sequence by hand.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::engine::Transport;
use crate::error::{Error, Result};
use crate::opts::{Address, ConnectOpts};
use crate::pool::Connect;

enum Inner {
    Tcp(TcpStream),
    #[cfg(feature = "tokio-tls")]
    Tls(Box<tokio_native_tls::TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
    /// Only observed transiently inside [`TokioTransport::ssl_handshake`]
    /// if the upgrade itself panics/unwinds; never seen by a caller.
    Transitioning,
}

/// A live socket, optionally upgraded to TLS in place, implementing
/// [`Transport`] for the sans-I/O engine.
pub struct TokioTransport {
    inner: Inner,
    /// Server hostname, used for TLS SNI/certificate verification on
    /// upgrade. Empty for UNIX-socket transports, which never upgrade.
    host: String,
}

impl TokioTransport {
    fn tcp(stream: TcpStream, host: String) -> Self {
        Self {
            inner: Inner::Tcp(stream),
            host,
        }
    }

    #[cfg(unix)]
    fn unix(stream: UnixStream) -> Self {
        Self {
            inner: Inner::Unix(stream),
            host: String::new(),
        }
    }
}

impl Connect for TokioTransport {
    async fn open(opts: &ConnectOpts) -> Result<Self> {
        match &opts.address {
            Address::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                Ok(Self::tcp(stream, host.clone()))
            }
            #[cfg(unix)]
            Address::Unix { path } => {
                let stream = UnixStream::connect(path).await?;
                Ok(Self::unix(stream))
            }
            #[cfg(not(unix))]
            Address::Unix { .. } => Err(Error::ServerUnsupported("unix sockets are not supported on this platform".into())),
        }
    }
}

impl Transport for TokioTransport {
    async fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            Inner::Tcp(s) => s.read(buf).await,
            #[cfg(feature = "tokio-tls")]
            Inner::Tls(s) => s.read(buf).await,
            #[cfg(unix)]
            Inner::Unix(s) => s.read(buf).await,
            Inner::Transitioning => Err(std::io::Error::other("transport mid-TLS-upgrade")),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match &mut self.inner {
            Inner::Tcp(s) => s.write_all(buf).await,
            #[cfg(feature = "tokio-tls")]
            Inner::Tls(s) => s.write_all(buf).await,
            #[cfg(unix)]
            Inner::Unix(s) => s.write_all(buf).await,
            Inner::Transitioning => Err(std::io::Error::other("transport mid-TLS-upgrade")),
        }
    }

    #[cfg(feature = "tokio-tls")]
    async fn ssl_handshake(&mut self) -> Result<()> {
        let current = std::mem::replace(&mut self.inner, Inner::Transitioning);
        let tcp = match current {
            Inner::Tcp(tcp) => tcp,
            other => {
                self.inner = other;
                return Err(Error::ServerUnsupported("TLS upgrade requested on a non-TCP or already-TLS transport".into()));
            }
        };
        let connector = native_tls::TlsConnector::new().map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let connector = tokio_native_tls::TlsConnector::from(connector);
        let tls = connector.connect(&self.host, tcp).await.map_err(|e| Error::Io(std::io::Error::other(e)))?;
        self.inner = Inner::Tls(Box::new(tls));
        Ok(())
    }

    #[cfg(feature = "tokio-tls")]
    async fn ssl_shutdown(&mut self) -> Result<()> {
        if let Inner::Tls(s) = &mut self.inner {
            s.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_unreachable_port_fails_with_io_error() {
        let opts = ConnectOpts {
            address: Address::Tcp {
                host: "127.0.0.1".into(),
                port: 1,
            },
            ..ConnectOpts::default()
        };
        let err = TokioTransport::open(&opts).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
