//! A TCP or TLS stream with a uniform `AsyncRead`/`AsyncWrite` surface.

use std::{net::SocketAddr, pin::Pin};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_rustls::rustls;

use crate::id::Id;
use crate::{Error, Result};

#[derive(Debug)]
pub enum ConnectionStream {
    Tcp(TcpStream),
    TlsServer(tokio_rustls::server::TlsStream<TcpStream>),
    TlsClient(tokio_rustls::client::TlsStream<TcpStream>),
}

impl ConnectionStream {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            Self::Tcp(s) => s.local_addr(),
            Self::TlsServer(s) => s.get_ref().0.local_addr(),
            Self::TlsClient(s) => s.get_ref().0.local_addr(),
        }
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            Self::Tcp(s) => s.peer_addr(),
            Self::TlsServer(s) => s.get_ref().0.peer_addr(),
            Self::TlsClient(s) => s.get_ref().0.peer_addr(),
        }
    }

    pub fn is_tls(&self) -> bool {
        !matches!(self, Self::Tcp(_))
    }

    /// The peer's identity. For TLS streams this is the hash of the certificate the peer
    /// presented during the handshake and can be trusted; for plain TCP it is derived from the
    /// socket address and cannot.
    pub fn peer_id(&self) -> Result<Id> {
        match self {
            Self::Tcp(s) => Ok(Id::from_ip(&s.peer_addr().map_err(Error::IO)?)),
            Self::TlsServer(s) => cert_id(s.get_ref().1.peer_certificates()),
            Self::TlsClient(s) => cert_id(s.get_ref().1.peer_certificates()),
        }
    }
}

fn cert_id(certs: Option<&[rustls::Certificate]>) -> Result<Id> {
    match certs.and_then(<[rustls::Certificate]>::first) {
        Some(cert) => Ok(Id::new(&cert.0)),
        None => Err(Error::UnexpectedPeer),
    }
}

impl AsyncWrite for ConnectionStream {
    #[inline]
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ConnectionStream::Tcp(x) => Pin::new(x).poll_write(cx, buf),
            ConnectionStream::TlsClient(x) => Pin::new(x).poll_write(cx, buf),
            ConnectionStream::TlsServer(x) => Pin::new(x).poll_write(cx, buf),
        }
    }

    #[inline]
    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::Tcp(x) => Pin::new(x).poll_flush(cx),
            ConnectionStream::TlsClient(x) => Pin::new(x).poll_flush(cx),
            ConnectionStream::TlsServer(x) => Pin::new(x).poll_flush(cx),
        }
    }

    #[inline]
    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::Tcp(x) => Pin::new(x).poll_shutdown(cx),
            ConnectionStream::TlsClient(x) => Pin::new(x).poll_shutdown(cx),
            ConnectionStream::TlsServer(x) => Pin::new(x).poll_shutdown(cx),
        }
    }
}

impl AsyncRead for ConnectionStream {
    #[inline]
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::Tcp(x) => Pin::new(x).poll_read(cx, buf),
            ConnectionStream::TlsClient(x) => Pin::new(x).poll_read(cx, buf),
            ConnectionStream::TlsServer(x) => Pin::new(x).poll_read(cx, buf),
        }
    }
}
