//! Turning raw sockets into [ConnectionStream]s.
//!
//! An [Upgrader] decides what happens between `accept`/`connect` and the first frame: the TLS
//! flavours run the handshake (which also settles the ALPN compression negotiation), the plain
//! TCP flavour passes the socket through so the whole fabric can run without certificates in
//! tests.

use std::io;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::tls::certificate::NodeCertificate;
use crate::tls::tls::{client_tls_config, server_tls_config, DUMMY_DOMAIN};

use super::connection_stream::ConnectionStream;

#[derive(Clone)]
pub enum Upgrader {
    /// Pass the socket through untouched; peer identities are unauthenticated.
    Tcp,
    /// Handshake as the dialling side.
    TlsClient(TlsConnector),
    /// Handshake as the accepting side.
    TlsServer(TlsAcceptor),
}

impl Upgrader {
    pub async fn upgrade(&self, socket: TcpStream) -> io::Result<ConnectionStream> {
        match self {
            Upgrader::Tcp => Ok(ConnectionStream::Tcp(socket)),
            Upgrader::TlsClient(connector) => {
                let stream = connector.connect(DUMMY_DOMAIN.clone(), socket).await?;
                Ok(ConnectionStream::TlsClient(stream))
            }
            Upgrader::TlsServer(acceptor) => {
                let stream = acceptor.accept(socket).await?;
                Ok(ConnectionStream::TlsServer(stream))
            }
        }
    }

    /// True when upgrading runs a TLS handshake, i.e. when the upgraded stream's peer identity
    /// can be trusted.
    pub fn is_tls(&self) -> bool {
        !matches!(self, Upgrader::Tcp)
    }
}

/// The dialling and accepting upgraders of one endpoint.
#[derive(Clone)]
pub struct Upgraders {
    pub client: Arc<Upgrader>,
    pub server: Arc<Upgrader>,
}

impl Upgraders {
    /// Mutual-TLS upgraders built from this node's certificate material, offering the ALPN token
    /// that matches `compression` on both sides.
    pub fn from_certificate(identity: &NodeCertificate, compression: bool) -> Upgraders {
        let connector = TlsConnector::from(Arc::new(client_tls_config(
            &identity.certificate,
            &identity.private_key,
            compression,
        )));
        let acceptor = TlsAcceptor::from(Arc::new(server_tls_config(
            &identity.certificate,
            &identity.private_key,
            compression,
        )));
        Upgraders {
            client: Arc::new(Upgrader::TlsClient(connector)),
            server: Arc::new(Upgrader::TlsServer(acceptor)),
        }
    }

    /// Plain-TCP upgraders, for tests that don't need authenticated peers.
    pub fn insecure() -> Upgraders {
        Upgraders { client: Arc::new(Upgrader::Tcp), server: Arc::new(Upgrader::Tcp) }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::id::Id;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[actix_rt::test]
    async fn upgraders_report_their_authentication() {
        let upgraders = Upgraders::insecure();
        assert!(!upgraders.client.is_tls());
        assert!(!upgraders.server.is_tls());

        let identity = NodeCertificate::generate().unwrap();
        let upgraders = Upgraders::from_certificate(&identity, false);
        assert!(upgraders.client.is_tls());
        assert!(upgraders.server.is_tls());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn each_side_sees_the_others_certificate_hash() {
        let server_identity = NodeCertificate::generate().unwrap();
        let client_identity = NodeCertificate::generate().unwrap();
        let server_upgraders = Upgraders::from_certificate(&server_identity, false);
        let client_upgraders = Upgraders::from_certificate(&client_identity, false);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_side = async {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = server_upgraders.server.upgrade(socket).await.unwrap();
            assert!(stream.is_tls());
            stream.write_all(b"hello").await.unwrap();
            stream.flush().await.unwrap();
            stream.peer_id().unwrap()
        };
        let connect_side = async {
            let socket = TcpStream::connect(addr).await.unwrap();
            let mut stream = client_upgraders.client.upgrade(socket).await.unwrap();
            assert!(stream.is_tls());
            let mut greeting = [0u8; 5];
            stream.read_exact(&mut greeting).await.unwrap();
            assert_eq!(&greeting, b"hello");
            stream.peer_id().unwrap()
        };

        let (client_id_as_seen, server_id_as_seen) = tokio::join!(accept_side, connect_side);
        assert_eq!(client_id_as_seen, Id::new(&client_identity.certificate));
        assert_eq!(server_id_as_seen, Id::new(&server_identity.certificate));
    }
}
