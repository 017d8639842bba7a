//! `tokio_rustls` configuration for a peer-to-peer setting.
//!
//! Both sides authenticate: the server demands a client certificate and the client accepts the
//! server's self-signed certificate, so verification on either end only enforces the *presence*
//! of a certificate. Trust in the certificate's owner comes from the identity check performed by
//! the caller against the certificate hash. The ALPN token doubles as the compression handshake:
//! an endpoint offers exactly one protocol, so mismatched compression settings abort the
//! handshake instead of producing undecodable frames.

use lazy_static::lazy_static;
use std::convert::TryFrom;
use std::{sync::Arc, time::SystemTime};
use tokio_rustls::rustls::{
    self, client::ServerCertVerifier, server::ClientCertVerifier, Certificate, ClientConfig,
    ServerConfig, ServerName,
};

lazy_static! {
    pub static ref DUMMY_DOMAIN: ServerName = ServerName::try_from("example.org").unwrap();
}

/// ALPN token of an uncompressed RPC endpoint.
pub const ALPN_RPC: &[u8] = b"zfx-rpc/1";
/// ALPN token of a Snappy-compressed RPC endpoint.
pub const ALPN_RPC_SNAPPY: &[u8] = b"zfx-rpc-snappy/1";

fn alpn_token(compression: bool) -> Vec<u8> {
    if compression {
        ALPN_RPC_SNAPPY.to_vec()
    } else {
        ALPN_RPC.to_vec()
    }
}

/// Client verification: enforce the presence of a single certificate, nothing more
struct PermafrostClientCertVerifier;

impl ClientCertVerifier for PermafrostClientCertVerifier {
    fn verify_client_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _now: SystemTime,
    ) -> Result<rustls::server::ClientCertVerified, rustls::Error> {
        Ok(rustls::server::ClientCertVerified::assertion())
    }

    fn client_auth_root_subjects(&self) -> Option<rustls::DistinguishedNames> {
        Some(vec![])
    }

    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> Option<bool> {
        Some(true)
    }
}

/// Server verification: don't check the chain or the domain name, just that a certificate was
/// presented
struct PermafrostServerCertVerifier;

impl ServerCertVerifier for PermafrostServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

/// Build the client-side configuration from a certificate and private key in DER form.
pub fn client_tls_config(
    raw_certificate: &[u8],
    raw_private_key: &[u8],
    compression: bool,
) -> ClientConfig {
    let cert_vec = vec![rustls::Certificate(Vec::from(raw_certificate))];
    let pk = rustls::PrivateKey(Vec::from(raw_private_key));
    let mut config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_single_cert(cert_vec, pk)
        .unwrap();
    // `dangerous` only means we substitute our own certificate verification
    config.dangerous().set_certificate_verifier(Arc::new(PermafrostServerCertVerifier));
    config.alpn_protocols = vec![alpn_token(compression)];
    config
}

/// Build the server-side configuration from a certificate and private key in DER form.
pub fn server_tls_config(
    raw_certificate: &[u8],
    raw_private_key: &[u8],
    compression: bool,
) -> ServerConfig {
    let cert_vec = vec![rustls::Certificate(Vec::from(raw_certificate))];
    let pk = rustls::PrivateKey(Vec::from(raw_private_key));
    let mut config = ServerConfig::builder()
        .with_safe_defaults()
        .with_client_cert_verifier(Arc::new(PermafrostClientCertVerifier))
        .with_single_cert(cert_vec, pk)
        .unwrap();
    config.alpn_protocols = vec![alpn_token(compression)];
    config
}
