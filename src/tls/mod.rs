//! TLS and certificate-related code for the connection fabric.
//!
//! Mutual TLS is mandatory between production nodes: both ends present self-signed certificates
//! and a node's identity is the hash of the certificate it presents. The TLS handshake also
//! negotiates the transport compression via ALPN, so two endpoints with mismatched compression
//! settings fail at dial time instead of exchanging garbage.

pub mod certificate;
pub mod connection_stream;
pub mod tls;
pub mod upgrader;
