//! Node certificate material.
//!
//! A node proves who it is with a self-signed Ed25519 certificate, and the certificate hash *is*
//! the node id, so the material has to survive restarts. First boot mints a certificate and
//! writes it next to the configuration; every later boot reloads the same one.

use std::fs;
use std::path::Path;

use derive_more::{Display, Error, From};
use pem::PemError;
use rcgen::{CertificateParams, KeyIdMethod, KeyPair, RcgenError, PKCS_ED25519};
use x509_parser::certificate::X509Certificate;
use x509_parser::error::X509Error;
use x509_parser::prelude::FromDer;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, From)]
pub enum Error {
    #[display(fmt = "i/o error: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "certificate generation failed: {}", _0)]
    Generation(RcgenError),
    #[display(fmt = "stored material is not valid PEM: {}", _0)]
    BadPem(PemError),
    #[display(fmt = "stored certificate does not parse: {}", _0)]
    BadCertificate(x509_parser::nom::Err<X509Error>),
}

const SUBJECT_ALT_NAME: &str = "permafrost-node";

/// A node's certificate and private key, both in DER form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCertificate {
    pub certificate: Vec<u8>,
    pub private_key: Vec<u8>,
}

impl NodeCertificate {
    /// Reload the material stored at the given paths, minting and storing fresh material when
    /// either file is missing.
    pub fn load_or_generate(cert_path: &Path, key_path: &Path) -> Result<NodeCertificate> {
        if !cert_path.exists() || !key_path.exists() {
            let minted = NodeCertificate::generate()?;
            minted.store(cert_path, key_path)?;
            return Ok(minted);
        }
        let certificate = read_pem(cert_path)?;
        let private_key = read_pem(key_path)?;
        // Refuse to boot from bytes that no longer parse as a certificate.
        X509Certificate::from_der(&certificate)?;
        Ok(NodeCertificate { certificate, private_key })
    }

    /// Mint a fresh self-signed Ed25519 certificate.
    pub fn generate() -> Result<NodeCertificate> {
        let mut params = CertificateParams::new(vec![SUBJECT_ALT_NAME.to_owned()]);
        params.alg = &PKCS_ED25519;
        params.key_pair = Some(KeyPair::generate(&PKCS_ED25519)?);
        params.key_identifier_method = KeyIdMethod::Sha256;

        let cert = rcgen::Certificate::from_params(params)?;
        Ok(NodeCertificate {
            private_key: cert.serialize_private_key_der(),
            certificate: cert.serialize_der()?,
        })
    }

    fn store(&self, cert_path: &Path, key_path: &Path) -> Result<()> {
        write_pem(cert_path, "CERTIFICATE", &self.certificate)?;
        write_pem(key_path, "PRIVATE KEY", &self.private_key)
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    Ok(pem::parse(fs::read(path)?)?.contents)
}

fn write_pem(path: &Path, tag: &str, der: &[u8]) -> Result<()> {
    let block = pem::Pem { tag: tag.to_owned(), contents: der.to_owned() };
    fs::write(path, pem::encode(&block))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::env::temp_dir;
    use std::path::PathBuf;

    fn scratch_paths() -> (PathBuf, PathBuf) {
        use rand::Rng;

        let token: u32 = rand::thread_rng().gen();
        let dir = temp_dir();
        (
            dir.join(format!("permafrost-{:08x}.crt", token)),
            dir.join(format!("permafrost-{:08x}.key", token)),
        )
    }

    #[actix_rt::test]
    async fn material_survives_restarts() {
        let (crt, key) = scratch_paths();
        let first = NodeCertificate::load_or_generate(&crt, &key).unwrap();
        let second = NodeCertificate::load_or_generate(&crt, &key).unwrap();
        assert_eq!(first, second);
    }

    #[actix_rt::test]
    async fn minted_certificates_parse_and_differ() {
        let a = NodeCertificate::generate().unwrap();
        let b = NodeCertificate::generate().unwrap();
        assert_ne!(a.certificate, b.certificate);

        let (_rest, parsed) = X509Certificate::from_der(&a.certificate).unwrap();
        assert!(parsed.validity().is_valid());
    }

    #[actix_rt::test]
    async fn corrupt_stored_material_is_rejected() {
        let (crt, key) = scratch_paths();
        let junk = pem::Pem { tag: "CERTIFICATE".to_owned(), contents: b"junk".to_vec() };
        fs::write(&crt, pem::encode(&junk)).unwrap();
        fs::write(&key, pem::encode(&junk)).unwrap();

        assert!(matches!(
            NodeCertificate::load_or_generate(&crt, &key),
            Err(Error::BadCertificate(_))
        ));
    }
}
