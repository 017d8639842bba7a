//! Hash-based peer identities.
//!
//! A peer's `Id` is the hash of the certificate it presents during the TLS handshake, so the
//! identity a peer claims is the identity it can prove. Plain-TCP connections (tests only) fall
//! back to an *untrusted* identity derived from the socket address.

use std::convert::TryInto;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use base58check::{FromBase58Check, ToBase58Check};
use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;

/// A 32-byte hash identifying a peer, displayed in Base58check.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Serialize, Deserialize, Default)]
pub struct Id([u8; 32]);

impl Id {
    /// Hash an input byte slice (normally a certificate in DER form) into an `Id`.
    pub fn new(bytes: &[u8]) -> Id {
        Id(hash(bytes))
    }

    /// Derive an *untrusted* identity from a socket address.
    pub fn from_ip(ip: &SocketAddr) -> Id {
        Id::new(format!("{:?}", ip).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// All-zeroes `Id` (for testing)
    pub fn zero() -> Id {
        Id([0u8; 32])
    }
}

fn hash(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2bVar::new(32).expect("blake2b supports 32-byte output");
    hasher.update(bytes);
    let mut out = [0u8; 32];
    hasher.finalize_variable(&mut out).expect("output length matches");
    out
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl FromStr for Id {
    type Err = crate::Error;

    fn from_str(id_str: &str) -> Result<Self, crate::Error> {
        let (vsn, bytes) =
            id_str.from_base58check().map_err(|_| crate::Error::TryFromStringError)?;
        if vsn != 0 {
            return Err(crate::Error::TryFromStringError);
        }
        let bytes: [u8; 32] =
            bytes.as_slice().try_into().map_err(|_| crate::Error::TryFromStringError)?;
        Ok(Id(bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        let a = Id::new(b"certificate bytes");
        let b = Id::new(b"certificate bytes");
        let c = Id::new(b"other bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn display_round_trips() {
        let id = Id::new(b"some peer");
        let parsed: Id = format!("{}", id).parse().unwrap();
        assert_eq!(id, parsed);

        assert!(matches!("not-an-id".parse::<Id>(), Err(crate::Error::TryFromStringError)));
    }
}
