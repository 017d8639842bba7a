//! # Permafrost
//!
//! Permafrost is the inter-node RPC connection fabric of a database cluster. Every node keeps a
//! single, long-lived, mutually authenticated connection to each peer it talks to, heartbeats the
//! peer continuously and uses the heartbeat round trips to measure how far the peer clock sits
//! from the local one.
//!
//! ## Conn
//!
//! The connection registry hands out at most one connection per peer address, for the lifetime of
//! the process. Recovering from transient network failure is the transport's job; callers observe
//! it only through the per-connection health verdict.
//!
//! ## Heartbeat
//!
//! The heartbeat service answers pings with the local timestamp, taken as late as possible, so
//! that a caller can bracket the remote clock reading by its own round trip.
//!
//! ## Monitor
//!
//! The remote-clock monitor keeps the latest offset sample per peer and refuses to vouch for the
//! local clock when a majority of live samples put it outside the configured tolerance.

#[macro_use]
extern crate serde_derive;

pub mod channel;
pub mod clock;
pub mod conn;
pub mod constants;
pub mod heartbeat;
pub mod id;
pub mod monitor;
pub mod protocol;
pub mod server;
pub mod stopper;
pub mod tls;

mod integration_test;

pub use conn::{Health, HeartbeatFailure};
pub use protocol::{Request, Response};

use std::fmt;

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    Actix(actix::MailboxError),

    // dial errors
    Dial(String),
    UnexpectedPeer,
    PeerParseError,
    Certificate(tls::certificate::Error),

    // channel errors
    ChannelError(String),
    EmptyConnection,
    EmptyResponse,
    InvalidResponse,

    // health errors
    NotConnected,
    NotYetHeartbeated,
    FailedHeartbeat(conn::HeartbeatFailure),

    // clock quorum errors
    OffsetGreaterThanMaxOffset { healthy: usize, total: usize },

    Timeout,
    Cancelled,

    /// Error caused by converting from a `String` to an `Id`
    TryFromStringError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IO(err) => write!(f, "i/o error: {}", err),
            Error::Actix(err) => write!(f, "mailbox error: {}", err),
            Error::Dial(cause) => write!(f, "dial failed: {}", cause),
            Error::UnexpectedPeer => write!(f, "peer presented an unexpected identity"),
            Error::PeerParseError => write!(f, "could not parse peer address"),
            Error::Certificate(err) => write!(f, "certificate error: {}", err),
            Error::ChannelError(cause) => write!(f, "channel error: {}", cause),
            Error::EmptyConnection => write!(f, "connection has no live stream"),
            Error::EmptyResponse => write!(f, "peer closed the stream without responding"),
            Error::InvalidResponse => write!(f, "peer sent an unexpected response"),
            Error::NotConnected => write!(f, "not connected"),
            Error::NotYetHeartbeated => write!(f, "not yet heartbeated"),
            Error::FailedHeartbeat(cause) => write!(f, "failed heartbeat: {}", cause),
            Error::OffsetGreaterThanMaxOffset { healthy, total } => write!(
                f,
                "clock offset is greater than the tolerated maximum: only {} of {} live peer \
                 clocks agree with this node",
                healthy, total
            ),
            Error::Timeout => write!(f, "operation timed out"),
            Error::Cancelled => write!(f, "operation cancelled by shutdown"),
            Error::TryFromStringError => write!(f, "malformed id string"),
        }
    }
}

impl std::error::Error for Error {}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

impl std::convert::From<actix::MailboxError> for Error {
    fn from(error: actix::MailboxError) -> Self {
        Error::Actix(error)
    }
}

impl std::convert::From<tls::certificate::Error> for Error {
    fn from(error: tls::certificate::Error) -> Self {
        Error::Certificate(error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
