//! Wire protocol of the fabric.
//!
//! Requests and responses travel as bincode-serialized enums over length-delimited (optionally
//! Snappy-compressed) frames. The fabric itself defines a single RPC, `Ping`; business-level
//! services hang their own variants off `Request` and register a recipient with the router.

use actix_derive::{Message, MessageResponse};
use std::fmt;

pub type ServiceResult = std::result::Result<PingResponse, ServiceError>;

#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "ServiceResult")]
pub struct PingRequest {
    /// Opaque payload, echoed back verbatim.
    pub ping: String,
    /// The caller's latest measured offset of this node's clock, in nanoseconds; `0` when the
    /// caller has no usable measurement yet.
    pub offset_nanos: i64,
    /// Cluster token; mismatched clusters must never talk.
    pub cluster_id: String,
    /// The caller's advertised address, keying the passive offset entry on the server side.
    pub node_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub pong: String,
    /// Server clock reading, sampled immediately before the response is returned.
    pub server_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceError {
    ClusterIdMismatch { expected: String, got: String },
    /// Failure injected through a `ManualHeartbeatService` ready channel.
    ManualFailure(String),
    Unavailable(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServiceError::ClusterIdMismatch { expected, got } => {
                write!(f, "cluster id mismatch: expected {:?}, got {:?}", expected, got)
            }
            ServiceError::ManualFailure(cause) => write!(f, "{}", cause),
            ServiceError::Unavailable(cause) => write!(f, "service unavailable: {}", cause),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "Response")]
pub enum Request {
    Ping(PingRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize, MessageResponse)]
pub enum Response {
    Pong(PingResponse),
    Error(ServiceError),
}
