use tokio::time::Duration;

// Heartbeat settings
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(6);

// Offset monitor settings

/// How long a clock-offset sample stays usable. Stale samples are invisible to the quorum check
/// and lazily evicted.
pub const OFFSET_TTL: Duration = Duration::from_secs(30);

/// A ping whose round trip exceeds `MAXIMUM_PING_DURATION_MULT * max_offset` is too noisy to
/// bound the remote clock reading and its sample is discarded. The multiplier applies to the raw
/// round trip, not to the derived uncertainty.
pub const MAXIMUM_PING_DURATION_MULT: u32 = 2;

/// Below this many live samples the offset quorum is meaningless and never raises an error.
pub const MIN_OFFSET_SAMPLES: usize = 3;

/// Payload echoed back by the heartbeat service.
pub const PING_PAYLOAD: &str = "PING";
