//! Remote-clock monitoring and the offset quorum gate.
//!
//! Each heartbeat round trip yields one [`RemoteOffset`] sample per peer; the monitor keeps the
//! latest sample per peer address and answers one question: is this node's clock still in
//! agreement with the majority of live peers? A node that is not must die before it hands out
//! timestamps the rest of the cluster cannot order; a single peer with a broken clock must not be
//! able to take this node down. The monitor only renders the verdict, killing the process is the
//! caller's decision.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::{Error, Result};

/// A measurement of a peer clock relative to the local clock.
///
/// `offset` is the signed displacement of the peer clock in nanoseconds; the true displacement is
/// known to lie within `offset ± uncertainty`, where `uncertainty` is half the round trip of the
/// ping that produced the sample. The all-zero value means "no usable measurement".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteOffset {
    pub offset: i64,
    pub uncertainty: i64,
    pub measured_at: i64,
}

impl RemoteOffset {
    pub fn new(offset: i64, uncertainty: i64, measured_at: i64) -> RemoteOffset {
        RemoteOffset { offset, uncertainty, measured_at }
    }

    pub fn is_empty(&self) -> bool {
        *self == RemoteOffset::default()
    }

    fn is_stale(&self, ttl: Duration, now: i64) -> bool {
        now - self.measured_at > ttl.as_nanos() as i64
    }

    /// Whether the whole interval `offset ± uncertainty` lies within `± max_offset`. A sample is
    /// unhealthy only when the interval strictly exceeds the bound, so landing exactly on it is
    /// still healthy.
    fn is_healthy(&self, max_offset: Duration) -> bool {
        let max_offset = max_offset.as_nanos() as i64;
        self.offset + self.uncertainty <= max_offset
            && self.offset - self.uncertainty >= -max_offset
    }
}

impl fmt::Display for RemoteOffset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "off={}ns, err={}ns, at={}ns", self.offset, self.uncertainty, self.measured_at)
    }
}

/// Latest clock-offset sample per peer address, with TTL-based lazy eviction and the cluster-wide
/// quorum check.
pub struct RemoteClockMonitor {
    clock: Arc<dyn Clock>,
    offset_ttl: Duration,
    min_samples: usize,
    offsets: Mutex<HashMap<String, RemoteOffset>>,
}

impl RemoteClockMonitor {
    pub fn new(clock: Arc<dyn Clock>, offset_ttl: Duration, min_samples: usize) -> RemoteClockMonitor {
        RemoteClockMonitor { clock, offset_ttl, min_samples, offsets: Mutex::new(HashMap::new()) }
    }

    /// Record the latest measurement for `addr`.
    ///
    /// A non-empty sample replaces whatever was stored. An empty sample (a failed or unboundable
    /// measurement) never purges a fresh predecessor, it only clears one that has already
    /// outlived its TTL; a fresh predecessor is left for the TTL to expire.
    pub fn update_offset(&self, addr: &str, offset: RemoteOffset) {
        debug_assert!(offset.uncertainty >= 0);
        let mut offsets = self.offsets.lock().unwrap();
        if offset.is_empty() {
            let now = self.clock.now_nanos();
            if let Some(old) = offsets.get(addr) {
                if old.is_stale(self.offset_ttl, now) {
                    offsets.remove(addr);
                }
            }
        } else {
            offsets.insert(addr.to_owned(), offset);
        }
    }

    /// The stored sample for `addr`, stale or not.
    pub fn offset(&self, addr: &str) -> Option<RemoteOffset> {
        self.offsets.lock().unwrap().get(addr).cloned()
    }

    pub fn sample_count(&self) -> usize {
        self.offsets.lock().unwrap().len()
    }

    /// Check the local clock against the live samples.
    ///
    /// Stale samples are evicted, then every remaining sample votes: a sample is healthy when its
    /// whole interval fits within `± max_offset`. With at least `min_samples` live samples, the
    /// verdict is fatal as soon as the healthy samples no longer form a strict majority. The
    /// local node is the common factor of all unhealthy measurements, so it is the local clock
    /// that cannot be trusted.
    pub fn verify_clock_offset(&self) -> Result<()> {
        let now = self.clock.now_nanos();
        let max_offset = self.clock.max_offset();

        let (healthy, total) = {
            let mut offsets = self.offsets.lock().unwrap();
            offsets.retain(|_, offset| !offset.is_stale(self.offset_ttl, now));
            let healthy = offsets.values().filter(|offset| offset.is_healthy(max_offset)).count();
            (healthy, offsets.len())
        };

        if total >= self.min_samples && healthy <= total / 2 {
            warn!(healthy, total, "local clock disagrees with the majority of live peers");
            return Err(Error::OffsetGreaterThanMaxOffset { healthy, total });
        }
        debug!(healthy, total, "clock offset verified");
        Ok(())
    }
}
