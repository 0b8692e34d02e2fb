//! Session metrics
//!
//! Counters for one listening session, logged when it ends.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use whisper_protocol::Disposition;

#[derive(Debug, Default)]
pub struct SessionMetrics {
    // Inbound
    /// Messages delivered by the transport
    pub messages_received: AtomicU64,
    /// Messages addressed to another client
    pub messages_not_addressed: AtomicU64,
    /// Chunks that failed to parse
    pub malformed_chunks: AtomicU64,
    /// Messages after exit or for a channel we are not joined to
    pub messages_ignored: AtomicU64,

    // Outbound
    /// Publishes handed to the transport
    pub messages_published: AtomicU64,
    /// Publishes the transport rejected
    pub publish_errors: AtomicU64,
    /// `requestReread` chunks sent
    pub rereads_requested: AtomicU64,

    start_time: Option<Instant>,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_inbound(&self, disposition: &Disposition) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        let counter = match disposition {
            Disposition::Applied => return,
            Disposition::NotAddressed => &self.messages_not_addressed,
            Disposition::Malformed(_) => &self.malformed_chunks,
            Disposition::Ignored => &self.messages_ignored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn published(&self, reread: bool) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        if reread {
            self.rereads_requested.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn publish_failed(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            inbound: InboundMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                not_addressed: self.messages_not_addressed.load(Ordering::Relaxed),
                malformed: self.malformed_chunks.load(Ordering::Relaxed),
                ignored: self.messages_ignored.load(Ordering::Relaxed),
            },
            outbound: OutboundMetrics {
                published: self.messages_published.load(Ordering::Relaxed),
                errors: self.publish_errors.load(Ordering::Relaxed),
                rereads_requested: self.rereads_requested.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub inbound: InboundMetrics,
    pub outbound: OutboundMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMetrics {
    pub received: u64,
    pub not_addressed: u64,
    pub malformed: u64,
    pub ignored: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMetrics {
    pub published: u64,
    pub errors: u64,
    pub rereads_requested: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisper_protocol::{ChunkError, RejectedChunk};

    #[test]
    fn test_inbound_tracking() {
        let metrics = SessionMetrics::new();

        metrics.record_inbound(&Disposition::Applied);
        metrics.record_inbound(&Disposition::NotAddressed);
        metrics.record_inbound(&Disposition::Malformed(RejectedChunk::new(
            &ChunkError::Empty,
            "",
        )));
        metrics.record_inbound(&Disposition::Ignored);

        assert_eq!(metrics.messages_received.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.messages_not_addressed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.malformed_chunks.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.messages_ignored.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_snapshot() {
        let metrics = SessionMetrics::new();
        metrics.published(false);
        metrics.published(true);
        metrics.publish_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.outbound.published, 2);
        assert_eq!(snapshot.outbound.rereads_requested, 1);
        assert_eq!(snapshot.outbound.errors, 1);
        assert_eq!(snapshot.inbound.received, 0);
    }
}
