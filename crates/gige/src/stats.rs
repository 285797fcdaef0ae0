//! Atomic counters for observability, mirroring the accumulate-then-snapshot
//! pattern used throughout this workspace's transport layer.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for the streaming server.
#[derive(Default)]
pub struct StreamStats {
    frames_sent: AtomicU64,
    payload_packets_sent: AtomicU64,
    last_block_id: AtomicU64,
}

impl StreamStats {
    pub fn record_frame(&self, block_id: u16, payload_packets: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.payload_packets_sent
            .fetch_add(payload_packets, Ordering::Relaxed);
        self.last_block_id.store(u64::from(block_id), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            payload_packets_sent: self.payload_packets_sent.load(Ordering::Relaxed),
            last_block_id: self.last_block_id.load(Ordering::Relaxed) as u16,
        }
    }
}

/// Immutable point-in-time view of [`StreamStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStatsSnapshot {
    pub frames_sent: u64,
    pub payload_packets_sent: u64,
    pub last_block_id: u16,
}

/// Running counters for the stream receiver.
#[derive(Default)]
pub struct ReceiveStats {
    frames_assembled: AtomicU64,
    frames_dropped: AtomicU64,
    packets_received: AtomicU64,
}

impl ReceiveStats {
    pub fn record_assembled(&self) {
        self.frames_assembled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_packet(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReceiveStatsSnapshot {
        ReceiveStatsSnapshot {
            frames_assembled: self.frames_assembled.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
        }
    }
}

/// Immutable point-in-time view of [`ReceiveStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveStatsSnapshot {
    pub frames_assembled: u64,
    pub frames_dropped: u64,
    pub packets_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_stats_accumulate() {
        let stats = StreamStats::default();
        stats.record_frame(1, 3);
        stats.record_frame(2, 4);
        let snap = stats.snapshot();
        assert_eq!(snap.frames_sent, 2);
        assert_eq!(snap.payload_packets_sent, 7);
        assert_eq!(snap.last_block_id, 2);
    }
}
