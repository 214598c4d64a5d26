use std::sync::{Arc, Mutex, MutexGuard};

/// Receive counters. Monotonic for the lifetime of the receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub packets_received: u64,
    pub bytes_received: u64,
    /// Reserved; nothing drops packets after they are read.
    pub packets_dropped: u64,
    pub last_packet_size: usize,
}

/// Shared handle to the counters. Uses its own lock so stat readers
/// never contend with the point buffers.
#[derive(Debug, Clone, Default)]
pub struct StatsCounter {
    inner: Arc<Mutex<NetworkStats>>,
}

impl StatsCounter {
    pub fn record(&self, packet_size: usize) {
        let mut stats = self.lock();
        stats.packets_received += 1;
        stats.bytes_received += packet_size as u64;
        stats.last_packet_size = packet_size;
    }

    pub fn snapshot(&self) -> NetworkStats {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkStats> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
