//! Instance telemetry: monotonic counters and the reset-on-read snapshot.

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic counters maintained by the engines and workers.
///
/// Workers only ever add; the racy read-and-reset average of older designs
/// is avoided by snapshotting raw sums and computing averages in the
/// consumer.
#[derive(Default)]
pub(crate) struct Counters {
    /// Bytes accepted by the backend across all flush passes.
    bytes_written: AtomicU64,
    /// Bytes delivered to callers from `read`.
    bytes_read: AtomicU64,
    write_ops: AtomicU64,
    read_ops: AtomicU64,
    write_latency_us: AtomicU64,
    read_latency_us: AtomicU64,
    /// Bytes a backend write left unaccepted (retried on the next pass).
    short_write_bytes: AtomicU64,
    last_error_code: AtomicI32,
}

impl Counters {
    pub fn new() -> Counters {
        Counters::default()
    }

    pub fn record_flush(&self, bytes: usize, elapsed: Duration) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
        self.write_ops.fetch_add(1, Ordering::Relaxed);
        self.write_latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_fetch(&self, elapsed: Duration) {
        self.read_ops.fetch_add(1, Ordering::Relaxed);
        self.read_latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn add_short_write(&self, bytes: usize) {
        self.short_write_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn set_last_error(&self, code: i32) {
        self.last_error_code.store(code, Ordering::Relaxed);
    }

    /// Snapshots and resets every counter.
    pub fn take(&self) -> StatsSnapshot {
        let code = self.last_error_code.swap(0, Ordering::Relaxed);
        StatsSnapshot {
            bytes_written: self.bytes_written.swap(0, Ordering::Relaxed),
            bytes_read: self.bytes_read.swap(0, Ordering::Relaxed),
            write_ops: self.write_ops.swap(0, Ordering::Relaxed),
            read_ops: self.read_ops.swap(0, Ordering::Relaxed),
            write_latency: Duration::from_micros(self.write_latency_us.swap(0, Ordering::Relaxed)),
            read_latency: Duration::from_micros(self.read_latency_us.swap(0, Ordering::Relaxed)),
            short_write_bytes: self.short_write_bytes.swap(0, Ordering::Relaxed),
            last_error_code: (code != 0).then_some(code),
        }
    }
}

/// A point-in-time view of the instance counters.
///
/// Produced by [`Conveyor::take_stats`](crate::Conveyor::take_stats), which
/// resets the counters, so consecutive snapshots cover disjoint intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Bytes the backend accepted from flush passes.
    pub bytes_written: u64,
    /// Bytes delivered to callers.
    pub bytes_read: u64,
    /// Completed backend write calls.
    pub write_ops: u64,
    /// Completed backend read calls.
    pub read_ops: u64,
    /// Cumulative latency of backend write calls.
    pub write_latency: Duration,
    /// Cumulative latency of backend read calls.
    pub read_latency: Duration,
    /// Bytes the backend left unaccepted in short writes.
    pub short_write_bytes: u64,
    /// Platform code of the most recent backend failure, if any.
    pub last_error_code: Option<i32>,
}

impl StatsSnapshot {
    /// Mean backend write latency over the snapshot interval.
    pub fn avg_write_latency(&self) -> Option<Duration> {
        (self.write_ops > 0).then(|| self.write_latency / self.write_ops as u32)
    }

    /// Mean backend read latency over the snapshot interval.
    pub fn avg_read_latency(&self) -> Option<Duration> {
        (self.read_ops > 0).then(|| self.read_latency / self.read_ops as u32)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Counters;

    #[test]
    fn take_resets() {
        let counters = Counters::new();
        counters.record_flush(100, Duration::from_millis(4));
        counters.record_flush(50, Duration::from_millis(2));
        counters.add_bytes_read(30);
        counters.record_fetch(Duration::from_millis(9));
        counters.add_short_write(7);
        counters.set_last_error(5);

        let snapshot = counters.take();
        assert_eq!(snapshot.bytes_written, 150);
        assert_eq!(snapshot.bytes_read, 30);
        assert_eq!(snapshot.write_ops, 2);
        assert_eq!(snapshot.read_ops, 1);
        assert_eq!(snapshot.avg_write_latency(), Some(Duration::from_millis(3)));
        assert_eq!(snapshot.avg_read_latency(), Some(Duration::from_millis(9)));
        assert_eq!(snapshot.short_write_bytes, 7);
        assert_eq!(snapshot.last_error_code, Some(5));

        let empty = counters.take();
        assert_eq!(empty.bytes_written, 0);
        assert_eq!(empty.write_ops, 0);
        assert_eq!(empty.avg_write_latency(), None);
        assert_eq!(empty.last_error_code, None);
    }
}
