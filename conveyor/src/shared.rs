//! The per-instance shared block: device handle, position counters,
//! generation, sticky error slot and the two optional engines.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI32, AtomicU64, Ordering},
};

use conveyor_common::{Error, Result};
use conveyor_io::StorageDevice;

use crate::options::{AccessMode, ConveyorOptions};
use crate::read_engine::ReadEngine;
use crate::stats::Counters;
use crate::write_engine::WriteEngine;

/// Fallback platform code for backend errors that carry none.
pub(crate) const GENERIC_IO_ERRNO: i32 = 5;

/// Worker progression for one engine. The poisoned side-state latched on
/// the first backend failure lives in `Shared::sticky_error`, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// State shared between the public API and the two workers.
///
/// The two engines are owned here, side by side; the write path reaches the
/// read engine to invalidate its ring, and the read path reaches the write
/// engine to snoop unflushed bytes. Neither engine owns the other.
pub(crate) struct Shared {
    pub device: Arc<dyn StorageDevice>,
    pub mode: AccessMode,
    pub append: bool,
    /// The application's view of the current position: advanced by
    /// accepted writes and delivered reads, rewritten by seek.
    pub logical: AtomicU64,
    /// Where the shim believes the backend cursor is. Updated under
    /// `device_lock`; trusted only to elide redundant seeks.
    pub physical: AtomicU64,
    /// Bumped by every event that invalidates prefetched bytes. A
    /// prefetch whose captured generation no longer matches at commit
    /// time is discarded.
    pub generation: AtomicU64,
    /// First backend failure, as a raw platform code; zero when clear.
    /// Once set it poisons every operation except close.
    pub sticky_error: AtomicI32,
    /// Serializes backend seek+op pairs: the backend cursor is shared
    /// mutable state between the flusher, the prefetcher and `seek`.
    /// Never acquired while holding a ring lock, except on the seek path
    /// where it is a leaf.
    pub device_lock: Mutex<()>,
    pub stats: Counters,
    pub write: Option<WriteEngine>,
    pub read: Option<ReadEngine>,
}

impl Shared {
    pub fn new(device: Arc<dyn StorageDevice>, options: &ConveyorOptions) -> Shared {
        Shared {
            device,
            mode: options.mode,
            append: options.append,
            logical: AtomicU64::new(0),
            physical: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            sticky_error: AtomicI32::new(0),
            device_lock: Mutex::new(()),
            stats: Counters::new(),
            write: options
                .mode
                .allows_writes()
                .then(|| WriteEngine::new(options.write_capacity)),
            read: options
                .mode
                .allows_reads()
                .then(|| ReadEngine::new(options.read_capacity)),
        }
    }

    pub fn sticky_code(&self) -> Option<i32> {
        let code = self.sticky_error.load(Ordering::Relaxed);
        (code != 0).then_some(code)
    }

    /// Fails fast with the latched error, if any.
    pub fn check_sticky(&self, op: &'static str) -> Result<()> {
        match self.sticky_code() {
            Some(code) => Err(Error::io_code(op, code)),
            None => Ok(()),
        }
    }

    /// Latches the first backend failure and wakes every waiter so blocked
    /// producers and consumers observe the poisoned state.
    pub fn latch_sticky(&self, context: &'static str, err: &std::io::Error) {
        let code = err.raw_os_error().unwrap_or(GENERIC_IO_ERRNO);
        if self
            .sticky_error
            .compare_exchange(0, code, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.stats.set_last_error(code);
            tracing::warn!(context, code, "backend failure latched; instance poisoned");
        }
        self.wake_all();
    }

    pub fn wake_all(&self) {
        if let Some(engine) = &self.write {
            engine.producer.notify_all();
            engine.consumer.notify_all();
        }
        if let Some(engine) = &self.read {
            engine.producer.notify_all();
            engine.consumer.notify_all();
        }
    }

    /// Invalidates the read ring after a write-side mutation: bumps the
    /// generation (so an in-flight prefetch discards its bytes), clears
    /// the ring and asks the prefetcher to re-home it.
    pub fn invalidate_read_ring(&self) {
        let Some(engine) = &self.read else {
            return;
        };
        self.generation.fetch_add(1, Ordering::Relaxed);
        let mut state = engine.state.lock().unwrap();
        state.ring.clear();
        state.stale = true;
        engine.producer.notify_all();
    }
}
