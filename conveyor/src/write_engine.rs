//! Write direction: producer-side enqueue and the background flusher.

use std::sync::atomic::Ordering;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

use conveyor_common::{Error, Result};
use conveyor_io::SeekFrom;

use crate::options::CapacityRange;
use crate::ring::Ring;
use crate::shared::{Lifecycle, Shared};

/// Consecutive producer full-waits before the ring doubles.
const FULL_WAIT_GROWTH_THRESHOLD: u32 = 4;

pub(crate) struct WriteEngine {
    pub state: Mutex<WriteState>,
    /// Waited on by callers: space freed, drain completed, stop, error.
    pub producer: Condvar,
    /// Waited on by the flusher: data buffered, force-flush, stop.
    pub consumer: Condvar,
}

pub(crate) struct WriteState {
    pub ring: Ring,
    pub force_flush: bool,
    /// Set while the flusher is inside a backend write. Bytes being
    /// written stay in the ring until accepted, so "drained" means the
    /// ring is empty *and* nothing is in flight.
    pub flush_in_flight: bool,
    pub stop: bool,
    pub lifecycle: Lifecycle,
    full_waits: u32,
}

impl WriteEngine {
    pub fn new(capacity: CapacityRange) -> WriteEngine {
        WriteEngine {
            state: Mutex::new(WriteState {
                ring: Ring::with_capacity(capacity.initial, capacity.max),
                force_flush: false,
                flush_in_flight: false,
                stop: false,
                lifecycle: Lifecycle::Idle,
                full_waits: 0,
            }),
            producer: Condvar::new(),
            consumer: Condvar::new(),
        }
    }
}

/// Buffers `buf` into the write ring, blocking while the ring is full and
/// the flusher is still draining. Returns the number of bytes accepted:
/// all of them in steady state, fewer only on shutdown or when the sticky
/// error latches mid-wait.
pub(crate) fn enqueue(shared: &Shared, buf: &[u8]) -> Result<usize> {
    let engine = shared.write.as_ref().expect("write engine present");
    shared.check_sticky("write")?;
    if buf.is_empty() {
        return Ok(0);
    }

    let mut accepted = 0usize;
    let mut state = engine.state.lock().unwrap();
    grow_for_request(&mut state, buf.len());
    while accepted < buf.len() && !state.stop {
        if shared.sticky_code().is_some() {
            break;
        }
        let logical = shared.logical.load(Ordering::Relaxed);
        if state.ring.is_empty() {
            state.ring.set_base_offset(logical);
        } else if state.ring.window_end() != logical {
            // pending bytes target an older window (a seek intervened);
            // they must drain before the ring re-homes
            state.force_flush = true;
            engine.consumer.notify_one();
            state = engine.producer.wait(state).unwrap();
            continue;
        }
        if state.ring.available() == 0 {
            state.full_waits += 1;
            if state.full_waits >= FULL_WAIT_GROWTH_THRESHOLD
                && state.ring.capacity() < state.ring.max_capacity()
            {
                let target = state.ring.capacity() * 2;
                state.ring.resize_to(target);
                state.full_waits = 0;
                tracing::debug!(
                    capacity = state.ring.capacity(),
                    "write ring grown under sustained pressure"
                );
                continue;
            }
            state = engine.producer.wait(state).unwrap();
            continue;
        }
        let n = state.ring.write(&buf[accepted..]);
        accepted += n;
        state.full_waits = 0;
        shared.logical.fetch_add(n as u64, Ordering::Relaxed);
        engine.consumer.notify_one();
    }
    drop(state);

    if accepted > 0 {
        shared.invalidate_read_ring();
    }
    Ok(accepted)
}

/// Grows the ring up front when a single request exceeds its capacity.
fn grow_for_request(state: &mut WriteState, requested: usize) {
    let capacity = state.ring.capacity();
    if requested > capacity && capacity < state.ring.max_capacity() {
        let target = (capacity * 2).max(requested);
        state.ring.resize_to(target);
        tracing::debug!(
            capacity = state.ring.capacity(),
            requested,
            "write ring grown for large request"
        );
    }
}

/// Drains the write ring to the backend, returning once every enqueued
/// byte is on the backend (or the engine is poisoned or stopping).
/// Idempotent on an empty ring.
pub(crate) fn flush(shared: &Shared) -> Result<()> {
    let Some(engine) = shared.write.as_ref() else {
        return Ok(());
    };
    shared.check_sticky("flush")?;

    let mut state = engine.state.lock().unwrap();
    state.force_flush = true;
    engine.consumer.notify_one();
    loop {
        if let Some(code) = shared.sticky_code() {
            return Err(Error::io_code("flush", code));
        }
        if (state.ring.is_empty() && !state.flush_in_flight) || state.stop {
            return Ok(());
        }
        state = engine.producer.wait(state).unwrap();
    }
}

/// The flusher task. Peeks the buffered span, performs one backend write
/// outside the ring lock, then consumes exactly what the backend accepted;
/// a short write leaves the suffix in place for the next pass.
pub(crate) fn run_flusher(shared: std::sync::Arc<Shared>) {
    let engine = shared.write.as_ref().expect("write engine present");
    let mut scratch: Vec<u8> = Vec::new();

    let mut state = engine.state.lock().unwrap();
    state.lifecycle = Lifecycle::Running;
    tracing::debug!(lifecycle = ?state.lifecycle, "flusher started");
    loop {
        while !(state.ring.len() > 0 || state.force_flush || state.stop) {
            state = engine.consumer.wait(state).unwrap();
        }
        if state.stop && state.ring.is_empty() {
            break;
        }
        if shared.sticky_code().is_some() {
            // poisoned: buffered bytes can never land; drop them and idle
            // until close
            state.ring.clear();
            state.force_flush = false;
            engine.producer.notify_all();
            continue;
        }
        state.force_flush = false;
        let n = state.ring.len();
        if n == 0 {
            // force-flush with nothing buffered
            engine.producer.notify_all();
            continue;
        }
        let target = state.ring.base_offset();
        scratch.resize(n, 0);
        let copied = state.ring.peek_at(target, &mut scratch[..n]);
        debug_assert_eq!(copied, n);
        state.flush_in_flight = true;
        drop(state);

        let start = Instant::now();
        let result = write_to_device(&shared, target, &scratch[..n]);

        state = engine.state.lock().unwrap();
        state.flush_in_flight = false;
        let mut flushed = 0usize;
        match result {
            Ok(written) => {
                state.ring.discard(written);
                shared.stats.record_flush(written, start.elapsed());
                if written < n {
                    shared.stats.add_short_write(n - written);
                    tracing::debug!(
                        requested = n,
                        accepted = written,
                        "short backend write; suffix retried"
                    );
                }
                flushed = written;
            }
            Err(err) => {
                shared.latch_sticky("flush", &err);
            }
        }
        engine.producer.notify_all();

        if flushed > 0 && shared.read.is_some() {
            // freshly durable bytes may shadow stale prefetched content
            drop(state);
            shared.invalidate_read_ring();
            state = engine.state.lock().unwrap();
        }
    }
    drop(state);
    tracing::debug!("flusher stopped");
}

/// One backend write under the device lock. In append mode the backend is
/// repositioned to end-of-stream and that offset becomes the destination;
/// otherwise the write lands at the recorded target.
fn write_to_device(shared: &Shared, target: u64, buf: &[u8]) -> std::io::Result<usize> {
    let _device = shared.device_lock.lock().unwrap();
    let dest = if shared.append {
        shared.device.seek(SeekFrom::End(0))?
    } else {
        if shared.physical.load(Ordering::Relaxed) != target {
            shared.device.seek(SeekFrom::Start(target))?;
        }
        target
    };
    let written = shared.device.write(buf)?;
    shared.physical.store(dest + written as u64, Ordering::Relaxed);
    Ok(written)
}
