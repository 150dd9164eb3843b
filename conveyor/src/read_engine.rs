//! Read direction: consumer-side dequeue with the write-ring snoop, and
//! the background prefetcher.

use std::sync::atomic::Ordering;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

use conveyor_common::Result;
use conveyor_io::SeekFrom;

use crate::options::CapacityRange;
use crate::ring::Ring;
use crate::shared::{Lifecycle, Shared};

/// Consecutive ring-exhausting reads before the ring doubles.
const SEQ_EXHAUST_GROWTH_THRESHOLD: u32 = 3;

pub(crate) struct ReadEngine {
    pub state: Mutex<ReadState>,
    /// Waited on by the prefetcher: space, stale, need-fill, stop.
    pub producer: Condvar,
    /// Waited on by callers: data, end of stream, stop, error.
    pub consumer: Condvar,
}

pub(crate) struct ReadState {
    pub ring: Ring,
    /// Asks the prefetcher to discard the ring and re-home it at the
    /// current logical offset.
    pub stale: bool,
    pub need_fill: bool,
    pub eof: bool,
    pub stop: bool,
    pub lifecycle: Lifecycle,
    pub seq_exhausts: u32,
}

impl ReadEngine {
    pub fn new(capacity: CapacityRange) -> ReadEngine {
        ReadEngine {
            state: Mutex::new(ReadState {
                ring: Ring::with_capacity(capacity.initial, capacity.max),
                stale: false,
                need_fill: false,
                eof: false,
                stop: false,
                lifecycle: Lifecycle::Idle,
                seq_exhausts: 0,
            }),
            producer: Condvar::new(),
            consumer: Condvar::new(),
        }
    }
}

/// Fills `buf` from, in order of priority: the write ring (unflushed bytes
/// always win), the read ring, and the backend via the prefetcher.
/// Returns the number of bytes produced; zero means end of stream.
pub(crate) fn dequeue(shared: &Shared, buf: &mut [u8]) -> Result<usize> {
    let engine = shared.read.as_ref().expect("read engine present");
    shared.check_sticky("read")?;
    if buf.is_empty() {
        return Ok(0);
    }

    let mut produced = 0usize;
    let mut counted_exhaust = false;
    let mut state = engine.state.lock().unwrap();
    while produced < buf.len() && !state.stop {
        if shared.sticky_code().is_some() {
            break;
        }
        let logical = shared.logical.load(Ordering::Relaxed);

        let (snooped, hole) = peek_write_ring(shared, logical, &mut buf[produced..]);
        if snooped > 0 {
            produced += snooped;
            shared.logical.fetch_add(snooped as u64, Ordering::Relaxed);
            shared.stats.add_bytes_read(snooped);
            continue;
        }

        if !state.ring.is_empty() {
            let base = state.ring.base_offset();
            if logical > base {
                // the snoop advanced past these bytes; drop them
                let behind = ((logical - base) as usize).min(state.ring.len());
                state.ring.discard(behind);
                engine.producer.notify_one();
                continue;
            }
            if logical == base {
                // serve from the ring, but never across the start of the
                // write ring's window: those bytes must come from it
                let mut limit = buf.len() - produced;
                if let Some(hole_start) = hole {
                    limit = (limit as u64).min(hole_start - logical) as usize;
                }
                let n = state.ring.read(&mut buf[produced..produced + limit]);
                if n > 0 {
                    produced += n;
                    shared.logical.fetch_add(n as u64, Ordering::Relaxed);
                    shared.stats.add_bytes_read(n);
                    engine.producer.notify_one();
                    continue;
                }
            } else {
                // ring is ahead of the request; discard and re-home
                shared.generation.fetch_add(1, Ordering::Relaxed);
                state.ring.clear();
                state.stale = true;
                state.eof = false;
            }
        }

        if state.eof {
            break;
        }

        if !counted_exhaust {
            counted_exhaust = true;
            state.seq_exhausts += 1;
        }
        maybe_grow_read_ring(&mut state, buf.len() - produced);
        state.need_fill = true;
        engine.producer.notify_one();
        state = engine.consumer.wait(state).unwrap();
    }
    if !counted_exhaust {
        state.seq_exhausts = 0;
    }
    drop(state);

    if produced == 0 {
        shared.check_sticky("read")?;
    }
    Ok(produced)
}

/// Copies unflushed write-ring bytes covering `offset` into `dst`.
///
/// Returns the bytes copied, plus — when nothing was copied because the
/// write window starts beyond `offset` — the offset where that window
/// begins, so the caller can cap read-ring consumption at the boundary.
fn peek_write_ring(shared: &Shared, offset: u64, dst: &mut [u8]) -> (usize, Option<u64>) {
    let Some(engine) = shared.write.as_ref() else {
        return (0, None);
    };
    let state = engine.state.lock().unwrap();
    let copied = state.ring.peek_at(offset, dst);
    let hole = (copied == 0 && !state.ring.is_empty() && state.ring.base_offset() > offset)
        .then(|| state.ring.base_offset());
    (copied, hole)
}

/// Sequential-access growth heuristic: grow immediately for a request the
/// ring cannot hold, or double after enough consecutive exhausting reads.
fn maybe_grow_read_ring(state: &mut ReadState, want: usize) {
    let capacity = state.ring.capacity();
    if capacity >= state.ring.max_capacity() {
        return;
    }
    if want > capacity {
        let target = (capacity * 2).max(want);
        state.ring.resize_to(target);
        state.seq_exhausts = 0;
        tracing::debug!(
            capacity = state.ring.capacity(),
            want,
            "read ring grown for large request"
        );
    } else if state.seq_exhausts >= SEQ_EXHAUST_GROWTH_THRESHOLD {
        let target = capacity * 2;
        state.ring.resize_to(target);
        state.seq_exhausts = 0;
        tracing::debug!(
            capacity = state.ring.capacity(),
            "read ring grown after sequential exhaustion"
        );
    }
}

/// The prefetcher task. Keeps the read ring topped up from the backend;
/// a fetch that lands after a generation bump is discarded, since its
/// bytes belong to an invalidated address range.
pub(crate) fn run_prefetcher(shared: std::sync::Arc<Shared>) {
    let engine = shared.read.as_ref().expect("read engine present");
    let mut scratch: Vec<u8> = Vec::new();

    let mut state = engine.state.lock().unwrap();
    state.lifecycle = Lifecycle::Running;
    tracing::debug!(lifecycle = ?state.lifecycle, "prefetcher started");
    loop {
        while !(state.stop
            || state.stale
            || state.need_fill
            || (state.ring.available() > 0 && !state.eof))
        {
            state = engine.producer.wait(state).unwrap();
        }
        if state.stop {
            break;
        }
        if state.stale {
            let logical = shared.logical.load(Ordering::Relaxed);
            state.ring.clear();
            state.ring.set_base_offset(logical);
            state.stale = false;
            state.eof = false;
        }
        state.need_fill = false;
        if state.ring.available() == 0 || state.eof {
            engine.consumer.notify_all();
            continue;
        }

        let fetch_at = state.ring.window_end();
        let want = state.ring.available();
        let generation = shared.generation.load(Ordering::Relaxed);
        drop(state);

        scratch.resize(want, 0);
        let start = Instant::now();
        let result = read_from_device(&shared, fetch_at, &mut scratch[..want]);

        state = engine.state.lock().unwrap();
        match result {
            Ok(count) => {
                shared.stats.record_fetch(start.elapsed());
                if shared.generation.load(Ordering::Relaxed) != generation {
                    tracing::trace!(bytes = count, "prefetch discarded after invalidation");
                } else if count == 0 {
                    state.eof = true;
                } else {
                    let appended = state.ring.write(&scratch[..count]);
                    debug_assert_eq!(appended, count);
                }
            }
            Err(err) => {
                shared.latch_sticky("prefetch", &err);
            }
        }
        engine.consumer.notify_all();
    }
    drop(state);
    tracing::debug!("prefetcher stopped");
}

/// One backend read under the device lock, seeking first iff the cursor
/// belief disagrees with the fetch position.
fn read_from_device(shared: &Shared, fetch_at: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    let _device = shared.device_lock.lock().unwrap();
    if shared.physical.load(Ordering::Relaxed) != fetch_at {
        shared.device.seek(SeekFrom::Start(fetch_at))?;
    }
    let count = shared.device.read(buf)?;
    shared
        .physical
        .store(fetch_at + count as u64, Ordering::Relaxed);
    Ok(count)
}
