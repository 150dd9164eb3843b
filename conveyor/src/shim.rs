//! The public façade: argument validation, mode gating, worker lifecycle.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

use conveyor_common::{Error, Result};
use conveyor_io::{SeekFrom, StorageDevice};

use crate::options::ConveyorOptions;
use crate::read_engine;
use crate::shared::{Lifecycle, Shared};
use crate::stats::StatsSnapshot;
use crate::write_engine;

/// A buffered shim over a slow storage backend.
///
/// A conveyor binds one backend device, an access mode and two ring
/// buffers, and exposes a synchronous file-like surface whose latency is
/// dominated by memory copies: writes coalesce into large background
/// flushes, reads are served from a prefetched window, and bytes written
/// but not yet flushed are still visible to overlapping reads
/// (read-your-writes holds regardless of flush state).
///
/// The instance owns up to two long-lived worker threads, one per enabled
/// direction. All methods take `&self` and may be called from multiple
/// threads; each direction serializes through its own lock, and `seek`
/// serializes both.
///
/// The first backend failure poisons the instance: every subsequent
/// operation except `close` reports the latched error. Buffered data is
/// volatile — nothing survives the process — and two instances over the
/// same backend object are not coordinated: the outcome of concurrent
/// flushes to overlapping ranges is last-writer-wins.
pub struct Conveyor {
    shared: Arc<Shared>,
    flusher: Option<JoinHandle<()>>,
    prefetcher: Option<JoinHandle<()>>,
}

impl Conveyor {
    /// Opens a conveyor over `device` and starts the workers the access
    /// mode calls for.
    ///
    /// # Arguments
    ///
    /// * `device` - The backend to buffer. The conveyor assumes the
    ///   device cursor starts at offset zero.
    /// * `options` - Access mode, append flag and ring capacities.
    ///
    /// # Returns
    ///
    /// The running instance, or `InvalidArgument` when the options are
    /// inconsistent (zero capacity for an enabled direction, `max` below
    /// `initial`, append without write access).
    pub fn open(device: Arc<dyn StorageDevice>, options: ConveyorOptions) -> Result<Conveyor> {
        options.validate()?;
        let shared = Arc::new(Shared::new(device, &options));
        let mut conveyor = Conveyor {
            shared,
            flusher: None,
            prefetcher: None,
        };
        if conveyor.shared.write.is_some() {
            let shared = conveyor.shared.clone();
            let handle = std::thread::Builder::new()
                .name("conveyor-flusher".into())
                .spawn(move || write_engine::run_flusher(shared))
                .map_err(|err| Error::io("spawn flusher", err))?;
            conveyor.flusher = Some(handle);
        }
        if conveyor.shared.read.is_some() {
            let shared = conveyor.shared.clone();
            let handle = std::thread::Builder::new()
                .name("conveyor-prefetcher".into())
                .spawn(move || read_engine::run_prefetcher(shared))
                .map_err(|err| Error::io("spawn prefetcher", err))?;
            conveyor.prefetcher = Some(handle);
        }
        Ok(conveyor)
    }

    /// Buffers `buf` at the current position and returns the number of
    /// bytes accepted — all of them unless the instance is stopping or
    /// becomes poisoned mid-call.
    ///
    /// Blocks only while the write ring is full and the flusher is still
    /// draining, bounded by the backend latency of one flush cycle.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if !self.shared.mode.allows_writes() {
            return Err(Error::bad_mode("write"));
        }
        write_engine::enqueue(&self.shared, buf)
    }

    /// Reads from the current position into `buf`, returning the number
    /// of bytes produced; zero signals end of stream.
    ///
    /// Bytes overlapping unflushed writes are served from the write ring,
    /// so a `write` followed by a `read` of the same range observes the
    /// written bytes without waiting for a flush.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.shared.mode.allows_reads() {
            return Err(Error::bad_mode("read"));
        }
        read_engine::dequeue(&self.shared, buf)
    }

    /// Repositions the stream, returning the new absolute offset.
    ///
    /// On success both rings are re-homed: prefetched bytes are dropped
    /// (a prefetch in flight across the seek cannot contribute bytes
    /// afterwards) and pending writes drain to their previously recorded
    /// target. On failure nothing changes and the error is returned
    /// verbatim.
    ///
    /// `Start` and `Current` resolve locally — the workers reposition the
    /// backend lazily when their cursor belief disagrees with the next
    /// transfer, so no backend round-trip happens here. `End` consults
    /// the backend for the stream size.
    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        let shared = &self.shared;
        shared.check_sticky("seek")?;

        let read_engine = shared.read.as_ref();
        let write_engine = shared.write.as_ref();
        let mut read_state = read_engine.map(|engine| engine.state.lock().unwrap());
        let _write_state = write_engine.map(|engine| engine.state.lock().unwrap());

        let new_pos = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => shared
                .logical
                .load(Ordering::Relaxed)
                .checked_add_signed(delta)
                .ok_or_else(|| Error::io("seek", negative_seek_error()))?,
            SeekFrom::End(_) => {
                let _device = shared.device_lock.lock().unwrap();
                match shared.device.seek(pos) {
                    Ok(offset) => {
                        shared.physical.store(offset, Ordering::Relaxed);
                        offset
                    }
                    Err(err) => return Err(Error::io("seek", err)),
                }
            }
        };

        shared.logical.store(new_pos, Ordering::Relaxed);
        shared.generation.fetch_add(1, Ordering::Relaxed);

        if let (Some(engine), Some(state)) = (read_engine, read_state.as_mut()) {
            state.ring.clear();
            state.ring.set_base_offset(new_pos);
            state.stale = true;
            state.eof = false;
            state.seq_exhausts = 0;
            engine.producer.notify_all();
            engine.consumer.notify_all();
        }
        if let Some(engine) = write_engine {
            engine.producer.notify_all();
            engine.consumer.notify_all();
        }
        Ok(new_pos)
    }

    /// Drains the write ring to the backend.
    ///
    /// Returns once every byte accepted by `write` so far is on the
    /// backend; `Err` carries the latched error when the instance is
    /// poisoned. A no-op (beyond waking the workers) when nothing is
    /// buffered, or when the instance is read-only.
    pub fn flush(&self) -> Result<()> {
        write_engine::flush(&self.shared)
    }

    /// Snapshots and resets the instance counters.
    pub fn take_stats(&self) -> StatsSnapshot {
        self.shared.stats.take()
    }

    /// Closes the instance: drains the write ring, stops and joins both
    /// workers. Not retryable; dropping the instance does the same.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.flusher.is_some() {
            if let Some(engine) = &self.shared.write {
                engine.state.lock().unwrap().lifecycle = Lifecycle::Draining;
            }
            let _ = write_engine::flush(&self.shared);
        }
        if let Some(engine) = &self.shared.write {
            let mut state = engine.state.lock().unwrap();
            state.stop = true;
            engine.consumer.notify_all();
            engine.producer.notify_all();
        }
        if let Some(engine) = &self.shared.read {
            let mut state = engine.state.lock().unwrap();
            state.stop = true;
            engine.producer.notify_all();
            engine.consumer.notify_all();
        }
        if let Some(handle) = self.flusher.take() {
            let _ = handle.join();
            if let Some(engine) = &self.shared.write {
                engine.state.lock().unwrap().lifecycle = Lifecycle::Stopped;
            }
        }
        if let Some(handle) = self.prefetcher.take() {
            let _ = handle.join();
            if let Some(engine) = &self.shared.read {
                engine.state.lock().unwrap().lifecycle = Lifecycle::Stopped;
            }
        }
    }
}

impl Drop for Conveyor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn negative_seek_error() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        "seek before start of stream",
    )
}
