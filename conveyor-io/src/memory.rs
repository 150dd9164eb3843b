//! An in-memory `StorageDevice` with simulated latency and fault injection.

use std::io::SeekFrom;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering},
};
use std::time::Duration;

use crate::StorageDevice;

/// An in-memory storage device.
///
/// The device models a slow remote object: a growable byte vector behind a
/// cursor, with optional per-direction latency and one-shot fault knobs so
/// tests can force the races the shim is built to survive. Writes past the
/// current end grow the contents (zero-filling any gap), reads past the end
/// report end of stream.
///
/// `share` produces a second device over the same contents with an
/// independent cursor, modeling two handles opened on one backend object.
pub struct MemoryDevice {
    contents: Arc<Mutex<Vec<u8>>>,
    cursor: Mutex<u64>,
    write_delay_us: AtomicU64,
    read_delay_us: AtomicU64,
    next_write_error: AtomicI32,
    next_read_error: AtomicI32,
    next_write_limit: AtomicUsize,
}

impl MemoryDevice {
    /// Creates a device holding `size` zero bytes.
    pub fn new(size: usize) -> MemoryDevice {
        MemoryDevice::with_contents(vec![0u8; size])
    }

    /// Creates a device over the given initial contents.
    pub fn with_contents(contents: Vec<u8>) -> MemoryDevice {
        MemoryDevice {
            contents: Arc::new(Mutex::new(contents)),
            cursor: Mutex::new(0),
            write_delay_us: AtomicU64::new(0),
            read_delay_us: AtomicU64::new(0),
            next_write_error: AtomicI32::new(0),
            next_read_error: AtomicI32::new(0),
            next_write_limit: AtomicUsize::new(usize::MAX),
        }
    }

    /// Returns a second view over the same contents with an independent
    /// cursor and fresh fault knobs.
    pub fn share(&self) -> MemoryDevice {
        MemoryDevice {
            contents: self.contents.clone(),
            cursor: Mutex::new(0),
            write_delay_us: AtomicU64::new(0),
            read_delay_us: AtomicU64::new(0),
            next_write_error: AtomicI32::new(0),
            next_read_error: AtomicI32::new(0),
            next_write_limit: AtomicUsize::new(usize::MAX),
        }
    }

    /// Current size of the contents.
    pub fn len(&self) -> usize {
        self.contents.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the full contents.
    pub fn contents(&self) -> Vec<u8> {
        self.contents.lock().unwrap().clone()
    }

    /// Applies a delay to every subsequent write call.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_us
            .store(delay.as_micros() as u64, Ordering::Relaxed);
    }

    /// Applies a delay to every subsequent read call.
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_us
            .store(delay.as_micros() as u64, Ordering::Relaxed);
    }

    /// Fails the next write call with the given platform error code.
    pub fn fail_next_write(&self, code: i32) {
        self.next_write_error.store(code, Ordering::Relaxed);
    }

    /// Fails the next read call with the given platform error code.
    pub fn fail_next_read(&self, code: i32) {
        self.next_read_error.store(code, Ordering::Relaxed);
    }

    /// Makes the next write call accept at most `limit` bytes.
    pub fn limit_next_write(&self, limit: usize) {
        self.next_write_limit.store(limit, Ordering::Relaxed);
    }

    fn sleep_for(delay_us: &AtomicU64) {
        let us = delay_us.load(Ordering::Relaxed);
        if us > 0 {
            std::thread::sleep(Duration::from_micros(us));
        }
    }
}

impl StorageDevice for MemoryDevice {
    fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        Self::sleep_for(&self.write_delay_us);

        let injected = self.next_write_error.swap(0, Ordering::Relaxed);
        if injected != 0 {
            return Err(std::io::Error::from_raw_os_error(injected));
        }
        let limit = self.next_write_limit.swap(usize::MAX, Ordering::Relaxed);

        let mut cursor = self.cursor.lock().unwrap();
        let mut contents = self.contents.lock().unwrap();
        let pos = *cursor as usize;
        let n = buf.len().min(limit);
        if pos + n > contents.len() {
            contents.resize(pos + n, 0);
        }
        contents[pos..pos + n].copy_from_slice(&buf[..n]);
        *cursor += n as u64;
        Ok(n)
    }

    fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        Self::sleep_for(&self.read_delay_us);

        let injected = self.next_read_error.swap(0, Ordering::Relaxed);
        if injected != 0 {
            return Err(std::io::Error::from_raw_os_error(injected));
        }

        let mut cursor = self.cursor.lock().unwrap();
        let contents = self.contents.lock().unwrap();
        let pos = *cursor as usize;
        if pos >= contents.len() {
            return Ok(0);
        }
        let n = buf.len().min(contents.len() - pos);
        buf[..n].copy_from_slice(&contents[pos..pos + n]);
        *cursor += n as u64;
        Ok(n)
    }

    fn seek(&self, pos: SeekFrom) -> std::io::Result<u64> {
        let mut cursor = self.cursor.lock().unwrap();
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => cursor.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let end = self.contents.lock().unwrap().len() as u64;
                end.checked_add_signed(delta)
            }
        };
        let new_pos = new_pos.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of device",
            )
        })?;
        *cursor = new_pos;
        Ok(new_pos)
    }
}
