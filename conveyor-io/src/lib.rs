//! The storage backend contract for the conveyor shim:
//! - `StorageDevice`: cursor-positional reader/writer/seeker over an opaque
//!   storage object (a file descriptor, an object-store gateway connection,
//!   a remote WAL device).
//! - `FnDevice`: an adapter turning three plain callables into a device.
//! - `MemoryDevice`: an in-memory device with latency and fault injection,
//!   used by tests and benchmarks.

use std::sync::Arc;

pub use std::io::SeekFrom;

pub mod fn_device;
pub mod memory;

pub use fn_device::FnDevice;
pub use memory::MemoryDevice;

/// A slow, byte-addressable storage backend with a single cursor.
///
/// All three operations act at the device's current cursor position, the
/// way the positional-I/O primitives of a file descriptor do. The shim
/// serializes its own access to the cursor; implementations only need
/// interior mutability, not coordination between callers.
pub trait StorageDevice: Send + Sync + 'static {
    /// Writes the buffer at the current cursor, advancing it by the number
    /// of bytes accepted. May accept fewer bytes than offered.
    fn write(&self, buf: &[u8]) -> std::io::Result<usize>;

    /// Reads into the buffer from the current cursor, advancing it by the
    /// number of bytes produced. `Ok(0)` signals end of stream.
    fn read(&self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Repositions the cursor and returns the new absolute offset.
    fn seek(&self, pos: SeekFrom) -> std::io::Result<u64>;
}

impl<T> StorageDevice for Arc<T>
where
    T: StorageDevice + ?Sized,
{
    fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.as_ref().write(buf)
    }

    fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.as_ref().read(buf)
    }

    fn seek(&self, pos: SeekFrom) -> std::io::Result<u64> {
        self.as_ref().seek(pos)
    }
}
