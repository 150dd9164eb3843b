//! Buffered I/O shim for slow storage backends.
//!
//! A [`Conveyor`] wraps a high-latency byte-addressable backend — a network
//! file system, an object-store gateway, a remote WAL device — behind a
//! synchronous file-like interface. Small chatty operations land in ring
//! buffers; a background flusher coalesces writes into large backend
//! flushes and a background prefetcher keeps a read-ahead window warm, so
//! the caller's critical path never blocks on the backend while the
//! working set fits in memory.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use conveyor::{Conveyor, ConveyorOptions, MemoryDevice, SeekFrom};
//!
//! # fn main() -> conveyor::Result<()> {
//! let device = Arc::new(MemoryDevice::new(1024 * 1024));
//! let conveyor = Conveyor::open(device, ConveyorOptions::default())?;
//!
//! conveyor.write(b"hello")?;
//! conveyor.seek(SeekFrom::Start(0))?;
//! let mut buf = [0u8; 5];
//! conveyor.read(&mut buf)?; // b"hello", flushed or not
//! conveyor.close();
//! # Ok(())
//! # }
//! ```

mod options;
mod read_engine;
mod ring;
mod shared;
mod shim;
mod stats;
mod write_engine;

pub use conveyor_common::{Error, ErrorKind, Result};
pub use conveyor_io::{FnDevice, MemoryDevice, SeekFrom, StorageDevice};
pub use options::{AccessMode, CapacityRange, ConveyorOptions};
pub use shim::Conveyor;
pub use stats::StatsSnapshot;
