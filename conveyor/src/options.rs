//! Open-time configuration for a conveyor instance.

use conveyor_common::{Result, verify_arg};

/// Which directions a conveyor instance serves.
///
/// Each permitted direction gets its own ring buffer and background worker;
/// the other direction's operations are rejected with a `BadMode` error
/// without touching the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn allows_reads(&self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub fn allows_writes(&self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

/// Initial and maximum capacity for one ring buffer.
///
/// The ring starts at `initial` bytes and grows adaptively under pressure,
/// doubling (or jumping straight to a large request) up to `max`. Equal
/// values disable growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityRange {
    pub initial: usize,
    pub max: usize,
}

impl CapacityRange {
    pub fn new(initial: usize, max: usize) -> CapacityRange {
        CapacityRange { initial, max }
    }

    /// A capacity range that never grows.
    pub fn fixed(capacity: usize) -> CapacityRange {
        CapacityRange {
            initial: capacity,
            max: capacity,
        }
    }
}

impl Default for CapacityRange {
    fn default() -> CapacityRange {
        CapacityRange::fixed(1024 * 1024)
    }
}

/// Configuration accepted by [`Conveyor::open`](crate::Conveyor::open).
#[derive(Debug, Clone)]
pub struct ConveyorOptions {
    pub mode: AccessMode,
    /// When set, every flush repositions the backend to end-of-stream
    /// before writing, regardless of prior seeks.
    pub append: bool,
    pub write_capacity: CapacityRange,
    pub read_capacity: CapacityRange,
}

impl Default for ConveyorOptions {
    fn default() -> ConveyorOptions {
        ConveyorOptions {
            mode: AccessMode::ReadWrite,
            append: false,
            write_capacity: CapacityRange::default(),
            read_capacity: CapacityRange::default(),
        }
    }
}

impl ConveyorOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.mode.allows_writes() {
            verify_arg!(write_capacity, self.write_capacity.initial >= 1);
            verify_arg!(
                write_capacity,
                self.write_capacity.max >= self.write_capacity.initial
            );
        }
        if self.mode.allows_reads() {
            verify_arg!(read_capacity, self.read_capacity.initial >= 1);
            verify_arg!(
                read_capacity,
                self.read_capacity.max >= self.read_capacity.initial
            );
        }
        verify_arg!(append, !self.append || self.mode.allows_writes());
        Ok(())
    }
}
