//! Access-mode gating and argument validation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use conveyor::{
    AccessMode, CapacityRange, Conveyor, ConveyorOptions, FnDevice, MemoryDevice, SeekFrom,
};

#[test]
fn write_on_read_only_is_rejected_without_backend_traffic() {
    let writes = Arc::new(AtomicUsize::new(0));
    let writes_seen = writes.clone();
    let device = FnDevice::new(
        move |buf| {
            writes_seen.fetch_add(1, Ordering::Relaxed);
            Ok(buf.len())
        },
        |_buf| Ok(0),
        |pos| match pos {
            SeekFrom::Start(offset) => Ok(offset),
            _ => Ok(0),
        },
    );

    let conveyor = Conveyor::open(
        Arc::new(device),
        ConveyorOptions {
            mode: AccessMode::ReadOnly,
            read_capacity: CapacityRange::fixed(4096),
            ..Default::default()
        },
    )
    .unwrap();

    let err = conveyor.write(b"test").unwrap_err();
    assert!(err.is_bad_mode());
    assert_eq!(writes.load(Ordering::Relaxed), 0);

    // flush on a read-only instance is a no-op, not an error
    conveyor.flush().unwrap();
}

#[test]
fn read_on_write_only_is_rejected_without_backend_traffic() {
    let reads = Arc::new(AtomicUsize::new(0));
    let reads_seen = reads.clone();
    let device = FnDevice::new(
        |buf| Ok(buf.len()),
        move |_buf| {
            reads_seen.fetch_add(1, Ordering::Relaxed);
            Ok(0)
        },
        |pos| match pos {
            SeekFrom::Start(offset) => Ok(offset),
            _ => Ok(0),
        },
    );

    let conveyor = Conveyor::open(
        Arc::new(device),
        ConveyorOptions {
            mode: AccessMode::WriteOnly,
            write_capacity: CapacityRange::fixed(4096),
            ..Default::default()
        },
    )
    .unwrap();

    let mut buf = [0u8; 10];
    let err = conveyor.read(&mut buf).unwrap_err();
    assert!(err.is_bad_mode());
    assert_eq!(reads.load(Ordering::Relaxed), 0);
}

#[test]
fn inconsistent_options_are_rejected_at_open() {
    let device = Arc::new(MemoryDevice::new(64));

    for options in [
        ConveyorOptions {
            mode: AccessMode::WriteOnly,
            write_capacity: CapacityRange::fixed(0),
            ..Default::default()
        },
        ConveyorOptions {
            mode: AccessMode::ReadOnly,
            read_capacity: CapacityRange::new(4096, 16),
            ..Default::default()
        },
        ConveyorOptions {
            mode: AccessMode::ReadOnly,
            append: true,
            ..Default::default()
        },
    ] {
        assert!(Conveyor::open(device.clone(), options).is_err());
    }
}

#[test]
fn zero_length_operations_are_no_ops() {
    let device = Arc::new(MemoryDevice::new(64));
    let conveyor = Conveyor::open(device, ConveyorOptions::default()).unwrap();

    assert_eq!(conveyor.write(&[]).unwrap(), 0);
    let mut empty = [0u8; 0];
    assert_eq!(conveyor.read(&mut empty).unwrap(), 0);
}
