//! Consistency under a slow backend: read-your-writes, snoop overlap,
//! seek invalidation and sticky error propagation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use conveyor::{CapacityRange, Conveyor, ConveyorOptions, MemoryDevice, SeekFrom};

const EIO: i32 = 5;

fn open_rw(device: &Arc<MemoryDevice>) -> Conveyor {
    Conveyor::open(
        device.clone(),
        ConveyorOptions {
            write_capacity: CapacityRange::fixed(4096),
            read_capacity: CapacityRange::fixed(4096),
            ..Default::default()
        },
    )
    .unwrap()
}

// Data written is immediately readable, even while the backend write is
// still in flight.
#[test]
fn immediate_read_after_write() {
    let device = Arc::new(MemoryDevice::new(1024 * 1024));
    device.set_write_delay(Duration::from_millis(50));
    let conveyor = open_rw(&device);

    let payload = b"ConsistencyCheckPayload";
    assert_eq!(conveyor.write(payload).unwrap(), payload.len());

    let start = Instant::now();
    conveyor.seek(SeekFrom::Start(0)).unwrap();
    let mut buf = vec![0u8; payload.len()];
    assert_eq!(conveyor.read(&mut buf).unwrap(), payload.len());
    assert_eq!(buf.as_slice(), payload);
    assert!(
        start.elapsed() < Duration::from_millis(45),
        "read served from the write ring must not wait out the flush"
    );
}

// Writing past the backend's end and reading it back sources the bytes
// from the write ring, not from backend end-of-stream.
#[test]
fn append_past_end_of_backend() {
    let device = Arc::new(MemoryDevice::new(1024 * 1024));
    device.set_write_delay(Duration::from_millis(50));
    let conveyor = open_rw(&device);

    let far = 2 * 1024 * 1024;
    conveyor.seek(SeekFrom::Start(far)).unwrap();
    let payload = b"NewDataAtEOF";
    conveyor.write(payload).unwrap();

    conveyor.seek(SeekFrom::Start(far)).unwrap();
    let mut buf = vec![0u8; payload.len()];
    assert_eq!(conveyor.read(&mut buf).unwrap(), payload.len());
    assert_eq!(buf.as_slice(), payload);
}

// A prefetch in flight before a seek cannot contribute bytes after it.
#[test]
fn seek_invalidates_slow_prefetch() {
    let mut contents = vec![0u8; 1024 * 1024];
    contents[..4].copy_from_slice(b"AAAA");
    contents[5000..5004].copy_from_slice(b"BBBB");
    let device = Arc::new(MemoryDevice::with_contents(contents));
    device.set_read_delay(Duration::from_millis(100));
    let conveyor = open_rw(&device);

    conveyor.seek(SeekFrom::Start(0)).unwrap();
    let mut byte = [0u8; 1];
    assert_eq!(conveyor.read(&mut byte).unwrap(), 1);
    assert_eq!(&byte, b"A");

    conveyor.seek(SeekFrom::Start(5000)).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(conveyor.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"BBBB", "stale bytes from the previous offset leaked");
}

// A background write failure is reported on the next operation and stays
// latched until close.
#[test]
fn async_write_error_is_sticky() {
    let device = Arc::new(MemoryDevice::new(1024 * 1024));
    device.set_write_delay(Duration::from_millis(20));
    let conveyor = open_rw(&device);

    assert_eq!(conveyor.write(b"Good").unwrap(), 4);
    device.fail_next_write(EIO);
    assert_eq!(conveyor.write(b"Bad").unwrap(), 3);

    std::thread::sleep(Duration::from_millis(150));

    let mut buf = [0u8; 10];
    let err = conveyor.read(&mut buf).unwrap_err();
    assert_eq!(err.os_code(), Some(EIO));

    let err = conveyor.write(b"More").unwrap_err();
    assert_eq!(err.os_code(), Some(EIO));

    let err = conveyor.flush().unwrap_err();
    assert_eq!(err.os_code(), Some(EIO));

    assert_eq!(conveyor.take_stats().last_error_code, Some(EIO));
}

// A failing prefetch poisons the instance the same way.
#[test]
fn async_read_error_is_sticky() {
    let device = Arc::new(MemoryDevice::with_contents(vec![7u8; 8192]));
    let conveyor = open_rw(&device);

    device.fail_next_read(EIO);
    let mut buf = [0u8; 64];
    // the first read may race the eager prefetch; poll until the latch
    // becomes visible
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match conveyor.read(&mut buf) {
            Err(err) => {
                assert_eq!(err.os_code(), Some(EIO));
                break;
            }
            Ok(_) => {
                assert!(Instant::now() < deadline, "error never surfaced");
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
    let err = conveyor.write(b"x").unwrap_err();
    assert_eq!(err.os_code(), Some(EIO));
}

// Reads mix backend bytes with unflushed overlapping writes: the write
// ring wins over both the read ring and the backend.
#[test]
fn interleaved_snoop_overlap() {
    let device = Arc::new(MemoryDevice::with_contents(b"DDDDDDDDDD".to_vec()));
    device.set_write_delay(Duration::from_millis(50));
    let conveyor = open_rw(&device);

    conveyor.seek(SeekFrom::Start(2)).unwrap();
    conveyor.write(b"WW").unwrap();
    conveyor.seek(SeekFrom::Start(6)).unwrap();
    conveyor.write(b"ZZ").unwrap();
    conveyor.seek(SeekFrom::Start(0)).unwrap();

    let mut buf = [0u8; 10];
    assert_eq!(conveyor.read(&mut buf).unwrap(), 10);
    assert_eq!(&buf, b"DDWWDDZZDD");
}

// Round-trip survives the write crossing the backend between the write
// and the read.
#[test]
fn roundtrip_across_flush_boundary() {
    let device = Arc::new(MemoryDevice::new(4096));
    let conveyor = open_rw(&device);

    conveyor.write(b"payload-one").unwrap();
    conveyor.flush().unwrap();
    conveyor.write(b"payload-two").unwrap();

    conveyor.seek(SeekFrom::Start(0)).unwrap();
    let mut buf = [0u8; 22];
    assert_eq!(conveyor.read(&mut buf).unwrap(), 22);
    assert_eq!(&buf, b"payload-onepayload-two");
}
