//! Recovery-style sequential scan: a prepopulated backend read to the end
//! of stream through a small, growing read ring.

use std::sync::Arc;

use conveyor::{AccessMode, CapacityRange, Conveyor, ConveyorOptions, MemoryDevice};

#[test]
fn sequential_read_recovers_existing_data() {
    let mut existing = Vec::new();
    for i in 0..5000 {
        existing.extend_from_slice(format!("REC{i}|").as_bytes());
    }

    let device = Arc::new(MemoryDevice::with_contents(existing.clone()));
    let conveyor = Conveyor::open(
        device,
        ConveyorOptions {
            mode: AccessMode::ReadOnly,
            read_capacity: CapacityRange::new(4096, 1024 * 1024),
            ..Default::default()
        },
    )
    .unwrap();

    let mut recovered = Vec::with_capacity(existing.len());
    let mut buf = [0u8; 1024];
    loop {
        let n = conveyor.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        recovered.extend_from_slice(&buf[..n]);
    }

    assert_eq!(recovered.len(), existing.len());
    assert_eq!(recovered, existing);
}
