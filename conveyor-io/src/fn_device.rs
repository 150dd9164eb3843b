//! An adapter that turns three plain callables into a `StorageDevice`.

use std::io::SeekFrom;

use crate::StorageDevice;

type WriteFn = dyn Fn(&[u8]) -> std::io::Result<usize> + Send + Sync;
type ReadFn = dyn Fn(&mut [u8]) -> std::io::Result<usize> + Send + Sync;
type SeekFn = dyn Fn(SeekFrom) -> std::io::Result<u64> + Send + Sync;

/// A `StorageDevice` assembled from three callables.
///
/// This is the injection point for storage layers that are reached through
/// free functions over some opaque handle rather than through a type of
/// their own: the closures capture the handle, and the device stores them
/// by value.
pub struct FnDevice {
    write_fn: Box<WriteFn>,
    read_fn: Box<ReadFn>,
    seek_fn: Box<SeekFn>,
}

impl FnDevice {
    /// Creates a device from positional write, read and seek callables.
    pub fn new<W, R, S>(write_fn: W, read_fn: R, seek_fn: S) -> FnDevice
    where
        W: Fn(&[u8]) -> std::io::Result<usize> + Send + Sync + 'static,
        R: Fn(&mut [u8]) -> std::io::Result<usize> + Send + Sync + 'static,
        S: Fn(SeekFrom) -> std::io::Result<u64> + Send + Sync + 'static,
    {
        FnDevice {
            write_fn: Box::new(write_fn),
            read_fn: Box::new(read_fn),
            seek_fn: Box::new(seek_fn),
        }
    }
}

impl StorageDevice for FnDevice {
    fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        (self.write_fn)(buf)
    }

    fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        (self.read_fn)(buf)
    }

    fn seek(&self, pos: SeekFrom) -> std::io::Result<u64> {
        (self.seek_fn)(pos)
    }
}

#[cfg(test)]
mod tests {
    use std::io::SeekFrom;
    use std::sync::{Arc, Mutex};

    use super::FnDevice;
    use crate::StorageDevice;

    #[test]
    fn closures_capture_the_handle() {
        let store = Arc::new(Mutex::new(Vec::<u8>::new()));

        let w = store.clone();
        let device = FnDevice::new(
            move |buf| {
                w.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            },
            |_buf| Ok(0),
            |pos| match pos {
                SeekFrom::Start(offset) => Ok(offset),
                _ => Ok(0),
            },
        );

        assert_eq!(device.write(b"abc").unwrap(), 3);
        assert_eq!(device.seek(SeekFrom::Start(7)).unwrap(), 7);
        assert_eq!(store.lock().unwrap().as_slice(), b"abc");
    }
}
