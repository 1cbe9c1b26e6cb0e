//! Stream-scoped device allocator.
//!
//! Allocations made against a resource stay live until every op issued on
//! the resource's stream before the resource dropped has completed: the
//! release is itself a stream op, so it runs after any kernel still using
//! the memory. Scope one resource to one task.

use std::cell::RefCell;

use super::device::DeviceVec;
use super::stream::Stream;

pub struct AsyncDeviceResource<'a> {
    stream: &'a Stream,
    live: RefCell<Vec<Box<dyn Send>>>,
}

impl<'a> AsyncDeviceResource<'a> {
    pub fn new(stream: &'a Stream) -> Self {
        Self {
            stream,
            live: RefCell::new(Vec::new()),
        }
    }

    /// Allocates device memory whose release is ordered after the stream's
    /// outstanding work.
    pub fn alloc<T: Copy + Send + 'static>(&self, len: usize) -> DeviceVec<T> {
        let buffer = DeviceVec::uninit(len);
        self.live.borrow_mut().push(Box::new(buffer.clone()));
        buffer
    }
}

impl Drop for AsyncDeviceResource<'_> {
    fn drop(&mut self) {
        let live = std::mem::take(&mut *self.live.borrow_mut());
        if !live.is_empty() {
            self.stream.exec(move || drop(live));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::scheduler;
    use crate::exec::stream::await_stream;
    use std::sync::{Arc, Mutex};

    #[test]
    fn allocations_outlive_queued_ops() {
        let stream = Stream::new();
        let observed = Arc::new(Mutex::new(0u64));
        {
            let resource = AsyncDeviceResource::new(&stream);
            let buffer = resource.alloc::<u64>(8);
            {
                let buffer = buffer.clone();
                stream.exec(move || unsafe { buffer.slice_mut(0, 8).fill(41) });
            }
            {
                let buffer = buffer.clone();
                let observed = Arc::clone(&observed);
                stream.exec(move || {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    *observed.lock().unwrap() = unsafe { buffer.slice(0, 8)[7] };
                });
            }
            drop(buffer);
            // The resource drops here with ops still queued; the release op
            // trails them on the stream.
        }
        scheduler::run(await_stream(&stream));
        assert_eq!(*observed.lock().unwrap(), 41);
    }
}
