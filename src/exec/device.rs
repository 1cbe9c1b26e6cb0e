//! Device memory and device enumeration.
//!
//! The engine targets machines where each "device" owns an ordered queue of
//! operations executing asynchronously from the host. This build models a
//! device queue with a dedicated executor thread per stream (see
//! [`stream`](super::stream)); device memory is a shared buffer that only
//! stream operations may touch while work is in flight.
//!
//! Access discipline: a buffer handed to a stream op must not be read or
//! written elsewhere until an event recorded after that op has been awaited.
//! The orchestration layers uphold this by construction (FIFO streams plus
//! explicit awaits); the unsafe accessors below exist for them alone.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::{Arc, OnceLock};

struct RawBuffer<T> {
    cells: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// Stream ops move buffer handles across the host/worker boundary. Aliased
// access is prevented by the stream ordering discipline, not by the type
// system.
unsafe impl<T: Send> Send for RawBuffer<T> {}
unsafe impl<T: Send> Sync for RawBuffer<T> {}

impl<T> RawBuffer<T> {
    fn uninit(len: usize) -> Self {
        let mut cells = Vec::with_capacity(len);
        cells.resize_with(len, || UnsafeCell::new(MaybeUninit::uninit()));
        Self {
            cells: cells.into_boxed_slice(),
        }
    }

    unsafe fn slice(&self, first: usize, count: usize) -> &[T] {
        let ptr = self.cells.as_ptr().add(first) as *const T;
        std::slice::from_raw_parts(ptr, count)
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn slice_mut(&self, first: usize, count: usize) -> &mut [T] {
        let ptr = self.cells.as_ptr().add(first) as *mut T;
        std::slice::from_raw_parts_mut(ptr, count)
    }
}

/// A span of device memory.
///
/// Cloning yields another handle to the same allocation; the memory is
/// released when the last handle drops. Entries are uninitialized until a
/// stream op writes them.
pub struct DeviceVec<T> {
    raw: Arc<RawBuffer<T>>,
}

impl<T> Clone for DeviceVec<T> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
        }
    }
}

impl<T: Copy + Send + 'static> DeviceVec<T> {
    pub fn uninit(len: usize) -> Self {
        Self {
            raw: Arc::new(RawBuffer::uninit(len)),
        }
    }

    pub fn len(&self) -> usize {
        self.raw.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Safety
    /// Every entry in `first..first + count` must have been written by an
    /// op that completed before this call, and no op writing the range may
    /// be in flight.
    pub(crate) unsafe fn slice(&self, first: usize, count: usize) -> &[T] {
        debug_assert!(first + count <= self.len());
        self.raw.slice(first, count)
    }

    /// # Safety
    /// No other access to `first..first + count` may be in flight.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slice_mut(&self, first: usize, count: usize) -> &mut [T] {
        debug_assert!(first + count <= self.len());
        self.raw.slice_mut(first, count)
    }
}

/// A host-resident buffer that device streams copy into.
///
/// Used for staging results back from device memory: per-chunk ops write
/// disjoint ranges, and the host reads only after awaiting every writer.
pub struct HostBuf<T> {
    raw: Arc<RawBuffer<T>>,
}

impl<T> Clone for HostBuf<T> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
        }
    }
}

impl<T: Copy + Send + 'static> HostBuf<T> {
    pub fn uninit(len: usize) -> Self {
        Self {
            raw: Arc::new(RawBuffer::uninit(len)),
        }
    }

    pub fn len(&self) -> usize {
        self.raw.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Safety
    /// See [`DeviceVec::slice`].
    pub(crate) unsafe fn slice(&self, first: usize, count: usize) -> &[T] {
        debug_assert!(first + count <= self.len());
        self.raw.slice(first, count)
    }

    /// # Safety
    /// See [`DeviceVec::slice_mut`].
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slice_mut(&self, first: usize, count: usize) -> &mut [T] {
        debug_assert!(first + count <= self.len());
        self.raw.slice_mut(first, count)
    }
}

/// Raw pointer wrapper that may cross into a stream op. The issuer
/// guarantees the referent outlives the op and is not aliased while the op
/// runs.
pub(crate) struct SendConstPtr<T>(pub *const T);
unsafe impl<T> Send for SendConstPtr<T> {}

static NUM_DEVICES: OnceLock<usize> = OnceLock::new();
static TOTAL_DEVICE_MEMORY: OnceLock<usize> = OnceLock::new();

/// Number of device queues kernels may be spread across. Drives the split
/// factor of the chunking policy.
pub fn num_devices() -> usize {
    *NUM_DEVICES.get_or_init(|| {
        std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(1)
    })
}

/// Overrides the detected device count. Effective only before the first
/// query; later calls are ignored.
pub fn set_num_devices(count: usize) {
    assert!(count > 0, "device count must be positive");
    let _ = NUM_DEVICES.set(count);
}

/// Memory available per device, used by the memory-aware split planner.
pub fn total_device_memory() -> usize {
    // 8 GiB unless configured, a conservative stand-in for enumeration.
    *TOTAL_DEVICE_MEMORY.get_or_init(|| 8 << 30)
}

pub fn set_total_device_memory(bytes: usize) {
    assert!(bytes > 0, "device memory must be positive");
    let _ = TOTAL_DEVICE_MEMORY.set(bytes);
}
