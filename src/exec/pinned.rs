//! Fixed-capacity pinned host buffers with a thread-local pool.
//!
//! Host↔device transfers stage through page-locked buffers so copies can
//! run asynchronously with respect to the host. Allocations are modeled as
//! page-aligned blocks retained for the lifetime of the process: a released
//! buffer returns its block to the owning thread's free list, never to the
//! allocator, so a pointer handed to an in-flight stream op stays valid
//! unconditionally. What the protocol must still guarantee is that a block
//! is not refilled before the op reading it has completed.
//!
//! The pool is thread-local and must never be shared across threads.

use std::alloc::{alloc, Layout};
use std::cell::RefCell;
use std::ptr::NonNull;

/// Capacity of every pinned buffer, in bytes.
pub const PINNED_BUFFER_CAPACITY: usize = 64 * 1024;

const PINNED_BUFFER_ALIGN: usize = 4096;

struct Handle {
    ptr: NonNull<u8>,
}

thread_local! {
    static POOL: RefCell<Vec<Handle>> = const { RefCell::new(Vec::new()) };
}

fn acquire_handle() -> Handle {
    POOL.with_borrow_mut(|pool| {
        pool.pop().unwrap_or_else(|| {
            let layout = Layout::from_size_align(PINNED_BUFFER_CAPACITY, PINNED_BUFFER_ALIGN)
                .expect("static layout is valid");
            // SAFETY: layout has nonzero size.
            let ptr = unsafe { alloc(layout) };
            let Some(ptr) = NonNull::new(ptr) else {
                panic!("pinned buffer allocation failed");
            };
            Handle { ptr }
        })
    })
}

fn release_handle(handle: Handle) {
    POOL.with_borrow_mut(|pool| pool.push(handle));
}

/// Number of free buffers currently pooled on this thread.
pub fn pooled_buffer_count() -> usize {
    POOL.with_borrow(|pool| pool.len())
}

/// A pinned staging buffer holding `size` valid bytes out of
/// [`PINNED_BUFFER_CAPACITY`].
pub struct PinnedBuffer {
    handle: Handle,
    size: usize,
}

impl PinnedBuffer {
    pub fn new() -> Self {
        Self {
            handle: acquire_handle(),
            size: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub const fn capacity() -> usize {
        PINNED_BUFFER_CAPACITY
    }

    /// Largest element count of `T` a buffer can stage.
    pub fn element_capacity<T>() -> usize {
        PINNED_BUFFER_CAPACITY / std::mem::size_of::<T>()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.handle.ptr.as_ptr()
    }

    /// Appends elements from `src` until the buffer's element capacity is
    /// reached, returning the un-consumed tail of `src`.
    pub fn fill_from<'a, T: Copy>(&mut self, src: &'a [T]) -> &'a [T] {
        let elem_size = std::mem::size_of::<T>();
        debug_assert!(elem_size > 0 && self.size % elem_size == 0);
        let free = Self::element_capacity::<T>() - self.size / elem_size;
        let take = free.min(src.len());
        // SAFETY: the destination range lies within the allocation and the
        // buffer base is page-aligned, so `size` (a multiple of the element
        // size) keeps the write aligned.
        unsafe {
            let dst = self.handle.ptr.as_ptr().add(self.size) as *mut T;
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst, take);
        }
        self.size += take * elem_size;
        &src[take..]
    }

    pub fn reset(&mut self) {
        self.size = 0;
    }
}

impl Default for PinnedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PinnedBuffer {
    fn drop(&mut self) {
        release_handle(Handle {
            ptr: self.handle.ptr,
        });
    }
}
