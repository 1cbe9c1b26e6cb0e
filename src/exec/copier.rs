//! Chunked host→device copier.
//!
//! Streams an arbitrarily sized host span into a device destination through
//! two pinned buffers in rotation: the host fills one buffer while the
//! other's copy is in flight on the stream. At most one async copy is ever
//! outstanding against the buffers the copier owns, and source elements are
//! never reordered.
//!
//! Protocol, per `copy` call:
//! - fill `active` from the source; if the source runs dry before `active`
//!   fills, return with the pending elements staged;
//! - when `active` fills: if `alt` is non-empty, await the stream (the prior
//!   `alt`→device copy has then completed) and reset `alt`; issue the async
//!   `active`→device copy, advance the destination cursor, swap the buffers;
//! - once the staged elements exactly cover the rest of the destination:
//!   issue the final copy, await the stream, and reset both buffers.

use super::device::{DeviceVec, SendConstPtr};
use super::pinned::PinnedBuffer;
use super::stream::{await_stream, Stream};

pub struct ToDeviceCopier<'a, T: Copy + Send + 'static> {
    dst: DeviceVec<T>,
    stream: &'a Stream,
    /// Next destination element to write.
    position: usize,
    active: PinnedBuffer,
    alt: PinnedBuffer,
}

impl<'a, T: Copy + Send + 'static> ToDeviceCopier<'a, T> {
    pub fn new(dst: DeviceVec<T>, stream: &'a Stream) -> Self {
        assert!(PinnedBuffer::element_capacity::<T>() > 0);
        Self {
            dst,
            stream,
            position: 0,
            active: PinnedBuffer::new(),
            alt: PinnedBuffer::new(),
        }
    }

    fn staged(buffer: &PinnedBuffer) -> usize {
        buffer.size() / std::mem::size_of::<T>()
    }

    fn full(buffer: &PinnedBuffer) -> bool {
        Self::staged(buffer) == PinnedBuffer::element_capacity::<T>()
    }

    /// Issues the async copy of `active`'s staged elements and advances the
    /// destination cursor. The buffer must not be refilled until the stream
    /// has been awaited.
    fn issue_active(&mut self) {
        let count = Self::staged(&self.active);
        let src = SendConstPtr(self.active.as_ptr() as *const T);
        let dst = self.dst.clone();
        let position = self.position;
        self.stream.exec(move || {
            // Capture `src` as a whole value: RFC 2229 disjoint closure
            // captures would otherwise capture the `*const T` field alone,
            // discarding `SendConstPtr`'s manual `Send` impl.
            let src = src;
            // SAFETY: pinned allocations are retained for the process
            // lifetime and the copier does not refill this buffer before
            // awaiting the stream; the destination range belongs to this
            // copier's cursor alone.
            unsafe {
                let staged = std::slice::from_raw_parts(src.0, count);
                dst.slice_mut(position, count).copy_from_slice(staged);
            }
        });
        self.position += count;
    }

    /// Appends `src` to the device destination.
    pub async fn copy(&mut self, mut src: &[T]) {
        let remaining = self.dst.len() - self.position - Self::staged(&self.active);
        assert!(
            src.len() <= remaining,
            "copy would overrun the device destination"
        );
        if self.position == self.dst.len() {
            return;
        }
        loop {
            if src.is_empty() && Self::staged(&self.active) < self.dst.len() - self.position {
                return;
            }
            src = self.active.fill_from(src);
            if Self::staged(&self.active) == self.dst.len() - self.position {
                break;
            }
            if !Self::full(&self.active) {
                debug_assert!(src.is_empty());
                return;
            }
            if !self.alt.is_empty() {
                await_stream(self.stream).await;
                self.alt.reset();
            }
            self.issue_active();
            std::mem::swap(&mut self.active, &mut self.alt);
        }
        // The staged elements complete the destination: flush and settle.
        assert!(src.is_empty());
        self.issue_active();
        await_stream(self.stream).await;
        self.active.reset();
        self.alt.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::scheduler;

    fn copy_in_pieces(dst_len: usize, piece_len: usize) {
        let src: Vec<u8> = (0..dst_len).map(|i| i as u8).collect();
        let dst = DeviceVec::<u8>::uninit(dst_len);
        let stream = Stream::new();
        scheduler::run(async {
            let mut copier = ToDeviceCopier::new(dst.clone(), &stream);
            for piece in src.chunks(piece_len.max(1)) {
                copier.copy(piece).await;
            }
        });
        let copied = unsafe { dst.slice(0, dst_len) };
        assert_eq!(copied, &src[..]);
    }

    #[test]
    fn copies_smaller_than_one_buffer() {
        copy_in_pieces(17, 17);
        copy_in_pieces(17, 3);
    }

    #[test]
    fn copies_of_exactly_one_buffer() {
        copy_in_pieces(PinnedBuffer::capacity(), PinnedBuffer::capacity());
    }

    #[test]
    fn copies_larger_than_one_buffer() {
        copy_in_pieces(PinnedBuffer::capacity() + 1, PinnedBuffer::capacity() + 1);
    }

    #[test]
    fn copies_larger_than_two_buffers() {
        let len = 2 * PinnedBuffer::capacity() + 1;
        copy_in_pieces(len, len);
        copy_in_pieces(len, 1000);
    }

    #[test]
    fn wide_elements_stage_whole_elements_per_buffer() {
        let len = PinnedBuffer::element_capacity::<u64>() * 2 + 5;
        let src: Vec<u64> = (0..len as u64).collect();
        let dst = DeviceVec::<u64>::uninit(len);
        let stream = Stream::new();
        scheduler::run(async {
            let mut copier = ToDeviceCopier::new(dst.clone(), &stream);
            copier.copy(&src).await;
        });
        assert_eq!(unsafe { dst.slice(0, len) }, &src[..]);
    }

    #[test]
    #[should_panic(expected = "overrun")]
    fn copying_past_the_destination_panics() {
        let dst = DeviceVec::<u8>::uninit(4);
        let stream = Stream::new();
        scheduler::run(async {
            let mut copier = ToDeviceCopier::new(dst.clone(), &stream);
            copier.copy(&[0u8; 5]).await;
        });
    }
}
