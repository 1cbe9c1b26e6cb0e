//! Copy helpers layered over the chunked copier.

use super::copier::ToDeviceCopier;
use super::device::{DeviceVec, HostBuf};
use super::stream::Stream;

/// Copies a host slice to a device buffer through pinned staging. The
/// source is consumed synchronously on the host; only staged pinned memory
/// is read by the stream.
pub async fn copy_host_slice_to_device<T: Copy + Send + 'static>(
    dst: &DeviceVec<T>,
    stream: &Stream,
    src: &[T],
) {
    assert_eq!(dst.len(), src.len());
    let mut copier = ToDeviceCopier::new(dst.clone(), stream);
    copier.copy(src).await;
}

/// Copies `dst.len() / slice_len` strided slices out of `src` to the
/// device: slice `r` covers `src[offset + r * stride..][..slice_len]`.
/// Used to pull one output range out of chunk-major partial products.
pub async fn strided_copy_host_to_device<T: Copy + Send + 'static>(
    dst: &DeviceVec<T>,
    stream: &Stream,
    src: &HostBuf<T>,
    stride: usize,
    slice_len: usize,
    offset: usize,
) {
    if dst.is_empty() {
        return;
    }
    assert!(slice_len > 0 && dst.len() % slice_len == 0);
    let count = dst.len() / slice_len;
    assert!(offset + (count - 1) * stride + slice_len <= src.len());
    let mut copier = ToDeviceCopier::new(dst.clone(), stream);
    for r in 0..count {
        // SAFETY: the caller has awaited every op that wrote `src`.
        let slice = unsafe { src.slice(offset + r * stride, slice_len) };
        copier.copy(slice).await;
    }
}

/// Enqueues a device→host copy of `src[src_first..src_first + count]` into
/// `dst[dst_first..]`. Completion is observed by awaiting the stream.
pub fn async_copy_device_to_host<T: Copy + Send + 'static>(
    dst: &HostBuf<T>,
    dst_first: usize,
    src: &DeviceVec<T>,
    src_first: usize,
    count: usize,
    stream: &Stream,
) {
    assert!(src_first + count <= src.len());
    assert!(dst_first + count <= dst.len());
    let dst = dst.clone();
    let src = src.clone();
    stream.exec(move || {
        // SAFETY: FIFO stream order places this op after the writes that
        // produced `src`; the destination range is owned by this copy until
        // the caller awaits the stream.
        unsafe {
            dst.slice_mut(dst_first, count)
                .copy_from_slice(src.slice(src_first, count));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::scheduler;
    use crate::exec::stream::await_stream;

    fn host_buf_from(values: &[u8]) -> HostBuf<u8> {
        let buf = HostBuf::uninit(values.len());
        unsafe { buf.slice_mut(0, values.len()).copy_from_slice(values) };
        buf
    }

    #[test]
    fn strided_copy_selects_every_other_element() {
        let src = host_buf_from(&[1, 2, 3, 4]);
        let dst = DeviceVec::<u8>::uninit(2);
        let stream = Stream::new();
        scheduler::run(strided_copy_host_to_device(&dst, &stream, &src, 2, 1, 0));
        assert_eq!(unsafe { dst.slice(0, 2) }, &[1, 3]);
    }

    #[test]
    fn strided_copy_honors_the_offset() {
        let src = host_buf_from(&[1, 2]);
        let dst = DeviceVec::<u8>::uninit(1);
        let stream = Stream::new();
        scheduler::run(strided_copy_host_to_device(&dst, &stream, &src, 1, 1, 1));
        assert_eq!(unsafe { dst.slice(0, 1) }, &[2]);
    }

    #[test]
    fn round_trip_through_device_memory() {
        let src: Vec<u8> = (0..100).collect();
        let dev = DeviceVec::<u8>::uninit(src.len());
        let back = HostBuf::<u8>::uninit(src.len());
        let stream = Stream::new();
        scheduler::run(async {
            copy_host_slice_to_device(&dev, &stream, &src).await;
            async_copy_device_to_host(&back, 0, &dev, 0, src.len(), &stream);
            await_stream(&stream).await;
        });
        assert_eq!(unsafe { back.slice(0, src.len()) }, &src[..]);
    }
}
