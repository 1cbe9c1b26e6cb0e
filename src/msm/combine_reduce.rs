//! Combine-reduce kernel: collapse per-bit partials into output points.
//!
//! For output `i` with partials p₀..p_{B−1}, computes
//! `R = p_{B−1} + 2·(p_{B−2} + 2·(… + 2·p₀))`, a left-to-right Horner
//! schedule on doubling. When the partials were accumulated in C chunks,
//! the chunk-strided copies of each bit are folded in before the doubling
//! step; chunk reduction is associative, so any chunking of the generator
//! axis yields the same output.

use crate::curve::Element;
use crate::exec::copy::{async_copy_device_to_host, strided_copy_host_to_device};
use crate::exec::scheduler::join_all;
use crate::exec::{
    await_stream, split, AsyncDeviceResource, DeviceVec, HostBuf, IndexRange, SplitOptions, Stream,
};

use rayon::prelude::*;

/// Horner reduction of one output. `partials` is chunk-major with
/// `num_partials` entries per chunk; this output's bit `j` for chunk `r`
/// lives at `partials[r * num_partials + base + j]`. A zero bit width
/// reduces to the identity.
fn combine_reduce_output<T: Element>(
    partials: &[T],
    num_partials: usize,
    reduction_size: usize,
    base: usize,
    bit_width: usize,
) -> T {
    if bit_width == 0 {
        return T::identity();
    }
    let top = base + bit_width - 1;
    let mut e = partials[top];
    for r in 1..reduction_size {
        let mut ep = partials[r * num_partials + top];
        T::add_inplace(&mut e, &mut ep);
    }
    for bit in (0..bit_width - 1).rev() {
        e = T::double(&e);
        for r in 0..reduction_size {
            let mut ep = partials[r * num_partials + base + bit];
            T::add_inplace(&mut e, &mut ep);
        }
    }
    e
}

/// Host reduction of single-chunk products into outputs.
pub fn reduce_products<T: Element>(res: &mut [T], bit_table: &[u32], products: &[T]) {
    assert_eq!(res.len(), bit_table.len());
    let prefix = prefix_sums(bit_table);
    assert_eq!(products.len(), prefix.last().copied().unwrap_or(0));
    res.par_iter_mut().enumerate().for_each(|(i, out)| {
        let base = if i == 0 { 0 } else { prefix[i - 1] };
        *out = combine_reduce_output(products, products.len(), 1, base, prefix[i] - base);
    });
}

fn prefix_sums(bit_table: &[u32]) -> Vec<usize> {
    let mut prefix = Vec::with_capacity(bit_table.len());
    let mut sum = 0usize;
    for &bits in bit_table {
        sum += bits as usize;
        prefix.push(sum);
    }
    prefix
}

/// Reduces device-resident partials directly, the single-chunk fast path:
/// no host-side partial buffer exists and the kernel runs in place.
#[tracing::instrument(skip_all)]
pub async fn combine_reduce_device<T: Element>(
    res: &mut [T],
    bit_table: &[u32],
    partials: &DeviceVec<T>,
) {
    let num_outputs = res.len();
    assert_eq!(bit_table.len(), num_outputs);
    if num_outputs == 0 {
        return;
    }
    let prefix = prefix_sums(bit_table);
    let num_partials = *prefix.last().expect("at least one output");
    assert!(num_partials > 0 && partials.len() % num_partials == 0);
    let reduction_size = partials.len() / num_partials;

    let stream = Stream::new();
    let resource = AsyncDeviceResource::new(&stream);
    let res_dev = resource.alloc::<T>(num_outputs);
    {
        let partials = partials.clone();
        let res_dev = res_dev.clone();
        let partials_len = partials.len();
        let prefix = prefix.clone();
        stream.exec(move || {
            // SAFETY: the partials were written by ops the caller has
            // already awaited; `res_dev` belongs to this kernel.
            let partials = unsafe { partials.slice(0, partials_len) };
            let out = unsafe { res_dev.slice_mut(0, num_outputs) };
            out.par_iter_mut().enumerate().for_each(|(i, slot)| {
                let base = if i == 0 { 0 } else { prefix[i - 1] };
                *slot = combine_reduce_output(
                    partials,
                    num_partials,
                    reduction_size,
                    base,
                    prefix[i] - base,
                );
            });
        });
    }
    let res_host = HostBuf::<T>::uninit(num_outputs);
    async_copy_device_to_host(&res_host, 0, &res_dev, 0, num_outputs, &stream);
    await_stream(&stream).await;
    // SAFETY: the copy above completed with the await.
    res.copy_from_slice(unsafe { res_host.slice(0, num_outputs) });
}

/// Reduces one chunk of outputs from host-resident partials: the output
/// range's strided slices move to the device through pinned staging, the
/// kernel reduces them, and the results copy back.
async fn combine_reduce_chunk<T: Element>(
    res: &mut [T],
    prefix: &[usize],
    partials: &HostBuf<T>,
    num_partials: usize,
    reduction_size: usize,
    partials_offset: usize,
) {
    let num_outputs = res.len();
    debug_assert_eq!(prefix.len(), num_outputs);
    debug_assert!(num_outputs > 0);
    let slice_num_partials = prefix[num_outputs - 1] - partials_offset;

    let stream = Stream::new();
    let resource = AsyncDeviceResource::new(&stream);
    let partials_dev = resource.alloc::<T>(slice_num_partials * reduction_size);
    strided_copy_host_to_device(
        &partials_dev,
        &stream,
        partials,
        num_partials,
        slice_num_partials,
        partials_offset,
    )
    .await;

    let res_dev = resource.alloc::<T>(num_outputs);
    {
        let partials_dev = partials_dev.clone();
        let res_dev = res_dev.clone();
        let prefix: Vec<usize> = prefix.to_vec();
        let partials_len = slice_num_partials * reduction_size;
        stream.exec(move || {
            // SAFETY: the strided copy settled before this op was issued;
            // `res_dev` belongs to this kernel.
            let partials = unsafe { partials_dev.slice(0, partials_len) };
            let out = unsafe { res_dev.slice_mut(0, num_outputs) };
            out.par_iter_mut().enumerate().for_each(|(i, slot)| {
                let base = if i == 0 {
                    0
                } else {
                    prefix[i - 1] - partials_offset
                };
                *slot = combine_reduce_output(
                    partials,
                    slice_num_partials,
                    reduction_size,
                    base,
                    prefix[i] - partials_offset - base,
                );
            });
        });
    }
    let res_host = HostBuf::<T>::uninit(num_outputs);
    async_copy_device_to_host(&res_host, 0, &res_dev, 0, num_outputs, &stream);
    await_stream(&stream).await;
    // SAFETY: the copy above completed with the await.
    res.copy_from_slice(unsafe { res_host.slice(0, num_outputs) });
}

/// Combines chunk-major host partials into the final outputs, splitting
/// the output axis across devices.
#[tracing::instrument(skip_all, fields(num_outputs = res.len()))]
pub async fn combine_reduce<T: Element>(
    res: &mut [T],
    options: SplitOptions,
    bit_table: &[u32],
    partials: &HostBuf<T>,
) {
    let num_outputs = res.len();
    assert_eq!(bit_table.len(), num_outputs);
    if num_outputs == 0 {
        return;
    }
    let prefix = prefix_sums(bit_table);
    let num_partials = *prefix.last().expect("at least one output");
    assert!(num_partials > 0 && partials.len() % num_partials == 0);
    let reduction_size = partials.len() / num_partials;

    let chunks: Vec<IndexRange> = split(IndexRange::new(0, num_outputs), options).collect();
    let mut tasks = Vec::with_capacity(chunks.len());
    let mut rest = res;
    for rng in chunks {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(rng.len());
        rest = tail;
        let prefix_chunk = &prefix[rng.a()..rng.b()];
        let partials_offset = if rng.a() == 0 { 0 } else { prefix[rng.a() - 1] };
        tasks.push(async move {
            combine_reduce_chunk(
                head,
                prefix_chunk,
                partials,
                num_partials,
                reduction_size,
                partials_offset,
            )
            .await;
        });
    }
    join_all(tasks).await;
}
