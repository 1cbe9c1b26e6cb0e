//! Variable-length multiexponentiation over precomputed partition tables.
//!
//! The generator axis splits into window-aligned chunks sized by the
//! fabric's split policy. Each chunk pipelines scalars to the device,
//! then table windows, the partition-product kernel, and the partials
//! back to the host, FIFO on its own streams; chunks proceed
//! concurrently. A final
//! combine-reduce folds the chunk partials into the output points. When
//! everything fits one chunk, the partials stay on device and the combine
//! runs in place without a host-side partial buffer.

pub mod combine_reduce;
pub mod partition_product;
pub mod product_length;

use crate::curve::Element;
use crate::exec::copy::async_copy_device_to_host;
use crate::exec::scheduler::concurrent_for_each;
use crate::exec::{await_stream, device, split, DeviceVec, HostBuf, IndexRange, SplitOptions, Stream};
use crate::table::{PartitionTableAccessor, WINDOW_WIDTH};

pub use combine_reduce::{combine_reduce, combine_reduce_device, reduce_products};
pub use partition_product::{async_partition_product, partition_product};
pub use product_length::{compute_product_length_table, count_products};

fn default_split_options() -> SplitOptions {
    SplitOptions {
        min_chunk_size: 64,
        max_chunk_size: 1024,
        split_factor: device::num_devices(),
    }
}

fn combine_split_options() -> SplitOptions {
    SplitOptions {
        min_chunk_size: 1,
        max_chunk_size: 1024,
        split_factor: device::num_devices(),
    }
}

/// Derives the generator count from the packed scalar stream.
fn packed_length(num_products: usize, scalars: &[u8]) -> usize {
    let num_output_bytes = num_products.div_ceil(8);
    assert!(
        num_output_bytes > 0 && scalars.len() % num_output_bytes == 0,
        "scalar stream does not hold whole generator records"
    );
    scalars.len() / num_output_bytes
}

/// Computes this chunk's partial products into device memory.
async fn async_partition_product_chunk<T: Element>(
    products: &DeviceVec<T>,
    accessor: &impl PartitionTableAccessor<T>,
    bit_table: &[u32],
    output_lengths: &[u32],
    scalars: &[u8],
    first: usize,
    length: usize,
) {
    let product_lengths =
        compute_product_length_table(bit_table, output_lengths, first, length);
    async_partition_product(products, accessor, scalars, &product_lengths, first).await;
}

async fn multiexponentiate_impl<T: Element>(
    res: &mut [T],
    options: SplitOptions,
    accessor: &impl PartitionTableAccessor<T>,
    bit_table: &[u32],
    output_lengths: &[u32],
    scalars: &[u8],
) {
    let num_outputs = res.len();
    if num_outputs == 0 {
        return;
    }
    assert_eq!(bit_table.len(), num_outputs);
    assert_eq!(output_lengths.len(), num_outputs);
    let num_products = count_products(bit_table);
    if num_products == 0 {
        res.fill(T::identity());
        return;
    }
    let n = packed_length(num_products, scalars);
    if n == 0 {
        res.fill(T::identity());
        return;
    }
    assert!(
        n <= accessor.window_count() * WINDOW_WIDTH,
        "scalar stream is longer than the precomputed generator set"
    );
    for &length in output_lengths {
        assert!(length as usize <= n, "output length exceeds the stream");
    }
    let num_output_bytes = num_products.div_ceil(8);

    // Split by groups of generators so that a single chunk processes every
    // output for those generators; that keeps each precomputed window's
    // trip to the device unique.
    let chunks: Vec<IndexRange> =
        split(IndexRange::new(0, n).chunk_multiple(WINDOW_WIDTH), options).collect();
    tracing::info!(
        num_products,
        n,
        num_chunks = chunks.len(),
        "computing bitwise multiexponentiation products"
    );

    if chunks.len() == 1 {
        let partials = DeviceVec::<T>::uninit(num_products);
        async_partition_product_chunk(
            &partials,
            accessor,
            bit_table,
            output_lengths,
            scalars,
            0,
            n,
        )
        .await;
        combine_reduce_device(res, bit_table, &partials).await;
        return;
    }

    let num_chunks = chunks.len();
    let partials = HostBuf::<T>::uninit(num_products * num_chunks);
    concurrent_for_each(chunks.into_iter().enumerate(), |(chunk_index, rng)| {
        let partials = partials.clone();
        async move {
            tracing::debug!(
                first = rng.a(),
                last = rng.b(),
                "computing multiproducts for a generator chunk"
            );
            let partials_dev = DeviceVec::<T>::uninit(num_products);
            let scalars_slice =
                &scalars[num_output_bytes * rng.a()..num_output_bytes * rng.b()];
            async_partition_product_chunk(
                &partials_dev,
                accessor,
                bit_table,
                output_lengths,
                scalars_slice,
                rng.a(),
                rng.len(),
            )
            .await;
            let stream = Stream::new();
            async_copy_device_to_host(
                &partials,
                num_products * chunk_index,
                &partials_dev,
                0,
                num_products,
                &stream,
            );
            await_stream(&stream).await;
        }
    })
    .await;

    tracing::info!(num_chunks, "combining partial product chunks");
    combine_reduce(res, combine_split_options(), bit_table, &partials).await;
}

/// Computes a varying-length multiexponentiation on the device pipeline.
///
/// `scalars` is the packed stream: one `⌈ΣBᵢ/8⌉`-byte record per
/// generator, output bit fields concatenated LSB-first in output order.
/// Output `i` sums its first `output_lengths[i]` generators.
#[tracing::instrument(skip_all, fields(num_outputs = res.len()))]
pub async fn async_multiexponentiate<T: Element>(
    res: &mut [T],
    accessor: &impl PartitionTableAccessor<T>,
    bit_table: &[u32],
    output_lengths: &[u32],
    scalars: &[u8],
) {
    multiexponentiate_impl(
        res,
        default_split_options(),
        accessor,
        bit_table,
        output_lengths,
        scalars,
    )
    .await;
}

/// Host version of [`async_multiexponentiate`]: the whole computation runs
/// on the calling thread against a host view of the table.
#[tracing::instrument(skip_all, fields(num_outputs = res.len()))]
pub fn multiexponentiate<T: Element>(
    res: &mut [T],
    accessor: &impl PartitionTableAccessor<T>,
    bit_table: &[u32],
    output_lengths: &[u32],
    scalars: &[u8],
) {
    let num_outputs = res.len();
    if num_outputs == 0 {
        return;
    }
    assert_eq!(bit_table.len(), num_outputs);
    assert_eq!(output_lengths.len(), num_outputs);
    let num_products = count_products(bit_table);
    if num_products == 0 {
        res.fill(T::identity());
        return;
    }
    let n = packed_length(num_products, scalars);
    assert!(
        n <= accessor.window_count() * WINDOW_WIDTH,
        "scalar stream is longer than the precomputed generator set"
    );
    for &length in output_lengths {
        assert!(length as usize <= n, "output length exceeds the stream");
    }

    let product_lengths = compute_product_length_table(bit_table, output_lengths, 0, n);
    let mut products = vec![T::identity(); num_products];
    partition_product(&mut products, accessor, scalars, &product_lengths, 0);
    tracing::debug!(num_products, num_outputs, "reducing products to outputs");
    reduce_products(res, bit_table, &products);
}

/// Runs `future` on the cooperative scheduler; the synchronous entry used
/// by callers that are not themselves tasks.
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    crate::exec::scheduler::run(future)
}
