//! Partition-product kernel: one partial sum per scalar bit.
//!
//! Product index `p` is bound to one output and one scalar bit position
//! (byte `p / 8`, bit `p % 8` of each generator's packed record). The
//! kernel assembles, per 16-generator window, the 16-bit mask of that bit
//! across the window's generators and resolves it with a single table
//! lookup, summing lookups across windows.

use crate::curve::Element;
use crate::exec::copy::copy_host_slice_to_device;
use crate::exec::{await_stream, AsyncDeviceResource, DeviceVec, Stream};
use crate::table::{PartitionTableAccessor, PARTITION_TABLE_SIZE, WINDOW_WIDTH};

use rayon::prelude::*;

/// Gathers bit `bit_offset` of the addressed byte across up to 16
/// generators spaced `stride` bytes apart.
#[inline]
fn compute_partition_index(scalars: &[u8], stride: usize, num_elements: usize, bit_offset: u32) -> u16 {
    let mut mask = 0u16;
    for k in 0..num_elements.min(WINDOW_WIDTH) {
        let bit = scalars[k * stride] >> bit_offset & 1;
        mask |= (bit as u16) << k;
    }
    mask
}

/// Computes the partial sum for product `product_index` over `n` leading
/// generators of the chunk. `table` covers the chunk's windows; `scalars`
/// is the chunk's packed stream. `n == 0` yields the identity.
pub(crate) fn partition_product_kernel<T: Element>(
    table: &[T],
    scalars: &[u8],
    product_index: usize,
    num_products: usize,
    n: usize,
) -> T {
    if n == 0 {
        return T::identity();
    }
    let stride = num_products.div_ceil(8);
    let byte_index = product_index / 8;
    let bit_offset = (product_index % 8) as u32;
    let scalars = &scalars[byte_index..];

    let mut remaining = n;
    let mut res = {
        let mask = compute_partition_index(scalars, stride, remaining, bit_offset);
        table[mask as usize]
    };
    let mut window = 0;
    while remaining > WINDOW_WIDTH {
        remaining -= WINDOW_WIDTH;
        window += 1;
        let window_scalars = &scalars[window * WINDOW_WIDTH * stride..];
        let mask = compute_partition_index(window_scalars, stride, remaining, bit_offset);
        let mut e = table[window * PARTITION_TABLE_SIZE + mask as usize];
        T::add_inplace(&mut res, &mut e);
    }
    res
}

/// Host execution of the partition products for one generator chunk.
pub fn partition_product<T: Element>(
    products: &mut [T],
    accessor: &impl PartitionTableAccessor<T>,
    scalars: &[u8],
    product_lengths: &[u32],
    first: usize,
) {
    let num_products = products.len();
    if num_products == 0 {
        return;
    }
    assert_eq!(first % WINDOW_WIDTH, 0);
    assert_eq!(product_lengths.len(), num_products);
    let stride = num_products.div_ceil(8);
    assert_eq!(scalars.len() % stride, 0);
    let n = scalars.len() / stride;
    let num_windows = n.div_ceil(WINDOW_WIDTH);
    let table = accessor.host_view(
        first / WINDOW_WIDTH * PARTITION_TABLE_SIZE,
        num_windows * PARTITION_TABLE_SIZE,
    );
    products
        .par_iter_mut()
        .enumerate()
        .for_each(|(product_index, product)| {
            *product = partition_product_kernel(
                table,
                scalars,
                product_index,
                num_products,
                product_lengths[product_index] as usize,
            );
        });
}

/// Device execution of the partition products for one generator chunk.
///
/// Scalars stream to the device on their own stream while the table slice
/// copies on the kernel's stream; the kernel launches once both transfers
/// have settled and the caller resumes when the products are written.
#[tracing::instrument(skip_all, fields(num_products = products.len()))]
pub async fn async_partition_product<T: Element>(
    products: &DeviceVec<T>,
    accessor: &impl PartitionTableAccessor<T>,
    scalars: &[u8],
    product_lengths: &[u32],
    first: usize,
) {
    let num_products = products.len();
    if num_products == 0 {
        return;
    }
    assert_eq!(first % WINDOW_WIDTH, 0);
    assert_eq!(product_lengths.len(), num_products);
    let stride = num_products.div_ceil(8);
    assert_eq!(scalars.len() % stride, 0);
    let n = scalars.len() / stride;
    let num_windows = n.div_ceil(WINDOW_WIDTH);

    // Scalars go out on a dedicated stream, overlapping the table copy.
    let scalars_dev = DeviceVec::<u8>::uninit(scalars.len());
    let scalars_stream = Stream::new();
    let scalars_fut = copy_host_slice_to_device(&scalars_dev, &scalars_stream, scalars);

    let stream = Stream::new();
    let resource = AsyncDeviceResource::new(&stream);
    let table_dev = resource.alloc::<T>(num_windows * PARTITION_TABLE_SIZE);
    accessor.async_copy_to_device(&table_dev, &stream, first / WINDOW_WIDTH);
    let lengths_dev = resource.alloc::<u32>(num_products);
    copy_host_slice_to_device(&lengths_dev, &stream, product_lengths).await;
    scalars_fut.await;

    let kernel_products = products.clone();
    let kernel_table = table_dev.clone();
    let kernel_scalars = scalars_dev.clone();
    let kernel_lengths = lengths_dev.clone();
    let scalars_len = scalars.len();
    let table_len = table_dev.len();
    stream.exec(move || {
        // SAFETY: both transfers completed before launch (scalars await
        // above, table by stream order) and the products span is owned by
        // this kernel until the stream is awaited.
        let table = unsafe { kernel_table.slice(0, table_len) };
        let scalars = unsafe { kernel_scalars.slice(0, scalars_len) };
        let lengths = unsafe { kernel_lengths.slice(0, num_products) };
        let out = unsafe { kernel_products.slice_mut(0, num_products) };
        out.par_iter_mut()
            .enumerate()
            .for_each(|(product_index, product)| {
                *product = partition_product_kernel(
                    table,
                    scalars,
                    product_index,
                    num_products,
                    lengths[product_index] as usize,
                );
            });
    });
    await_stream(&stream).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::example::Element97;
    use crate::exec::scheduler;
    use crate::table::InMemoryPartitionTableAccessor;

    fn generators(n: usize) -> Vec<Element97> {
        (0..n).map(|i| Element97::new(i as u32 + 1)).collect()
    }

    #[test]
    fn single_window_products_follow_the_scalar_bits() {
        let gens = generators(2);
        let accessor = InMemoryPartitionTableAccessor::from_generators(&gens);
        // Packed records for one 2-bit output: g0 bits = 0b01, g1 bits = 0b10.
        let scalars = [0b01u8, 0b10u8];
        let mut products = [Element97::identity(); 2];
        partition_product(&mut products, &accessor, &scalars, &[2, 2], 0);
        // Bit 0 selects g0 only, bit 1 selects g1 only.
        assert_eq!(products[0], gens[0]);
        assert_eq!(products[1], gens[1]);
    }

    #[test]
    fn window_sums_accumulate_across_partitions() {
        let gens = generators(40);
        let accessor = InMemoryPartitionTableAccessor::from_generators(&gens);
        // One 8-bit output; every generator has scalar 1.
        let scalars = vec![1u8; 40];
        let mut products = [Element97::identity(); 8];
        partition_product(&mut products, &accessor, &scalars, &[40; 8], 0);
        let mut expected = Element97::identity();
        for g in &gens {
            expected = Element97::add(&expected, g);
        }
        assert_eq!(products[0], expected);
        for product in &products[1..] {
            assert_eq!(*product, Element97::identity());
        }
    }

    #[test]
    fn zero_length_products_are_the_identity() {
        let gens = generators(2);
        let accessor = InMemoryPartitionTableAccessor::from_generators(&gens);
        let scalars = [0xffu8, 0xff];
        let mut products = [Element97::new(5); 8];
        partition_product(&mut products, &accessor, &scalars, &[0; 8], 0);
        assert!(products.iter().all(|p| *p == Element97::identity()));
    }

    #[test]
    fn effective_lengths_truncate_the_generator_range() {
        let gens = generators(3);
        let accessor = InMemoryPartitionTableAccessor::from_generators(&gens);
        let scalars = [1u8, 1, 1];
        let mut products = [Element97::identity(); 8];
        partition_product(&mut products, &accessor, &scalars, &[2; 8], 0);
        assert_eq!(products[0], Element97::add(&gens[0], &gens[1]));
    }

    #[test]
    fn device_execution_matches_the_host_kernel() {
        let gens = generators(50);
        let accessor = InMemoryPartitionTableAccessor::from_generators(&gens);
        let scalars: Vec<u8> = (0..50).map(|i| (i * 37 + 11) as u8).collect();
        let lengths = [50u32; 8];

        let mut host_products = [Element97::identity(); 8];
        partition_product(&mut host_products, &accessor, &scalars, &lengths, 0);

        let device_products = DeviceVec::<Element97>::uninit(8);
        scheduler::run(async_partition_product(
            &device_products,
            &accessor,
            &scalars,
            &lengths,
            0,
        ));
        let device_products = unsafe { device_products.slice(0, 8) };
        assert_eq!(device_products, &host_products);
    }

    #[test]
    fn nonzero_window_offsets_read_the_right_windows() {
        let gens = generators(48);
        let accessor = InMemoryPartitionTableAccessor::from_generators(&gens);
        // Chunk covering generators [16, 48) with an 8-bit output.
        let scalars = vec![1u8; 32];
        let mut products = [Element97::identity(); 8];
        partition_product(&mut products, &accessor, &scalars, &[32; 8], 16);
        let mut expected = Element97::identity();
        for g in &gens[16..48] {
            expected = Element97::add(&expected, g);
        }
        assert_eq!(products[0], expected);
    }
}
