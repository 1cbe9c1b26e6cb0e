//! Scalar reshaping for the multiexponentiation kernels.
//!
//! Callers hand the engine one scalar array per output, element-major then
//! byte-major. The kernels want the packed stream: one record per
//! generator, holding that generator's scalar bytes for every output
//! back-to-back, so the product index is the fastest-moving axis and the
//! generator index the slowest. The transpose is a pure host reshape; the
//! packed stream is then staged to the device chunk by chunk through the
//! pinned double-buffered copier.

use rayon::prelude::*;

/// Reshapes per-output scalar arrays into the packed generator-major
/// stream. Each of `outputs` holds `n * element_num_bytes` bytes; `dst`
/// receives `n` records of `outputs.len() * element_num_bytes` bytes.
pub fn transpose_scalars(
    dst: &mut [u8],
    outputs: &[&[u8]],
    element_num_bytes: usize,
    n: usize,
) {
    let record_size = outputs.len() * element_num_bytes;
    assert_eq!(dst.len(), n * record_size);
    for output in outputs {
        assert_eq!(output.len(), n * element_num_bytes);
    }
    dst.par_chunks_exact_mut(record_size)
        .enumerate()
        .for_each(|(g, record)| {
            for (o, output) in outputs.iter().enumerate() {
                let element = &output[g * element_num_bytes..(g + 1) * element_num_bytes];
                record[o * element_num_bytes..(o + 1) * element_num_bytes]
                    .copy_from_slice(element);
            }
        });
}

/// Inverse of [`transpose_scalars`]: recovers the per-output arrays from a
/// packed stream.
pub fn detranspose_scalars(
    outputs: &mut [Vec<u8>],
    src: &[u8],
    element_num_bytes: usize,
    n: usize,
) {
    let record_size = outputs.len() * element_num_bytes;
    assert_eq!(src.len(), n * record_size);
    for (o, output) in outputs.iter_mut().enumerate() {
        output.resize(n * element_num_bytes, 0);
        for g in 0..n {
            let record = &src[g * record_size..];
            output[g * element_num_bytes..(g + 1) * element_num_bytes]
                .copy_from_slice(&record[o * element_num_bytes..(o + 1) * element_num_bytes]);
        }
    }
}
