//! Fixed-generator multiexponentiation handles.
//!
//! A handle owns the precomputed partition tables for one generator set
//! and exposes the three scalar layouts callers use: uniform fixed-width
//! arrays, packed bit-table streams, and packed streams with per-output
//! lengths. Dispatch between the host path and the device pipeline follows
//! the backend selected at [`init`](crate::backend::init).

use std::path::Path;

use crate::backend::{backend, Backend};
use crate::curve::Element;
use crate::msm;
use crate::table::{InMemoryPartitionTableAccessor, PartitionTableAccessor, WINDOW_WIDTH};
use crate::transpose::transpose_scalars;

pub struct MultiexpHandle<T: Element> {
    accessor: InMemoryPartitionTableAccessor<T>,
    num_generators: usize,
}

impl<T: Element> MultiexpHandle<T> {
    /// Precomputes partition tables for `generators`.
    pub fn new(generators: &[T]) -> Self {
        Self {
            accessor: InMemoryPartitionTableAccessor::from_generators(generators),
            num_generators: generators.len(),
        }
    }

    /// Loads a handle whose tables were serialized with
    /// [`Self::write_to_file`]. The generator count rounds up to whole
    /// windows; the padded tail behaves as the identity.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let accessor = InMemoryPartitionTableAccessor::from_file(path);
        let num_generators = accessor.window_count() * WINDOW_WIDTH;
        Self {
            accessor,
            num_generators,
        }
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) {
        self.accessor.write_to_file(path)
    }

    pub fn num_generators(&self) -> usize {
        self.num_generators
    }

    pub fn accessor(&self) -> &InMemoryPartitionTableAccessor<T> {
        &self.accessor
    }

    fn dispatch(&self, res: &mut [T], bit_table: &[u32], lengths: &[u32], scalars: &[u8]) {
        match backend() {
            Backend::Cpu => {
                msm::multiexponentiate(res, &self.accessor, bit_table, lengths, scalars)
            }
            Backend::Gpu => msm::block_on(msm::async_multiexponentiate(
                res,
                &self.accessor,
                bit_table,
                lengths,
                scalars,
            )),
        }
    }

    /// Multiexponentiation over uniform fixed-width scalars.
    ///
    /// `scalars` holds `num_outputs` arrays back to back, each of `n`
    /// little-endian elements of `element_num_bytes` bytes:
    /// `res[i] = Σ_{k<n} scalars[i][k] · G_k`.
    #[tracing::instrument(skip_all, fields(num_outputs = res.len(), n = n))]
    pub fn fixed_multiexponentiation(
        &self,
        res: &mut [T],
        element_num_bytes: usize,
        num_outputs: usize,
        n: usize,
        scalars: &[u8],
    ) {
        assert_eq!(res.len(), num_outputs);
        assert_eq!(scalars.len(), num_outputs * n * element_num_bytes);
        assert!(n <= self.num_generators);
        let outputs: Vec<&[u8]> = scalars.chunks_exact(n * element_num_bytes).collect();
        let mut packed = vec![0u8; scalars.len()];
        transpose_scalars(&mut packed, &outputs, element_num_bytes, n);
        let bit_table = vec![8 * element_num_bytes as u32; num_outputs];
        let lengths = vec![n as u32; num_outputs];
        self.dispatch(res, &bit_table, &lengths, &packed);
    }

    /// Multiexponentiation over an already packed scalar stream: one
    /// `⌈ΣBᵢ/8⌉`-byte record per generator with output bit fields
    /// concatenated LSB-first in output order.
    #[tracing::instrument(skip_all, fields(num_outputs = res.len(), n = n))]
    pub fn fixed_packed_multiexponentiation(
        &self,
        res: &mut [T],
        bit_table: &[u32],
        n: usize,
        scalars: &[u8],
    ) {
        assert_eq!(res.len(), bit_table.len());
        let num_output_bytes = msm::count_products(bit_table).div_ceil(8);
        assert_eq!(scalars.len(), n * num_output_bytes);
        assert!(n <= self.num_generators);
        let lengths = vec![n as u32; bit_table.len()];
        self.dispatch(res, bit_table, &lengths, scalars);
    }

    /// Packed multiexponentiation with per-output lengths: output `i` sums
    /// only its first `lengths[i]` generators.
    #[tracing::instrument(skip_all, fields(num_outputs = res.len()))]
    pub fn fixed_vlen_multiexponentiation(
        &self,
        res: &mut [T],
        bit_table: &[u32],
        lengths: &[u32],
        scalars: &[u8],
    ) {
        assert_eq!(res.len(), bit_table.len());
        assert_eq!(lengths.len(), bit_table.len());
        self.dispatch(res, bit_table, lengths, scalars);
    }
}
