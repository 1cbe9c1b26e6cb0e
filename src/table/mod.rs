//! Precomputed partition tables.
//!
//! A partition window covers 16 consecutive generators; its table holds the
//! 2¹⁶ subset sums indexed by bitmask, so a kernel resolves 16 scalar bits
//! with a single lookup. Tables are built once per generator set, persisted
//! as dense compact records, and served to device memory one generator
//! chunk at a time.

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;

use crate::curve::Element;
use crate::exec::{DeviceVec, Stream};

/// Generators per partition window.
pub const WINDOW_WIDTH: usize = 16;

/// Subset sums per window.
pub const PARTITION_TABLE_SIZE: usize = 1 << WINDOW_WIDTH;

/// Read access to precomputed subset sums by generator window.
pub trait PartitionTableAccessor<T: Element>: Send + Sync {
    fn window_count(&self) -> usize;

    /// Asynchronously copies `dst.len() / 2¹⁶` consecutive windows starting
    /// at `first_window` into device memory on `stream`.
    fn async_copy_to_device(&self, dst: &DeviceVec<T>, stream: &Stream, first_window: usize);

    /// Host-visible view of `count` table entries starting at `first_entry`.
    fn host_view(&self, first_entry: usize, count: usize) -> &[T];
}

/// Builds one window's table over at most 16 generators. Gray-code
/// traversal: consecutive masks differ in one bit, so every entry costs a
/// single add of the flipped generator (or its negation).
fn build_window<T: Element>(entries: &mut [T], generators: &[T]) {
    debug_assert_eq!(entries.len(), PARTITION_TABLE_SIZE);
    debug_assert!(generators.len() <= WINDOW_WIDTH);
    entries[0] = T::identity();
    let mut prev = 0usize;
    for i in 1..PARTITION_TABLE_SIZE {
        let mask = i ^ (i >> 1);
        let flipped = (mask ^ prev).trailing_zeros() as usize;
        // Missing generators in a ragged final window behave as identity.
        let mut step = generators.get(flipped).copied().unwrap_or_else(T::identity);
        if mask & (1 << flipped) == 0 {
            step.neg_inplace();
        }
        entries[mask] = T::add(&entries[prev], &step);
        prev = mask;
    }
}

/// Partition table held in host memory, the working form of a
/// `multiexp` handle.
pub struct InMemoryPartitionTableAccessor<T: Element> {
    table: Arc<Vec<T>>,
}

impl<T: Element> Clone for InMemoryPartitionTableAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T: Element> InMemoryPartitionTableAccessor<T> {
    /// Precomputes the table for a fixed generator set. The final window is
    /// identity-padded when the generator count is not a multiple of 16.
    #[tracing::instrument(skip_all, fields(num_generators = generators.len()))]
    pub fn from_generators(generators: &[T]) -> Self {
        let num_windows = generators.len().div_ceil(WINDOW_WIDTH).max(1);
        let mut table = vec![T::identity(); num_windows * PARTITION_TABLE_SIZE];
        table
            .par_chunks_mut(PARTITION_TABLE_SIZE)
            .enumerate()
            .for_each(|(w, entries)| {
                let first = w * WINDOW_WIDTH;
                let window_generators = &generators[first..generators.len().min(first + WINDOW_WIDTH)];
                build_window(entries, window_generators);
            });
        Self {
            table: Arc::new(table),
        }
    }

    /// Loads a table previously written with [`Self::write_to_file`].
    ///
    /// The file must hold whole windows of whole compact records; anything
    /// else is a corrupt table and panics.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .unwrap_or_else(|e| panic!("failed to open {}: {e}", path.display()));
        let record_size = T::compact_size();
        assert!(
            bytes.len() % record_size == 0,
            "table file size is not a multiple of the element size"
        );
        let num_entries = bytes.len() / record_size;
        assert!(
            num_entries % PARTITION_TABLE_SIZE == 0,
            "table file does not hold whole partition windows"
        );
        let table = bytes
            .par_chunks_exact(record_size)
            .map(|record| {
                let compact =
                    T::read_compact(record).expect("table file holds an invalid element");
                T::from_compact(&compact)
            })
            .collect();
        Self {
            table: Arc::new(table),
        }
    }

    /// Serializes the table as dense little-endian compact records.
    pub fn write_to_file(&self, path: impl AsRef<Path>) {
        let record_size = T::compact_size();
        let mut bytes = vec![0u8; self.table.len() * record_size];
        bytes
            .par_chunks_exact_mut(record_size)
            .zip(self.table.par_iter())
            .for_each(|(record, entry)| T::write_compact(&entry.to_compact(), record));
        let path = path.as_ref();
        std::fs::write(path, bytes)
            .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    }
}

impl<T: Element> PartitionTableAccessor<T> for InMemoryPartitionTableAccessor<T> {
    fn window_count(&self) -> usize {
        self.table.len() / PARTITION_TABLE_SIZE
    }

    fn async_copy_to_device(&self, dst: &DeviceVec<T>, stream: &Stream, first_window: usize) {
        assert!(dst.len() % PARTITION_TABLE_SIZE == 0);
        let num_windows = dst.len() / PARTITION_TABLE_SIZE;
        assert!(first_window + num_windows <= self.window_count());
        let table = Arc::clone(&self.table);
        let dst = dst.clone();
        let first = first_window * PARTITION_TABLE_SIZE;
        let count = num_windows * PARTITION_TABLE_SIZE;
        stream.exec(move || {
            // SAFETY: the table is immutable once built; the destination is
            // owned by this copy until the stream is awaited.
            unsafe { dst.slice_mut(0, count).copy_from_slice(&table[first..first + count]) };
        });
    }

    fn host_view(&self, first_entry: usize, count: usize) -> &[T] {
        &self.table[first_entry..first_entry + count]
    }
}
