//! Chunking policy for spreading work across device queues.

use super::device;

/// A half-open index range `[a, b)` with an optional chunking alignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexRange {
    a: usize,
    b: usize,
    chunk_multiple: usize,
}

impl IndexRange {
    pub fn new(a: usize, b: usize) -> Self {
        assert!(a <= b);
        Self {
            a,
            b,
            chunk_multiple: 1,
        }
    }

    /// Requires chunk boundaries to fall on multiples of `multiple`
    /// (relative to the start of the range). The generator axis uses 16 so
    /// chunks respect partition-window boundaries.
    pub fn chunk_multiple(self, multiple: usize) -> Self {
        assert!(multiple > 0);
        Self {
            chunk_multiple: multiple,
            ..self
        }
    }

    pub fn a(&self) -> usize {
        self.a
    }

    pub fn b(&self) -> usize {
        self.b
    }

    pub fn len(&self) -> usize {
        self.b - self.a
    }

    pub fn is_empty(&self) -> bool {
        self.a == self.b
    }
}

/// Controls how [`split`] partitions a range.
#[derive(Clone, Copy, Debug)]
pub struct SplitOptions {
    /// Smallest chunk worth dispatching, in elements.
    pub min_chunk_size: usize,
    /// Largest chunk a single dispatch may cover, in elements.
    pub max_chunk_size: usize,
    /// Oversubscription factor, normally the device count.
    pub split_factor: usize,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            min_chunk_size: 1,
            max_chunk_size: usize::MAX,
            split_factor: 1,
        }
    }
}

/// Partitions `range` into approximately
/// `split_factor * ceil(len / max_chunk_size)` equal pieces of size at least
/// `min_chunk_size`, snapped up to the range's chunk multiple.
pub fn split(range: IndexRange, options: SplitOptions) -> impl Iterator<Item = IndexRange> {
    assert!(options.min_chunk_size > 0 && options.split_factor > 0);
    assert!(options.min_chunk_size <= options.max_chunk_size);
    let n = range.len();
    let target_chunks = n.div_ceil(options.max_chunk_size).max(1) * options.split_factor;
    let chunk_size = n
        .div_ceil(target_chunks)
        .max(options.min_chunk_size)
        .next_multiple_of(range.chunk_multiple);
    ChunkIter { range, chunk_size }
}

struct ChunkIter {
    range: IndexRange,
    chunk_size: usize,
}

impl Iterator for ChunkIter {
    type Item = IndexRange;

    fn next(&mut self) -> Option<IndexRange> {
        if self.range.is_empty() {
            return None;
        }
        let a = self.range.a;
        let b = self.range.b.min(a + self.chunk_size);
        self.range.a = b;
        Some(IndexRange {
            a,
            b,
            chunk_multiple: self.range.chunk_multiple,
        })
    }
}

const MIN_CHUNK_SIZE: usize = 64;
const MAX_CHUNK_SIZE: usize = 1024;
const MEMORY_TARGET_LOW: f64 = 0.1;
const MEMORY_TARGET_HIGH: f64 = 0.4;

pub fn plan_split_impl(
    element_footprint: usize,
    total_device_memory: usize,
    memory_target_low: f64,
    memory_target_high: f64,
    split_factor: usize,
) -> SplitOptions {
    assert!(element_footprint > 0);
    assert!(0.0 < memory_target_low && memory_target_low <= memory_target_high);
    // Chunks small enough to stay under the high occupancy target, but not
    // so small that a dispatch falls below the low target's worth of work.
    let high_budget = (total_device_memory as f64 * memory_target_high) as usize;
    let low_budget = (total_device_memory as f64 * memory_target_low) as usize;
    let max_chunk_size = (high_budget / element_footprint).clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
    let min_chunk_size = (low_budget / element_footprint).clamp(1, MIN_CHUNK_SIZE);
    SplitOptions {
        min_chunk_size,
        max_chunk_size: max_chunk_size.max(min_chunk_size),
        split_factor,
    }
}

/// Memory-aware split options for work whose per-element device footprint
/// is `element_footprint` bytes.
pub fn plan_split(element_footprint: usize) -> SplitOptions {
    plan_split_impl(
        element_footprint,
        device::total_device_memory(),
        MEMORY_TARGET_LOW,
        MEMORY_TARGET_HIGH,
        device::num_devices(),
    )
}
