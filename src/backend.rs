//! Process-wide engine configuration and the Pedersen commitment entry.
//!
//! [`init`] selects the computational backend once per process and may
//! precompute partition tables for a prefix of the deterministic default
//! generator set, so later commitment calls skip table construction.

use std::sync::OnceLock;

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};

use crate::curve::ristretto::default_generator;
use crate::curve::Element;
use crate::error::EngineError;
use crate::exec::{DeviceVec, Stream};
use crate::msm;
use crate::table::{InMemoryPartitionTableAccessor, PartitionTableAccessor, WINDOW_WIDTH};

/// Computational backend the engine dispatches to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Host-only execution on the calling thread.
    Cpu,
    /// The stream-pipelined device path.
    Gpu,
}

#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub backend: Backend,
    /// Number of default generators to precompute partition tables for at
    /// initialization. Zero defers all table construction to call time.
    pub num_precomputed_elements: usize,
}

struct EngineState {
    backend: Backend,
    precomputed: Option<InMemoryPartitionTableAccessor<RistrettoPoint>>,
    num_precomputed: usize,
}

static STATE: OnceLock<EngineState> = OnceLock::new();

fn build_state(config: EngineConfig) -> EngineState {
    if config.num_precomputed_elements == 0 {
        return EngineState {
            backend: config.backend,
            precomputed: None,
            num_precomputed: 0,
        };
    }
    let num_precomputed = config.num_precomputed_elements.next_multiple_of(WINDOW_WIDTH);
    tracing::info!(num_precomputed, "precomputing default generator tables");
    let generators: Vec<RistrettoPoint> =
        (0..num_precomputed as u64).map(default_generator).collect();
    EngineState {
        backend: config.backend,
        precomputed: Some(InMemoryPartitionTableAccessor::from_generators(&generators)),
        num_precomputed,
    }
}

/// Initializes the engine. Returns an error if called twice.
pub fn init(config: EngineConfig) -> Result<(), EngineError> {
    let mut fresh = false;
    STATE.get_or_init(|| {
        fresh = true;
        build_state(config)
    });
    if fresh {
        Ok(())
    } else {
        Err(EngineError::AlreadyInitialized)
    }
}

fn state() -> &'static EngineState {
    STATE.get_or_init(|| build_state(EngineConfig {
        backend: Backend::Cpu,
        num_precomputed_elements: 0,
    }))
}

/// The backend selected at initialization (CPU when uninitialized).
pub fn backend() -> Backend {
    state().backend
}

/// One commitment's scalar sequence: `n` elements of `element_nbytes`
/// little-endian bytes each, element-major.
#[derive(Clone, Copy, Debug)]
pub struct SequenceDescriptor<'a> {
    pub element_nbytes: usize,
    pub n: usize,
    pub data: &'a [u8],
}

/// Serves table windows for generators `[offset, offset + …)` out of a
/// larger precomputed set; valid only for window-aligned offsets.
struct ShiftedAccessor<'a, T: Element> {
    inner: &'a InMemoryPartitionTableAccessor<T>,
    first_window: usize,
}

impl<T: Element> PartitionTableAccessor<T> for ShiftedAccessor<'_, T> {
    fn window_count(&self) -> usize {
        self.inner.window_count() - self.first_window
    }

    fn async_copy_to_device(&self, dst: &DeviceVec<T>, stream: &Stream, first_window: usize) {
        self.inner
            .async_copy_to_device(dst, stream, self.first_window + first_window)
    }

    fn host_view(&self, first_entry: usize, count: usize) -> &[T] {
        use crate::table::PARTITION_TABLE_SIZE;
        self.inner
            .host_view(self.first_window * PARTITION_TABLE_SIZE + first_entry, count)
    }
}

fn run_multiexponentiation(
    res: &mut [RistrettoPoint],
    accessor: &impl PartitionTableAccessor<RistrettoPoint>,
    bit_table: &[u32],
    lengths: &[u32],
    scalars: &[u8],
) {
    match backend() {
        Backend::Cpu => msm::multiexponentiate(res, accessor, bit_table, lengths, scalars),
        Backend::Gpu => msm::block_on(msm::async_multiexponentiate(
            res, accessor, bit_table, lengths, scalars,
        )),
    }
}

/// Computes one Pedersen commitment per descriptor over the default
/// generator set shifted by `generator_offset`:
/// `res[i] = Σ_g descriptors[i].scalar(g) · G_{offset + g}`.
#[tracing::instrument(skip_all, fields(num_commitments = res.len()))]
pub fn compute_pedersen_commitments(
    res: &mut [CompressedRistretto],
    descriptors: &[SequenceDescriptor<'_>],
    generator_offset: u64,
) -> Result<(), EngineError> {
    if res.len() != descriptors.len() {
        return Err(EngineError::InvalidArgument(
            "result and descriptor counts differ".into(),
        ));
    }
    if descriptors.is_empty() {
        return Ok(());
    }
    for descriptor in descriptors {
        if descriptor.element_nbytes == 0 || descriptor.element_nbytes > 32 {
            return Err(EngineError::InvalidElementWidth(descriptor.element_nbytes));
        }
        if descriptor.data.len() != descriptor.n * descriptor.element_nbytes {
            return Err(EngineError::InvalidArgument(
                "descriptor data length does not match n".into(),
            ));
        }
    }
    let offset = generator_offset as usize;
    let n_max = descriptors.iter().map(|d| d.n).max().unwrap_or(0);
    if n_max == 0 {
        res.fill(RistrettoPoint::identity().compress());
        return Ok(());
    }

    // Pack the variable-width sequences into one generator-major stream,
    // zero-padding sequences shorter than the widest one.
    let bit_table: Vec<u32> = descriptors
        .iter()
        .map(|d| 8 * d.element_nbytes as u32)
        .collect();
    let lengths: Vec<u32> = descriptors.iter().map(|d| d.n as u32).collect();
    let stride: usize = descriptors.iter().map(|d| d.element_nbytes).sum();
    let mut packed = vec![0u8; n_max * stride];
    let mut field_offset = 0usize;
    for descriptor in descriptors {
        for g in 0..descriptor.n {
            let element =
                &descriptor.data[g * descriptor.element_nbytes..(g + 1) * descriptor.element_nbytes];
            packed[g * stride + field_offset..g * stride + field_offset + descriptor.element_nbytes]
                .copy_from_slice(element);
        }
        field_offset += descriptor.element_nbytes;
    }

    let mut points = vec![RistrettoPoint::identity(); descriptors.len()];
    let state = state();
    let window_aligned = offset % WINDOW_WIDTH == 0;
    if window_aligned && offset + n_max <= state.num_precomputed {
        let accessor = ShiftedAccessor {
            inner: state.precomputed.as_ref().expect("tables precomputed"),
            first_window: offset / WINDOW_WIDTH,
        };
        run_multiexponentiation(&mut points, &accessor, &bit_table, &lengths, &packed);
    } else {
        // Outside the precomputed set (or unaligned): build tables for just
        // the generators this call touches.
        tracing::debug!(offset, n_max, "building ad hoc generator tables");
        let generators: Vec<RistrettoPoint> = (offset as u64..(offset + n_max) as u64)
            .map(default_generator)
            .collect();
        let accessor = InMemoryPartitionTableAccessor::from_generators(&generators);
        run_multiexponentiation(&mut points, &accessor, &bit_table, &lengths, &packed);
    }
    for (out, point) in res.iter_mut().zip(&points) {
        *out = point.compress();
    }
    Ok(())
}
