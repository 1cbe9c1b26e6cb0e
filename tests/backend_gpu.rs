//! Public-API flows with the engine initialized on the device backend,
//! checked bit-exact against host-path results.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use fixed_msm::curve::Element;
use fixed_msm::msm::multiexponentiate;
use fixed_msm::table::InMemoryPartitionTableAccessor;
use fixed_msm::{
    compute_pedersen_commitments, init, Backend, EngineConfig, MultiexpHandle, SequenceDescriptor,
};

fn setup() {
    // First test to run wins; the config is process-wide.
    let _ = init(EngineConfig {
        backend: Backend::Gpu,
        num_precomputed_elements: 32,
    });
}

#[test]
fn the_device_backend_is_bit_exact_with_the_host_path() {
    setup();
    let mut rng = ChaCha20Rng::seed_from_u64(4242);
    let n = 100;
    let generators: Vec<RistrettoPoint> =
        (0..n).map(|_| RistrettoPoint::random(&mut rng)).collect();
    let scalars: Vec<u8> = (0..n * 32).map(|_| rng.gen()).collect();

    // Through the handle: dispatches to the device pipeline.
    let handle = MultiexpHandle::new(&generators);
    let mut via_handle = [RistrettoPoint::identity()];
    handle.fixed_multiexponentiation(&mut via_handle, 32, 1, n, &scalars);

    // Directly on the host engine.
    let accessor = InMemoryPartitionTableAccessor::from_generators(&generators);
    let mut via_host = [RistrettoPoint::identity()];
    multiexponentiate(&mut via_host, &accessor, &[256], &[n as u32], &scalars);

    assert_eq!(
        via_handle[0].to_compact().as_bytes(),
        via_host[0].to_compact().as_bytes()
    );
}

#[test]
fn pedersen_commitments_are_additive_over_sequences() {
    setup();
    // The third sequence is the element-wise sum of the first two, so its
    // commitment must be the group sum of theirs.
    let rows: [[u32; 4]; 3] = [
        [2000, 7500, 5000, 1500],
        [5000, 0, 400000, 10],
        [2000 + 5000, 7500 + 0, 5000 + 400000, 1500 + 10],
    ];
    let data: Vec<Vec<u8>> = rows
        .iter()
        .map(|row| row.iter().flat_map(|v| v.to_le_bytes()).collect())
        .collect();
    let descriptors: Vec<SequenceDescriptor> = data
        .iter()
        .map(|bytes| SequenceDescriptor {
            element_nbytes: 4,
            n: 4,
            data: bytes,
        })
        .collect();
    let mut res = [CompressedRistretto([0u8; 32]); 3];
    compute_pedersen_commitments(&mut res, &descriptors, 0).unwrap();

    let sum = res[0].decompress().unwrap() + res[1].decompress().unwrap();
    assert_eq!(res[2], sum.compress());
}

#[test]
fn pedersen_commitments_use_the_offset_generators() {
    setup();
    // Window-aligned offset inside the precomputed set.
    let descriptors = [SequenceDescriptor {
        element_nbytes: 1,
        n: 3,
        data: &[1, 2, 3],
    }];
    let mut at_offset = [CompressedRistretto([0u8; 32])];
    compute_pedersen_commitments(&mut at_offset, &descriptors, 16).unwrap();

    let expected: RistrettoPoint = (0..3u64)
        .map(|i| {
            Scalar::from(i + 1) * fixed_msm::curve::ristretto::default_generator(16 + i)
        })
        .sum();
    assert_eq!(at_offset[0], expected.compress());
}

#[test]
fn file_backed_handles_reproduce_in_memory_results() {
    setup();
    let generators: Vec<RistrettoPoint> = (0..5u64)
        .map(|i| Scalar::from(i + 7) * RISTRETTO_BASEPOINT_POINT)
        .collect();
    let handle = MultiexpHandle::new(&generators);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ristretto_table");
    handle.write_to_file(&path);
    let reloaded = MultiexpHandle::<RistrettoPoint>::from_file(&path);

    let scalars = [9u8, 8, 7, 6, 5];
    let mut expected = [RistrettoPoint::identity()];
    handle.fixed_multiexponentiation(&mut expected, 1, 1, 5, &scalars);
    let mut res = [RistrettoPoint::identity()];
    reloaded.fixed_multiexponentiation(&mut res, 1, 1, 5, &scalars);
    assert_eq!(res[0].to_compact(), expected[0].to_compact());
}
