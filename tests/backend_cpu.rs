//! Public-API flows with the engine initialized on the CPU backend.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;

use fixed_msm::curve::scalar_mul;
use fixed_msm::curve::Element;
use fixed_msm::{
    compute_pedersen_commitments, init, Backend, EngineConfig, EngineError, MultiexpHandle,
    SequenceDescriptor,
};

fn setup() {
    let _ = init(EngineConfig {
        backend: Backend::Cpu,
        num_precomputed_elements: 16,
    });
}

#[test]
fn initializing_twice_is_an_error() {
    setup();
    assert_eq!(
        init(EngineConfig {
            backend: Backend::Gpu,
            num_precomputed_elements: 0,
        }),
        Err(EngineError::AlreadyInitialized)
    );
}

#[test]
fn fixed_multiexponentiation_on_the_host_backend() {
    setup();
    let generators: Vec<RistrettoPoint> = (1..=2u64)
        .map(|i| Scalar::from(0x111 * i) * RISTRETTO_BASEPOINT_POINT)
        .collect();
    let handle = MultiexpHandle::new(&generators);
    let scalars = [1u8, 0, 0, 2];
    let mut res = [RistrettoPoint::identity()];
    handle.fixed_multiexponentiation(&mut res, 2, 1, 2, &scalars);
    assert_eq!(res[0], generators[0] + Scalar::from(512u32) * generators[1]);
}

#[test]
fn pedersen_commitments_match_the_direct_sum() {
    setup();
    let descriptors = [
        SequenceDescriptor {
            element_nbytes: 2,
            n: 3,
            data: &[10, 0, 20, 0, 30, 0],
        },
        SequenceDescriptor {
            element_nbytes: 1,
            n: 1,
            data: &[255],
        },
    ];
    let mut res = [CompressedRistretto([0u8; 32]); 2];
    compute_pedersen_commitments(&mut res, &descriptors, 0).unwrap();

    let g: Vec<RistrettoPoint> = (0..3u64)
        .map(fixed_msm::curve::ristretto::default_generator)
        .collect();
    let expected0 = scalar_mul(&g[0], &[10]) + scalar_mul(&g[1], &[20]) + scalar_mul(&g[2], &[30]);
    let expected1 = scalar_mul(&g[0], &[255]);
    assert_eq!(res[0], expected0.compress());
    assert_eq!(res[1], expected1.compress());
}

#[test]
fn unaligned_offsets_fall_back_to_ad_hoc_tables() {
    setup();
    let descriptors = [SequenceDescriptor {
        element_nbytes: 1,
        n: 2,
        data: &[1, 1],
    }];
    let mut res = [CompressedRistretto([0u8; 32])];
    compute_pedersen_commitments(&mut res, &descriptors, 3).unwrap();
    let expected = fixed_msm::curve::ristretto::default_generator(3)
        + fixed_msm::curve::ristretto::default_generator(4);
    assert_eq!(res[0], expected.compress());
}
