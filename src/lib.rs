//! Fixed-base multi-scalar multiplication with precomputed partition
//! tables.
//!
//! Given a fixed generator set G₀…G_{n−1}, the engine precomputes, per
//! window of 16 generators, all 2¹⁶ subset sums; a multiexponentiation
//! then resolves 16 scalar bits per table lookup and collapses the per-bit
//! partial sums with a double-and-add reduction. Scalars are public proof
//! data: nothing here is constant time.
//!
//! The device pipeline streams scalars and table windows chunk by chunk
//! through pinned staging buffers, overlapping transfers with kernel
//! execution across per-device streams, while the host orchestrator stays
//! a single cooperative thread. A CPU backend runs the same kernels on the
//! calling thread.
//!
//! Supported groups: Ristretto255, BLS12-381 G1, BN254 G1, and Grumpkin.
//! A multilinear sumcheck prover shares the execution fabric.

use std::str::FromStr;

pub mod backend;
pub mod curve;
pub mod error;
pub mod exec;
pub mod handle;
pub mod msm;
pub mod sumcheck;
pub mod table;
pub mod transpose;

pub use backend::{
    compute_pedersen_commitments, init, Backend, EngineConfig, SequenceDescriptor,
};
pub use error::EngineError;
pub use handle::MultiexpHandle;

/// Identifiers for the supported curves at the API boundary. The engine
/// itself is generic over [`curve::Element`]; this enum exists for
/// callers that pick a curve at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Curve {
    Ristretto255,
    Bls12381G1,
    Bn254G1,
    Grumpkin,
}

impl FromStr for Curve {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, EngineError> {
        match s {
            "curve25519" | "ristretto255" => Ok(Curve::Ristretto255),
            "bls12-381" | "bls12_381" => Ok(Curve::Bls12381G1),
            "bn254" => Ok(Curve::Bn254G1),
            "grumpkin" => Ok(Curve::Grumpkin),
            other => Err(EngineError::UnsupportedCurve(other.to_string())),
        }
    }
}
