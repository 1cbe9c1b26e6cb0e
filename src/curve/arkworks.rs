//! [`Element`] adapters for arkworks short-Weierstrass curves.
//!
//! All three pairing-friendly / cycle curves we support share the same
//! arkworks surface, so a single macro stamps out the adapter. The working
//! form is the projective point; the compact form is the affine point
//! serialized uncompressed in arkworks' little-endian limb order.

use ark_ec::AffineRepr;
use ark_ff::AdditiveGroup;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::Zero;

use super::Element;

macro_rules! impl_element_for_ark_curve {
    ($projective:ty, $affine:ty) => {
        impl Element for $projective {
            type Compact = $affine;

            fn identity() -> Self {
                <$projective>::zero()
            }

            fn add(a: &Self, b: &Self) -> Self {
                *a + *b
            }

            fn add_inplace(res: &mut Self, e: &mut Self) {
                *res += &*e;
            }

            fn double(e: &Self) -> Self {
                AdditiveGroup::double(e)
            }

            fn neg_inplace(&mut self) {
                *self = -*self;
            }

            fn to_compact(&self) -> Self::Compact {
                use ark_ec::CurveGroup;
                self.into_affine()
            }

            fn from_compact(compact: &Self::Compact) -> Self {
                (*compact).into()
            }

            fn compact_size() -> usize {
                <$affine>::zero().uncompressed_size()
            }

            fn write_compact(compact: &Self::Compact, out: &mut [u8]) {
                compact
                    .serialize_uncompressed(out)
                    .expect("affine serialization to a sized buffer cannot fail");
            }

            fn read_compact(bytes: &[u8]) -> Option<Self::Compact> {
                <$affine>::deserialize_uncompressed(bytes).ok()
            }
        }
    };
}

// NOTE: each curve's `G1Projective`/`G1Affine` (or `Projective`/`Affine`) aliases
// are defined upstream via an associated-type projection (e.g. `bn::G1Projective<Config>`
// = `Projective<<Config as BnConfig>::G1Config>`), which rustc's coherence checker
// cannot normalize across macro invocations, producing spurious E0119 conflicts even
// though the underlying concrete types are distinct. Spelling out the fully
// normalized `Projective<XConfig>`/`Affine<XConfig>` path sidesteps the false
// conflict while remaining the exact same type as the alias.
impl_element_for_ark_curve!(
    ark_ec::short_weierstrass::Projective<ark_bn254::g1::Config>,
    ark_ec::short_weierstrass::Affine<ark_bn254::g1::Config>
);
impl_element_for_ark_curve!(
    ark_ec::short_weierstrass::Projective<ark_bls12_381::g1::Config>,
    ark_ec::short_weierstrass::Affine<ark_bls12_381::g1::Config>
);
impl_element_for_ark_curve!(
    ark_ec::short_weierstrass::Projective<ark_grumpkin::GrumpkinConfig>,
    ark_ec::short_weierstrass::Affine<ark_grumpkin::GrumpkinConfig>
);
