//! Curve abstraction used by the multiexponentiation pipeline.
//!
//! The engine is generic over [`Element`], the minimal set of group
//! operations a fixed-base MSM needs. Field and curve internals stay opaque;
//! concrete curves adapt their ecosystem types (arkworks projective points,
//! dalek Ristretto points) to this trait. Hot loops are monomorphized over
//! `Element`; nothing here is object-safe by design.

use std::fmt::Debug;

pub mod example;
pub mod ristretto;

mod arkworks;

/// A group element usable by the MSM kernels.
///
/// Two forms are in play: `Self` is the working (projective) form used for
/// accumulation, and [`Element::Compact`] is the smaller affine form used
/// when a partition table is stored at rest. Equality on `Self` is over the
/// projective equivalence class.
pub trait Element: Copy + Debug + PartialEq + Send + Sync + 'static {
    /// Compact storage form, convertible to and from the working form.
    type Compact: Copy + Send + Sync + 'static;

    /// The additive identity of the group.
    fn identity() -> Self;

    fn add(a: &Self, b: &Self) -> Self;

    /// Adds `e` into `res`. `e` may be left holding an arbitrary value
    /// afterwards; callers must not reuse it. Some curves exploit the
    /// relaxed contract for cheaper addition formulas.
    fn add_inplace(res: &mut Self, e: &mut Self);

    /// Doubles `e`. Kept distinct from `add(e, e)`: the reduction step of
    /// the combine kernel spends most of its time here and curves with a
    /// dedicated doubling formula are markedly faster.
    fn double(e: &Self) -> Self;

    /// Negates in place. Must be O(1).
    fn neg_inplace(&mut self);

    fn to_compact(&self) -> Self::Compact;

    fn from_compact(compact: &Self::Compact) -> Self;

    /// Serialized size of the compact form in bytes. Constant per curve.
    fn compact_size() -> usize;

    /// Writes the compact form in little-endian field-limb order.
    /// `out.len()` must equal [`Element::compact_size`].
    fn write_compact(compact: &Self::Compact, out: &mut [u8]);

    /// Reads a compact form previously produced by
    /// [`Element::write_compact`]. Returns `None` for bytes that do not
    /// decode to a group element.
    fn read_compact(bytes: &[u8]) -> Option<Self::Compact>;
}

/// Multiplies `e` by a little-endian unsigned scalar byte string.
///
/// Reference implementation used by tests and by the Pedersen path for
/// descriptor widths the table cannot serve. Plain MSB-first double-and-add.
pub fn scalar_mul<T: Element>(e: &T, scalar_le: &[u8]) -> T {
    let mut res = T::identity();
    for byte in scalar_le.iter().rev() {
        for bit_index in (0..8).rev() {
            res = T::double(&res);
            if byte >> bit_index & 1 == 1 {
                res = T::add(&res, e);
            }
        }
    }
    res
}
