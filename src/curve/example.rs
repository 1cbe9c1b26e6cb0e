//! Integer arithmetic mod 97.
//!
//! A minimal model of the [`Element`](super::Element) contract used for
//! writing tests. Cheap enough that correctness tests can run at generator
//! counts where a real curve would be prohibitively slow, and transparent
//! enough that expected values can be computed by hand.

use super::Element;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Element97 {
    value: u32,
}

impl Element97 {
    pub const fn new(value: u32) -> Self {
        Self { value: value % 97 }
    }

    pub fn value(&self) -> u32 {
        self.value
    }
}

impl Element for Element97 {
    type Compact = u32;

    fn identity() -> Self {
        Self { value: 0 }
    }

    fn add(a: &Self, b: &Self) -> Self {
        Self {
            value: (a.value + b.value) % 97,
        }
    }

    fn add_inplace(res: &mut Self, e: &mut Self) {
        res.value = (res.value + e.value) % 97;
        // Simulate a destructive add so tests catch callers that reuse `e`.
        e.value = 13;
    }

    fn double(e: &Self) -> Self {
        Self {
            value: (e.value * 2) % 97,
        }
    }

    fn neg_inplace(&mut self) {
        self.value = (97 - self.value) % 97;
    }

    fn to_compact(&self) -> u32 {
        self.value
    }

    fn from_compact(compact: &u32) -> Self {
        Self::new(*compact)
    }

    fn compact_size() -> usize {
        4
    }

    fn write_compact(compact: &u32, out: &mut [u8]) {
        out.copy_from_slice(&compact.to_le_bytes());
    }

    fn read_compact(bytes: &[u8]) -> Option<u32> {
        let value = u32::from_le_bytes(bytes.try_into().ok()?);
        (value < 97).then_some(value)
    }
}
