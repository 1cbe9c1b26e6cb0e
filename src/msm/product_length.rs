//! Per-product effective lengths for variable-length outputs.

/// Total number of products, one per scalar bit across all outputs.
pub fn count_products(bit_table: &[u32]) -> usize {
    bit_table.iter().map(|&b| b as usize).sum()
}

/// Computes the effective length of every product within the generator
/// chunk `[first, first + length)`: output `i` participates with its
/// global length clamped to the chunk. Every product of output `i` shares
/// that output's effective length; zero means the product reduces to the
/// identity.
pub fn compute_product_length_table(
    bit_table: &[u32],
    output_lengths: &[u32],
    first: usize,
    length: usize,
) -> Vec<u32> {
    assert_eq!(bit_table.len(), output_lengths.len());
    let mut product_lengths = Vec::with_capacity(count_products(bit_table));
    for (&bits, &output_length) in bit_table.iter().zip(output_lengths) {
        let effective = (output_length as usize).saturating_sub(first).min(length) as u32;
        product_lengths.extend(std::iter::repeat(effective).take(bits as usize));
    }
    product_lengths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_clamp_to_the_chunk() {
        // Outputs of 3 and 1 bits with lengths 10 and 100, chunk [16, 48).
        let lengths = compute_product_length_table(&[3, 1], &[10, 100], 16, 32);
        assert_eq!(lengths, vec![0, 0, 0, 32]);
    }

    #[test]
    fn a_leading_chunk_keeps_short_outputs() {
        let lengths = compute_product_length_table(&[2, 1], &[10, 100], 0, 32);
        assert_eq!(lengths, vec![10, 10, 32]);
    }

    #[test]
    fn product_counts_sum_the_bit_table() {
        assert_eq!(count_products(&[3, 1, 8]), 12);
        assert_eq!(count_products(&[]), 0);
    }
}
