//! Round-polynomial generation for a multilinear sumcheck.
//!
//! The prover sums, over the Boolean hypercube, products of multilinear
//! extensions held as evaluation tables over the curve25519 scalar field.
//! Each round emits the coefficients of the round polynomial, draws a
//! challenge from the caller's transcript, and folds the tables in half.
//! The device driver shares the execution fabric with the MSM pipeline:
//! the pair index range splits across streams, per-chunk coefficient sums
//! come back through stream awaits, and the fold runs as a kernel.

use curve25519_dalek::scalar::Scalar;
use rayon::prelude::*;

use crate::backend::{backend, Backend};
use crate::exec::copy::{async_copy_device_to_host, copy_host_slice_to_device};
use crate::exec::scheduler::concurrent_for_each;
use crate::exec::{await_stream, split, DeviceVec, HostBuf, IndexRange, Stream};

/// Caller-supplied Fiat–Shamir transcript.
pub trait SumcheckTranscript {
    /// Observes the shape of the proof before the first round.
    fn init(&mut self, num_variables: usize, round_degree: usize);

    /// Absorbs one round polynomial (coefficients, constant term first)
    /// and returns the round's challenge.
    fn round_challenge(&mut self, polynomial: &[Scalar]) -> Scalar;
}

/// One product in the sum: a multiplier and how many of the flattened
/// `product_terms` entries belong to it.
pub type ProductEntry = (Scalar, u32);

fn ceil_log2(n: usize) -> usize {
    n.next_power_of_two().trailing_zeros() as usize
}

fn round_degree(product_table: &[ProductEntry]) -> usize {
    product_table
        .iter()
        .map(|&(_, terms)| terms as usize)
        .max()
        .unwrap_or(0)
}

/// Accumulates, into `polynomial`, the expansion of
/// `mult · Π_t ((1−X)·aₜ + X·bₜ)` for one pair index.
fn accumulate_pair(
    polynomial: &mut [Scalar],
    scratch: &mut Vec<Scalar>,
    mles: &[Scalar],
    n: usize,
    mid: usize,
    pair_index: usize,
    product_table: &[ProductEntry],
    product_terms: &[u32],
) {
    let mle_value = |term: u32, index: usize| -> Scalar {
        let column = term as usize * n;
        if index < n {
            mles[column + index]
        } else {
            Scalar::ZERO
        }
    };
    let mut term_cursor = 0usize;
    for &(mult, num_terms) in product_table {
        scratch.clear();
        scratch.push(mult);
        for &term in &product_terms[term_cursor..term_cursor + num_terms as usize] {
            let a = mle_value(term, pair_index);
            let b = mle_value(term, pair_index + mid);
            let slope = b - a;
            // Multiply the accumulated coefficients by a + slope·X.
            scratch.push(Scalar::ZERO);
            for k in (0..scratch.len() - 1).rev() {
                let low = scratch[k] * a;
                let carry = scratch[k] * slope;
                scratch[k + 1] += carry;
                scratch[k] = low;
            }
        }
        for (dst, src) in polynomial.iter_mut().zip(scratch.iter()) {
            *dst += src;
        }
        term_cursor += num_terms as usize;
    }
}

/// Sums the round polynomial over pair indices `[first, last)`.
fn sum_pairs(
    polynomial: &mut [Scalar],
    mles: &[Scalar],
    n: usize,
    mid: usize,
    first: usize,
    last: usize,
    product_table: &[ProductEntry],
    product_terms: &[u32],
) {
    let mut scratch = Vec::with_capacity(polynomial.len());
    for pair_index in first..last {
        accumulate_pair(
            polynomial,
            &mut scratch,
            mles,
            n,
            mid,
            pair_index,
            product_table,
            product_terms,
        );
    }
}

/// Binds the halving variable to `r`: `mle'[i] = a + r·(b − a)`. The new
/// tables are dense over `mid` entries.
fn fold_mles(mles: &[Scalar], num_mles: usize, n: usize, mid: usize, r: Scalar) -> Vec<Scalar> {
    let mut folded = vec![Scalar::ZERO; num_mles * mid];
    folded
        .par_chunks_mut(mid)
        .enumerate()
        .for_each(|(column, out)| {
            let table = &mles[column * n..(column + 1) * n];
            for (i, slot) in out.iter_mut().enumerate() {
                let a = if i < n { table[i] } else { Scalar::ZERO };
                let b = if i + mid < n { table[i + mid] } else { Scalar::ZERO };
                *slot = a + r * (b - a);
            }
        });
    folded
}

fn check_shape(mles: &[Scalar], product_table: &[ProductEntry], product_terms: &[u32], n: usize) {
    assert!(n > 0, "sumcheck over an empty table");
    assert!(mles.len() % n == 0, "mle table length is not a multiple of n");
    let num_mles = mles.len() / n;
    let total_terms: usize = product_table.iter().map(|&(_, t)| t as usize).sum();
    assert_eq!(total_terms, product_terms.len());
    for &term in product_terms {
        assert!((term as usize) < num_mles, "product term out of range");
    }
}

/// Host driver.
fn prove_sum_cpu(
    polynomials: &mut [Scalar],
    evaluation_point: &mut [Scalar],
    transcript: &mut impl SumcheckTranscript,
    mles: &[Scalar],
    product_table: &[ProductEntry],
    product_terms: &[u32],
    n: usize,
) {
    let num_mles = mles.len() / n;
    let num_rounds = ceil_log2(n);
    let num_coefficients = round_degree(product_table) + 1;
    let mut table = mles.to_vec();
    let mut n = n;
    for round in 0..num_rounds {
        let mid = 1 << (num_rounds - round - 1);
        let polynomial = &mut polynomials[round * num_coefficients..(round + 1) * num_coefficients];
        polynomial.fill(Scalar::ZERO);
        let partial = (0..mid)
            .into_par_iter()
            .fold(
                || vec![Scalar::ZERO; num_coefficients],
                |mut acc, pair_index| {
                    let mut scratch = Vec::with_capacity(num_coefficients);
                    accumulate_pair(
                        &mut acc,
                        &mut scratch,
                        &table,
                        n,
                        mid,
                        pair_index,
                        product_table,
                        product_terms,
                    );
                    acc
                },
            )
            .reduce(
                || vec![Scalar::ZERO; num_coefficients],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            );
        polynomial.copy_from_slice(&partial);

        let r = transcript.round_challenge(polynomial);
        evaluation_point[round] = r;
        table = fold_mles(&table, num_mles, n, mid, r);
        n = mid;
    }
}

/// Device driver: tables live in device memory, per-round coefficient sums
/// split across streams, and folds run as kernels.
async fn prove_sum_device(
    polynomials: &mut [Scalar],
    evaluation_point: &mut [Scalar],
    transcript: &mut impl SumcheckTranscript,
    mles: &[Scalar],
    product_table: &[ProductEntry],
    product_terms: &[u32],
    n: usize,
) {
    let num_mles = mles.len() / n;
    let num_rounds = ceil_log2(n);
    let num_coefficients = round_degree(product_table) + 1;

    let mut table = DeviceVec::<Scalar>::uninit(mles.len());
    {
        let stream = Stream::new();
        copy_host_slice_to_device(&table, &stream, mles).await;
    }
    let mut n = n;

    // Each pair index touches one entry per column in both halves.
    let options = split::plan_split(2 * num_mles * std::mem::size_of::<Scalar>());

    for round in 0..num_rounds {
        let mid = 1 << (num_rounds - round - 1);
        let chunks: Vec<IndexRange> = split::split(IndexRange::new(0, mid), options).collect();
        let partials = HostBuf::<Scalar>::uninit(chunks.len() * num_coefficients);
        concurrent_for_each(chunks.into_iter().enumerate(), |(chunk_index, rng)| {
            let table = table.clone();
            let partials = partials.clone();
            let product_table = product_table.to_vec();
            let product_terms = product_terms.to_vec();
            let table_len = num_mles * n;
            async move {
                let stream = Stream::new();
                let chunk_out = DeviceVec::<Scalar>::uninit(num_coefficients);
                {
                    let chunk_out = chunk_out.clone();
                    stream.exec(move || {
                        // SAFETY: the table was fully written before this
                        // round and the output belongs to this kernel.
                        let mles = unsafe { table.slice(0, table_len) };
                        let out = unsafe { chunk_out.slice_mut(0, num_coefficients) };
                        out.fill(Scalar::ZERO);
                        sum_pairs(
                            out,
                            mles,
                            n,
                            mid,
                            rng.a(),
                            rng.b(),
                            &product_table,
                            &product_terms,
                        );
                    });
                }
                async_copy_device_to_host(
                    &partials,
                    chunk_index * num_coefficients,
                    &chunk_out,
                    0,
                    num_coefficients,
                    &stream,
                );
                await_stream(&stream).await;
            }
        })
        .await;

        let polynomial = &mut polynomials[round * num_coefficients..(round + 1) * num_coefficients];
        polynomial.fill(Scalar::ZERO);
        // SAFETY: every chunk writer has been awaited.
        let partials = unsafe { partials.slice(0, partials.len()) };
        for chunk in partials.chunks_exact(num_coefficients) {
            for (dst, src) in polynomial.iter_mut().zip(chunk) {
                *dst += src;
            }
        }

        let r = transcript.round_challenge(polynomial);
        evaluation_point[round] = r;

        let folded = DeviceVec::<Scalar>::uninit(num_mles * mid);
        {
            let stream = Stream::new();
            let table = table.clone();
            let folded_dev = folded.clone();
            let table_len = num_mles * n;
            stream.exec(move || {
                // SAFETY: the sum kernels above have completed; the folded
                // buffer belongs to this kernel.
                let mles = unsafe { table.slice(0, table_len) };
                let out = unsafe { folded_dev.slice_mut(0, num_mles * mid) };
                out.par_chunks_mut(mid).enumerate().for_each(|(column, out)| {
                    let column_table = &mles[column * n..(column + 1) * n];
                    for (i, slot) in out.iter_mut().enumerate() {
                        let a = if i < n { column_table[i] } else { Scalar::ZERO };
                        let b = if i + mid < n {
                            column_table[i + mid]
                        } else {
                            Scalar::ZERO
                        };
                        *slot = a + r * (b - a);
                    }
                });
            });
            await_stream(&stream).await;
        }
        table = folded;
        n = mid;
    }
}

/// Proves the sum of the given products over the Boolean hypercube.
///
/// `polynomials` receives `ceil_log2(n)` round polynomials of
/// `round_degree + 1` coefficients each; `evaluation_point` receives the
/// transcript challenges. `mles` holds the evaluation tables column-major,
/// one column of `n` entries per multilinear extension.
#[tracing::instrument(skip_all, fields(n = n, num_products = product_table.len()))]
pub fn prove_sum(
    polynomials: &mut [Scalar],
    evaluation_point: &mut [Scalar],
    transcript: &mut impl SumcheckTranscript,
    mles: &[Scalar],
    product_table: &[ProductEntry],
    product_terms: &[u32],
    n: usize,
) {
    check_shape(mles, product_table, product_terms, n);
    let num_rounds = ceil_log2(n);
    let num_coefficients = round_degree(product_table) + 1;
    assert_eq!(polynomials.len(), num_rounds * num_coefficients);
    assert_eq!(evaluation_point.len(), num_rounds);
    transcript.init(num_rounds, num_coefficients.saturating_sub(1));
    match backend() {
        Backend::Cpu => prove_sum_cpu(
            polynomials,
            evaluation_point,
            transcript,
            mles,
            product_table,
            product_terms,
            n,
        ),
        Backend::Gpu => crate::msm::block_on(prove_sum_device(
            polynomials,
            evaluation_point,
            transcript,
            mles,
            product_table,
            product_terms,
            n,
        )),
    }
}

fn evaluate_polynomial(coefficients: &[Scalar], x: Scalar) -> Scalar {
    let mut acc = Scalar::ZERO;
    for &c in coefficients.iter().rev() {
        acc = acc * x + c;
    }
    acc
}

/// Checks the round-polynomial chain against a claimed sum: every round
/// must satisfy `p(0) + p(1) == claim`, with the claim reduced to `p(r)`.
/// The final reduced claim still has to be checked against the multilinear
/// evaluations by the caller; this returns `false` on any chain break.
pub fn verify_round_polynomials(
    claimed_sum: Scalar,
    polynomials: &[&[Scalar]],
    evaluation_point: &[Scalar],
) -> bool {
    if polynomials.len() != evaluation_point.len() {
        return false;
    }
    let mut claim = claimed_sum;
    for (polynomial, &r) in polynomials.iter().zip(evaluation_point) {
        let at_zero = polynomial.first().copied().unwrap_or(Scalar::ZERO);
        let at_one: Scalar = polynomial.iter().copied().sum();
        if at_zero + at_one != claim {
            return false;
        }
        claim = evaluate_polynomial(polynomial, r);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTranscript {
        challenges: Vec<Scalar>,
        next: usize,
        rounds_seen: usize,
    }

    impl FixedTranscript {
        fn new(challenges: Vec<Scalar>) -> Self {
            Self {
                challenges,
                next: 0,
                rounds_seen: 0,
            }
        }
    }

    impl SumcheckTranscript for FixedTranscript {
        fn init(&mut self, num_variables: usize, _round_degree: usize) {
            self.rounds_seen = num_variables;
        }

        fn round_challenge(&mut self, _polynomial: &[Scalar]) -> Scalar {
            let r = self.challenges[self.next];
            self.next += 1;
            r
        }
    }

    fn s(v: u64) -> Scalar {
        Scalar::from(v)
    }

    /// Direct evaluation of Σ_x Π mles at the hypercube points.
    fn direct_sum(
        mles: &[Scalar],
        product_table: &[ProductEntry],
        product_terms: &[u32],
        n: usize,
    ) -> Scalar {
        let mut sum = Scalar::ZERO;
        let mut cursor = 0usize;
        for &(mult, num_terms) in product_table {
            for x in 0..n {
                let mut prod = mult;
                for &term in &product_terms[cursor..cursor + num_terms as usize] {
                    prod *= mles[term as usize * n + x];
                }
                sum += prod;
            }
            cursor += num_terms as usize;
        }
        sum
    }

    fn prove_and_verify(n: usize, mles: Vec<Scalar>, product_table: Vec<ProductEntry>, product_terms: Vec<u32>) {
        let num_rounds = ceil_log2(n);
        let num_coefficients = round_degree(&product_table) + 1;
        let mut polynomials = vec![Scalar::ZERO; num_rounds * num_coefficients];
        let mut evaluation_point = vec![Scalar::ZERO; num_rounds];
        let challenges: Vec<Scalar> = (0..num_rounds as u64).map(|i| s(i * 7 + 3)).collect();
        let mut transcript = FixedTranscript::new(challenges);
        prove_sum(
            &mut polynomials,
            &mut evaluation_point,
            &mut transcript,
            &mles,
            &product_table,
            &product_terms,
            n,
        );

        assert_eq!(transcript.rounds_seen, num_rounds);
        let claimed = direct_sum(&mles, &product_table, &product_terms, n);
        let rounds: Vec<&[Scalar]> = polynomials.chunks_exact(num_coefficients).collect();
        assert!(verify_round_polynomials(claimed, &rounds, &evaluation_point));

        // Tampering with the claimed sum must break the chain.
        assert!(!verify_round_polynomials(
            claimed + s(1),
            &rounds,
            &evaluation_point
        ));
    }

    #[test]
    fn the_device_driver_matches_the_host_driver() {
        let n = 13;
        let mles: Vec<Scalar> = (0..2 * n as u64).map(|i| s(i * 3 + 5)).collect();
        let product_table = vec![(s(4), 2), (s(1), 1)];
        let product_terms = vec![0u32, 1, 0];
        let num_rounds = ceil_log2(n);
        let num_coefficients = round_degree(&product_table) + 1;
        let challenges: Vec<Scalar> = (0..num_rounds as u64).map(|i| s(i + 2)).collect();

        let mut host_polys = vec![Scalar::ZERO; num_rounds * num_coefficients];
        let mut host_point = vec![Scalar::ZERO; num_rounds];
        prove_sum_cpu(
            &mut host_polys,
            &mut host_point,
            &mut FixedTranscript::new(challenges.clone()),
            &mles,
            &product_table,
            &product_terms,
            n,
        );

        let mut device_polys = vec![Scalar::ZERO; num_rounds * num_coefficients];
        let mut device_point = vec![Scalar::ZERO; num_rounds];
        crate::msm::block_on(prove_sum_device(
            &mut device_polys,
            &mut device_point,
            &mut FixedTranscript::new(challenges),
            &mles,
            &product_table,
            &product_terms,
            n,
        ));

        assert_eq!(host_polys, device_polys);
        assert_eq!(host_point, device_point);
    }

    #[test]
    fn degree_two_products_prove_and_verify() {
        let n = 8;
        let p: Vec<Scalar> = (0..n as u64).map(|i| s(i + 1)).collect();
        let q: Vec<Scalar> = (0..n as u64).map(|i| s(i * i + 2)).collect();
        let mles: Vec<Scalar> = p.into_iter().chain(q).collect();
        prove_and_verify(n, mles, vec![(s(1), 2)], vec![0, 1]);
    }

    #[test]
    fn sums_of_weighted_products_prove_and_verify() {
        let n = 5; // not a power of two: the tail pads with zeros
        let mles: Vec<Scalar> = (0..3 * n as u64).map(|i| s(i * 11 + 1)).collect();
        prove_and_verify(
            n,
            mles,
            vec![(s(2), 2), (s(5), 1)],
            vec![0, 2, 1],
        );
    }

    #[test]
    fn final_claim_matches_the_folded_tables() {
        let n = 4;
        let p: Vec<Scalar> = vec![s(3), s(1), s(4), s(1)];
        let q: Vec<Scalar> = vec![s(2), s(7), s(1), s(8)];
        let mles: Vec<Scalar> = p.iter().chain(q.iter()).copied().collect();
        let product_table = vec![(s(1), 2)];
        let product_terms = vec![0u32, 1];

        let mut polynomials = vec![Scalar::ZERO; 2 * 3];
        let mut evaluation_point = vec![Scalar::ZERO; 2];
        let mut transcript = FixedTranscript::new(vec![s(5), s(9)]);
        prove_sum(
            &mut polynomials,
            &mut evaluation_point,
            &mut transcript,
            &mles,
            &product_table,
            &product_terms,
            n,
        );

        // The chain verifies, and the final reduced claim must equal the
        // product of the fully folded tables.
        let claimed = direct_sum(&mles, &product_table, &product_terms, n);
        let rounds: Vec<&[Scalar]> = polynomials.chunks_exact(3).collect();
        assert!(verify_round_polynomials(claimed, &rounds, &evaluation_point));
        let claim = evaluate_polynomial(rounds[1], evaluation_point[1]);
        let fold = |table: &[Scalar]| {
            let mut table = table.to_vec();
            let mut n = n;
            for &r in &evaluation_point {
                let mid = n / 2;
                table = fold_mles(&table, 1, n, mid, r);
                n = mid;
            }
            table[0]
        };
        assert_eq!(claim, fold(&p) * fold(&q));
    }
}
