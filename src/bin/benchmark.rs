//! Multiexponentiation throughput benchmark.
//!
//! ```text
//! benchmark <backend> <curve> <n> <num_samples> <num_outputs> <element_nbytes> [--verbose]
//! ```

use std::process::exit;
use std::time::Instant;

use clap::Parser;
use curve25519_dalek::ristretto::RistrettoPoint;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing_subscriber::EnvFilter;

use fixed_msm::curve::Element;
use fixed_msm::{init, Backend, Curve, EngineConfig, MultiexpHandle};

#[derive(Parser, Debug)]
#[command(name = "benchmark", about = "Fixed-base multiexponentiation benchmark")]
struct Args {
    /// Computational backend: cpu or gpu
    backend: String,
    /// Curve: curve25519, bls12-381, bn254, or grumpkin
    curve: String,
    /// Number of generators per output
    n: usize,
    /// Timed repetitions
    num_samples: usize,
    /// Number of outputs per multiexponentiation
    num_outputs: usize,
    /// Scalar width in bytes (1..=32)
    element_nbytes: usize,
    /// Print per-sample timings
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

struct SampleStats {
    mean_seconds: f64,
    scalar_throughput: f64,
}

fn run_benchmark<T: Element>(generators: Vec<T>, args: &Args) -> SampleStats {
    let mut rng = ChaCha20Rng::seed_from_u64(0x5eed);
    let handle = MultiexpHandle::new(&generators);
    let scalars: Vec<u8> = (0..args.num_outputs * args.n * args.element_nbytes)
        .map(|_| rng.gen())
        .collect();
    let mut res = vec![T::identity(); args.num_outputs];

    let mut total = 0.0f64;
    for sample in 0..args.num_samples {
        let start = Instant::now();
        handle.fixed_multiexponentiation(
            &mut res,
            args.element_nbytes,
            args.num_outputs,
            args.n,
            &scalars,
        );
        let elapsed = start.elapsed().as_secs_f64();
        total += elapsed;
        if args.verbose {
            println!("sample {sample}: {elapsed:.6} s");
        }
    }
    let mean_seconds = total / args.num_samples as f64;
    SampleStats {
        mean_seconds,
        scalar_throughput: (args.n * args.num_outputs) as f64 / mean_seconds,
    }
}

fn sample_generators<T: Element>(n: usize, mut sample: impl FnMut(&mut ChaCha20Rng) -> T) -> Vec<T> {
    let mut rng = ChaCha20Rng::seed_from_u64(0xba5e);
    (0..n).map(|_| sample(&mut rng)).collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            exit(-1);
        }
    };

    let backend = match args.backend.as_str() {
        "cpu" => Backend::Cpu,
        "gpu" => Backend::Gpu,
        other => {
            eprintln!("unsupported backend: {other}");
            exit(-1);
        }
    };
    let curve: Curve = match args.curve.parse() {
        Ok(curve) => curve,
        Err(e) => {
            eprintln!("{e}");
            exit(-1);
        }
    };
    if args.n == 0
        || args.num_samples == 0
        || args.num_outputs == 0
        || args.element_nbytes == 0
        || args.element_nbytes > 32
    {
        eprintln!("restriction: 1 <= n, 1 <= num_samples, 1 <= num_outputs, 1 <= element_nbytes <= 32");
        exit(-1);
    }
    init(EngineConfig {
        backend,
        num_precomputed_elements: 0,
    })
    .expect("first initialization");

    let stats = match curve {
        Curve::Ristretto255 => run_benchmark(
            sample_generators(args.n, |rng| RistrettoPoint::random(rng)),
            &args,
        ),
        Curve::Bls12381G1 => run_benchmark(
            sample_generators(args.n, |rng| {
                <ark_bls12_381::G1Projective as ark_std::UniformRand>::rand(rng)
            }),
            &args,
        ),
        Curve::Bn254G1 => run_benchmark(
            sample_generators(args.n, |rng| {
                <ark_bn254::G1Projective as ark_std::UniformRand>::rand(rng)
            }),
            &args,
        ),
        Curve::Grumpkin => run_benchmark(
            sample_generators(args.n, |rng| {
                <ark_grumpkin::Projective as ark_std::UniformRand>::rand(rng)
            }),
            &args,
        ),
    };

    println!(
        "{} outputs x {} generators x {} bytes: {:.6} s/sample, {:.0} scalars/s",
        args.num_outputs, args.n, args.element_nbytes, stats.mean_seconds, stats.scalar_throughput
    );
}
