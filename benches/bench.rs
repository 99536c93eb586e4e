#![allow(clippy::all)]

use criterion::*;
use gridgen::*;
use mfa::*;
use randn::*;

macro_rules! bench_decode_specific {
    ($group:ident, $label:expr, $mfa:expr, $size:expr, $eval:expr) => {
        $group.bench_with_input(
            BenchmarkId::new(format!("{} {}", $label, $mfa.model().tmesh.tensor_prods.len()), $size),
            $size,
            |b, &size| {
                let dom_dim = $mfa.model().dom_dim;
                let params = gen_params(dom_dim, size);
                let decoder = Decoder::new($mfa.model()).unwrap();
                let mut out = vec![0.0; size];

                b.iter(|| black_box($eval(&decoder, &params, &mut out)));
            },
        );
    };
}

fn eval_vol_pt(decoder: &Decoder<f64>, params: &[Vec<f64>], out: &mut [f64]) {
    let mut di = DecodeInfo::new(decoder.model());
    let mut z = [0.0];
    for (i, p) in params.iter().enumerate() {
        decoder.vol_pt(p, 0, &[], &mut di, &mut z).unwrap();
        out[i] = z[0];
    }
}

fn eval_tmesh(decoder: &Decoder<f64>, params: &[Vec<f64>], out: &mut [f64]) {
    let mut di = DecodeInfo::new(decoder.model());
    let mut z = [0.0];
    for (i, p) in params.iter().enumerate() {
        decoder.vol_pt_tmesh(p, &mut di, &mut z).unwrap();
        out[i] = z[0];
    }
}

fn eval_fast(decoder: &Decoder<f64>, params: &[Vec<f64>], out: &mut [f64]) {
    let mut fdi = FastDecodeInfo::new(decoder);
    for (i, p) in params.iter().enumerate() {
        out[i] = decoder.fast_vol_pt(p, &mut fdi).unwrap();
    }
}

fn eval_fast_grad(decoder: &Decoder<f64>, params: &[Vec<f64>], out: &mut [f64]) {
    let mut fdi = FastDecodeInfo::new(decoder);
    let mut grad = vec![0.0; params[0].len()];
    for (i, p) in params.iter().enumerate() {
        decoder.fast_grad(p, &mut fdi, &mut grad, None).unwrap();
        out[i] = grad[0];
    }
}

fn bench_decode(c: &mut Criterion) {
    for ndims in [2, 3] {
        let mfa = gen_fixed_model(ndims, 16, 3, 10);
        let mut group = c.benchmark_group(format!("Decode_{ndims}D_single-tensor"));
        for size in [1, 100, 10_000].iter() {
            group.throughput(Throughput::Elements(*size as u64));
            bench_decode_specific!(group, "vol_pt", mfa, size, eval_vol_pt);
            bench_decode_specific!(group, "fast_vol_pt", mfa, size, eval_fast);
            bench_decode_specific!(group, "fast_grad", mfa, size, eval_fast_grad);
        }
        group.finish();
    }

    let mfa = gen_adaptive_model(40, 3, 1e-4);
    let mut group = c.benchmark_group("Decode_2D_tmesh");
    for size in [1, 100, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        bench_decode_specific!(group, "vol_pt", mfa, size, eval_vol_pt);
        bench_decode_specific!(group, "vol_pt_tmesh", mfa, size, eval_tmesh);
    }
    group.finish();
}

fn bench_point_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("Decode_2D_point-set");
    for gridsize in [20, 100] {
        let mfa = gen_fixed_model(2, gridsize, 3, gridsize / 2);
        let size = gridsize * gridsize;
        group.throughput(Throughput::Elements(size as u64));
        for saved_basis in [true, false] {
            group.bench_with_input(
                BenchmarkId::new(format!("decode_domain saved_basis={saved_basis}"), size),
                &size,
                |b, _| b.iter(|| black_box(mfa.decode_domain(&[], saved_basis).unwrap())),
            );
        }
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("Encode_2D");
    for gridsize in [20, 60] {
        let size = gridsize * gridsize;
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("fixed_encode", size), &gridsize, |b, &n| {
            b.iter(|| black_box(gen_fixed_model(2, n, 3, n / 2)))
        });
        group.bench_with_input(BenchmarkId::new("adaptive_encode", size), &gridsize, |b, &n| {
            b.iter(|| black_box(gen_adaptive_model(n, 3, 1e-3)))
        });
    }
    group.finish();
}

criterion_group!(benches_decode, bench_decode, bench_point_set);
criterion_group!(benches_encode, bench_encode);
criterion_main!(benches_decode, benches_encode,);

mod randn {
    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;

    /// Fixed random seed to support repeatable testing
    const SEED: [u8; 32] = [
        0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 15, 14, 13, 12, 11, 10, 9, 8, 7,
        6, 5, 4, 3, 2, 1,
    ];

    /// Get a random number generator with a const seed for repeatable testing
    pub fn rng_fixed_seed() -> StdRng {
        StdRng::from_seed(SEED)
    }

    /// Generate `n` parameters in [0, 1)
    pub fn randu(rng: &mut StdRng, n: usize) -> Vec<f64> {
        (0..n).map(|_| rng.random::<f64>()).collect()
    }
}

mod gridgen {
    use super::randn::*;
    use mfa::utils::*;
    use mfa::*;

    // Samples of a smooth scalar field on a regular grid of the unit cube,
    // stored as `ndims` domain columns followed by the value column.
    pub fn gen_samples(ndims: usize, size: usize) -> PointSet<f64> {
        let axes: Vec<Vec<f64>> = (0..ndims).map(|_| linspace(0.0_f64, 1.0, size)).collect();
        let domain = sample_grid(&axes, |p| {
            p.iter()
                .enumerate()
                .map(|(k, &x)| (std::f64::consts::PI * (k as f64 + 1.0) * x).sin())
                .product()
        });
        PointSet::structured(domain, &vec![size; ndims]).unwrap()
    }

    // Single-tensor unweighted fit of the value column only.
    pub fn gen_fixed_model(ndims: usize, size: usize, degree: usize, nctrl: usize) -> Mfa<f64> {
        let mut mfa = Mfa::new(&vec![degree; ndims], &vec![nctrl; ndims], gen_samples(ndims, size), ndims, ndims)
            .unwrap();
        mfa.fixed_encode(&EncodeOptions::default()).unwrap();
        mfa
    }

    // Adaptively refined 2D fit of the value column; usually leaves several tensor products.
    pub fn gen_adaptive_model(size: usize, degree: usize, err_limit: f64) -> Mfa<f64> {
        let mut mfa = Mfa::new(&[degree, degree], &[degree + 1, degree + 1], gen_samples(2, size), 2, 2).unwrap();
        mfa.adaptive_encode(&AdaptiveOptions::with_err_limit(err_limit)).unwrap();
        mfa
    }

    // `n` uniformly random parameter points.
    pub fn gen_params(ndims: usize, n: usize) -> Vec<Vec<f64>> {
        let mut rng = rng_fixed_seed();
        let cols: Vec<Vec<f64>> = (0..ndims).map(|_| randu(&mut rng, n)).collect();
        (0..n).map(|i| cols.iter().map(|c| c[i]).collect()).collect()
    }
}
