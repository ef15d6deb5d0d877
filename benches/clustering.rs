use std::f64::consts::{PI, TAU};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;
use recombine::cluster::{ClusterSequence, CylinderMetric, Metric};
use recombine::nn::{RapPhi, SelfImagePolicy, WrapOptions, WrapStrategy};

/// Squared cylinder distance, beam at `R²`, inverse squared weight as scale factor.
struct AntiKtLike(RapPhi, f64);

const R2: f64 = 0.16;

impl Metric<(RapPhi, f64)> for AntiKtLike {
    fn from_object(o: &(RapPhi, f64)) -> Self {
        AntiKtLike(o.0, o.1)
    }
    fn geometric_distance(&self, other: &Self) -> f64 {
        self.0.cylinder_distance_sq(&other.0)
    }
    fn geometric_beam_distance(&self) -> f64 {
        R2
    }
    fn scale_factor(&self) -> f64 {
        1.0 / (self.1 * self.1)
    }
}

impl CylinderMetric<(RapPhi, f64)> for AntiKtLike {
    fn rap_phi(&self) -> RapPhi {
        self.0
    }
}

fn combine(a: &(RapPhi, f64), b: &(RapPhi, f64)) -> (RapPhi, f64) {
    let w = a.1 + b.1;
    let mut dphi = b.0.phi - a.0.phi;
    if dphi > PI {
        dphi -= TAU;
    } else if dphi < -PI {
        dphi += TAU;
    }
    let rap = (a.0.rap * a.1 + b.0.rap * b.1) / w;
    let phi = a.0.phi + dphi * b.1 / w;
    (RapPhi::new(rap, phi).sanitized(), w)
}

fn bench_sequences(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster_sequence");

    let mut rng = StdRng::seed_from_u64(42);
    let n = 400;
    let data: Vec<(RapPhi, f64)> = (0..n)
        .map(|_| {
            let p = RapPhi::new(rng.random_range(-4.0..4.0), rng.random_range(0.0..TAU));
            (p, rng.random_range(0.5..50.0))
        })
        .collect();

    group.bench_function("plain_n400", |b| {
        b.iter(|| {
            ClusterSequence::plain::<AntiKtLike, _>(black_box(data.clone()), &combine).unwrap()
        })
    });
    group.bench_function("scaled_n400", |b| {
        b.iter(|| {
            ClusterSequence::scaled::<AntiKtLike, _>(black_box(data.clone()), &combine).unwrap()
        })
    });
    for strategy in [WrapStrategy::Full4Pi, WrapStrategy::Mirror3Pi, WrapStrategy::Lazy2Pi] {
        let options = WrapOptions::new(strategy).with_self_image(SelfImagePolicy::Lenient);
        group.bench_function(format!("cylinder_{strategy:?}_n400"), |b| {
            b.iter(|| {
                ClusterSequence::cylinder::<AntiKtLike, _>(black_box(data.clone()), &options, &combine)
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sequences);
criterion_main!(benches);
