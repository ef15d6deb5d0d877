//! Recombination on the (rapidity, azimuth) cylinder with each engine.
//!
//! Run with `RUST_LOG=recombine=trace` to see every step.

use std::f64::consts::{PI, TAU};

use recombine::cluster::{ClusterSequence, CylinderMetric, Metric};
use recombine::nn::{RapPhi, WrapOptions, WrapStrategy};

/// An object with a position and a weight.
#[derive(Clone, Copy, Debug)]
struct Deposit {
    at: RapPhi,
    weight: f64,
}

/// Squared cylinder distance with the beam at radius 0.4, scaled by inverse squared weight.
struct Distance {
    at: RapPhi,
    weight: f64,
}

impl Metric<Deposit> for Distance {
    fn from_object(d: &Deposit) -> Self {
        Distance { at: d.at, weight: d.weight }
    }
    fn geometric_distance(&self, other: &Self) -> f64 {
        self.at.cylinder_distance_sq(&other.at)
    }
    fn geometric_beam_distance(&self) -> f64 {
        0.16
    }
    fn scale_factor(&self) -> f64 {
        1.0 / (self.weight * self.weight)
    }
}

impl CylinderMetric<Deposit> for Distance {
    fn rap_phi(&self) -> RapPhi {
        self.at
    }
}

fn merge(a: &Deposit, b: &Deposit) -> Deposit {
    let weight = a.weight + b.weight;
    let mut dphi = b.at.phi - a.at.phi;
    if dphi > PI {
        dphi -= TAU;
    } else if dphi < -PI {
        dphi += TAU;
    }
    let rap = (a.at.rap * a.weight + b.at.rap * b.weight) / weight;
    let phi = a.at.phi + dphi * b.weight / weight;
    Deposit { at: RapPhi::new(rap, phi).sanitized(), weight }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // two groups, one straddling the azimuth seam
    let deposits = vec![
        Deposit { at: RapPhi::new(0.0, 0.05), weight: 40.0 },
        Deposit { at: RapPhi::new(0.1, 6.25), weight: 12.0 },
        Deposit { at: RapPhi::new(-0.1, 0.2), weight: 3.0 },
        Deposit { at: RapPhi::new(1.5, 3.0), weight: 25.0 },
        Deposit { at: RapPhi::new(1.6, 3.2), weight: 5.0 },
        Deposit { at: RapPhi::new(-2.5, 1.5), weight: 0.8 },
    ];

    let scaled = ClusterSequence::scaled::<Distance, _>(deposits.clone(), &merge).unwrap();
    println!("=== scaled engine ===");
    for (i, e) in scaled.history().elements().iter().enumerate().skip(deposits.len()) {
        println!(
            "  node {i}: {:?} + {:?} at d = {:.4}",
            e.parent1, e.parent2, e.distance
        );
    }
    println!("  final clusters:");
    for d in scaled.inclusive() {
        println!("    rap {:5.2}  phi {:5.2}  weight {:6.2}", d.at.rap, d.at.phi, d.weight);
    }

    for strategy in [WrapStrategy::Full4Pi, WrapStrategy::Mirror3Pi, WrapStrategy::Lazy2Pi] {
        let seq = ClusterSequence::cylinder::<Distance, _>(
            deposits.clone(),
            &WrapOptions::new(strategy),
            &merge,
        )
        .unwrap();
        let same = seq.history().elements().len() == scaled.history().elements().len()
            && seq
                .history()
                .elements()
                .iter()
                .zip(scaled.history().elements())
                .all(|(a, b)| a.parent1 == b.parent1 && a.parent2 == b.parent2);
        println!("\n=== cylinder engine ({strategy:?}) ===");
        println!("  same merge tree as the scaled engine: {same}");
        println!("  clusters at dcut = 1e-3: {}", seq.history().n_exclusive(1e-3).unwrap());
    }
}
