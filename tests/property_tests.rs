use std::f64::consts::TAU;

use proptest::prelude::*;
use recombine::cluster::{ClusterSequence, Metric, Parent};
use recombine::nn::{
    build_index, Neighbour, RapPhi, SelfImagePolicy, WrapOptions, WrapStrategy,
};

/// Position, scale factor and beam distance on a line.
type Obj = (f64, f64, f64);

struct Weighted(Obj);

impl Metric<Obj> for Weighted {
    fn from_object(o: &Obj) -> Self {
        Weighted(*o)
    }
    fn geometric_distance(&self, other: &Self) -> f64 {
        let d = self.0 .0 - other.0 .0;
        d * d
    }
    fn geometric_beam_distance(&self) -> f64 {
        self.0 .2
    }
    fn scale_factor(&self) -> f64 {
        self.0 .1
    }
}

fn combine(a: &Obj, b: &Obj) -> Obj {
    ((a.0 + b.0) / 2.0, a.1 + b.1, a.2.min(b.2))
}

fn objects() -> impl Strategy<Value = Vec<Obj>> {
    prop::collection::vec((-10.0f64..10.0, 0.1f64..3.0, 0.5f64..50.0), 0..40)
}

fn point() -> impl Strategy<Value = (f64, f64)> {
    (-3.0f64..3.0, 0.0f64..TAU)
}

proptest! {
    #[test]
    fn prop_plain_and_scaled_agree(data in objects()) {
        let plain = ClusterSequence::plain::<Weighted, _>(data.clone(), &combine).unwrap();
        let scaled = ClusterSequence::scaled::<Weighted, _>(data, &combine).unwrap();
        prop_assert_eq!(plain.history(), scaled.history());
        prop_assert_eq!(plain.objects(), scaled.objects());
    }

    #[test]
    fn prop_runs_are_deterministic(data in objects()) {
        let first = ClusterSequence::scaled::<Weighted, _>(data.clone(), &combine).unwrap();
        let second = ClusterSequence::scaled::<Weighted, _>(data, &combine).unwrap();
        prop_assert_eq!(first.history(), second.history());
    }

    #[test]
    fn prop_history_is_a_complete_forest(data in objects()) {
        let n = data.len();
        let seq = ClusterSequence::plain::<Weighted, _>(data, &combine).unwrap();
        let h = seq.history();
        prop_assert!(h.validate().is_ok());
        prop_assert!(h.is_complete());
        prop_assert_eq!(h.len(), 2 * n);
        prop_assert!(h.unclustered().is_empty());

        // every step is one merge or one retirement
        let merges = h.elements()[n..].iter().filter(|e| e.parent2 != Parent::Beam).count();
        prop_assert_eq!(seq.objects().len(), n + merges);

        // final clusters partition the inputs
        let mut leaves: Vec<usize> = h.inclusive_nodes().into_iter().flat_map(|c| h.leaves(c)).collect();
        leaves.sort_unstable();
        prop_assert_eq!(leaves, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn prop_traversals_are_idempotent(data in objects()) {
        let seq = ClusterSequence::scaled::<Weighted, _>(data, &combine).unwrap();
        let h = seq.history();
        let order = h.unique_order();
        prop_assert_eq!(&order, &h.unique_order());
        let mut sorted = order.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, (0..h.len()).collect::<Vec<_>>());
        for node in 0..h.len() {
            prop_assert_eq!(h.leaves(node), h.leaves(node));
        }
    }

    #[test]
    fn prop_exclusive_counts_match_nodes(data in objects(), dcut in 0.0f64..100.0) {
        let seq = ClusterSequence::plain::<Weighted, _>(data, &combine).unwrap();
        let h = seq.history();
        let njets = h.n_exclusive(dcut).unwrap();
        prop_assert_eq!(h.exclusive_nodes_dcut(dcut).unwrap().len(), njets);
        prop_assert!(njets <= h.n_inputs());
        if njets < h.n_inputs() {
            prop_assert!(h.exclusive_dmerge_max(njets).unwrap() <= dcut);
        }
        if njets > 0 {
            prop_assert!(h.exclusive_dmerge_max(njets - 1).unwrap() > dcut);
        }
    }

    #[test]
    fn prop_cylinder_index_matches_brute_force(
        initial in prop::collection::vec(point(), 1..30),
        ops in prop::collection::vec((0u8..3, any::<usize>(), any::<usize>(), point()), 0..30),
    ) {
        for strategy in [WrapStrategy::Full4Pi, WrapStrategy::Mirror3Pi, WrapStrategy::Lazy2Pi] {
            let options = WrapOptions::new(strategy).with_self_image(SelfImagePolicy::Lenient);
            let mut positions: Vec<RapPhi> =
                initial.iter().map(|&(r, p)| RapPhi::new(r, p)).collect();
            let mut index = build_index(&positions, &options).unwrap();
            let mut live: Vec<usize> = (0..positions.len()).collect();

            for &(kind, x, y, (r, p)) in &ops {
                let new_point = RapPhi::new(r, p);
                let before: Vec<(usize, Option<Neighbour>)> = live
                    .iter()
                    .map(|&i| (i, index.nearest_neighbour(i).unwrap()))
                    .collect();
                let updated = if kind == 0 && live.len() >= 2 {
                    let a = live.swap_remove(x % live.len());
                    let b = live.swap_remove(y % live.len());
                    let (i, updated) =
                        index.remove_combined_add_combination(a, b, new_point).unwrap();
                    prop_assert_eq!(i, positions.len());
                    positions.push(new_point);
                    live.push(i);
                    updated
                } else if kind == 1 && !live.is_empty() {
                    let a = live.swap_remove(x % live.len());
                    index.remove_point(a).unwrap()
                } else {
                    let update = index.remove_and_add_points(&[], &[new_point]).unwrap();
                    prop_assert_eq!(&update.added, &vec![positions.len()]);
                    live.push(positions.len());
                    positions.push(new_point);
                    update.updated
                };

                // every live point whose answer moved is reported, and nothing dead is
                prop_assert!(updated.windows(2).all(|w| w[0] < w[1]));
                prop_assert!(updated.iter().all(|&u| index.is_valid(u)));
                for &i in &live {
                    let now = index.nearest_neighbour(i).unwrap();
                    let old = before.iter().find(|(j, _)| *j == i).map(|(_, n)| *n);
                    if old != Some(now) {
                        prop_assert!(updated.contains(&i), "{:?}: {} changed silently", strategy, i);
                    }
                }
                prop_assert_eq!(index.len(), live.len());

                for &i in &live {
                    prop_assert!(index.is_valid(i));
                    let brute = live
                        .iter()
                        .filter(|&&j| j != i)
                        .map(|&j| positions[i].cylinder_distance_sq(&positions[j]))
                        .fold(f64::INFINITY, f64::min);
                    match index.nearest_neighbour(i).unwrap() {
                        None => {
                            prop_assert_eq!(live.len(), 1);
                        }
                        Some(n) if n.self_image => {
                            prop_assert!(strategy != WrapStrategy::Full4Pi);
                            prop_assert_eq!(n.index, i);
                            prop_assert!(brute >= n.distance_sq - 1e-9);
                        }
                        Some(n) => {
                            prop_assert!(n.index != i && live.contains(&n.index));
                            prop_assert!((n.distance_sq - brute).abs() <= 1e-9 * (1.0 + brute));
                            let direct = positions[i].cylinder_distance_sq(&positions[n.index]);
                            prop_assert!((n.distance_sq - direct).abs() <= 1e-9 * (1.0 + direct));
                        }
                    }

                    let radius_sq = 1.5 * brute;
                    let within = index.neighbours_within(i, radius_sq);
                    for &j in &live {
                        let d = positions[i].cylinder_distance_sq(&positions[j]);
                        if j != i && d <= radius_sq * (1.0 - 1e-9) {
                            prop_assert!(within.contains(&j));
                        }
                    }
                    for &j in &within {
                        prop_assert!(j != i && live.contains(&j));
                        let d = positions[i].cylinder_distance_sq(&positions[j]);
                        prop_assert!(d <= radius_sq * (1.0 + 1e-9) + 1e-12);
                    }
                }
            }
        }
    }
}
