//! Closest-pair tracking on the cylinder, backed by a dynamic nearest-neighbour index.
//!
//! Each live object keeps the same `dij` as in [`super::ScaledEngine`], but its geometric
//! neighbour comes from a [`crate::nn::DynamicNearestNeighbours`] index instead of a
//! linear scan. Rows live in a binary heap keyed by `(dij, key)`. A row that changes gets
//! a new stamp and a fresh heap entry; outdated entries are dropped when they surface.
//! After each step only the points the index reports as updated are refreshed.
//!
//! The index names one neighbour per point, so the key on a heap entry is not always
//! the smallest key at that distance. When the minimum surfaces, every row sitting at
//! it is checked against the points within its geometric neighbour distance, which
//! holds every step that ties with it (the member with the smaller scale factor sees
//! its partner at exactly that distance).

use super::traits::{ClosestPair, CylinderMetric, Metric, NearestNeighbourEngine};
use super::util::PairKey;
use crate::error::{Error, Result};
use crate::nn::{build_index, BoxedIndex, RapPhi, WrapOptions};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

/// Compact the heap once stale entries outnumber live rows by this factor.
const HEAP_SLACK: usize = 2;

#[derive(Clone, Debug)]
struct CylinderRow<M> {
    point: usize,
    metric: M,
    nn: Option<usize>,
    /// Index distance to the geometric neighbour, even when the beam wins.
    nn_geo: f64,
    dij: f64,
    stamp: u32,
}

impl<M> CylinderRow<M> {
    fn new<T>(point: usize, metric: M) -> Self
    where
        M: Metric<T>,
    {
        Self {
            point,
            dij: metric.beam_distance(),
            metric,
            nn: None,
            nn_geo: f64::INFINITY,
            stamp: 0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct HeapEntry {
    dij: f64,
    key: PairKey,
    index: usize,
    stamp: u32,
}

// Reversed so that `BinaryHeap` pops the smallest `(dij, key)` first.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dij
            .total_cmp(&self.dij)
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

/// Closest-pair engine using a cylinder nearest-neighbour index.
///
/// Produces the same steps as [`super::PlainEngine`] as long as the metric's geometric
/// distance is the squared cylinder distance, ties included.
///
/// A self-image answer from the index (see [`crate::nn::SelfImagePolicy`]) means no
/// real object lies within 2π; it is treated as "beam only" as long as the beam is
/// closer than the image, and reported as [`Error::AmbiguousNeighbour`] otherwise.
pub struct CylinderEngine<M> {
    index: BoxedIndex,
    rows: Vec<Option<CylinderRow<M>>>,
    object_of_point: Vec<usize>,
    heap: BinaryHeap<HeapEntry>,
    n_live: usize,
}

impl<M> fmt::Debug for CylinderEngine<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CylinderEngine")
            .field("n_live", &self.n_live)
            .field("heap_len", &self.heap.len())
            .finish_non_exhaustive()
    }
}

impl<M> CylinderEngine<M> {
    /// Build the engine over `objects` (indices `0..objects.len()`).
    pub fn new<T>(objects: &[T], options: &WrapOptions) -> Result<Self>
    where
        M: CylinderMetric<T>,
    {
        let metrics: Vec<M> = objects.iter().map(M::from_object).collect();
        let points: Vec<RapPhi> = metrics.iter().map(|m| m.rap_phi()).collect();
        let index = build_index(&points, options)?;
        let n = metrics.len();
        let rows = metrics
            .into_iter()
            .enumerate()
            .map(|(i, metric)| Some(CylinderRow::new::<T>(i, metric)))
            .collect();
        let mut engine = Self {
            index,
            rows,
            object_of_point: (0..n).collect(),
            heap: BinaryHeap::with_capacity(2 * n),
            n_live: n,
        };
        for i in 0..n {
            engine.refresh::<T>(i)?;
        }
        tracing::debug!(
            objects = n,
            strategy = ?options.strategy(),
            "built cylinder engine"
        );
        Ok(engine)
    }

    fn take_row(&mut self, index: usize) -> CylinderRow<M> {
        match self.rows.get_mut(index).and_then(Option::take) {
            Some(row) => row,
            None => panic!("index {index} is not live"),
        }
    }

    fn live_row(&self, index: usize) -> &CylinderRow<M> {
        match self.rows.get(index).and_then(Option::as_ref) {
            Some(row) => row,
            None => panic!("index {index} is not live"),
        }
    }

    fn is_current(&self, entry: &HeapEntry) -> bool {
        self.rows
            .get(entry.index)
            .and_then(Option::as_ref)
            .is_some_and(|r| r.stamp == entry.stamp)
    }

    /// Re-derive the neighbour of a live object and queue it.
    fn refresh<T>(&mut self, index: usize) -> Result<()>
    where
        M: CylinderMetric<T>,
    {
        let Some(row) = self.rows[index].as_ref() else {
            return Ok(());
        };
        let answer = self
            .index
            .nearest_neighbour(row.point)
            .map_err(|e| match e {
                Error::AmbiguousNeighbour { .. } => Error::AmbiguousNeighbour { index },
                other => other,
            })?;
        let beam_geo = row.metric.geometric_beam_distance();
        let (nn, nn_geo, dij) = match answer {
            Some(n) if n.self_image => {
                if beam_geo > n.distance_sq {
                    return Err(Error::AmbiguousNeighbour { index });
                }
                (None, f64::INFINITY, row.metric.beam_distance())
            }
            Some(n) if n.distance_sq <= beam_geo => {
                let other = self.object_of_point[n.index];
                let partner = self.live_row(other);
                (Some(other), n.distance_sq, row.metric.distance(&partner.metric))
            }
            Some(n) => (None, n.distance_sq, row.metric.beam_distance()),
            None => (None, f64::INFINITY, row.metric.beam_distance()),
        };

        let Some(row) = self.rows[index].as_mut() else {
            return Ok(());
        };
        row.nn = nn;
        row.nn_geo = nn_geo;
        row.dij = dij;
        row.stamp = row.stamp.wrapping_add(1);
        let entry = HeapEntry {
            dij,
            key: PairKey::with_neighbour(index, nn),
            index,
            stamp: row.stamp,
        };
        self.heap.push(entry);
        Ok(())
    }

    fn refresh_points<T>(&mut self, points: &[usize]) -> Result<()>
    where
        M: CylinderMetric<T>,
    {
        for &p in points {
            self.refresh::<T>(self.object_of_point[p])?;
        }
        if self.heap.len() > HEAP_SLACK * self.n_live + 64 {
            self.compact_heap();
        }
        Ok(())
    }

    fn compact_heap(&mut self) {
        let entries: Vec<HeapEntry> = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                row.as_ref().map(|r| HeapEntry {
                    dij: r.dij,
                    key: PairKey::with_neighbour(index, r.nn),
                    index,
                    stamp: r.stamp,
                })
            })
            .collect();
        tracing::trace!(
            dropped = self.heap.len() - entries.len(),
            "compacted closest-pair heap"
        );
        self.heap = BinaryHeap::from(entries);
    }

    /// Smallest key among the steps at exactly `min` that involve one of the `tied` rows.
    ///
    /// A row with a zero scale factor is at `min` with every partner, so it is checked
    /// against all live rows.
    fn smallest_tied_key<T>(&self, tied: &[usize], min: f64) -> Option<PairKey>
    where
        M: CylinderMetric<T>,
    {
        let mut best: Option<PairKey> = None;
        let mut offer = |key: PairKey| {
            if best.map_or(true, |b| key < b) {
                best = Some(key);
            }
        };
        for &i in tied {
            let row = self.live_row(i);
            if row.metric.beam_distance() == min {
                offer(PairKey::beam(i));
            }
            let partners: Vec<usize> = if row.metric.scale_factor() > 0.0 {
                if !row.nn_geo.is_finite() {
                    continue;
                }
                self.index
                    .neighbours_within(row.point, row.nn_geo)
                    .into_iter()
                    .map(|p| self.object_of_point[p])
                    .collect()
            } else {
                (0..self.rows.len())
                    .filter(|&k| self.rows[k].is_some())
                    .collect()
            };
            for other in partners {
                if other != i && row.metric.distance(&self.live_row(other).metric) == min {
                    offer(PairKey::pair(i, other));
                }
            }
        }
        best
    }
}

impl<T, M: CylinderMetric<T>> NearestNeighbourEngine<T> for CylinderEngine<M> {
    fn closest_pair(&mut self) -> Option<ClosestPair> {
        let min = loop {
            let top = self.heap.peek()?;
            if self.is_current(top) {
                break top.dij;
            }
            self.heap.pop();
        };

        let mut tied: SmallVec<[HeapEntry; 4]> = SmallVec::new();
        while let Some(&top) = self.heap.peek() {
            if top.dij != min {
                break;
            }
            self.heap.pop();
            if self.is_current(&top) {
                tied.push(top);
            }
        }
        let rows: SmallVec<[usize; 4]> = tied.iter().map(|e| e.index).collect();
        let key = self
            .smallest_tied_key::<T>(&rows, min)
            .unwrap_or_else(|| tied[0].key);
        self.heap.extend(tied);
        Some(key.into_closest(min))
    }

    fn remove(&mut self, index: usize) -> Result<()> {
        let row = self.take_row(index);
        self.n_live -= 1;
        let updated = self.index.remove_point(row.point)?;
        self.refresh_points::<T>(&updated)
    }

    fn merge(&mut self, a: usize, b: usize, object: &T, index: usize) -> Result<()> {
        assert_ne!(a, b, "cannot merge object {a} with itself");
        let ra = self.take_row(a);
        let rb = self.take_row(b);
        let metric = M::from_object(object);
        let (point, updated) =
            self.index
                .remove_combined_add_combination(ra.point, rb.point, metric.rap_phi())?;

        debug_assert_eq!(point, self.object_of_point.len());
        self.object_of_point.push(index);
        if index >= self.rows.len() {
            self.rows.resize_with(index + 1, || None);
        }
        assert!(self.rows[index].is_none(), "index {index} is already in use");
        self.rows[index] = Some(CylinderRow::new::<T>(point, metric));
        self.n_live -= 1;
        self.refresh_points::<T>(&updated)
    }

    fn len(&self) -> usize {
        self.n_live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::traits::Metric;
    use crate::cluster::PlainEngine;
    use crate::nn::{SelfImagePolicy, WrapStrategy};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::TAU;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Particle {
        rap: f64,
        phi: f64,
        weight: f64,
    }

    /// Squared cylinder distance; beam at `rap² + 1`; weight as scale factor.
    struct Geometric(Particle);

    impl Metric<Particle> for Geometric {
        fn from_object(p: &Particle) -> Self {
            Geometric(*p)
        }
        fn geometric_distance(&self, other: &Self) -> f64 {
            RapPhi::new(self.0.rap, self.0.phi)
                .cylinder_distance_sq(&RapPhi::new(other.0.rap, other.0.phi))
        }
        fn geometric_beam_distance(&self) -> f64 {
            self.0.rap * self.0.rap + 1.0
        }
        fn scale_factor(&self) -> f64 {
            self.0.weight
        }
    }

    impl CylinderMetric<Particle> for Geometric {
        fn rap_phi(&self) -> RapPhi {
            RapPhi::new(self.0.rap, self.0.phi)
        }
    }

    fn combine(a: &Particle, b: &Particle) -> Particle {
        let w = a.weight + b.weight;
        let rap = (a.rap * a.weight + b.rap * b.weight) / w;
        // azimuth of the heavier one keeps the merge well defined across the seam
        let phi = if a.weight >= b.weight { a.phi } else { b.phi };
        Particle { rap, phi, weight: w }
    }

    fn drain<E: NearestNeighbourEngine<Particle>>(
        mut engine: E,
        objects: &[Particle],
    ) -> Vec<ClosestPair> {
        let mut objects = objects.to_vec();
        let mut steps = Vec::new();
        while let Some(step) = engine.closest_pair() {
            match step.b {
                Some(b) => {
                    let merged = combine(&objects[step.a], &objects[b]);
                    engine.merge(step.a, b, &merged, objects.len()).unwrap();
                    objects.push(merged);
                }
                None => engine.remove(step.a).unwrap(),
            }
            steps.push(step);
        }
        steps
    }

    fn random_particles(seed: u64, n: usize) -> Vec<Particle> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Particle {
                rap: rng.random_range(-2.0..2.0),
                phi: rng.random_range(0.0..TAU),
                weight: rng.random_range(0.5..2.0),
            })
            .collect()
    }

    #[test]
    fn matches_plain_engine_for_every_strategy() {
        let objects = random_particles(42, 60);
        let reference = drain(PlainEngine::<Geometric>::new(&objects), &objects);
        assert_eq!(reference.len(), objects.len());
        for strategy in [WrapStrategy::Full4Pi, WrapStrategy::Mirror3Pi, WrapStrategy::Lazy2Pi] {
            let options = WrapOptions::new(strategy).with_self_image(SelfImagePolicy::Lenient);
            let engine = CylinderEngine::<Geometric>::new(&objects, &options).unwrap();
            let steps = drain(engine, &objects);
            assert_eq!(steps.len(), reference.len(), "{strategy:?}");
            for (got, want) in steps.iter().zip(&reference) {
                assert_eq!((got.a, got.b), (want.a, want.b), "{strategy:?}");
                approx::assert_relative_eq!(got.distance, want.distance, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn equidistant_neighbours_resolve_to_the_smallest_key() {
        // object 3 is 0.5 from both 1 (across the seam) and 2; the index names 2 first
        let at = |phi: f64, weight: f64| Particle { rap: 0.0, phi, weight };
        let objects = [at(TAU - 0.75, 2.0), at(TAU - 0.25, 2.0), at(0.75, 2.0), at(0.25, 0.5)];
        let reference = drain(PlainEngine::<Geometric>::new(&objects), &objects);
        assert_eq!((reference[0].a, reference[0].b), (1, Some(3)));
        assert_eq!(reference[0].distance, 0.125);
        // later on, object 2 sits exactly as far from the merged pair as from the beam
        assert!(reference.iter().any(|s| (s.a, s.b) == (2, Some(5)) && s.distance == 2.0));

        for strategy in [WrapStrategy::Full4Pi, WrapStrategy::Mirror3Pi, WrapStrategy::Lazy2Pi] {
            let engine = CylinderEngine::<Geometric>::new(&objects, &WrapOptions::new(strategy))
                .unwrap();
            let steps = drain(engine, &objects);
            assert_eq!(steps, reference, "{strategy:?}");
        }
    }

    #[test]
    fn repeated_queries_leave_the_heap_intact() {
        let objects = random_particles(11, 40);
        let options = WrapOptions::new(WrapStrategy::Mirror3Pi);
        let mut engine = CylinderEngine::<Geometric>::new(&objects, &options).unwrap();
        let first = NearestNeighbourEngine::<Particle>::closest_pair(&mut engine);
        let live = engine.heap.iter().filter(|e| engine.is_current(e)).count();
        let second = NearestNeighbourEngine::<Particle>::closest_pair(&mut engine);
        assert_eq!(first, second);
        assert_eq!(engine.heap.iter().filter(|e| engine.is_current(e)).count(), live);
        assert_eq!(live, 40);
    }

    #[test]
    #[should_panic(expected = "not live")]
    fn dead_rows_are_not_read() {
        let objects = random_particles(5, 3);
        let mut engine =
            CylinderEngine::<Geometric>::new(&objects, &WrapOptions::new(WrapStrategy::Full4Pi))
                .unwrap();
        engine.rows[1] = None;
        engine.live_row(1);
    }

    #[test]
    fn strict_policy_reports_far_away_objects() {
        let objects = [
            Particle { rap: 0.0, phi: 1.0, weight: 1.0 },
            Particle { rap: 50.0, phi: 1.0, weight: 1.0 },
        ];
        let err = CylinderEngine::<Geometric>::new(&objects, &WrapOptions::default()).unwrap_err();
        assert!(matches!(err, Error::AmbiguousNeighbour { .. }));
    }

    #[test]
    fn lenient_policy_still_refuses_a_misleading_image() {
        // beam at 50² + 1 is farther than the 2π image, so "beam only" would be wrong
        let objects = [
            Particle { rap: 50.0, phi: 1.0, weight: 1.0 },
            Particle { rap: -50.0, phi: 1.0, weight: 1.0 },
        ];
        let options = WrapOptions::default().with_self_image(SelfImagePolicy::Lenient);
        let err = CylinderEngine::<Geometric>::new(&objects, &options).unwrap_err();
        assert!(matches!(err, Error::AmbiguousNeighbour { index: 0 }));
    }

    #[test]
    fn stale_heap_entries_are_skipped() {
        let objects = random_particles(3, 200);
        let options = WrapOptions::new(WrapStrategy::Full4Pi);
        let mut engine = CylinderEngine::<Geometric>::new(&objects, &options).unwrap();
        let mut objects = objects;
        let mut steps = 0;
        while let Some(step) = NearestNeighbourEngine::<Particle>::closest_pair(&mut engine) {
            assert!(engine.rows[step.a].is_some());
            match step.b {
                Some(b) => {
                    let merged = combine(&objects[step.a], &objects[b]);
                    engine.merge(step.a, b, &merged, objects.len()).unwrap();
                    objects.push(merged);
                }
                None => NearestNeighbourEngine::<Particle>::remove(&mut engine, step.a).unwrap(),
            }
            steps += 1;
            assert!(engine.heap.len() <= HEAP_SLACK * engine.n_live + 64 + 64);
        }
        assert_eq!(steps, 200);
    }
}
