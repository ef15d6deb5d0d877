//! Running a clustering to completion.

use super::cylinder::CylinderEngine;
use super::history::History;
use super::plain::PlainEngine;
use super::scaled::ScaledEngine;
use super::traits::{CylinderMetric, Metric, NearestNeighbourEngine, Recombiner};
use crate::error::Result;
use crate::nn::WrapOptions;

/// The outcome of a clustering run: every object ever created plus the merge forest.
///
/// Objects `0..N` are the inputs; each merge appends the recombined object. History
/// nodes refer to objects through [`super::HistoryElement::object`].
#[derive(Clone, Debug)]
pub struct ClusterSequence<T> {
    objects: Vec<T>,
    history: History,
}

impl<T> ClusterSequence<T> {
    /// Cluster with the [`PlainEngine`].
    pub fn plain<M, R>(objects: Vec<T>, recombiner: &R) -> Result<Self>
    where
        M: Metric<T>,
        R: Recombiner<T>,
    {
        let engine = PlainEngine::<M>::new(&objects);
        Self::with_engine(objects, engine, recombiner)
    }

    /// Cluster with the [`ScaledEngine`].
    pub fn scaled<M, R>(objects: Vec<T>, recombiner: &R) -> Result<Self>
    where
        M: Metric<T>,
        R: Recombiner<T>,
    {
        let engine = ScaledEngine::<M>::new(&objects);
        Self::with_engine(objects, engine, recombiner)
    }

    /// Cluster with the [`CylinderEngine`].
    pub fn cylinder<M, R>(objects: Vec<T>, options: &WrapOptions, recombiner: &R) -> Result<Self>
    where
        M: CylinderMetric<T>,
        R: Recombiner<T>,
    {
        let engine = CylinderEngine::<M>::new(&objects, options)?;
        Self::with_engine(objects, engine, recombiner)
    }

    /// Cluster with any engine that was built over exactly `objects`.
    pub fn with_engine<E, R>(objects: Vec<T>, mut engine: E, recombiner: &R) -> Result<Self>
    where
        E: NearestNeighbourEngine<T>,
        R: Recombiner<T>,
    {
        let n = objects.len();
        assert_eq!(engine.len(), n, "engine was built over a different input");
        let mut objects = objects;
        objects.reserve(n);
        let mut history = History::new(n);
        let mut object_node: Vec<usize> = (0..n).collect();

        while let Some(step) = engine.closest_pair() {
            match step.b {
                Some(b) => {
                    let merged = recombiner.recombine(&objects[step.a], &objects[b]);
                    let index = objects.len();
                    engine.merge(step.a, b, &merged, index)?;
                    let node =
                        history.record_pair(object_node[step.a], object_node[b], index, step.distance);
                    objects.push(merged);
                    object_node.push(node);
                    tracing::trace!(a = step.a, b, distance = step.distance, node, "merged");
                }
                None => {
                    engine.remove(step.a)?;
                    let node = history.record_beam(object_node[step.a], step.distance);
                    tracing::trace!(a = step.a, distance = step.distance, node, "retired to beam");
                }
            }
        }

        tracing::debug!(
            inputs = n,
            objects = objects.len(),
            nodes = history.len(),
            "clustering finished"
        );
        Ok(Self { objects, history })
    }

    /// Inputs followed by every merged object, in creation order.
    pub fn objects(&self) -> &[T] {
        &self.objects
    }

    /// The merge forest.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Number of inputs.
    pub fn n_inputs(&self) -> usize {
        self.history.n_inputs()
    }

    /// The object a history node stands for (`None` for beam retirements).
    pub fn object_of(&self, node: usize) -> Option<&T> {
        self.history
            .element(node)
            .object
            .and_then(|i| self.objects.get(i))
    }

    fn objects_of(&self, nodes: Vec<usize>) -> Vec<&T> {
        nodes.into_iter().filter_map(|n| self.object_of(n)).collect()
    }

    /// Objects that were retired to the beam, most recent first.
    pub fn inclusive(&self) -> Vec<&T> {
        self.objects_of(self.history.inclusive_nodes())
    }

    /// Objects of the exclusive clustering with cut `dcut`.
    pub fn exclusive_dcut(&self, dcut: f64) -> Result<Vec<&T>> {
        Ok(self.objects_of(self.history.exclusive_nodes_dcut(dcut)?))
    }

    /// Objects of the exclusive clustering into exactly `njets` clusters.
    pub fn exclusive(&self, njets: usize) -> Result<Vec<&T>> {
        Ok(self.objects_of(self.history.exclusive_nodes(njets)?))
    }

    /// Objects of the exclusive clustering into at most `njets` clusters.
    pub fn exclusive_up_to(&self, njets: usize) -> Result<Vec<&T>> {
        Ok(self.objects_of(self.history.exclusive_nodes_up_to(njets)?))
    }

    /// Inputs that ended up in the object created by `node`.
    pub fn constituents(&self, node: usize) -> Vec<&T> {
        self.objects_of(self.history.leaves(node))
    }

    /// Take the objects and history apart.
    pub fn into_parts(self) -> (Vec<T>, History) {
        (self.objects, self.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Parent;

    /// Position and weight on a line.
    type Obj = (f64, f64);

    struct Line(Obj);

    impl Metric<Obj> for Line {
        fn from_object(o: &Obj) -> Self {
            Line(*o)
        }
        fn geometric_distance(&self, other: &Self) -> f64 {
            (self.0 .0 - other.0 .0).abs()
        }
        fn geometric_beam_distance(&self) -> f64 {
            self.0 .1
        }
    }

    fn centroid(a: &Obj, b: &Obj) -> Obj {
        ((a.0 + b.0) / 2.0, a.1.max(b.1))
    }

    #[test]
    fn empty_input_records_nothing() {
        let seq = ClusterSequence::plain::<Line, _>(Vec::new(), &centroid).unwrap();
        assert_eq!(seq.history().len(), 0);
        assert!(seq.objects().is_empty());
        assert!(seq.inclusive().is_empty());
    }

    #[test]
    fn single_input_is_retired() {
        let seq = ClusterSequence::plain::<Line, _>(vec![(3.0, 2.0)], &centroid).unwrap();
        let h = seq.history();
        assert_eq!(h.len(), 2);
        assert_eq!(h.parents(1), (Parent::Node(0), Parent::Beam));
        assert_eq!(h.element(1).distance, 2.0);
        assert_eq!(seq.inclusive(), [&(3.0, 2.0)]);
    }

    #[test]
    fn merges_then_retires() {
        let objects = vec![(0.0, 5.0), (0.5, 5.0), (10.0, 0.2)];
        let seq = ClusterSequence::plain::<Line, _>(objects, &centroid).unwrap();
        let h = seq.history();
        h.validate().unwrap();
        assert!(h.is_complete());

        // 2 retires first (0.2), then (0,1) merge (0.5), then the merged object
        assert_eq!(h.parents(3), (Parent::Node(2), Parent::Beam));
        assert_eq!(h.parents(4), (Parent::Node(0), Parent::Node(1)));
        assert_eq!(h.element(4).object, Some(3));
        assert_eq!(seq.objects()[3], (0.25, 5.0));
        assert_eq!(h.parents(5), (Parent::Node(4), Parent::Beam));

        assert_eq!(seq.inclusive(), [&(0.25, 5.0), &(10.0, 0.2)]);
        assert_eq!(seq.constituents(4), [&(0.0, 5.0), &(0.5, 5.0)]);
        assert_eq!(seq.exclusive(2).unwrap().len(), 2);
        assert_eq!(seq.object_of(3), None);
    }

    #[test]
    fn all_engines_record_the_same_history() {
        let objects: Vec<Obj> = (0..30)
            .map(|i| (((i * 17) % 31) as f64 * 0.37, 1.0 + (i % 5) as f64))
            .collect();
        let plain = ClusterSequence::plain::<Line, _>(objects.clone(), &centroid).unwrap();
        let scaled = ClusterSequence::scaled::<Line, _>(objects, &centroid).unwrap();
        assert_eq!(plain.history(), scaled.history());
        assert_eq!(plain.objects(), scaled.objects());
    }
}
