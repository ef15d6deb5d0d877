use crate::error::Result;
use crate::nn::RapPhi;

/// Distance capabilities of a clustered object.
///
/// A metric value is built once per object and cached by the engines. The full pair
/// distance is `min(scale_i, scale_j) * geometric_distance(i, j)` and the distance to the
/// beam is `scale_i * geometric_beam_distance(i)`.
///
/// `geometric_distance` must be symmetric and never NaN. The engines compare the
/// provided [`Metric::distance`] and [`Metric::beam_distance`] values bit for bit, so
/// overriding them with anything other than the formulas above breaks the agreement
/// between engines.
pub trait Metric<T>: Sized {
    /// Extract the metric data from an object.
    fn from_object(object: &T) -> Self;

    /// Geometric part of the pair distance.
    fn geometric_distance(&self, other: &Self) -> f64;

    /// Geometric part of the beam distance.
    fn geometric_beam_distance(&self) -> f64;

    /// Per-object multiplier. Defaults to 1.
    fn scale_factor(&self) -> f64 {
        1.0
    }

    /// Full pair distance.
    #[inline]
    fn distance(&self, other: &Self) -> f64 {
        self.scale_factor().min(other.scale_factor()) * self.geometric_distance(other)
    }

    /// Full beam distance.
    #[inline]
    fn beam_distance(&self) -> f64 {
        self.scale_factor() * self.geometric_beam_distance()
    }
}

/// A metric whose geometric distance is the squared distance on the
/// (rapidity, azimuth) cylinder.
///
/// The cylinder engine picks neighbours by the index's cylinder distance and then
/// prices them with [`Metric::distance`]; implementations should make the geometric
/// distance agree with [`RapPhi::cylinder_distance_sq`].
pub trait CylinderMetric<T>: Metric<T> {
    /// Position on the cylinder.
    fn rap_phi(&self) -> RapPhi;
}

/// Builds the object that replaces a merged pair.
pub trait Recombiner<T> {
    /// Combine two objects.
    fn recombine(&self, a: &T, b: &T) -> T;
}

impl<T, F> Recombiner<T> for F
where
    F: Fn(&T, &T) -> T,
{
    fn recombine(&self, a: &T, b: &T) -> T {
        self(a, b)
    }
}

/// The smallest distance among all live pairs and beam retirements.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClosestPair {
    /// The distance.
    pub distance: f64,
    /// First index (the smaller one for a pair).
    pub a: usize,
    /// Second index, or `None` when `a` should be retired to the beam.
    pub b: Option<usize>,
}

/// Common interface of the closest-pair engines.
///
/// Indices are the caller's stable object indices; engines translate them to their
/// own storage. Ties on the minimum distance go to the smallest key, where a pair
/// `(i, j)` has key `(min, max)` and a beam retirement of `i` has key `(i, ∞)`.
pub trait NearestNeighbourEngine<T> {
    /// Current global minimum, or `None` when no objects are left.
    fn closest_pair(&mut self) -> Option<ClosestPair>;

    /// Retire object `index` to the beam.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not live.
    fn remove(&mut self, index: usize) -> Result<()>;

    /// Replace live objects `a` and `b` by `object`, known from now on as `index`.
    ///
    /// # Panics
    ///
    /// Panics if `a` or `b` is not live, or if `index` is already in use.
    fn merge(&mut self, a: usize, b: usize, object: &T, index: usize) -> Result<()>;

    /// Number of live objects.
    fn len(&self) -> usize;

    /// Whether no objects are left.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
