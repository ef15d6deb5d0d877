//! Dynamic nearest neighbours on a cylinder.
//!
//! Points live on an infinite cylinder: rapidity is unbounded, azimuth wraps with
//! period 2π. The underlying [`PlaneIndex`] only knows about a flat plane, so
//! the cylinder indices place *mirror* copies of points one period away from their
//! true azimuth. Three policies are available (see [`WrapStrategy`]):
//!
//! | strategy | mirrors | plane width | self-image possible |
//! |----------|---------|-------------|---------------------|
//! | [`WrapStrategy::Full4Pi`] | every point, in a second plane | 4π | no |
//! | [`WrapStrategy::Mirror3Pi`] | points with azimuth < π | 3π | yes |
//! | [`WrapStrategy::Lazy2Pi`] | only where the seam is closer than the current neighbour | ~2π | yes |
//!
//! A *self-image* answer means that nothing real lies within 2π of a point, so the
//! plane reports the point's own mirror copy. [`SelfImagePolicy`] decides whether that
//! is an error or a flagged answer.
//!
//! All distances are **squared** flat distances in (rapidity, azimuth).
//!
//! ```rust
//! use recombine::nn::{build_index, RapPhi, WrapOptions, WrapStrategy};
//!
//! let points = [RapPhi::new(0.0, 0.01), RapPhi::new(0.0, 6.27), RapPhi::new(2.0, 3.0)];
//! let index = build_index(&points, &WrapOptions::new(WrapStrategy::Full4Pi)).unwrap();
//!
//! let nn = index.nearest_neighbour(0).unwrap().unwrap();
//! assert_eq!(nn.index, 1); // across the seam
//! assert!(nn.distance_sq < 1e-3);
//! ```

mod four_pi;
mod grid;
mod mirror;
mod plane;
mod three_pi;
mod two_pi;

pub use four_pi::Cylinder4Pi;
pub use plane::PlaneIndex;
pub use three_pi::Cylinder3Pi;
pub use two_pi::Cylinder2Pi;

use crate::error::{Error, Result};
use crate::warning::DEFAULT_MAX_WARNINGS;
use std::f64::consts::{PI, TAU};

/// A position on the cylinder.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RapPhi {
    /// Unbounded coordinate.
    pub rap: f64,
    /// Periodic coordinate, canonically in `[0, 2π)`.
    pub phi: f64,
}

impl RapPhi {
    /// Create a position (azimuth is not wrapped; see [`RapPhi::sanitized`]).
    pub const fn new(rap: f64, phi: f64) -> Self {
        Self { rap, phi }
    }

    /// The same position with azimuth wrapped into `[0, 2π)`.
    pub fn sanitized(self) -> Self {
        let mut phi = self.phi.rem_euclid(TAU);
        // rem_euclid can round up to exactly 2π for tiny negative inputs
        if phi >= TAU {
            phi = 0.0;
        }
        Self { rap: self.rap, phi }
    }

    /// Whether both coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.rap.is_finite() && self.phi.is_finite()
    }

    /// Squared flat distance, ignoring periodicity.
    #[inline]
    pub fn plane_distance_sq(&self, other: &Self) -> f64 {
        let drap = self.rap - other.rap;
        let dphi = self.phi - other.phi;
        drap * drap + dphi * dphi
    }

    /// Squared distance on the cylinder: `Δrap² + min(|Δφ|, 2π − |Δφ|)²`.
    #[inline]
    pub fn cylinder_distance_sq(&self, other: &Self) -> f64 {
        let drap = self.rap - other.rap;
        let mut dphi = (self.phi - other.phi).abs();
        if dphi > PI {
            dphi = TAU - dphi;
        }
        drap * drap + dphi * dphi
    }

    /// Check finiteness and return the sanitized position.
    pub(crate) fn validated(self, index: usize) -> Result<Self> {
        if !self.is_finite() {
            return Err(Error::InvalidPoint {
                index,
                rapidity: self.rap,
                azimuth: self.phi,
            });
        }
        Ok(self.sanitized())
    }
}

/// The answer to a nearest-neighbour query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbour {
    /// Index of the neighbour (equal to the queried index for a self-image answer).
    pub index: usize,
    /// Squared distance to the neighbour.
    pub distance_sq: f64,
    /// The neighbour is the queried point's own periodic image.
    pub self_image: bool,
}

/// Result of a batched update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Update {
    /// Indices assigned to the added points, in input order.
    pub added: Vec<usize>,
    /// Sorted indices of live points whose nearest neighbour may have changed
    /// (includes every added point).
    pub updated: Vec<usize>,
}

/// A dynamic nearest-neighbour structure.
///
/// Indices are assigned sequentially, starting at 0 for the construction points, and
/// are never reused.
pub trait DynamicNearestNeighbours {
    /// Nearest neighbour of a live point; `None` if it is the only point.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not live.
    fn nearest_neighbour(&self, index: usize) -> Result<Option<Neighbour>>;

    /// Live points other than `index` whose squared distance to it is at most
    /// `distance_sq`, sorted. Points beyond the bound by no more than rounding may be
    /// included as well.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not live.
    fn neighbours_within(&self, index: usize, distance_sq: f64) -> Vec<usize>;

    /// Whether `index` has been added and not removed since.
    fn is_valid(&self, index: usize) -> bool;

    /// Number of live points.
    fn len(&self) -> usize;

    /// Whether there are no live points.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `remove` and add `add`, reporting new indices and the points whose
    /// nearest neighbour may have changed.
    ///
    /// # Panics
    ///
    /// Panics if an index in `remove` is not live.
    fn remove_and_add_points(&mut self, remove: &[usize], add: &[RapPhi]) -> Result<Update>;

    /// Add points; returns their indices.
    fn insert_batch(&mut self, points: &[RapPhi]) -> Result<Vec<usize>> {
        Ok(self.remove_and_add_points(&[], points)?.added)
    }

    /// Remove one point; returns the points whose neighbour may have changed.
    fn remove_point(&mut self, index: usize) -> Result<Vec<usize>> {
        Ok(self.remove_and_add_points(&[index], &[])?.updated)
    }

    /// Replace two points by their combination; returns the new index and the points
    /// whose neighbour may have changed (the new point included).
    fn remove_combined_add_combination(
        &mut self,
        a: usize,
        b: usize,
        point: RapPhi,
    ) -> Result<(usize, Vec<usize>)> {
        let update = self.remove_and_add_points(&[a, b], &[point])?;
        Ok((update.added[0], update.updated))
    }
}

/// A boxed cylinder index, as returned by [`build_index`].
pub type BoxedIndex = Box<dyn DynamicNearestNeighbours + Send>;

/// How periodicity in azimuth is emulated on a flat plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WrapStrategy {
    /// Two planes, every point duplicated. Never reports a self-image.
    Full4Pi,
    /// One plane; points with azimuth < π are mirrored at azimuth + 2π.
    Mirror3Pi,
    /// One plane; mirrors are created only when they could change an answer.
    #[default]
    Lazy2Pi,
}

/// What to do when a point's nearest neighbour is its own mirror image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SelfImagePolicy {
    /// Report [`Error::AmbiguousNeighbour`].
    #[default]
    Strict,
    /// Return the answer with [`Neighbour::self_image`] set.
    Lenient,
}

/// Configuration of a cylinder index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrapOptions {
    strategy: WrapStrategy,
    self_image: SelfImagePolicy,
    max_warnings: u32,
}

impl WrapOptions {
    /// Options for `strategy` with the strict self-image policy.
    pub fn new(strategy: WrapStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Set the wrap strategy.
    pub fn with_strategy(mut self, strategy: WrapStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the self-image policy.
    pub fn with_self_image(mut self, policy: SelfImagePolicy) -> Self {
        self.self_image = policy;
        self
    }

    /// Set how many coincident-point warnings each plane emits.
    pub fn with_max_warnings(mut self, max_warnings: u32) -> Self {
        self.max_warnings = max_warnings;
        self
    }

    /// The wrap strategy.
    pub fn strategy(&self) -> WrapStrategy {
        self.strategy
    }

    /// The self-image policy.
    pub fn self_image(&self) -> SelfImagePolicy {
        self.self_image
    }

    /// The warning limit per plane.
    pub fn max_warnings(&self) -> u32 {
        self.max_warnings
    }
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            strategy: WrapStrategy::default(),
            self_image: SelfImagePolicy::default(),
            max_warnings: DEFAULT_MAX_WARNINGS,
        }
    }
}

/// Build a cylinder index over `points` (indices `0..points.len()`).
pub fn build_index(points: &[RapPhi], options: &WrapOptions) -> Result<BoxedIndex> {
    Ok(match options.strategy {
        WrapStrategy::Full4Pi => Box::new(Cylinder4Pi::new(points, options)?),
        WrapStrategy::Mirror3Pi => Box::new(Cylinder3Pi::new(points, options)?),
        WrapStrategy::Lazy2Pi => Box::new(Cylinder2Pi::new(points, options)?),
    })
}

/// Relative slack on range queries; absorbs the rounding of a shift by one period.
const RANGE_SLACK: f64 = 1e-9;

pub(crate) fn padded(distance_sq: f64) -> f64 {
    distance_sq + distance_sq.abs() * RANGE_SLACK
}

/// Visit the plane points within `distance_sq` of `center` or of its periodic images,
/// the images only where the disc crosses the seam.
pub(crate) fn for_each_on_cylinder(
    plane: &PlaneIndex,
    center: RapPhi,
    distance_sq: f64,
    mut f: impl FnMut(usize),
) {
    let reach = distance_sq.sqrt();
    plane.for_each_within(&center, distance_sq, &mut f);
    if center.phi - reach < 0.0 {
        let image = RapPhi::new(center.rap, center.phi + TAU);
        plane.for_each_within(&image, distance_sq, &mut f);
    }
    if center.phi + reach >= TAU {
        let image = RapPhi::new(center.rap, center.phi - TAU);
        plane.for_each_within(&image, distance_sq, &mut f);
    }
}

/// Validate and sanitize a batch of points whose indices start at `first_index`.
pub(crate) fn validated_points(points: &[RapPhi], first_index: usize) -> Result<Vec<RapPhi>> {
    points
        .iter()
        .enumerate()
        .map(|(k, p)| p.validated(first_index + k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sanitize_wraps_azimuth() {
        assert_relative_eq!(RapPhi::new(0.0, -0.5).sanitized().phi, TAU - 0.5);
        assert_relative_eq!(RapPhi::new(0.0, TAU + 0.25).sanitized().phi, 0.25);
        assert_eq!(RapPhi::new(1.0, TAU).sanitized().phi, 0.0);
        let p = RapPhi::new(0.0, -1e-300).sanitized();
        assert!(p.phi >= 0.0 && p.phi < TAU);
    }

    #[test]
    fn cylinder_distance_uses_short_way_round() {
        let a = RapPhi::new(0.0, 0.01);
        let b = RapPhi::new(0.0, 6.27);
        let d = a.cylinder_distance_sq(&b).sqrt();
        assert_relative_eq!(d, 0.01 + (TAU - 6.27), epsilon = 1e-12);
        assert!(a.plane_distance_sq(&b).sqrt() > 6.0);
    }

    #[test]
    fn non_finite_points_are_rejected() {
        let err = validated_points(&[RapPhi::new(0.0, 1.0), RapPhi::new(f64::NAN, 0.0)], 10)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPoint { index: 11, .. }));
    }

    #[test]
    fn options_builder() {
        let opts = WrapOptions::default()
            .with_strategy(WrapStrategy::Mirror3Pi)
            .with_self_image(SelfImagePolicy::Lenient)
            .with_max_warnings(1);
        assert_eq!(opts.strategy(), WrapStrategy::Mirror3Pi);
        assert_eq!(opts.self_image(), SelfImagePolicy::Lenient);
        assert_eq!(opts.max_warnings(), 1);
        assert_eq!(WrapOptions::default().strategy(), WrapStrategy::Lazy2Pi);
    }
}
