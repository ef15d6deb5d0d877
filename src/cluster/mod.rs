//! Sequential closest-pair recombination.
//!
//! Start from `N` objects. At each step, find the smallest distance among all pairs
//! and all "beam" distances (the distance from one object to an external reference).
//! If it belongs to a pair, replace the pair by the recombined object; if it belongs
//! to the beam, retire the object. Stop when nothing is left. Every step is recorded in
//! a [`History`], which is a forest of `2N` nodes for `N` inputs.
//!
//! ## Distances
//!
//! A [`Metric`] supplies a symmetric geometric distance, a geometric beam distance and
//! an optional per-object scale factor:
//!
//! ```text
//! d(i, j) = min(s_i, s_j) * g(i, j)        d(i, beam) = s_i * g_beam(i)
//! ```
//!
//! Ties on the minimal distance go to the smallest key, a pair `(i, j)` having key
//! `(min, max)` and a beam retirement of `i` having key `(i, ∞)`.
//!
//! ## Engines
//!
//! | engine | neighbour search | per step |
//! |--------|------------------|----------|
//! | [`PlainEngine`] | cached full-distance neighbour, linear rescans | O(N) plus rescans |
//! | [`ScaledEngine`] | cached geometric neighbour, scale factors applied afterwards | O(N) plus rescans |
//! | [`CylinderEngine`] | [`crate::nn`] index on the (rapidity, azimuth) cylinder | roughly O(log N) |
//!
//! The plain and scaled engines produce exactly the same steps for the same metric.
//! The cylinder engine does too when its geometric distance is the squared cylinder
//! distance, ties included; only candidates that differ by the rounding of a shift
//! across the azimuth seam can be ordered differently.
//!
//! ## Usage
//!
//! ```rust
//! use recombine::cluster::{ClusterSequence, Metric, Parent};
//!
//! /// A point on a line with a fixed beam distance.
//! struct Line(f64);
//!
//! impl Metric<f64> for Line {
//!     fn from_object(x: &f64) -> Self {
//!         Line(*x)
//!     }
//!     fn geometric_distance(&self, other: &Self) -> f64 {
//!         (self.0 - other.0).abs()
//!     }
//!     fn geometric_beam_distance(&self) -> f64 {
//!         1.0
//!     }
//! }
//!
//! let midpoint = |a: &f64, b: &f64| (a + b) / 2.0;
//! let seq = ClusterSequence::scaled::<Line, _>(vec![0.0, 0.2, 5.0], &midpoint).unwrap();
//!
//! let history = seq.history();
//! assert_eq!(history.len(), 6);
//! assert_eq!(history.parents(3), (Parent::Node(0), Parent::Node(1)));
//! // 5.0 and the merged 0.1 tie on the beam; the lower index retires first
//! assert_eq!(seq.inclusive(), [&0.1, &5.0]);
//! ```

mod cylinder;
mod history;
mod plain;
mod scaled;
mod sequence;
mod traits;
mod util;

pub use cylinder::CylinderEngine;
pub use history::{History, HistoryElement, Parent};
pub use plain::PlainEngine;
pub use scaled::ScaledEngine;
pub use sequence::ClusterSequence;
pub use traits::{ClosestPair, CylinderMetric, Metric, NearestNeighbourEngine, Recombiner};
