//! Cylinder index over a 3π-wide plane: every point with azimuth below π gets a
//! mirror copy at azimuth + 2π.

use super::mirror::{remap, MirroredPlane};
use super::plane::PlaneIndex;
use super::{validated_points, DynamicNearestNeighbours, Neighbour, RapPhi, Update, WrapOptions};
use crate::error::Result;
use std::f64::consts::PI;

/// Cylinder index with eager mirrors for the lower half of the azimuth range.
///
/// A point whose closest real neighbour is more than 2π away can see its own
/// mirror; see [`super::SelfImagePolicy`].
#[derive(Clone, Debug)]
pub struct Cylinder3Pi {
    core: MirroredPlane,
}

impl Cylinder3Pi {
    /// Build the index over `points` (indices `0..points.len()`).
    pub fn new(points: &[RapPhi], options: &WrapOptions) -> Result<Self> {
        let points = validated_points(points, 0)?;
        let mut core = MirroredPlane::new(
            PlaneIndex::with_max_warnings(&[], options.max_warnings())?,
            options.self_image(),
        );
        let mut plane_points = Vec::with_capacity(points.len() * 3 / 2);
        for &p in &points {
            core.register(p, mirror_of(p), &mut plane_points);
        }
        core.plane = PlaneIndex::with_max_warnings(&plane_points, options.max_warnings())?;
        Ok(Self { core })
    }
}

fn mirror_of(p: RapPhi) -> Option<RapPhi> {
    (p.phi < PI).then(|| remap(p))
}

impl DynamicNearestNeighbours for Cylinder3Pi {
    fn nearest_neighbour(&self, index: usize) -> Result<Option<Neighbour>> {
        self.core.nearest(index)
    }

    fn is_valid(&self, index: usize) -> bool {
        self.core.is_valid(index)
    }

    fn neighbours_within(&self, index: usize, distance_sq: f64) -> Vec<usize> {
        self.core.within(index, distance_sq)
    }

    fn len(&self) -> usize {
        self.core.len()
    }

    fn remove_and_add_points(&mut self, remove: &[usize], add: &[RapPhi]) -> Result<Update> {
        let add = validated_points(add, self.core.mirrors.len())?;
        let plane_remove = self.core.retire(remove);
        let mut plane_points = Vec::with_capacity(2 * add.len());
        let added = add
            .iter()
            .map(|&p| self.core.register(p, mirror_of(p), &mut plane_points))
            .collect();
        let update = self
            .core
            .plane
            .remove_and_add_points(&plane_remove, &plane_points)?;
        Ok(Update {
            added,
            updated: self.core.to_cylinder(&update.updated),
        })
    }
}
