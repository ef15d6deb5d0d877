//! Cylinder index over a single 2π plane with mirrors created on demand.
//!
//! A point at azimuth φ gets a mirror copy only once the seam (at φ = 0 or φ = 2π) is
//! closer than its current nearest neighbour, i.e. when `φ² < d²` or `(2π − φ)² < d²`.
//! Until then no periodic image can beat the neighbour found in the plane.

use super::mirror::{remap, MirroredPlane};
use super::plane::PlaneIndex;
use super::{validated_points, DynamicNearestNeighbours, Neighbour, RapPhi, Update, WrapOptions};
use crate::error::Result;
use std::f64::consts::TAU;

/// Cylinder index with lazily created mirrors.
#[derive(Clone, Debug)]
pub struct Cylinder2Pi {
    core: MirroredPlane,
}

impl Cylinder2Pi {
    /// Build the index over `points` (indices `0..points.len()`).
    pub fn new(points: &[RapPhi], options: &WrapOptions) -> Result<Self> {
        let points = validated_points(points, 0)?;
        let mut core = MirroredPlane::new(
            PlaneIndex::with_max_warnings(&[], options.max_warnings())?,
            options.self_image(),
        );
        let mut plane_points = Vec::with_capacity(points.len());
        for &p in &points {
            core.register(p, None, &mut plane_points);
        }
        core.plane = PlaneIndex::with_max_warnings(&plane_points, options.max_warnings())?;
        let mut index = Self { core };
        let all: Vec<usize> = (0..plane_points.len()).collect();
        index.create_necessary_mirrors(&all)?;
        Ok(index)
    }

    /// Number of mirror copies currently in the plane (live or not).
    pub fn mirror_count(&self) -> usize {
        self.core.cylinder_of_plane.len() - self.core.mirrors.len()
    }

    /// Add mirrors for the given plane points where the seam is closer than their
    /// neighbour. Returns the plane points affected by the additions.
    fn create_necessary_mirrors(&mut self, plane_indices: &[usize]) -> Result<Vec<usize>> {
        let mut new_points = Vec::new();
        for &ip in plane_indices {
            let cylinder = self.core.cylinder_of_plane[ip];
            if self.core.mirrors[cylinder].mirror.is_some() {
                continue;
            }
            let p = self.core.plane.position(ip);
            let nn_dist_sq = self.core.plane.nearest_distance_sq(ip);
            let to_low = p.phi * p.phi;
            let to_high = (TAU - p.phi) * (TAU - p.phi);
            if to_low >= nn_dist_sq && to_high >= nn_dist_sq {
                continue;
            }
            self.core.register_mirror(cylinder, remap(p), &mut new_points);
        }
        if new_points.is_empty() {
            return Ok(Vec::new());
        }
        tracing::trace!(mirrors = new_points.len(), "creating mirror points");
        Ok(self.core.plane.remove_and_add_points(&[], &new_points)?.updated)
    }
}

impl DynamicNearestNeighbours for Cylinder2Pi {
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
        let mut plane_points = Vec::with_capacity(add.len());
        let added = add
            .iter()
            .map(|&p| self.core.register(p, None, &mut plane_points))
            .collect();
        let mut updated = self
            .core
            .plane
            .remove_and_add_points(&plane_remove, &plane_points)?
            .updated;
        let extra = self.create_necessary_mirrors(&updated)?;
        updated.extend(extra);
        Ok(Update {
            added,
            updated: self.core.to_cylinder(&updated),
        })
    }
}
