//! Bookkeeping shared by the single-plane cylinder indices.
//!
//! A cylinder point owns one plane point (its main copy) and at most one mirror
//! copy shifted by ±2π in azimuth. The plane assigns its own indices; the tables
//! here translate in both directions.

use super::plane::PlaneIndex;
use super::{for_each_on_cylinder, padded, Neighbour, RapPhi, SelfImagePolicy};
use crate::error::{Error, Result};
use std::f64::consts::{PI, TAU};

#[derive(Clone, Copy, Debug)]
pub(super) struct MirrorInfo {
    pub main: usize,
    pub mirror: Option<usize>,
}

#[derive(Clone, Debug)]
pub(super) struct MirroredPlane {
    pub plane: PlaneIndex,
    /// Indexed by cylinder index.
    pub mirrors: Vec<MirrorInfo>,
    /// Indexed by plane index.
    pub cylinder_of_plane: Vec<usize>,
    policy: SelfImagePolicy,
    n_live: usize,
}

/// Shift a point by one period towards the middle of the plane.
pub(super) fn remap(p: RapPhi) -> RapPhi {
    let phi = if p.phi < PI { p.phi + TAU } else { p.phi - TAU };
    RapPhi::new(p.rap, phi)
}

impl MirroredPlane {
    pub fn new(plane: PlaneIndex, policy: SelfImagePolicy) -> Self {
        Self {
            plane,
            mirrors: Vec::new(),
            cylinder_of_plane: Vec::new(),
            policy,
            n_live: 0,
        }
    }

    /// Allocate a cylinder index whose copies will be pushed onto `plane_points`, in
    /// the order the plane is going to number them.
    pub fn register(
        &mut self,
        point: RapPhi,
        mirror: Option<RapPhi>,
        plane_points: &mut Vec<RapPhi>,
    ) -> usize {
        let cylinder = self.mirrors.len();
        let main = self.push_plane_point(cylinder, point, plane_points);
        let mirror = mirror.map(|m| self.push_plane_point(cylinder, m, plane_points));
        self.mirrors.push(MirrorInfo { main, mirror });
        self.n_live += 1;
        cylinder
    }

    /// Give an existing cylinder point a mirror copy.
    pub fn register_mirror(
        &mut self,
        cylinder: usize,
        mirror: RapPhi,
        plane_points: &mut Vec<RapPhi>,
    ) {
        debug_assert!(self.mirrors[cylinder].mirror.is_none());
        let mirror = self.push_plane_point(cylinder, mirror, plane_points);
        self.mirrors[cylinder].mirror = Some(mirror);
    }

    fn push_plane_point(
        &mut self,
        cylinder: usize,
        point: RapPhi,
        plane_points: &mut Vec<RapPhi>,
    ) -> usize {
        let plane_index = self.cylinder_of_plane.len();
        self.cylinder_of_plane.push(cylinder);
        plane_points.push(point);
        plane_index
    }

    pub fn is_valid(&self, cylinder: usize) -> bool {
        self.mirrors
            .get(cylinder)
            .is_some_and(|info| self.plane.is_valid(info.main))
    }

    pub fn len(&self) -> usize {
        self.n_live
    }

    /// Plane indices backing `remove`, which are marked dead here.
    ///
    /// # Panics
    ///
    /// Panics if a cylinder index is not live.
    pub fn retire(&mut self, remove: &[usize]) -> Vec<usize> {
        let mut plane_remove = Vec::with_capacity(2 * remove.len());
        for &c in remove {
            assert!(self.is_valid(c), "cannot remove point {c}: not live");
            let info = self.mirrors[c];
            plane_remove.push(info.main);
            plane_remove.extend(info.mirror);
        }
        self.n_live -= remove.len();
        plane_remove
    }

    /// Sorted, deduplicated cylinder indices of a list of plane indices.
    pub fn to_cylinder(&self, plane_indices: &[usize]) -> Vec<usize> {
        let mut out: Vec<usize> = plane_indices
            .iter()
            .map(|&p| self.cylinder_of_plane[p])
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Closer of the neighbours of the main and mirror copies, mapped to the cylinder.
    /// A lone point has no neighbour, whatever its mirror says.
    pub fn nearest(&self, cylinder: usize) -> Result<Option<Neighbour>> {
        assert!(self.is_valid(cylinder), "point {cylinder} is not live");
        if self.n_live == 1 {
            return Ok(None);
        }
        let info = self.mirrors[cylinder];
        let mut best = self.plane_nearest(info.main);
        if let Some(m) = info.mirror {
            if let Some((n, d)) = self.plane_nearest(m) {
                if best.map_or(true, |(_, bd)| d < bd) {
                    best = Some((n, d));
                }
            }
        }
        let Some((plane_nn, distance_sq)) = best else {
            return Ok(None);
        };
        let index = self.cylinder_of_plane[plane_nn];
        let self_image = index == cylinder;
        if self_image && self.policy == SelfImagePolicy::Strict {
            return Err(Error::AmbiguousNeighbour { index: cylinder });
        }
        Ok(Some(Neighbour {
            index,
            distance_sq,
            self_image,
        }))
    }

    /// Live cylinder points within `distance_sq` of `cylinder`, measured between main
    /// copies; see [`super::DynamicNearestNeighbours::neighbours_within`].
    pub fn within(&self, cylinder: usize, distance_sq: f64) -> Vec<usize> {
        assert!(self.is_valid(cylinder), "point {cylinder} is not live");
        let position = |c: usize| self.plane.position(self.mirrors[c].main);
        let center = position(cylinder);
        let bound = padded(distance_sq);
        let mut out = Vec::new();
        for_each_on_cylinder(&self.plane, center, bound, |q| {
            let c = self.cylinder_of_plane[q];
            if c != cylinder && center.cylinder_distance_sq(&position(c)) <= bound {
                out.push(c);
            }
        });
        out.sort_unstable();
        out.dedup();
        out
    }

    fn plane_nearest(&self, plane_index: usize) -> Option<(usize, f64)> {
        self.plane
            .nearest_index(plane_index)
            .map(|n| (n, self.plane.nearest_distance_sq(plane_index)))
    }
}
