//! Cylinder index over two planes.
//!
//! The first plane holds points as given. The second holds every point shifted by
//! one period towards the middle (azimuth below π moved up by 2π, the rest kept),
//! so any pair closer than π in azimuth is adjacent in at least one plane. Both
//! planes number points identically, so no index translation is needed.

use super::plane::PlaneIndex;
use super::{
    for_each_on_cylinder, padded, validated_points, DynamicNearestNeighbours, Neighbour, RapPhi,
    Update, WrapOptions,
};
use crate::error::Result;
use std::f64::consts::{PI, TAU};

/// Cylinder index that never reports a self-image.
#[derive(Clone, Debug)]
pub struct Cylinder4Pi {
    direct: PlaneIndex,
    shifted: PlaneIndex,
}

fn shifted(p: RapPhi) -> RapPhi {
    if p.phi < PI {
        RapPhi::new(p.rap, p.phi + TAU)
    } else {
        p
    }
}

impl Cylinder4Pi {
    /// Build the index over `points` (indices `0..points.len()`).
    pub fn new(points: &[RapPhi], options: &WrapOptions) -> Result<Self> {
        let points = validated_points(points, 0)?;
        let moved: Vec<RapPhi> = points.iter().copied().map(shifted).collect();
        Ok(Self {
            direct: PlaneIndex::with_max_warnings(&points, options.max_warnings())?,
            shifted: PlaneIndex::with_max_warnings(&moved, options.max_warnings())?,
        })
    }
}

impl DynamicNearestNeighbours for Cylinder4Pi {
    fn nearest_neighbour(&self, index: usize) -> Result<Option<Neighbour>> {
        let a = self.direct.nearest_index(index);
        let b = self.shifted.nearest_index(index);
        let da = self.direct.nearest_distance_sq(index);
        let db = self.shifted.nearest_distance_sq(index);
        let (nn, distance_sq) = if db < da { (b, db) } else { (a, da) };
        Ok(nn.map(|index| Neighbour {
            index,
            distance_sq,
            self_image: false,
        }))
    }

    fn is_valid(&self, index: usize) -> bool {
        self.direct.is_valid(index)
    }

    fn neighbours_within(&self, index: usize, distance_sq: f64) -> Vec<usize> {
        assert!(self.direct.is_valid(index), "point {index} is not live");
        let center = self.direct.position(index);
        let bound = padded(distance_sq);
        let mut out = Vec::new();
        for_each_on_cylinder(&self.direct, center, bound, |q| {
            if q != index && center.cylinder_distance_sq(&self.direct.position(q)) <= bound {
                out.push(q);
            }
        });
        out.sort_unstable();
        out.dedup();
        out
    }

    fn len(&self) -> usize {
        self.direct.len()
    }

    fn remove_and_add_points(&mut self, remove: &[usize], add: &[RapPhi]) -> Result<Update> {
        let add = validated_points(add, self.direct.next_index())?;
        let moved: Vec<RapPhi> = add.iter().copied().map(shifted).collect();
        let first = self.direct.remove_and_add_points(remove, &add)?;
        let second = self.shifted.remove_and_add_points(remove, &moved)?;
        debug_assert_eq!(first.added, second.added);
        let mut updated = first.updated;
        updated.extend(second.updated);
        updated.sort_unstable();
        updated.dedup();
        Ok(Update {
            added: first.added,
            updated,
        })
    }
}
