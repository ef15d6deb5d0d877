//! Exact dynamic nearest neighbours in the flat plane.
//!
//! Each live point caches its nearest neighbour. Every point also keeps the list of
//! points that currently name it as their neighbour ("followers"), so a removal only
//! revisits the points that actually lost their neighbour. Insertions run a bounded
//! reverse search: no cached distance exceeds `bound_sq`, so cells farther away than
//! that cannot hold a point the newcomer would steal.
//!
//! Exactly coincident points are chained to a representative instead of entering the
//! grid. A duplicate's neighbour is its representative at distance zero.

use super::grid::HashGrid;
use super::{padded, DynamicNearestNeighbours, Neighbour, RapPhi, Update};
use crate::error::{Error, Result};
use crate::warning::{LimitedWarning, DEFAULT_MAX_WARNINGS};
use smallvec::SmallVec;

/// Rebuild the grid once the live count drops below `1 / REBUILD_FRACTION` of the
/// count it was sized for.
const REBUILD_FRACTION: usize = 4;
const MIN_REBUILD_SIZE: usize = 32;

/// Slack, in cells, on the distance from a query to the edge of the searched block.
/// Covers the rounding in `floor(coord / cell_size)` for every keyable coordinate.
const CELL_SLACK: f64 = 1e-3;

#[derive(Clone, Debug)]
struct Vertex {
    pos: RapPhi,
    live: bool,
    nn: Option<usize>,
    nn_dist_sq: f64,
    coincident_with: Option<usize>,
    duplicates: SmallVec<[usize; 2]>,
    followers: SmallVec<[usize; 4]>,
}

impl Vertex {
    fn new(pos: RapPhi) -> Self {
        Self {
            pos,
            live: true,
            nn: None,
            nn_dist_sq: f64::INFINITY,
            coincident_with: None,
            duplicates: SmallVec::new(),
            followers: SmallVec::new(),
        }
    }
}

/// Running minimum of `(distance, index)`.
#[derive(Clone, Copy, Debug)]
struct Closest {
    index: Option<usize>,
    dist_sq: f64,
}

impl Closest {
    const NONE: Self = Self {
        index: None,
        dist_sq: f64::INFINITY,
    };

    #[inline]
    fn offer(&mut self, index: usize, dist_sq: f64) {
        let better = dist_sq < self.dist_sq
            || (dist_sq == self.dist_sq && self.index.map_or(true, |best| index < best));
        if better {
            self.index = Some(index);
            self.dist_sq = dist_sq;
        }
    }
}

/// Dynamic nearest-neighbour index over points in the plane.
///
/// Ties between equidistant neighbours go to the lowest index. Azimuth is not
/// wrapped: this is the building block under the cylinder indices.
#[derive(Clone, Debug)]
pub struct PlaneIndex {
    vertices: Vec<Vertex>,
    grid: HashGrid,
    n_live: usize,
    n_at_build: usize,
    bound_sq: f64,
    coincidences: LimitedWarning,
}

impl PlaneIndex {
    /// Build an index over `points` (indices `0..points.len()`).
    pub fn new(points: &[RapPhi]) -> Result<Self> {
        Self::with_max_warnings(points, DEFAULT_MAX_WARNINGS)
    }

    /// Build an index, emitting at most `max_warnings` coincident-point warnings.
    pub fn with_max_warnings(points: &[RapPhi], max_warnings: u32) -> Result<Self> {
        check_finite(points, 0)?;
        let mut index = Self {
            vertices: Vec::with_capacity(points.len()),
            grid: HashGrid::sized_for(points),
            n_live: 0,
            n_at_build: points.len(),
            bound_sq: 0.0,
            coincidences: LimitedWarning::new(max_warnings),
        };
        for &pos in points {
            index.place(pos);
        }
        for i in 0..points.len() {
            let closest = index.search_nearest(i);
            index.set_nn(i, closest.index, closest.dist_sq);
        }
        index.bound_sq = index.exact_bound();
        tracing::debug!(
            points = points.len(),
            cell_size = index.grid.cell_size(),
            "built plane index"
        );
        Ok(index)
    }

    /// Number of live points.
    pub fn len(&self) -> usize {
        self.n_live
    }

    /// Whether there are no live points.
    pub fn is_empty(&self) -> bool {
        self.n_live == 0
    }

    /// Whether `index` is live.
    pub fn is_valid(&self, index: usize) -> bool {
        self.vertices.get(index).is_some_and(|v| v.live)
    }

    /// Position of a point (live or not).
    ///
    /// # Panics
    ///
    /// Panics if `index` was never assigned.
    pub fn position(&self, index: usize) -> RapPhi {
        self.vertices[index].pos
    }

    /// Index the next added point will receive.
    pub fn next_index(&self) -> usize {
        self.vertices.len()
    }

    /// Cached nearest neighbour of a live point.
    pub fn nearest_index(&self, index: usize) -> Option<usize> {
        self.live_vertex(index).nn
    }

    /// Cached squared distance to the nearest neighbour (infinite if there is none).
    pub fn nearest_distance_sq(&self, index: usize) -> f64 {
        self.live_vertex(index).nn_dist_sq
    }

    /// Number of coincident-point insertions seen so far.
    pub fn coincidence_count(&self) -> u32 {
        self.coincidences.count()
    }

    /// Remove and add points in one batch.
    ///
    /// Added points receive consecutive indices following the last assigned one. The
    /// returned `updated` list is sorted and contains every live point whose cached
    /// neighbour changed, the added points included.
    ///
    /// # Panics
    ///
    /// Panics if an index in `remove` is not live.
    pub fn remove_and_add_points(&mut self, remove: &[usize], add: &[RapPhi]) -> Result<Update> {
        check_finite(add, self.vertices.len())?;

        let mut stale = Vec::new();
        for &i in remove {
            self.detach(i, &mut stale);
        }

        let mut updated = Vec::with_capacity(add.len() + stale.len());
        let mut added = Vec::with_capacity(add.len());
        for &pos in add {
            added.push(self.attach(pos, &mut updated));
        }

        for p in stale {
            let v = &self.vertices[p];
            if !v.live || v.nn.is_some_and(|n| self.vertices[n].live) {
                continue;
            }
            let closest = self.search_nearest(p);
            self.set_nn(p, closest.index, closest.dist_sq);
            updated.push(p);
        }

        self.maybe_rebuild();
        if self.bound_sq == f64::INFINITY {
            self.bound_sq = self.exact_bound();
        }

        updated.sort_unstable();
        updated.dedup();
        Ok(Update { added, updated })
    }

    fn live_vertex(&self, index: usize) -> &Vertex {
        let v = &self.vertices[index];
        assert!(v.live, "point {index} is not live");
        v
    }

    /// Append a vertex and file it in the grid or in a coincidence chain.
    fn place(&mut self, pos: RapPhi) -> (usize, Option<usize>) {
        let index = self.vertices.len();
        let rep = self
            .grid
            .same_cell(&pos)
            .iter()
            .copied()
            .find(|&q| self.vertices[q].pos == pos);
        self.vertices.push(Vertex::new(pos));
        self.n_live += 1;
        match rep {
            Some(r) => {
                self.vertices[index].coincident_with = Some(r);
                self.vertices[r].duplicates.push(index);
                self.coincidences.warn(&format!(
                    "point {index} coincides with point {r} at ({}, {})",
                    pos.rap, pos.phi
                ));
            }
            None => self.grid.insert(index, &pos),
        }
        (index, rep)
    }

    fn attach(&mut self, pos: RapPhi, updated: &mut Vec<usize>) -> usize {
        let (index, rep) = self.place(pos);
        updated.push(index);
        if let Some(r) = rep {
            self.set_nn(index, Some(r), 0.0);
            if self.vertices[r].nn_dist_sq > 0.0 {
                self.set_nn(r, Some(index), 0.0);
                updated.push(r);
            }
            return index;
        }
        let closest = self.search_nearest(index);
        self.set_nn(index, closest.index, closest.dist_sq);
        self.claim_reverse_neighbours(index, updated);
        index
    }

    fn detach(&mut self, i: usize, stale: &mut Vec<usize>) {
        assert!(self.is_valid(i), "cannot remove point {i}: not live");
        let followers = std::mem::take(&mut self.vertices[i].followers);
        stale.extend(followers.into_iter().filter(|&f| f != i));
        if let Some(n) = self.vertices[i].nn.take() {
            unfollow(&mut self.vertices[n].followers, i);
        }
        self.vertices[i].live = false;
        self.n_live -= 1;

        let pos = self.vertices[i].pos;
        if let Some(r) = self.vertices[i].coincident_with {
            self.vertices[r].duplicates.retain(|d| *d != i);
        } else if self.vertices[i].duplicates.is_empty() {
            self.grid.remove(i, &pos);
        } else {
            let dups = std::mem::take(&mut self.vertices[i].duplicates);
            let heir = dups[0];
            self.grid.replace(i, heir, &pos);
            for &d in &dups[1..] {
                self.vertices[d].coincident_with = Some(heir);
            }
            let v = &mut self.vertices[heir];
            v.coincident_with = None;
            v.duplicates = dups[1..].iter().copied().collect();
        }
    }

    fn set_nn(&mut self, p: usize, nn: Option<usize>, dist_sq: f64) {
        let old = self.vertices[p].nn;
        if old != nn {
            if let Some(o) = old {
                unfollow(&mut self.vertices[o].followers, p);
            }
            if let Some(n) = nn {
                self.vertices[n].followers.push(p);
            }
        }
        let v = &mut self.vertices[p];
        v.nn = nn;
        v.nn_dist_sq = dist_sq;
        if dist_sq > self.bound_sq {
            self.bound_sq = dist_sq;
        }
    }

    #[inline]
    fn offer(&self, best: &mut Closest, p: usize, q: usize) {
        if q != p {
            best.offer(q, self.vertices[p].pos.plane_distance_sq(&self.vertices[q].pos));
        }
    }

    /// Squared distance from a query to the edge of the block of rings `0..=r`.
    #[inline]
    fn clear_radius_sq(&self, r: i64) -> f64 {
        let edge = (r as f64 - CELL_SLACK).max(0.0) * self.grid.cell_size();
        edge * edge
    }

    fn scan_budget(&self) -> usize {
        2 * self.grid.len() + 16
    }

    fn search_nearest(&self, p: usize) -> Closest {
        let v = &self.vertices[p];
        if let Some(r) = v.coincident_with {
            return Closest {
                index: Some(r),
                dist_sq: 0.0,
            };
        }
        if let Some(&d) = v.duplicates.first() {
            return Closest {
                index: Some(d),
                dist_sq: 0.0,
            };
        }

        let mut best = Closest::NONE;
        let (Some(center), Some(bounds)) = (self.grid.key_for(&v.pos), self.grid.bounds()) else {
            self.grid.for_each(|q| self.offer(&mut best, p, q));
            return best;
        };
        for &q in self.grid.outliers() {
            self.offer(&mut best, p, q);
        }
        let budget = self.scan_budget();
        let mut looked_up = 0;
        for r in 0i64.. {
            looked_up += self
                .grid
                .for_each_in_ring(center, r, &bounds, |q| self.offer(&mut best, p, q));
            if best.dist_sq < self.clear_radius_sq(r) || bounds.covered_by(center, r) {
                break;
            }
            if looked_up > budget {
                best = Closest::NONE;
                self.grid.for_each(|q| self.offer(&mut best, p, q));
                break;
            }
        }
        best
    }

    /// Visit every live point within squared distance `distance_sq` of `center`.
    /// Points reached through the brute-force fallback may be visited twice.
    pub fn for_each_within(&self, center: &RapPhi, distance_sq: f64, mut f: impl FnMut(usize)) {
        let mut visit = |q: usize| {
            let v = &self.vertices[q];
            if center.plane_distance_sq(&v.pos) <= distance_sq {
                f(q);
                v.duplicates.iter().for_each(|&d| f(d));
            }
        };
        let (Some(key), Some(bounds)) = (self.grid.key_for(center), self.grid.bounds()) else {
            self.grid.for_each(visit);
            return;
        };
        for &q in self.grid.outliers() {
            visit(q);
        }
        let budget = self.scan_budget();
        let mut looked_up = 0;
        for r in 0i64.. {
            looked_up += self.grid.for_each_in_ring(key, r, &bounds, &mut visit);
            if distance_sq < self.clear_radius_sq(r) || bounds.covered_by(key, r) {
                break;
            }
            if looked_up > budget {
                self.grid.for_each(&mut visit);
                break;
            }
        }
    }

    /// Point every live point that is strictly closer to `y` than to its cached
    /// neighbour at `y`.
    fn claim_reverse_neighbours(&mut self, y: usize, updated: &mut Vec<usize>) {
        let pos = self.vertices[y].pos;
        let mut claimed: Vec<(usize, f64)> = Vec::new();
        let mut consider = |q: usize| {
            if q == y {
                return;
            }
            let v = &self.vertices[q];
            let dist_sq = pos.plane_distance_sq(&v.pos);
            if dist_sq < v.nn_dist_sq {
                claimed.push((q, dist_sq));
            }
        };

        match (self.grid.key_for(&pos), self.grid.bounds()) {
            (Some(center), Some(bounds)) => {
                for &q in self.grid.outliers() {
                    consider(q);
                }
                let budget = self.scan_budget();
                let mut looked_up = 0;
                for r in 0i64.. {
                    looked_up += self.grid.for_each_in_ring(center, r, &bounds, &mut consider);
                    if self.clear_radius_sq(r) >= self.bound_sq || bounds.covered_by(center, r) {
                        break;
                    }
                    if looked_up > budget {
                        // repeats are harmless: claiming is idempotent
                        self.grid.for_each(&mut consider);
                        break;
                    }
                }
            }
            _ => self.grid.for_each(&mut consider),
        }

        for (q, dist_sq) in claimed {
            self.set_nn(q, Some(y), dist_sq);
            updated.push(q);
        }
    }

    fn exact_bound(&self) -> f64 {
        self.vertices
            .iter()
            .filter(|v| v.live)
            .map(|v| v.nn_dist_sq)
            .fold(0.0, f64::max)
    }

    fn maybe_rebuild(&mut self) {
        if self.n_live < MIN_REBUILD_SIZE || self.n_live * REBUILD_FRACTION >= self.n_at_build {
            return;
        }
        let reps = || {
            self.vertices
                .iter()
                .enumerate()
                .filter(|(_, v)| v.live && v.coincident_with.is_none())
        };
        let mut grid = HashGrid::sized_for(reps().map(|(_, v)| &v.pos));
        for (i, v) in reps() {
            grid.insert(i, &v.pos);
        }
        tracing::debug!(
            live = self.n_live,
            sized_for = self.n_at_build,
            cell_size = grid.cell_size(),
            "rebuilt plane grid"
        );
        self.grid = grid;
        self.n_at_build = self.n_live;
        self.bound_sq = self.exact_bound();
    }
}

impl DynamicNearestNeighbours for PlaneIndex {
    fn nearest_neighbour(&self, index: usize) -> Result<Option<Neighbour>> {
        let v = self.live_vertex(index);
        Ok(v.nn.map(|n| Neighbour {
            index: n,
            distance_sq: v.nn_dist_sq,
            self_image: false,
        }))
    }

    fn is_valid(&self, index: usize) -> bool {
        PlaneIndex::is_valid(self, index)
    }

    fn len(&self) -> usize {
        self.n_live
    }

    fn remove_and_add_points(&mut self, remove: &[usize], add: &[RapPhi]) -> Result<Update> {
        PlaneIndex::remove_and_add_points(self, remove, add)
    }
    fn neighbours_within(&self, index: usize, distance_sq: f64) -> Vec<usize> {
        let center = self.live_vertex(index).pos;
        let mut out = Vec::new();
        self.for_each_within(&center, padded(distance_sq), |q| {
            if q != index {
                out.push(q);
            }
        });
        out.sort_unstable();
        out.dedup();
        out
    }
}

fn unfollow(followers: &mut SmallVec<[usize; 4]>, p: usize) {
    if let Some(k) = followers.iter().position(|&f| f == p) {
        followers.swap_remove(k);
    }
}

fn check_finite(points: &[RapPhi], first_index: usize) -> Result<()> {
    match points.iter().position(|p| !p.is_finite()) {
        Some(k) => Err(Error::InvalidPoint {
            index: first_index + k,
            rapidity: points[k].rap,
            azimuth: points[k].phi,
        }),
        None => Ok(()),
    }
}
