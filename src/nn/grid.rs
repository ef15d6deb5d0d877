//! Uniform hash grid over the (rapidity, azimuth) plane.
//!
//! Points are bucketed by `floor(coord / cell_size)`. Points outside the bulk the grid
//! was sized for, or too far out to be keyed robustly, are kept in a separate list
//! that callers scan linearly.

use super::RapPhi;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::f64::consts::TAU;

/// Cell coordinates beyond this magnitude are not keyed.
const MAX_CELL_COORD: f64 = (1u64 << 40) as f64;

const BUCKET_INLINE_CAPACITY: usize = 8;

pub(super) type CellKey = (i64, i64);

/// Inclusive range of occupied cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct CellBounds {
    pub min_x: i64,
    pub max_x: i64,
    pub min_y: i64,
    pub max_y: i64,
}

impl CellBounds {
    fn including(self, (x, y): CellKey) -> Self {
        Self {
            min_x: self.min_x.min(x),
            max_x: self.max_x.max(x),
            min_y: self.min_y.min(y),
            max_y: self.max_y.max(y),
        }
    }

    /// Whether the square of half-width `r` around `center` covers every occupied cell.
    pub fn covered_by(&self, (cx, cy): CellKey, r: i64) -> bool {
        cx - r <= self.min_x && cx + r >= self.max_x && cy - r <= self.min_y && cy + r >= self.max_y
    }
}

/// Region whose points are keyed; everything else is an outlier.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Fences {
    lo_x: f64,
    hi_x: f64,
    lo_y: f64,
    hi_y: f64,
}

impl Fences {
    const OPEN: Self = Self {
        lo_x: f64::NEG_INFINITY,
        hi_x: f64::INFINITY,
        lo_y: f64::NEG_INFINITY,
        hi_y: f64::INFINITY,
    };

    fn contain(&self, p: &RapPhi) -> bool {
        p.rap >= self.lo_x && p.rap <= self.hi_x && p.phi >= self.lo_y && p.phi <= self.hi_y
    }
}

/// Interquartile fences of `values` (reordered in place).
fn fences(values: &mut [f64]) -> (f64, f64) {
    values.sort_unstable_by(f64::total_cmp);
    let n = values.len();
    let (q1, q3) = (values[n / 4], values[(3 * n / 4).min(n - 1)]);
    let margin = (2.0 * (q3 - q1)).max(TAU);
    (q1 - margin, q3 + margin)
}

/// Side of a square cell giving about one of `n` points per cell over a `w` by `h` box.
fn cell_size(n: usize, w: f64, h: f64) -> f64 {
    if n == 0 {
        return 1.0;
    }
    let n = n as f64;
    // the second term keeps collinear input from producing needle-thin cells
    let size = (w * h / n).sqrt().max(w.max(h) / n);
    if size.is_finite() && size > 0.0 {
        size
    } else {
        1.0
    }
}

#[derive(Clone, Debug)]
pub(super) struct HashGrid {
    cell_size: f64,
    fences: Fences,
    cells: FxHashMap<CellKey, SmallVec<[usize; BUCKET_INLINE_CAPACITY]>>,
    outliers: Vec<usize>,
    // Never shrinks between rebuilds; stale extent only costs a few empty lookups.
    bounds: Option<CellBounds>,
    len: usize,
}

impl HashGrid {
    pub fn new(cell_size: f64) -> Self {
        debug_assert!(cell_size.is_finite() && cell_size > 0.0);
        Self {
            cell_size,
            fences: Fences::OPEN,
            cells: FxHashMap::default(),
            outliers: Vec::new(),
            bounds: None,
            len: 0,
        }
    }

    /// A grid sized for `points`: roughly one point per cell over the bulk of them.
    ///
    /// The bulk is the interquartile box widened by twice its size, and by at least
    /// one period, on each side. Points outside it are not keyed, so a far straggler
    /// neither inflates the cells nor stretches the rings.
    pub fn sized_for<'a>(points: impl IntoIterator<Item = &'a RapPhi>) -> Self {
        let (mut raps, mut phis): (Vec<f64>, Vec<f64>) =
            points.into_iter().map(|p| (p.rap, p.phi)).unzip();
        if raps.is_empty() {
            return Self::new(1.0);
        }
        let (lo_x, hi_x) = fences(&mut raps);
        let (lo_y, hi_y) = fences(&mut phis);
        let inside = |v: f64, lo: f64, hi: f64| v >= lo && v <= hi;

        let mut n = 0usize;
        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for (&x, &y) in raps.iter().zip(&phis) {
            if inside(x, lo_x, hi_x) && inside(y, lo_y, hi_y) {
                n += 1;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }
        let mut grid = Self::new(cell_size(n, max_x - min_x, max_y - min_y));
        grid.fences = Fences {
            lo_x,
            hi_x,
            lo_y,
            hi_y,
        };
        grid
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of stored points, outliers included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn bounds(&self) -> Option<CellBounds> {
        self.bounds
    }

    pub fn outliers(&self) -> &[usize] {
        &self.outliers
    }

    pub fn key_for(&self, p: &RapPhi) -> Option<CellKey> {
        if !self.fences.contain(p) {
            return None;
        }
        let x = (p.rap / self.cell_size).floor();
        let y = (p.phi / self.cell_size).floor();
        if !x.is_finite() || !y.is_finite() || x.abs() >= MAX_CELL_COORD || y.abs() >= MAX_CELL_COORD
        {
            return None;
        }
        Some((x as i64, y as i64))
    }

    pub fn cell(&self, key: CellKey) -> &[usize] {
        self.cells.get(&key).map_or(&[], |bucket| bucket.as_slice())
    }

    /// Points sharing the cell of `p` (or the outlier list if `p` has no cell).
    pub fn same_cell(&self, p: &RapPhi) -> &[usize] {
        match self.key_for(p) {
            Some(key) => self.cell(key),
            None => &self.outliers,
        }
    }

    pub fn insert(&mut self, index: usize, p: &RapPhi) {
        self.len += 1;
        let Some(key) = self.key_for(p) else {
            self.outliers.push(index);
            return;
        };
        self.cells.entry(key).or_default().push(index);
        self.bounds = Some(match self.bounds {
            Some(b) => b.including(key),
            None => CellBounds {
                min_x: key.0,
                max_x: key.0,
                min_y: key.1,
                max_y: key.1,
            },
        });
    }

    /// Remove `index`, stored at `p`. Returns false if it was not found.
    pub fn remove(&mut self, index: usize, p: &RapPhi) -> bool {
        let removed = match self.key_for(p) {
            Some(key) => {
                let Some(bucket) = self.cells.get_mut(&key) else {
                    return false;
                };
                let Some(pos) = bucket.iter().position(|&q| q == index) else {
                    return false;
                };
                bucket.remove(pos);
                if bucket.is_empty() {
                    self.cells.remove(&key);
                }
                true
            }
            None => match self.outliers.iter().position(|&q| q == index) {
                Some(pos) => {
                    self.outliers.remove(pos);
                    true
                }
                None => false,
            },
        };
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Put `new` in the slot held by `old` (both at `p`).
    pub fn replace(&mut self, old: usize, new: usize, p: &RapPhi) -> bool {
        let slot = match self.key_for(p) {
            Some(key) => self
                .cells
                .get_mut(&key)
                .and_then(|bucket| bucket.iter_mut().find(|q| **q == old)),
            None => self.outliers.iter_mut().find(|q| **q == old),
        };
        match slot {
            Some(q) => {
                *q = new;
                true
            }
            None => false,
        }
    }

    /// Visit every stored point, outliers included.
    pub fn for_each(&self, mut f: impl FnMut(usize)) {
        for bucket in self.cells.values() {
            for &q in bucket {
                f(q);
            }
        }
        for &q in &self.outliers {
            f(q);
        }
    }

    /// Visit the cells at Chebyshev distance exactly `r` from `center`, clipped to the
    /// occupied extent. Returns the number of cells looked up.
    pub fn for_each_in_ring(
        &self,
        center: CellKey,
        r: i64,
        bounds: &CellBounds,
        mut f: impl FnMut(usize),
    ) -> usize {
        let (cx, cy) = center;
        let mut looked_up = 0;
        let mut visit = |x: i64, y: i64| {
            if x < bounds.min_x || x > bounds.max_x || y < bounds.min_y || y > bounds.max_y {
                return;
            }
            looked_up += 1;
            for &q in self.cell((x, y)) {
                f(q);
            }
        };
        if r == 0 {
            visit(cx, cy);
            return looked_up;
        }
        for x in (cx - r)..=(cx + r) {
            visit(x, cy - r);
            visit(x, cy + r);
        }
        for y in (cy - r + 1)..=(cy + r - 1) {
            visit(cx - r, y);
            visit(cx + r, y);
        }
        looked_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_and_replace() {
        let mut grid = HashGrid::new(0.5);
        let p = RapPhi::new(0.3, 1.2);
        grid.insert(7, &p);
        grid.insert(9, &p);
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.same_cell(&p), &[7, 9]);

        assert!(grid.replace(7, 11, &p));
        assert_eq!(grid.same_cell(&p), &[11, 9]);
        assert!(grid.remove(11, &p));
        assert!(!grid.remove(11, &p));
        assert_eq!(grid.same_cell(&p), &[9]);
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn far_points_become_outliers() {
        let mut grid = HashGrid::new(1e-3);
        let far = RapPhi::new(1e300, 0.0);
        assert!(grid.key_for(&far).is_none());
        grid.insert(0, &far);
        assert_eq!(grid.outliers(), &[0]);
        assert!(grid.bounds().is_none());
        assert!(grid.remove(0, &far));
        assert_eq!(grid.len(), 0);
    }

    #[test]
    fn rings_visit_each_cell_once() {
        let mut grid = HashGrid::new(1.0);
        let mut next = 0;
        for x in -3..=3 {
            for y in -3..=3 {
                grid.insert(next, &RapPhi::new(x as f64 + 0.5, y as f64 + 0.5));
                next += 1;
            }
        }
        let bounds = grid.bounds().unwrap();
        let mut seen = Vec::new();
        let mut lookups = 0;
        for r in 0..=3 {
            lookups += grid.for_each_in_ring((0, 0), r, &bounds, |q| seen.push(q));
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..49).collect::<Vec<_>>());
        assert_eq!(lookups, 49);
        assert!(bounds.covered_by((0, 0), 3));
        assert!(!bounds.covered_by((0, 0), 2));
    }

    #[test]
    fn cell_size_handles_degenerate_boxes() {
        assert_eq!(HashGrid::sized_for(std::iter::empty()).cell_size(), 1.0);
        assert_eq!(HashGrid::sized_for(&[RapPhi::new(1.0, 1.0)]).cell_size(), 1.0);
        let line: Vec<_> = (0..10).map(|i| RapPhi::new(0.0, i as f64)).collect();
        let size = HashGrid::sized_for(&line).cell_size();
        assert!((size - 0.9).abs() < 1e-12);
    }

    #[test]
    fn far_straggler_does_not_inflate_cells() {
        let mut points: Vec<_> = (0..400)
            .map(|i| RapPhi::new((i % 20) as f64 * 0.1 - 1.0, (i / 20) as f64 * 0.3))
            .collect();
        let bulk = HashGrid::sized_for(&points).cell_size();
        points.push(RapPhi::new(1e6, 1.0));
        let mut grid = HashGrid::sized_for(&points);
        assert!(grid.cell_size() < 0.5);
        assert!((grid.cell_size() - bulk).abs() < 1e-12);

        for (i, p) in points.iter().enumerate() {
            grid.insert(i, p);
        }
        assert_eq!(grid.outliers(), &[400]);
        let bounds = grid.bounds().unwrap();
        assert!(bounds.max_x - bounds.min_x < 100);
        // mirror copies one period away are still keyed
        assert!(grid.key_for(&RapPhi::new(0.0, 0.5 + TAU)).is_some());
    }
}
