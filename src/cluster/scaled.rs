//! Closest-pair tracking with per-object scale factors.
//!
//! Rows cache their *geometric* nearest neighbour (the beam counts, through its
//! geometric beam distance) and derive
//!
//! ```text
//! dij = min(scale_i, scale_nn) * geometric(i, nn)    or    scale_i * geometric_beam(i)
//! ```
//!
//! For the minimal step, the row of the member with the smaller scale factor always
//! caches exactly the minimal distance, so the global minimum of `dij` is the global
//! minimum of the full distance. Rows only need a rescan when their geometric
//! neighbour disappears; scale factors never invalidate anything.

use super::traits::{ClosestPair, Metric, NearestNeighbourEngine};
use super::util::{rows_at, smallest_key_at, swap_remove_row, EngineRow, PairKey, SlotTable};
use crate::error::Result;

#[derive(Clone, Debug)]
struct ScaledRow<M> {
    metric: M,
    index: usize,
    scale: f64,
    beam_geo: f64,
    nn: Option<usize>,
    nn_geo: f64,
    dij: f64,
}

impl<M> EngineRow for ScaledRow<M> {
    type Metric = M;

    fn index(&self) -> usize {
        self.index
    }

    fn metric(&self) -> &M {
        &self.metric
    }
}

impl<M> ScaledRow<M> {
    fn new<T>(metric: M, index: usize) -> Self
    where
        M: Metric<T>,
    {
        let scale = metric.scale_factor();
        let beam_geo = metric.geometric_beam_distance();
        Self {
            metric,
            index,
            scale,
            beam_geo,
            nn: None,
            nn_geo: beam_geo,
            dij: scale * beam_geo,
        }
    }

    /// Point at `nn` (geometric distance `geo`, scale factor `nn_scale`).
    #[inline]
    fn link(&mut self, nn: usize, geo: f64, nn_scale: f64) {
        self.nn = Some(nn);
        self.nn_geo = geo;
        self.dij = self.scale.min(nn_scale) * geo;
    }

    #[inline]
    fn unlink(&mut self) {
        self.nn = None;
        self.nn_geo = self.beam_geo;
        self.dij = self.scale * self.beam_geo;
    }
}

/// Closest-pair engine that caches geometric neighbours and scale factors.
///
/// Produces exactly the same steps as [`super::PlainEngine`] for the same metric.
#[derive(Clone, Debug)]
pub struct ScaledEngine<M> {
    rows: Vec<ScaledRow<M>>,
    slots: SlotTable,
}

impl<M> ScaledEngine<M> {
    /// Build the engine over `objects` (indices `0..objects.len()`).
    pub fn new<T>(objects: &[T]) -> Self
    where
        M: Metric<T>,
    {
        let mut rows: Vec<ScaledRow<M>> = objects
            .iter()
            .enumerate()
            .map(|(index, object)| ScaledRow::new::<T>(M::from_object(object), index))
            .collect();

        for i in 0..rows.len() {
            for j in (i + 1)..rows.len() {
                let geo = rows[i].metric.geometric_distance(&rows[j].metric);
                if geo < rows[i].nn_geo {
                    let scale = rows[j].scale;
                    rows[i].link(j, geo, scale);
                }
                if geo < rows[j].nn_geo {
                    let scale = rows[i].scale;
                    rows[j].link(i, geo, scale);
                }
            }
        }

        Self {
            slots: SlotTable::identity(rows.len()),
            rows,
        }
    }

    fn rescan<T>(&mut self, slot: usize)
    where
        M: Metric<T>,
    {
        let row = &self.rows[slot];
        let mut best: Option<(usize, f64)> = None;
        let mut best_geo = row.beam_geo;
        for (other_slot, other) in self.rows.iter().enumerate() {
            if other_slot == slot {
                continue;
            }
            let geo = row.metric.geometric_distance(&other.metric);
            if geo < best_geo {
                best_geo = geo;
                best = Some((other_slot, geo));
            }
        }
        match best {
            Some((other_slot, geo)) => {
                let (nn, scale) = (self.rows[other_slot].index, self.rows[other_slot].scale);
                self.rows[slot].link(nn, geo, scale);
            }
            None => self.rows[slot].unlink(),
        }
    }
}

impl<T, M: Metric<T>> NearestNeighbourEngine<T> for ScaledEngine<M> {
    fn closest_pair(&mut self) -> Option<ClosestPair> {
        let min = self.rows.iter().map(|r| r.dij).reduce(f64::min)?;
        let candidates = rows_at(self.rows.iter().map(|r| r.dij), min);
        let key = smallest_key_at::<T, _>(&self.rows, &candidates, min).unwrap_or_else(|| {
            let row = &self.rows[candidates[0]];
            PairKey::with_neighbour(row.index, row.nn)
        });
        Some(key.into_closest(min))
    }

    fn remove(&mut self, index: usize) -> Result<()> {
        let slot = self.slots.remove(index);
        swap_remove_row(&mut self.rows, &mut self.slots, slot);
        for s in 0..self.rows.len() {
            if self.rows[s].nn == Some(index) {
                self.rescan::<T>(s);
            }
        }
        Ok(())
    }

    fn merge(&mut self, a: usize, b: usize, object: &T, index: usize) -> Result<()> {
        assert_ne!(a, b, "cannot merge object {a} with itself");
        let sa = self.slots.remove(a);
        let sb = self.slots.remove(b);
        let (keep, vacated) = (sa.min(sb), sa.max(sb));

        self.rows[keep] = ScaledRow::new::<T>(M::from_object(object), index);
        self.slots.insert(index, keep);
        swap_remove_row(&mut self.rows, &mut self.slots, vacated);

        let new_scale = self.rows[keep].scale;
        let mut best: Option<(usize, f64)> = None;
        let mut best_geo = self.rows[keep].beam_geo;
        for s in 0..self.rows.len() {
            if s == keep {
                continue;
            }
            let geo = self.rows[s]
                .metric
                .geometric_distance(&self.rows[keep].metric);
            if geo < best_geo {
                best_geo = geo;
                best = Some((s, geo));
            }
            let row = &self.rows[s];
            if row.nn == Some(a) || row.nn == Some(b) {
                self.rescan::<T>(s);
            } else if geo < row.nn_geo {
                self.rows[s].link(index, geo, new_scale);
            }
        }
        match best {
            Some((s, geo)) => {
                let (nn, scale) = (self.rows[s].index, self.rows[s].scale);
                self.rows[keep].link(nn, geo, scale);
            }
            None => self.rows[keep].unlink(),
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}
