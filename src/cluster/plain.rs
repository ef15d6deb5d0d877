//! Plain O(N²) closest-pair tracking.
//!
//! Every live object caches its nearest neighbour under the full distance, the beam
//! counting as a neighbour. The global minimum is a linear sweep over the cache.
//! After a step, only the rows whose neighbour disappeared are rescanned; every other
//! row just compares itself against the newly created object.
//!
//! Storage is a dense table. A removal moves the last row into the freed slot, and a
//! merge writes the new object into the lower of the two freed slots before doing the
//! same for the upper one. Cached neighbours are stored as stable indices, so moved
//! rows need no relabelling; a [`SlotTable`] resolves stable indices to slots.

use super::traits::{ClosestPair, Metric, NearestNeighbourEngine};
use super::util::{rows_at, smallest_key_at, swap_remove_row, EngineRow, PairKey, SlotTable};
use crate::error::Result;

#[derive(Clone, Debug)]
struct PlainRow<M> {
    metric: M,
    index: usize,
    nn: Option<usize>,
    nn_dist: f64,
}

impl<M> EngineRow for PlainRow<M> {
    type Metric = M;

    fn index(&self) -> usize {
        self.index
    }

    fn metric(&self) -> &M {
        &self.metric
    }
}

/// Closest-pair engine with a full rescan per invalidated row.
#[derive(Clone, Debug)]
pub struct PlainEngine<M> {
    rows: Vec<PlainRow<M>>,
    slots: SlotTable,
}

impl<M> PlainEngine<M> {
    /// Build the engine over `objects` (indices `0..objects.len()`).
    pub fn new<T>(objects: &[T]) -> Self
    where
        M: Metric<T>,
    {
        let mut rows: Vec<PlainRow<M>> = objects
            .iter()
            .enumerate()
            .map(|(index, object)| {
                let metric = M::from_object(object);
                let nn_dist = metric.beam_distance();
                PlainRow {
                    metric,
                    index,
                    nn: None,
                    nn_dist,
                }
            })
            .collect();

        // each pair is evaluated once and offered to both ends
        for i in 0..rows.len() {
            for j in (i + 1)..rows.len() {
                let d = rows[i].metric.distance(&rows[j].metric);
                if d < rows[i].nn_dist {
                    rows[i].nn = Some(j);
                    rows[i].nn_dist = d;
                }
                if d < rows[j].nn_dist {
                    rows[j].nn = Some(i);
                    rows[j].nn_dist = d;
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
        let mut nn = None;
        let mut nn_dist = row.metric.beam_distance();
        for (other_slot, other) in self.rows.iter().enumerate() {
            if other_slot == slot {
                continue;
            }
            let d = row.metric.distance(&other.metric);
            if d < nn_dist {
                nn = Some(other.index);
                nn_dist = d;
            }
        }
        let row = &mut self.rows[slot];
        row.nn = nn;
        row.nn_dist = nn_dist;
    }
}

impl<T, M: Metric<T>> NearestNeighbourEngine<T> for PlainEngine<M> {
    fn closest_pair(&mut self) -> Option<ClosestPair> {
        let min = self
            .rows
            .iter()
            .map(|r| r.nn_dist)
            .reduce(f64::min)?;
        let candidates = rows_at(self.rows.iter().map(|r| r.nn_dist), min);
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

        let metric = M::from_object(object);
        let beam = metric.beam_distance();
        self.rows[keep] = PlainRow {
            metric,
            index,
            nn: None,
            nn_dist: beam,
        };
        self.slots.insert(index, keep);
        // keep < vacated, so the new row is never the one moved here
        swap_remove_row(&mut self.rows, &mut self.slots, vacated);

        let mut nn = None;
        let mut nn_dist = beam;
        for s in 0..self.rows.len() {
            if s == keep {
                continue;
            }
            let d = self.rows[s].metric.distance(&self.rows[keep].metric);
            if d < nn_dist {
                nn = Some(self.rows[s].index);
                nn_dist = d;
            }
            let row = &self.rows[s];
            if row.nn == Some(a) || row.nn == Some(b) {
                self.rescan::<T>(s);
            } else if d < row.nn_dist {
                let row = &mut self.rows[s];
                row.nn = Some(index);
                row.nn_dist = d;
            }
        }
        let row = &mut self.rows[keep];
        row.nn = nn;
        row.nn_dist = nn_dist;
        Ok(())
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}
