use super::traits::{ClosestPair, Metric};
use smallvec::SmallVec;

const BEAM: usize = usize::MAX;

/// Tie-break key of a candidate step: `(min, max)` for a pair, `(i, ∞)` for a beam
/// retirement. Smaller keys win ties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct PairKey {
    pub(crate) first: usize,
    pub(crate) second: usize,
}

impl PairKey {
    pub(crate) fn pair(i: usize, j: usize) -> Self {
        Self {
            first: i.min(j),
            second: i.max(j),
        }
    }

    pub(crate) fn beam(i: usize) -> Self {
        Self {
            first: i,
            second: BEAM,
        }
    }

    pub(crate) fn with_neighbour(i: usize, nn: Option<usize>) -> Self {
        match nn {
            Some(j) => Self::pair(i, j),
            None => Self::beam(i),
        }
    }

    pub(crate) fn into_closest(self, distance: f64) -> ClosestPair {
        ClosestPair {
            distance,
            a: self.first,
            b: (self.second != BEAM).then_some(self.second),
        }
    }
}

/// Row of a dense engine table.
pub(crate) trait EngineRow {
    type Metric;

    fn index(&self) -> usize;
    fn metric(&self) -> &Self::Metric;
}

/// Slots whose cached value equals `min`.
pub(crate) fn rows_at(values: impl Iterator<Item = f64>, min: f64) -> SmallVec<[usize; 4]> {
    values
        .enumerate()
        .filter(|&(_, v)| v == min)
        .map(|(slot, _)| slot)
        .collect()
}

/// Rescan the candidate rows with the full distance and return the smallest key among
/// the steps whose distance is exactly `min`.
///
/// Every minimal step has a member whose row caches `min` (the member with the
/// smaller scale factor, or the retired object), so scanning only those rows sees
/// every tied step.
pub(crate) fn smallest_key_at<T, R>(rows: &[R], candidates: &[usize], min: f64) -> Option<PairKey>
where
    R: EngineRow,
    R::Metric: Metric<T>,
{
    let mut best: Option<PairKey> = None;
    let mut offer = |key: PairKey| {
        if best.map_or(true, |b| key < b) {
            best = Some(key);
        }
    };
    for &slot in candidates {
        let row = &rows[slot];
        if row.metric().beam_distance() == min {
            offer(PairKey::beam(row.index()));
        }
        for (other_slot, other) in rows.iter().enumerate() {
            if other_slot != slot && row.metric().distance(other.metric()) == min {
                offer(PairKey::pair(row.index(), other.index()));
            }
        }
    }
    best
}

/// Stable index to storage slot.
#[derive(Clone, Debug, Default)]
pub(crate) struct SlotTable {
    slots: Vec<Option<usize>>,
}

impl SlotTable {
    /// Indices `0..n` in slots `0..n`.
    pub(crate) fn identity(n: usize) -> Self {
        Self {
            slots: (0..n).map(Some).collect(),
        }
    }

    pub(crate) fn get(&self, index: usize) -> usize {
        match self.slots.get(index).copied().flatten() {
            Some(slot) => slot,
            None => panic!("index {index} is not live"),
        }
    }

    pub(crate) fn insert(&mut self, index: usize, slot: usize) {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        assert!(self.slots[index].is_none(), "index {index} is already in use");
        self.slots[index] = Some(slot);
    }

    pub(crate) fn remove(&mut self, index: usize) -> usize {
        let slot = self.get(index);
        self.slots[index] = None;
        slot
    }

    /// Record that live `index` moved to `slot`.
    pub(crate) fn relocate(&mut self, index: usize, slot: usize) {
        self.slots[index] = Some(slot);
    }
}

/// `swap_remove` that keeps the slot table in sync.
pub(crate) fn swap_remove_row<R: EngineRow>(rows: &mut Vec<R>, slots: &mut SlotTable, slot: usize) {
    rows.swap_remove(slot);
    if let Some(moved) = rows.get(slot) {
        slots.relocate(moved.index(), slot);
    }
}
