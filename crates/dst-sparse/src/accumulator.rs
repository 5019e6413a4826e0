//! The accumulation contract shared by every sparse backend.
//!
//! An accumulator is an additive multiset of `(row, col, value)`
//! contributions: assigning to an occupied position appends a second entry
//! rather than overwriting it, and [`Accumulator::compact`] merges
//! duplicates by summation. Queries between appends are legal and see the
//! same sums.

use serde::{Deserialize, Serialize};

/// One `(row, col, value)` contribution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Triplet {
    pub row: usize,
    pub col: usize,
    pub val: f64,
}

impl Triplet {
    pub fn new(row: usize, col: usize, val: f64) -> Self {
        Self { row, col, val }
    }
}

/// Lexicographic orderings for sorted triplet storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Sort by row, then column.
    #[default]
    RowMajor,
    /// Sort by column, then row.
    ColMajor,
}

impl SortOrder {
    /// Primary/secondary index pair of `t` under this ordering.
    pub fn sort_key(self, t: &Triplet) -> (usize, usize) {
        match self {
            SortOrder::RowMajor => (t.row, t.col),
            SortOrder::ColMajor => (t.col, t.row),
        }
    }
}

/// Additive sparse accumulation.
///
/// Backends share one contract: [`assign`](Accumulator::assign) appends,
/// [`compact`](Accumulator::compact) merges duplicate positions by
/// summation, and [`at`](Accumulator::at) reports the summed value at a
/// position whether or not the container has been compacted.
///
/// Bounds discipline: `assign` checks indices with `debug_assert!` only
/// and is meant for call sites whose indices were just derived from the
/// accumulator's own limits. The `assign_checked*` variants silently drop
/// out-of-range contributions and are the safe default.
pub trait Accumulator {
    /// Append `value` at `(row, col)`. Bounds are the caller's problem.
    fn assign(&mut self, row: usize, col: usize, value: f64);

    /// One past the largest legal row index.
    fn row_limit(&self) -> usize;

    /// One past the largest legal column index.
    fn col_limit(&self) -> usize;

    /// Change the row bound; backends repartition as needed.
    fn set_row_limit(&mut self, limit: usize);

    /// Change the column bound; backends repartition as needed.
    fn set_col_limit(&mut self, limit: usize);

    /// Make room for at least `count` total contributions.
    fn reserve(&mut self, count: usize);

    /// Drop every contribution; limits are kept.
    fn clear(&mut self);

    /// Number of stored contributions (duplicates counted until compacted).
    fn size(&self) -> usize;

    /// Contributions that fit without reallocating.
    fn capacity(&self) -> usize;

    /// Merge duplicate positions by summation.
    ///
    /// Afterwards each `(row, col)` appears at most once and the value at
    /// every position is unchanged.
    fn compact(&mut self);

    /// Summed value at `(row, col)`, zero when absent.
    fn at(&self, row: usize, col: usize) -> f64;

    /// The `index`-th stored contribution in backend order.
    fn element(&self, index: usize) -> Triplet;

    /// One sequential pass over the stored contributions.
    fn elements(&self) -> Box<dyn Iterator<Item = Triplet> + '_>;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Append `value` unless `row` is out of range.
    fn assign_checked_row(&mut self, row: usize, col: usize, value: f64) {
        if row < self.row_limit() {
            self.assign(row, col, value);
        }
    }

    /// Append `value` unless `col` is out of range.
    fn assign_checked_col(&mut self, row: usize, col: usize, value: f64) {
        if col < self.col_limit() {
            self.assign(row, col, value);
        }
    }

    /// Append `value` unless either index is out of range.
    fn assign_checked(&mut self, row: usize, col: usize, value: f64) {
        if row < self.row_limit() && col < self.col_limit() {
            self.assign(row, col, value);
        }
    }

    /// Append every contribution of `other`.
    fn merge(&mut self, other: &dyn Accumulator) {
        for t in other.elements() {
            self.assign(t.row, t.col, t.val);
        }
    }

    /// Append every contribution of `other`, scaled by `factor`.
    fn merge_scaled(&mut self, other: &dyn Accumulator, factor: f64) {
        for t in other.elements() {
            self.assign(t.row, t.col, t.val * factor);
        }
    }

    /// Append `source`'s row `orig` re-addressed to row `new`.
    fn copy_translate_row(&mut self, source: &dyn Accumulator, orig: usize, new: usize) {
        for t in source.elements() {
            if t.row == orig {
                self.assign(new, t.col, t.val);
            }
        }
    }

    /// Append `source`'s column `orig` re-addressed to column `new`.
    fn copy_translate_col(&mut self, source: &dyn Accumulator, orig: usize, new: usize) {
        for t in source.elements() {
            if t.col == orig {
                self.assign(t.row, new, t.val);
            }
        }
    }
}
