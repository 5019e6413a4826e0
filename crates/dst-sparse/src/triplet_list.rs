//! Flat triplet storage with sort-on-demand.
//!
//! The workhorse backend: a single `Vec` of contributions in insertion
//! order, sorted only when a query or compaction needs it. Carries the
//! matrix manipulation helpers (scaling, index translation, replication,
//! chain-rule cascade) used when a Jacobian is assembled from
//! per-component pieces and then rewritten for the solver's variable
//! layout.

use crate::accumulator::{Accumulator, SortOrder, Triplet};
use crate::error::SparseError;
use sprs::{CsMat, TriMat};

/// Append-friendly triplet list over a bounded index space.
#[derive(Debug, Clone)]
pub struct TripletList {
    row_limit: usize,
    col_limit: usize,
    data: Vec<Triplet>,
    /// Leading run of `data` known to be sorted under `order`.
    sorted: usize,
    order: SortOrder,
}

impl TripletList {
    /// New list with the given index-space bounds.
    pub fn new(row_limit: usize, col_limit: usize) -> Self {
        Self::with_capacity(row_limit, col_limit, 64)
    }

    /// New list reserving space for `capacity` contributions up front.
    pub fn with_capacity(row_limit: usize, col_limit: usize, capacity: usize) -> Self {
        Self {
            row_limit,
            col_limit,
            data: Vec::with_capacity(capacity),
            sorted: 0,
            order: SortOrder::RowMajor,
        }
    }

    /// Whether every element currently sits in sorted position.
    pub fn is_sorted(&self) -> bool {
        self.sorted == self.data.len()
    }

    /// Ordering the data was last sorted under.
    pub fn order(&self) -> SortOrder {
        self.order
    }

    /// Sort all elements under `order`.
    pub fn sort(&mut self, order: SortOrder) {
        self.data.sort_unstable_by_key(|t| order.sort_key(t));
        self.order = order;
        self.sorted = self.data.len();
    }

    /// Multiply every element by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for t in &mut self.data {
            t.val *= factor;
        }
    }

    /// Multiply an ordinal range of elements by `factor`.
    ///
    /// The range addresses storage positions, not matrix positions, and is
    /// clipped to the current element count.
    pub fn scale_range(&mut self, factor: f64, start: usize, count: usize) {
        let lo = start.min(self.data.len());
        let hi = start.saturating_add(count).min(self.data.len());
        for t in &mut self.data[lo..hi] {
            t.val *= factor;
        }
    }

    /// Multiply every element in `row` by `factor`.
    pub fn scale_row(&mut self, row: usize, factor: f64) {
        for t in &mut self.data {
            if t.row == row {
                t.val *= factor;
            }
        }
    }

    /// Multiply every element in `col` by `factor`.
    pub fn scale_col(&mut self, col: usize, factor: f64) {
        for t in &mut self.data {
            if t.col == col {
                t.val *= factor;
            }
        }
    }

    /// Re-address every element of row `from` to row `to`.
    pub fn translate_row(&mut self, from: usize, to: usize) {
        for t in &mut self.data {
            if t.row == from {
                t.row = to;
            }
        }
        self.sorted = 0;
    }

    /// Re-address every element of column `from` to column `to`.
    pub fn translate_col(&mut self, from: usize, to: usize) {
        for t in &mut self.data {
            if t.col == from {
                t.col = to;
            }
        }
        self.sorted = 0;
    }

    /// Copy all of `source`, fanning the entries of `orig_col` out to every
    /// column in `new_cols` scaled by the matching multiplier. Entries in
    /// other columns are copied through once, unchanged.
    pub fn copy_replicate(
        &mut self,
        source: &TripletList,
        orig_col: usize,
        new_cols: &[usize],
        multipliers: &[f64],
    ) -> Result<(), SparseError> {
        if new_cols.len() != multipliers.len() {
            return Err(SparseError::LengthMismatch {
                expected: new_cols.len(),
                got: multipliers.len(),
            });
        }
        for t in &source.data {
            if t.col == orig_col {
                for (&col, &mult) in new_cols.iter().zip(multipliers) {
                    self.data.push(Triplet::new(t.row, col, t.val * mult));
                }
            } else {
                self.data.push(*t);
            }
        }
        Ok(())
    }

    /// Chain-rule substitution through column `index`.
    ///
    /// Each element of `self` in column `index` is a partial with respect
    /// to an intermediate variable; `through` holds that variable's own
    /// partials in row `index`. The element is replaced by its value times
    /// each of those partials (the first in place, the rest appended).
    /// Elements with no counterpart in `through` are left untouched.
    pub fn cascade(&mut self, through: &TripletList, index: usize) {
        let original = self.data.len();
        for n in 0..original {
            if self.data[n].col != index {
                continue;
            }
            let keyval = self.data[n].val;
            let row = self.data[n].row;
            let mut first = true;
            for t in through.data.iter().filter(|t| t.row == index) {
                if first {
                    self.data[n].col = t.col;
                    self.data[n].val = keyval * t.val;
                    first = false;
                } else {
                    self.data.push(Triplet::new(row, t.col, keyval * t.val));
                }
            }
        }
        self.sorted = 0;
    }

    /// Swap rows and columns, limits included.
    pub fn transpose(&mut self) {
        for t in &mut self.data {
            std::mem::swap(&mut t.row, &mut t.col);
        }
        std::mem::swap(&mut self.row_limit, &mut self.col_limit);
        self.sorted = 0;
    }

    /// Multiply each element by `diag[col]`.
    pub fn diag_multiply(&mut self, diag: &[f64]) {
        debug_assert!(diag.len() >= self.col_limit);
        for t in &mut self.data {
            if let Some(d) = diag.get(t.col) {
                t.val *= d;
            }
        }
    }

    /// Drop elements outside the current limits, plus the whole of
    /// `drop_row` when given.
    pub fn filter(&mut self, drop_row: Option<usize>) {
        let was_sorted = self.is_sorted();
        let (rl, cl) = (self.row_limit, self.col_limit);
        self.data
            .retain(|t| t.row < rl && t.col < cl && Some(t.row) != drop_row);
        self.sorted = if was_sorted { self.data.len() } else { 0 };
    }

    /// Export as compressed sparse row, merging duplicates first.
    ///
    /// Elements outside the current limits are left out of the export.
    pub fn to_csr(&mut self) -> CsMat<f64> {
        self.compact();
        let mut tri = TriMat::new((self.row_limit, self.col_limit));
        for t in &self.data {
            if t.row < self.row_limit && t.col < self.col_limit {
                tri.add_triplet(t.row, t.col, t.val);
            }
        }
        tri.to_csr()
    }
}

impl Accumulator for TripletList {
    fn assign(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.row_limit, "row {row} outside limit {}", self.row_limit);
        debug_assert!(col < self.col_limit, "col {col} outside limit {}", self.col_limit);
        self.data.push(Triplet::new(row, col, value));
    }

    fn row_limit(&self) -> usize {
        self.row_limit
    }

    fn col_limit(&self) -> usize {
        self.col_limit
    }

    fn set_row_limit(&mut self, limit: usize) {
        self.row_limit = limit;
    }

    fn set_col_limit(&mut self, limit: usize) {
        self.col_limit = limit;
    }

    fn reserve(&mut self, count: usize) {
        self.data.reserve(count.saturating_sub(self.data.len()));
    }

    fn clear(&mut self) {
        self.data.clear();
        self.sorted = 0;
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn compact(&mut self) {
        if self.data.len() < 2 {
            self.sorted = self.data.len();
            return;
        }
        if !self.is_sorted() {
            self.sort(self.order);
        }
        let mut write = 0;
        for read in 1..self.data.len() {
            let cur = self.data[read];
            if cur.row == self.data[write].row && cur.col == self.data[write].col {
                self.data[write].val += cur.val;
            } else {
                write += 1;
                self.data[write] = cur;
            }
        }
        self.data.truncate(write + 1);
        self.sorted = self.data.len();
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        if self.is_sorted() {
            let key = match self.order {
                SortOrder::RowMajor => (row, col),
                SortOrder::ColMajor => (col, row),
            };
            let start = self.data.partition_point(|t| self.order.sort_key(t) < key);
            self.data[start..]
                .iter()
                .take_while(|t| t.row == row && t.col == col)
                .map(|t| t.val)
                .sum()
        } else {
            self.data
                .iter()
                .filter(|t| t.row == row && t.col == col)
                .map(|t| t.val)
                .sum()
        }
    }

    fn element(&self, index: usize) -> Triplet {
        self.data[index]
    }

    fn elements(&self) -> Box<dyn Iterator<Item = Triplet> + '_> {
        Box::new(self.data.iter().copied())
    }
}
