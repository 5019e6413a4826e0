//! Structural degeneracy scans over an assembled Jacobian.
//!
//! Run out of band, after assembly and before a factorization attempt;
//! neither scan belongs to the accumulation hot path. Both compact and
//! row-sort the matrix first, so they take it by mutable reference.

use crate::accumulator::{Accumulator, SortOrder};
use crate::triplet_list::TripletList;
use std::ops::Range;

/// Per-entry tolerance when testing two rows for a common factor.
const RATIO_TOLERANCE: f64 = 1e-6;

/// A pair of rows whose entries are exact multiples of each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DependentPair {
    pub row_a: usize,
    pub row_b: usize,
    /// `row_b`'s entries equal `factor` times `row_a`'s.
    pub factor: f64,
}

/// Rows of `0..row_limit` with no usable entry.
///
/// An entry is usable when its column is in range and its value is finite,
/// nonzero, and not subnormal. A row without one makes the matrix
/// structurally singular.
pub fn find_missing(md: &mut TripletList) -> Vec<usize> {
    md.compact();
    md.sort(SortOrder::RowMajor);

    let mut missing = Vec::new();
    let mut pos = 0;
    for row in 0..md.row_limit() {
        let mut good = false;
        while pos < md.size() {
            let t = md.element(pos);
            if t.row != row {
                break;
            }
            if t.col < md.col_limit() && t.val.is_normal() {
                good = true;
            }
            pos += 1;
        }
        if !good {
            missing.push(row);
        }
    }
    missing
}

/// Pairs of rows that are linear multiples of each other.
///
/// Two rows qualify when they touch exactly the same columns and every
/// entry pair agrees on one factor within [`RATIO_TOLERANCE`]. Such pairs
/// leave the matrix rank deficient even though both rows have entries.
pub fn find_dependent_rows(md: &mut TripletList) -> Vec<DependentPair> {
    md.compact();
    md.sort(SortOrder::RowMajor);

    let mut ranges: Vec<(usize, Range<usize>)> = Vec::new();
    let mut pos = 0;
    while pos < md.size() {
        let row = md.element(pos).row;
        let start = pos;
        while pos < md.size() && md.element(pos).row == row {
            pos += 1;
        }
        ranges.push((row, start..pos));
    }

    let mut pairs = Vec::new();
    for (i, (row_a, range_a)) in ranges.iter().enumerate() {
        for (row_b, range_b) in &ranges[i + 1..] {
            if range_a.len() != range_b.len() {
                continue;
            }
            if let Some(factor) = common_factor(md, range_a.clone(), range_b.clone()) {
                pairs.push(DependentPair {
                    row_a: *row_a,
                    row_b: *row_b,
                    factor,
                });
            }
        }
    }
    pairs
}

fn common_factor(md: &TripletList, a: Range<usize>, b: Range<usize>) -> Option<f64> {
    let mut factor = None;
    for (ia, ib) in a.zip(b) {
        let ta = md.element(ia);
        let tb = md.element(ib);
        if ta.col != tb.col {
            return None;
        }
        if ta.val == 0.0 {
            if tb.val != 0.0 {
                return None;
            }
            continue;
        }
        let f = match factor {
            Some(f) => f,
            None => {
                let f = tb.val / ta.val;
                factor = Some(f);
                f
            }
        };
        if (tb.val / ta.val - f).abs() > RATIO_TOLERANCE {
            return None;
        }
    }
    factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_missing_flags_empty_and_zero_rows() {
        let mut md = TripletList::new(4, 4);
        md.assign(0, 1, 1.0);
        md.assign(2, 2, 0.0);
        md.assign(3, 0, 5.0);
        assert_eq!(find_missing(&mut md), vec![1, 2]);
    }

    #[test]
    fn test_find_missing_ignores_out_of_range_cols() {
        let mut md = TripletList::new(2, 10);
        md.assign(0, 0, 1.0);
        md.assign(1, 9, 1.0);
        md.set_col_limit(4);
        assert_eq!(find_missing(&mut md), vec![1]);
    }

    #[test]
    fn test_find_missing_clean_matrix() {
        let mut md = TripletList::new(3, 3);
        for n in 0..3 {
            md.assign(n, n, 1.0);
        }
        assert!(find_missing(&mut md).is_empty());
    }

    #[test]
    fn test_find_dependent_rows_reports_factor() {
        let mut md = TripletList::new(3, 3);
        md.assign(0, 0, 1.0);
        md.assign(0, 2, 2.0);
        md.assign(1, 0, 2.0);
        md.assign(1, 2, 4.0);
        md.assign(2, 1, 3.0);

        let pairs = find_dependent_rows(&mut md);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].row_a, 0);
        assert_eq!(pairs[0].row_b, 1);
        assert!((pairs[0].factor - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_find_dependent_rows_rejects_near_multiples() {
        let mut md = TripletList::new(2, 3);
        md.assign(0, 0, 1.0);
        md.assign(0, 2, 2.0);
        md.assign(1, 0, 2.0);
        md.assign(1, 2, 4.001);
        assert!(find_dependent_rows(&mut md).is_empty());
    }

    #[test]
    fn test_dependence_tolerance_is_relative_to_magnitude() {
        // ratio deviation 5e-7, absolute residual 1.0
        let mut big = TripletList::new(2, 2);
        big.assign(0, 0, 1.0e6);
        big.assign(0, 1, 2.0e6);
        big.assign(1, 0, 2.0e6);
        big.assign(1, 1, 4.0e6 + 1.0);
        let pairs = find_dependent_rows(&mut big);
        assert_eq!(pairs.len(), 1);
        assert!((pairs[0].factor - 2.0).abs() < 1e-12);

        // tiny absolute residuals still reject when the ratios disagree
        let mut small = TripletList::new(2, 2);
        small.assign(0, 0, 1.0e-9);
        small.assign(0, 1, 2.0e-9);
        small.assign(1, 0, 3.0e-9);
        small.assign(1, 1, 5.0e-9);
        assert!(find_dependent_rows(&mut small).is_empty());
    }

    #[test]
    fn test_find_dependent_rows_needs_matching_pattern() {
        let mut md = TripletList::new(2, 4);
        md.assign(0, 0, 1.0);
        md.assign(0, 1, 2.0);
        md.assign(1, 0, 2.0);
        md.assign(1, 3, 4.0);
        assert!(find_dependent_rows(&mut md).is_empty());
    }
}
