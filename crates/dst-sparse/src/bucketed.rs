//! Packed-key accumulation partitioned into `2^k` buckets.
//!
//! Each contribution is stored as a single integer key plus its value:
//! `key = primary << (bits/2) | secondary`, where the primary index is the
//! row under row-major ordering and the column under column-major. Keys
//! compare in lexicographic `(primary, secondary)` order for free, halve
//! the memory of a full triplet, and make compaction a plain integer sort.
//!
//! The bucket array splits the primary index space so that sorting and
//! merging work on `2^k` short runs instead of one long one. `k = 0`
//! degenerates to a single vector, `k = 1` to a two-way split at the
//! midpoint; larger `k` uses a shift-and-bias mapping recomputed whenever
//! the limits change.

use crate::accumulator::{Accumulator, SortOrder, Triplet};
use crate::error::SparseError;

/// Integer keys that pack a `(primary, secondary)` index pair.
pub trait PackedKey: Copy + Ord + std::fmt::Debug {
    /// Bits available to each half of the key.
    const HALF_BITS: u32;

    /// Exclusive bound on either dimension for this key width.
    const LIMIT_CAP: usize = 1 << Self::HALF_BITS;

    fn compose(primary: usize, secondary: usize) -> Self;
    fn primary(self) -> usize;
    fn secondary(self) -> usize;
}

impl PackedKey for u32 {
    const HALF_BITS: u32 = 16;

    fn compose(primary: usize, secondary: usize) -> Self {
        ((primary as u32) << 16) | (secondary as u32)
    }

    fn primary(self) -> usize {
        (self >> 16) as usize
    }

    fn secondary(self) -> usize {
        (self & 0xFFFF) as usize
    }
}

impl PackedKey for u64 {
    const HALF_BITS: u32 = 32;

    fn compose(primary: usize, secondary: usize) -> Self {
        ((primary as u64) << 32) | (secondary as u64)
    }

    fn primary(self) -> usize {
        (self >> 32) as usize
    }

    fn secondary(self) -> usize {
        (self & 0xFFFF_FFFF) as usize
    }
}

/// How the primary index space maps onto the bucket array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPartition {
    /// One bucket takes everything.
    Single,
    /// Two buckets split at the midpoint of the primary span.
    Split { split: usize },
    /// `bucket = (primary + bias) >> shift`.
    ///
    /// The middle buckets each cover `2^shift` primaries; the bias centers
    /// the leftover span on the first and last buckets.
    Shifted { shift: u32, bias: usize },
}

impl BlockPartition {
    /// Partition `span` primary indices across `2^k` buckets.
    pub fn compute(k: u32, span: usize) -> Self {
        match k {
            0 => BlockPartition::Single,
            1 => BlockPartition::Split { split: span >> 1 },
            _ => {
                let span = span.max(1);
                let log2 = usize::BITS - 1 - span.leading_zeros();
                if log2 + 1 <= k {
                    // fewer primaries than buckets: map directly, tail buckets idle
                    return BlockPartition::Shifted { shift: 0, bias: 0 };
                }
                let shift = log2 - k + 1;
                let middle = (1usize << shift) * ((1usize << k) - 2);
                let extra = span.saturating_sub(middle);
                let mut bias = (1usize << shift).saturating_sub(extra >> 1);
                if shift >= k && extra < (1usize << (shift - k)) {
                    bias >>= 1;
                }
                BlockPartition::Shifted { shift, bias }
            }
        }
    }

    /// Bucket index for `primary`, clamped to the bucket array.
    pub fn bucket_of(self, primary: usize, bucket_count: usize) -> usize {
        let raw = match self {
            BlockPartition::Single => 0,
            BlockPartition::Split { split } => usize::from(primary >= split),
            BlockPartition::Shifted { shift, bias } => (primary + bias) >> shift,
        };
        raw.min(bucket_count - 1)
    }
}

/// Bucketed packed-key accumulator.
///
/// `X` selects the key width: `u32` for dimensions below 65,536, `u64` for
/// dimensions below 2^32.
#[derive(Debug, Clone)]
pub struct BucketedTriplets<X: PackedKey> {
    row_limit: usize,
    col_limit: usize,
    order: SortOrder,
    k: u32,
    partition: BlockPartition,
    buckets: Vec<Vec<(X, f64)>>,
    /// Total size at the last full sort; equal to the current size when
    /// every bucket is in key order.
    sorted_count: usize,
}

impl<X: PackedKey> BucketedTriplets<X> {
    /// New accumulator with `2^k` buckets, partitioned by row.
    pub fn new(k: u32, row_limit: usize, col_limit: usize) -> Result<Self, SparseError> {
        Self::with_order(k, row_limit, col_limit, SortOrder::RowMajor)
    }

    /// New accumulator partitioned by the primary index of `order`.
    pub fn with_order(
        k: u32,
        row_limit: usize,
        col_limit: usize,
        order: SortOrder,
    ) -> Result<Self, SparseError> {
        for dim in [row_limit, col_limit] {
            if dim > X::LIMIT_CAP {
                return Err(SparseError::DimensionTooLarge {
                    dim,
                    max: X::LIMIT_CAP,
                });
            }
        }
        let span = match order {
            SortOrder::RowMajor => row_limit,
            SortOrder::ColMajor => col_limit,
        };
        Ok(Self {
            row_limit,
            col_limit,
            order,
            k,
            partition: BlockPartition::compute(k, span),
            buckets: vec![Vec::new(); 1 << k],
            sorted_count: 0,
        })
    }

    /// As [`BucketedTriplets::new`], reserving room for `capacity` total
    /// contributions.
    pub fn with_capacity(
        k: u32,
        row_limit: usize,
        col_limit: usize,
        capacity: usize,
    ) -> Result<Self, SparseError> {
        let mut md = Self::new(k, row_limit, col_limit)?;
        md.reserve(capacity);
        Ok(md)
    }

    /// Active partition of the primary index space.
    pub fn partition(&self) -> BlockPartition {
        self.partition
    }

    /// Number of buckets (`2^k`).
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Contributions currently held by bucket `n`.
    pub fn bucket_len(&self, n: usize) -> usize {
        self.buckets[n].len()
    }

    /// Whether every bucket is in key order.
    pub fn is_sorted(&self) -> bool {
        self.sorted_count == self.len_total()
    }

    /// Sort every bucket by key without merging duplicates.
    pub fn sort(&mut self) {
        for bucket in &mut self.buckets {
            bucket.sort_unstable_by_key(|&(key, _)| key);
        }
        self.sorted_count = self.len_total();
    }

    fn len_total(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    fn primary_of(&self, row: usize, col: usize) -> (usize, usize) {
        match self.order {
            SortOrder::RowMajor => (row, col),
            SortOrder::ColMajor => (col, row),
        }
    }

    fn primary_span(&self) -> usize {
        match self.order {
            SortOrder::RowMajor => self.row_limit,
            SortOrder::ColMajor => self.col_limit,
        }
    }

    fn bucket_of(&self, primary: usize) -> usize {
        self.partition.bucket_of(primary, self.buckets.len())
    }

    fn triplet_from(&self, key: X, val: f64) -> Triplet {
        match self.order {
            SortOrder::RowMajor => Triplet::new(key.primary(), key.secondary(), val),
            SortOrder::ColMajor => Triplet::new(key.secondary(), key.primary(), val),
        }
    }

    /// Recompute the partition for the current limits and re-bucket every
    /// stored contribution.
    fn repartition(&mut self) {
        self.partition = BlockPartition::compute(self.k, self.primary_span());
        let old: Vec<(X, f64)> = self
            .buckets
            .iter_mut()
            .flat_map(|bucket| bucket.drain(..))
            .collect();
        for (key, val) in old {
            let bucket = self.bucket_of(key.primary());
            self.buckets[bucket].push((key, val));
        }
        self.sorted_count = 0;
    }
}

impl<X: PackedKey> Accumulator for BucketedTriplets<X> {
    fn assign(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.row_limit, "row {row} outside limit {}", self.row_limit);
        debug_assert!(col < self.col_limit, "col {col} outside limit {}", self.col_limit);
        let (primary, secondary) = self.primary_of(row, col);
        let key = X::compose(primary, secondary);
        let bucket = self.bucket_of(primary);
        self.buckets[bucket].push((key, value));
    }

    fn row_limit(&self) -> usize {
        self.row_limit
    }

    fn col_limit(&self) -> usize {
        self.col_limit
    }

    fn set_row_limit(&mut self, limit: usize) {
        debug_assert!(limit <= X::LIMIT_CAP);
        self.row_limit = limit;
        if self.order == SortOrder::RowMajor {
            self.repartition();
        }
    }

    fn set_col_limit(&mut self, limit: usize) {
        debug_assert!(limit <= X::LIMIT_CAP);
        self.col_limit = limit;
        if self.order == SortOrder::ColMajor {
            self.repartition();
        }
    }

    fn reserve(&mut self, count: usize) {
        let per = if self.k == 0 { count } else { count >> (self.k - 1) };
        for bucket in &mut self.buckets {
            bucket.reserve(per.saturating_sub(bucket.len()));
        }
    }

    fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.sorted_count = 0;
    }

    fn size(&self) -> usize {
        self.len_total()
    }

    fn capacity(&self) -> usize {
        self.buckets.iter().map(Vec::capacity).sum()
    }

    fn compact(&mut self) {
        for bucket in &mut self.buckets {
            if bucket.len() < 2 {
                continue;
            }
            bucket.sort_unstable_by_key(|&(key, _)| key);
            let mut write = 0;
            for read in 1..bucket.len() {
                let (key, val) = bucket[read];
                if key == bucket[write].0 {
                    bucket[write].1 += val;
                } else {
                    write += 1;
                    bucket[write] = (key, val);
                }
            }
            bucket.truncate(write + 1);
        }
        self.sorted_count = self.len_total();
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        let (primary, secondary) = self.primary_of(row, col);
        let key = X::compose(primary, secondary);
        let bucket = &self.buckets[self.bucket_of(primary)];
        if self.is_sorted() {
            let start = bucket.partition_point(|&(k, _)| k < key);
            bucket[start..]
                .iter()
                .take_while(|&&(k, _)| k == key)
                .map(|&(_, v)| v)
                .sum()
        } else {
            bucket
                .iter()
                .filter(|&&(k, _)| k == key)
                .map(|&(_, v)| v)
                .sum()
        }
    }

    fn element(&self, index: usize) -> Triplet {
        let mut n = index;
        for bucket in &self.buckets {
            if n < bucket.len() {
                let (key, val) = bucket[n];
                return self.triplet_from(key, val);
            }
            n -= bucket.len();
        }
        panic!("element index {index} out of range");
    }

    fn elements(&self) -> Box<dyn Iterator<Item = Triplet> + '_> {
        let order = self.order;
        Box::new(
            self.buckets
                .iter()
                .flatten()
                .map(move |&(key, val)| match order {
                    SortOrder::RowMajor => Triplet::new(key.primary(), key.secondary(), val),
                    SortOrder::ColMajor => Triplet::new(key.secondary(), key.primary(), val),
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triplet_list::TripletList;

    #[test]
    fn test_key_packing_round_trip() {
        let k32 = u32::compose(1234, 567);
        assert_eq!(k32.primary(), 1234);
        assert_eq!(k32.secondary(), 567);

        let k64 = u64::compose(4_000_000, 3_999_999);
        assert_eq!(k64.primary(), 4_000_000);
        assert_eq!(k64.secondary(), 3_999_999);
    }

    #[test]
    fn test_key_order_is_primary_then_secondary() {
        assert!(u32::compose(1, 9) < u32::compose(2, 0));
        assert!(u32::compose(2, 3) < u32::compose(2, 4));
    }

    #[test]
    fn test_partition_single_and_split() {
        assert_eq!(BlockPartition::compute(0, 100), BlockPartition::Single);

        let split = BlockPartition::compute(1, 100);
        assert_eq!(split, BlockPartition::Split { split: 50 });
        assert_eq!(split.bucket_of(49, 2), 0);
        assert_eq!(split.bucket_of(50, 2), 1);
    }

    #[test]
    fn test_partition_shift_bias_boundaries() {
        // span 100 over 4 buckets: 18 / 32 / 32 / 18
        let p = BlockPartition::compute(2, 100);
        assert_eq!(p, BlockPartition::Shifted { shift: 5, bias: 14 });
        assert_eq!(p.bucket_of(0, 4), 0);
        assert_eq!(p.bucket_of(17, 4), 0);
        assert_eq!(p.bucket_of(18, 4), 1);
        assert_eq!(p.bucket_of(49, 4), 1);
        assert_eq!(p.bucket_of(50, 4), 2);
        assert_eq!(p.bucket_of(81, 4), 2);
        assert_eq!(p.bucket_of(82, 4), 3);
        assert_eq!(p.bucket_of(99, 4), 3);
    }

    #[test]
    fn test_partition_small_span_maps_directly() {
        let p = BlockPartition::compute(3, 4);
        assert_eq!(p, BlockPartition::Shifted { shift: 0, bias: 0 });
        for primary in 0..4 {
            assert_eq!(p.bucket_of(primary, 8), primary);
        }
    }

    #[test]
    fn test_partition_span_just_below_bucket_count() {
        // span 3 over 4 buckets lands in the direct-map branch
        let p = BlockPartition::compute(2, 3);
        assert_eq!(p, BlockPartition::Shifted { shift: 0, bias: 0 });
        for primary in 0..3 {
            assert_eq!(p.bucket_of(primary, 4), primary);
        }

        let mut md = BucketedTriplets::<u32>::new(2, 3, 3).unwrap();
        md.assign(0, 0, 1.0);
        md.assign(2, 1, 2.0);
        md.assign(2, 1, 3.0);
        md.compact();
        assert_eq!(md.at(0, 0), 1.0);
        assert_eq!(md.at(2, 1), 5.0);

        let mut shrunk = BucketedTriplets::<u32>::new(2, 100, 100).unwrap();
        shrunk.assign(1, 1, 4.0);
        shrunk.set_row_limit(3);
        assert_eq!(
            shrunk.partition(),
            BlockPartition::Shifted { shift: 0, bias: 0 }
        );
        assert_eq!(shrunk.at(1, 1), 4.0);
    }

    #[test]
    fn test_dimension_cap_by_key_width() {
        let err = BucketedTriplets::<u32>::new(2, 70_000, 10).unwrap_err();
        assert_eq!(
            err,
            SparseError::DimensionTooLarge {
                dim: 70_000,
                max: 65_536
            }
        );
        assert!(BucketedTriplets::<u64>::new(2, 70_000, 10).is_ok());
    }

    #[test]
    fn test_assign_compact_at_across_buckets() {
        let mut md = BucketedTriplets::<u32>::new(2, 100, 100).unwrap();
        md.assign(2, 5, 1.0);
        md.assign(2, 5, 2.0);
        md.assign(0, 1, 3.0);
        md.assign(60, 4, 4.0);
        md.assign(99, 99, 5.0);
        assert_eq!(md.size(), 5);

        md.compact();
        assert_eq!(md.size(), 4);
        assert_eq!(md.at(2, 5), 3.0);
        assert_eq!(md.at(0, 1), 3.0);
        assert_eq!(md.at(60, 4), 4.0);
        assert_eq!(md.at(99, 99), 5.0);
        assert_eq!(md.at(1, 1), 0.0);
    }

    #[test]
    fn test_at_sums_before_compaction() {
        let mut md = BucketedTriplets::<u64>::new(1, 10, 10).unwrap();
        md.assign(7, 3, 1.5);
        md.assign(7, 3, 2.5);
        assert_eq!(md.at(7, 3), 4.0);
    }

    #[test]
    fn test_element_walks_buckets_in_order() {
        let mut md = BucketedTriplets::<u32>::new(1, 10, 10).unwrap();
        md.assign(7, 0, 1.0);
        md.assign(1, 0, 2.0);
        // bucket 0 holds primaries below 5, so (1,0) comes first
        assert_eq!(md.element(0), Triplet::new(1, 0, 2.0));
        assert_eq!(md.element(1), Triplet::new(7, 0, 1.0));
        let all: Vec<Triplet> = md.elements().collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].row, 1);
    }

    #[test]
    fn test_repartition_keeps_entries_reachable() {
        let mut md = BucketedTriplets::<u32>::new(2, 100, 100).unwrap();
        md.assign(10, 1, 1.0);
        md.assign(40, 2, 2.0);
        md.assign(60, 3, 3.0);
        md.set_row_limit(64);
        assert_ne!(md.partition(), BlockPartition::compute(2, 100));
        assert_eq!(md.at(10, 1), 1.0);
        assert_eq!(md.at(40, 2), 2.0);
        assert_eq!(md.at(60, 3), 3.0);
    }

    #[test]
    fn test_col_major_partitions_by_column() {
        let mut md =
            BucketedTriplets::<u32>::with_order(1, 10, 10, SortOrder::ColMajor).unwrap();
        md.assign(0, 8, 1.0);
        md.assign(9, 1, 2.0);
        // column 1 belongs to bucket 0, column 8 to bucket 1
        assert_eq!(md.bucket_len(0), 1);
        assert_eq!(md.bucket_len(1), 1);
        assert_eq!(md.element(0), Triplet::new(9, 1, 2.0));
    }

    #[test]
    fn test_clear_and_reserve() {
        let mut md = BucketedTriplets::<u32>::with_capacity(2, 100, 100, 80).unwrap();
        assert!(md.capacity() >= 80);
        md.assign(1, 1, 1.0);
        md.clear();
        assert_eq!(md.size(), 0);
        assert!(md.is_empty());
        assert_eq!(md.at(1, 1), 0.0);
    }

    #[test]
    fn test_checked_assign_drops_out_of_range() {
        let mut md = BucketedTriplets::<u32>::new(1, 8, 8).unwrap();
        md.assign_checked(8, 0, 1.0);
        md.assign_checked(0, 8, 1.0);
        assert_eq!(md.size(), 0);
        md.assign_checked(7, 7, 1.0);
        assert_eq!(md.size(), 1);
    }

    #[test]
    fn test_merge_from_triplet_list() {
        let mut src = TripletList::new(50, 50);
        src.assign(3, 4, 1.0);
        src.assign(30, 40, 2.0);

        let mut md = BucketedTriplets::<u32>::new(2, 50, 50).unwrap();
        md.assign(3, 4, 0.5);
        md.merge(&src);
        md.compact();
        assert_eq!(md.at(3, 4), 1.5);
        assert_eq!(md.at(30, 40), 2.0);
    }
}
