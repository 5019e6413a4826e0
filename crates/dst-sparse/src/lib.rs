//! # Sparse Accumulation for Solver Jacobians
//!
//! Jacobian assembly over a component tree is append-heavy: every component
//! contributes a handful of partial derivatives per evaluation pass,
//! several components routinely touch the same matrix position, and the
//! whole structure is rebuilt from scratch on the next pass. The containers
//! here are tuned for exactly that pattern: cheap unordered appends,
//! ordering deferred until a query needs it, and duplicate positions merged
//! by summation rather than overwritten.
//!
//! ## Module Organization
//!
//! - [`accumulator`]: the [`Accumulator`] contract shared by all backends
//! - [`triplet_list`]: flat triplet list with sort-on-demand and the full
//!   set of matrix manipulation helpers
//! - [`bucketed`]: packed-key storage partitioned into `2^k` buckets
//! - [`diagnostics`]: out-of-band degeneracy scans (empty rows, dependent
//!   row pairs)
//!
//! ## Choosing a backend
//!
//! | Backend | Entry | Best for |
//! |---------|-------|----------|
//! | [`TripletList`] | full triplet | small systems, matrix rewriting |
//! | [`BucketedTriplets<u32>`] | packed 32-bit key | dimensions below 65,536 |
//! | [`BucketedTriplets<u64>`] | packed 64-bit key | dimensions below 2^32 |
//!
//! ## Usage
//!
//! ```ignore
//! use dst_sparse::{Accumulator, TripletList};
//!
//! let mut jac = TripletList::new(n, n);
//! jac.assign(2, 5, 1.0);
//! jac.assign(2, 5, 2.0); // duplicate position: summed, not replaced
//! jac.assign(0, 1, 3.0);
//! jac.compact();
//! assert_eq!(jac.at(2, 5), 3.0);
//! ```

pub mod accumulator;
pub mod bucketed;
pub mod diagnostics;
pub mod error;
pub mod triplet_list;

pub use accumulator::{Accumulator, SortOrder, Triplet};
pub use bucketed::{BlockPartition, BucketedTriplets, PackedKey};
pub use diagnostics::{find_dependent_rows, find_missing, DependentPair};
pub use error::SparseError;
pub use triplet_list::TripletList;
